//! Parameter types: coercion from raw tokens (or already-typed values) into
//! [`Value`]s.
//!
//! Every conversion accepts the output of its own type unchanged, so defaults
//! that were declared already typed can be run through the same pipeline as
//! command-line strings.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::context::Context;
use crate::error::{CliError, CliResult};
use crate::value::{FileHandle, FileMode, Value};

pub trait ParamType: fmt::Debug + Send + Sync {
    /// Descriptive name, also the default metavar (upper-cased).
    fn name(&self) -> &str;

    fn convert(&self, value: Value, ctx: Option<&Context<'_>>) -> CliResult<Value>;

    fn metavar(&self) -> Option<String> {
        None
    }

    /// Extra text appended to "Missing ..." errors.
    fn missing_message(&self) -> Option<String> {
        None
    }

    /// Split an environment variable holding several values.
    fn split_envvar_value(&self, raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    /// Composite types consume several tokens per occurrence.
    fn is_composite(&self) -> bool {
        false
    }

    fn arity(&self) -> usize {
        1
    }

    fn is_bool(&self) -> bool {
        false
    }
}

pub type TypeRef = Arc<dyn ParamType>;

fn fail(message: impl Into<String>) -> CliError {
    CliError::bad_parameter(message)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

impl ParamType for StringType {
    fn name(&self) -> &str {
        "text"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        match value {
            Value::Str(_) => Ok(value),
            Value::Tuple(_) | Value::File(_) => Err(fail(format!(
                "expected text, got a {}",
                value.type_label()
            ))),
            other => Ok(Value::Str(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntType;

impl ParamType for IntType {
    fn name(&self) -> &str {
        "integer"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        match value {
            Value::Int(_) => Ok(value),
            Value::Str(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| fail(format!("{s} is not a valid integer"))),
            other => Err(fail(format!("{other} is not a valid integer"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatType;

impl ParamType for FloatType {
    fn name(&self) -> &str {
        "float"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        match value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Str(ref s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| fail(format!("{s} is not a valid floating point value"))),
            other => Err(fail(format!("{other} is not a valid floating point value"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolType;

impl ParamType for BoolType {
    fn name(&self) -> &str {
        "boolean"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        match value {
            Value::Bool(_) => Ok(value),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "t" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "n" | "f" | "off" => Ok(Value::Bool(false)),
                _ => Err(fail(format!("{s} is not a valid boolean"))),
            },
            other => Err(fail(format!("{other} is not a valid boolean"))),
        }
    }

    fn is_bool(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidType;

impl ParamType for UuidType {
    fn name(&self) -> &str {
        "uuid"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        match value {
            Value::Uuid(_) => Ok(value),
            Value::Str(ref s) => Uuid::parse_str(s.trim())
                .map(Value::Uuid)
                .map_err(|_| fail(format!("{s} is not a valid UUID value"))),
            other => Err(fail(format!("{other} is not a valid UUID value"))),
        }
    }
}

/// A fixed set of accepted strings.
#[derive(Debug, Clone)]
pub struct Choice {
    choices: Vec<String>,
    case_sensitive: bool,
}

impl Choice {
    pub fn new<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }
}

impl ParamType for Choice {
    fn name(&self) -> &str {
        "choice"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        let raw = match &value {
            Value::Str(s) => s.as_str(),
            other => {
                return Err(fail(format!(
                    "invalid choice: {other}. (choose from {})",
                    self.choices.join(", ")
                )));
            }
        };
        let found = if self.case_sensitive {
            self.choices.iter().find(|c| c.as_str() == raw)
        } else {
            let lowered = raw.to_lowercase();
            self.choices.iter().find(|c| c.to_lowercase() == lowered)
        };
        match found {
            Some(choice) => Ok(Value::Str(choice.clone())),
            None => Err(fail(format!(
                "invalid choice: {raw}. (choose from {})",
                self.choices.join(", ")
            ))),
        }
    }

    fn metavar(&self) -> Option<String> {
        Some(format!("[{}]", self.choices.join("|")))
    }

    fn missing_message(&self) -> Option<String> {
        Some(format!("Choose from {}.", self.choices.join(", ")))
    }
}

fn range_message<T: fmt::Display>(value: T, min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (None, Some(max)) => format!("{value} is bigger than the maximum valid value {max}."),
        (Some(min), None) => format!("{value} is smaller than the minimum valid value {min}."),
        (Some(min), Some(max)) => format!("{value} is not in the valid range of {min} to {max}."),
        (None, None) => format!("{value} is out of range."),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub clamp: bool,
}

impl IntRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            min,
            max,
            clamp: false,
        }
    }

    pub fn clamped(mut self) -> Self {
        self.clamp = true;
        self
    }
}

impl ParamType for IntRange {
    fn name(&self) -> &str {
        "integer range"
    }

    fn convert(&self, value: Value, ctx: Option<&Context<'_>>) -> CliResult<Value> {
        let Value::Int(mut rv) = IntType.convert(value, ctx)? else {
            return Err(fail("expected an integer"));
        };
        if self.clamp {
            if let Some(min) = self.min {
                rv = rv.max(min);
            }
            if let Some(max) = self.max {
                rv = rv.min(max);
            }
            return Ok(Value::Int(rv));
        }
        let below = self.min.is_some_and(|min| rv < min);
        let above = self.max.is_some_and(|max| rv > max);
        if below || above {
            return Err(fail(range_message(rv, self.min, self.max)));
        }
        Ok(Value::Int(rv))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub clamp: bool,
}

impl FloatRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min,
            max,
            clamp: false,
        }
    }

    pub fn clamped(mut self) -> Self {
        self.clamp = true;
        self
    }
}

impl ParamType for FloatRange {
    fn name(&self) -> &str {
        "float range"
    }

    fn convert(&self, value: Value, ctx: Option<&Context<'_>>) -> CliResult<Value> {
        let Value::Float(mut rv) = FloatType.convert(value, ctx)? else {
            return Err(fail("expected a floating point value"));
        };
        if self.clamp {
            if let Some(min) = self.min {
                rv = rv.max(min);
            }
            if let Some(max) = self.max {
                rv = rv.min(max);
            }
            return Ok(Value::Float(rv));
        }
        let below = self.min.is_some_and(|min| rv < min);
        let above = self.max.is_some_and(|max| rv > max);
        if below || above {
            return Err(fail(range_message(rv, self.min, self.max)));
        }
        Ok(Value::Float(rv))
    }
}

/// A filesystem path with optional existence and kind checks.
#[derive(Debug, Clone)]
pub struct PathType {
    pub exists: bool,
    pub file_okay: bool,
    pub dir_okay: bool,
    pub writable: bool,
    pub readable: bool,
    pub resolve_path: bool,
    pub allow_dash: bool,
}

impl Default for PathType {
    fn default() -> Self {
        Self {
            exists: false,
            file_okay: true,
            dir_okay: true,
            writable: false,
            readable: true,
            resolve_path: false,
            allow_dash: false,
        }
    }
}

impl PathType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(mut self) -> Self {
        self.exists = true;
        self
    }

    pub fn file_only(mut self) -> Self {
        self.file_okay = true;
        self.dir_okay = false;
        self
    }

    pub fn dir_only(mut self) -> Self {
        self.file_okay = false;
        self.dir_okay = true;
        self
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn resolve_path(mut self) -> Self {
        self.resolve_path = true;
        self
    }

    pub fn allow_dash(mut self) -> Self {
        self.allow_dash = true;
        self
    }

    fn kind_label(&self) -> &'static str {
        match (self.file_okay, self.dir_okay) {
            (true, false) => "File",
            (false, true) => "Directory",
            _ => "Path",
        }
    }

    fn check(&self, path: &Path, shown: &str) -> CliResult<()> {
        let label = self.kind_label();
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) if !self.exists => return Ok(()),
            Err(_) => return Err(fail(format!("{label} \"{shown}\" does not exist."))),
        };
        if !self.file_okay && meta.is_file() {
            return Err(fail(format!("{label} \"{shown}\" is a file.")));
        }
        if !self.dir_okay && meta.is_dir() {
            return Err(fail(format!("{label} \"{shown}\" is a directory.")));
        }
        if self.writable && meta.permissions().readonly() {
            return Err(fail(format!("{label} \"{shown}\" is not writable.")));
        }
        if self.readable {
            let readable = if meta.is_dir() {
                fs::read_dir(path).is_ok()
            } else {
                fs::File::open(path).is_ok()
            };
            if !readable {
                return Err(fail(format!("{label} \"{shown}\" is not readable.")));
            }
        }
        Ok(())
    }
}

impl ParamType for PathType {
    fn name(&self) -> &str {
        "path"
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        let original: PathBuf = match value {
            Value::Path(p) => p,
            Value::Str(s) => PathBuf::from(s),
            other => return Err(fail(format!("{other} is not a valid path"))),
        };
        let shown = original.display().to_string();
        if self.file_okay && self.allow_dash && shown == "-" {
            return Ok(Value::Path(original));
        }
        let path = if self.resolve_path {
            fs::canonicalize(&original).unwrap_or_else(|_| original.clone())
        } else {
            original
        };
        self.check(&path, &shown)?;
        Ok(Value::Path(path))
    }

    fn split_envvar_value(&self, raw: &str) -> Vec<String> {
        std::env::split_paths(raw)
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string())
            .collect()
    }
}

/// Opens the named file (or `-`) and registers its release with the Context.
#[derive(Debug, Clone, Copy)]
pub struct FileType {
    pub mode: FileMode,
    pub lazy: Option<bool>,
}

impl Default for FileType {
    fn default() -> Self {
        Self {
            mode: FileMode::Read,
            lazy: None,
        }
    }
}

impl FileType {
    pub fn read() -> Self {
        Self::default()
    }

    pub fn write() -> Self {
        Self {
            mode: FileMode::Write,
            lazy: None,
        }
    }

    pub fn append() -> Self {
        Self {
            mode: FileMode::Append,
            lazy: None,
        }
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    fn resolve_lazy(&self, name: &str) -> bool {
        match self.lazy {
            Some(lazy) => lazy,
            None => name != "-" && self.mode.is_write(),
        }
    }
}

impl ParamType for FileType {
    fn name(&self) -> &str {
        "filename"
    }

    fn convert(&self, value: Value, ctx: Option<&Context<'_>>) -> CliResult<Value> {
        let name = match value {
            Value::File(_) => return Ok(value),
            Value::Str(s) => s,
            Value::Path(p) => p.display().to_string(),
            other => return Err(fail(format!("{other} is not a valid filename"))),
        };
        let handle = FileHandle::open(name.as_str(), self.mode, self.resolve_lazy(&name))
            .map_err(|e| fail(format!("Could not open file: {name}: {e}")))?;
        if let Some(ctx) = ctx {
            let release = handle.clone();
            ctx.call_on_close(move || {
                release.close();
            });
        }
        Ok(Value::File(handle))
    }
}

/// Fixed-size heterogeneous group of values; sets the parameter's arity.
#[derive(Debug, Clone)]
pub struct TupleType {
    types: Vec<TypeRef>,
}

impl TupleType {
    pub fn new(types: Vec<TypeRef>) -> Self {
        Self { types }
    }
}

impl ParamType for TupleType {
    fn name(&self) -> &str {
        "tuple"
    }

    fn convert(&self, value: Value, ctx: Option<&Context<'_>>) -> CliResult<Value> {
        let Value::Tuple(items) = value else {
            return Err(fail(format!(
                "expected {} values, got a single {}",
                self.types.len(),
                value.type_label()
            )));
        };
        if items.len() != self.types.len() {
            return Err(fail(format!(
                "expected {} values, got {}",
                self.types.len(),
                items.len()
            )));
        }
        self.types
            .iter()
            .zip(items)
            .map(|(ty, item)| ty.convert(item, ctx))
            .collect::<CliResult<Vec<_>>>()
            .map(Value::Tuple)
    }

    fn metavar(&self) -> Option<String> {
        Some(
            self.types
                .iter()
                .map(|t| t.metavar().unwrap_or_else(|| t.name().to_uppercase()))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn arity(&self) -> usize {
        self.types.len()
    }
}

type ConvertFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// A user-supplied conversion function.
#[derive(Clone)]
pub struct FuncType {
    name: String,
    func: ConvertFn,
}

impl FuncType {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncType").field("name", &self.name).finish()
    }
}

impl ParamType for FuncType {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert(&self, value: Value, _ctx: Option<&Context<'_>>) -> CliResult<Value> {
        (self.func)(value).map_err(fail)
    }
}

/// Guess a type from a default value, `depth` nesting levels deep
/// (one level each for `nargs != 1` and `multiple`).
pub fn guess_type(default: &Value, depth: usize) -> TypeRef {
    if depth > 0 {
        return match default {
            Value::Tuple(items) => match items.first() {
                Some(first) => guess_type(first, depth - 1),
                None => Arc::new(StringType),
            },
            scalar => guess_type(scalar, depth - 1),
        };
    }
    match default {
        Value::Bool(_) => Arc::new(BoolType),
        Value::Int(_) => Arc::new(IntType),
        Value::Float(_) => Arc::new(FloatType),
        Value::Path(_) => Arc::new(PathType::default()),
        Value::Uuid(_) => Arc::new(UuidType),
        Value::Str(_) | Value::File(_) => Arc::new(StringType),
        Value::Tuple(items) => Arc::new(TupleType::new(
            items.iter().map(|item| guess_type(item, 0)).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(ty: &dyn ParamType, raw: &str) -> CliResult<Value> {
        ty.convert(Value::from(raw), None)
    }

    fn message(err: CliError) -> String {
        err.as_usage().expect("usage error").message().to_string()
    }

    #[test]
    fn coercion_is_idempotent() {
        let types: Vec<(TypeRef, &str)> = vec![
            (Arc::new(StringType), "hello"),
            (Arc::new(IntType), "42"),
            (Arc::new(FloatType), "2.5"),
            (Arc::new(BoolType), "yes"),
            (Arc::new(UuidType), "67e55044-10b1-426f-9247-bb680e5fe0c8"),
            (Arc::new(Choice::new(["a", "b"])), "b"),
            (Arc::new(IntRange::new(Some(0), Some(10))), "7"),
            (Arc::new(PathType::default()), "some/where"),
        ];
        for (ty, raw) in types {
            let once = convert(ty.as_ref(), raw).unwrap();
            let twice = ty.convert(once.clone(), None).unwrap();
            assert_eq!(once, twice, "{} is not idempotent", ty.name());
        }
    }

    #[test]
    fn int_rejects_garbage() {
        let err = convert(&IntType, "abc").unwrap_err();
        assert_eq!(message(err), "abc is not a valid integer");
    }

    #[test]
    fn bool_accepts_common_spellings() {
        for raw in ["true", "1", "YES", "y", "on"] {
            assert_eq!(convert(&BoolType, raw).unwrap(), Value::Bool(true));
        }
        for raw in ["false", "0", "No", "n", "off"] {
            assert_eq!(convert(&BoolType, raw).unwrap(), Value::Bool(false));
        }
        assert!(convert(&BoolType, "maybe").is_err());
    }

    #[test]
    fn choice_matching() {
        let ty = Choice::new(["json", "plain"]);
        assert_eq!(convert(&ty, "json").unwrap(), Value::from("json"));
        let err = convert(&ty, "JSON").unwrap_err();
        assert_eq!(message(err), "invalid choice: JSON. (choose from json, plain)");

        let loose = Choice::new(["json", "plain"]).case_insensitive();
        assert_eq!(convert(&loose, "JSON").unwrap(), Value::from("json"));
        assert_eq!(loose.metavar().as_deref(), Some("[json|plain]"));
    }

    #[test]
    fn ranges_check_and_clamp() {
        let ty = IntRange::new(Some(1), Some(5));
        assert_eq!(
            message(convert(&ty, "9").unwrap_err()),
            "9 is not in the valid range of 1 to 5."
        );
        assert_eq!(convert(&ty.clamped(), "9").unwrap(), Value::Int(5));

        let min_only = IntRange::new(Some(0), None);
        assert_eq!(
            message(convert(&min_only, "-1").unwrap_err()),
            "-1 is smaller than the minimum valid value 0."
        );

        let floats = FloatRange::new(None, Some(1.0));
        assert!(convert(&floats, "1.5").is_err());
        assert_eq!(convert(&floats.clamped(), "1.5").unwrap(), Value::Float(1.0));
    }

    #[test]
    fn path_existence_checks() {
        let missing = std::env::temp_dir().join("cmdscope-definitely-missing");
        let ty = PathType::new().exists();
        let err = ty
            .convert(Value::Path(missing.clone()), None)
            .unwrap_err();
        assert!(message(err).ends_with("does not exist."));

        let dir = std::env::temp_dir();
        let files_only = PathType::new().exists().file_only();
        let err = files_only.convert(Value::Path(dir), None).unwrap_err();
        assert!(message(err).starts_with("File \""));

        let lenient = PathType::new();
        assert_eq!(
            lenient.convert(Value::Path(missing.clone()), None).unwrap(),
            Value::Path(missing)
        );
    }

    #[test]
    fn path_envvar_splits_on_os_separator() {
        let joined = std::env::join_paths(["a", "b"]).unwrap();
        let parts = PathType::new().split_envvar_value(&joined.to_string_lossy());
        assert_eq!(parts, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(StringType.split_envvar_value(" x  y "), vec!["x", "y"]);
    }

    #[test]
    fn tuple_converts_each_position() {
        let ty = TupleType::new(vec![Arc::new(StringType), Arc::new(IntType)]);
        let out = ty
            .convert(Value::from(vec!["a", "3"]), None)
            .unwrap();
        assert_eq!(out, Value::Tuple(vec![Value::from("a"), Value::Int(3)]));
        assert_eq!(ty.arity(), 2);
        assert!(ty.convert(Value::from(vec!["a"]), None).is_err());
    }

    #[test]
    fn func_type_reports_failures_as_bad_parameter() {
        let even = FuncType::new("even", |v| match IntType.convert(v, None) {
            Ok(Value::Int(i)) if i % 2 == 0 => Ok(Value::Int(i)),
            _ => Err("not an even number".to_string()),
        });
        assert_eq!(convert(&even, "4").unwrap(), Value::Int(4));
        assert_eq!(message(convert(&even, "3").unwrap_err()), "not an even number");
    }

    #[test]
    fn guessing_from_defaults() {
        assert_eq!(guess_type(&Value::Int(1), 0).name(), "integer");
        assert_eq!(guess_type(&Value::from(vec![1, 2]), 1).name(), "integer");
        assert_eq!(guess_type(&Value::from(vec![1, 2]), 0).name(), "tuple");
        assert_eq!(guess_type(&Value::Tuple(Vec::new()), 1).name(), "text");
    }

    #[test]
    fn file_type_opens_for_reading() {
        let path = std::env::temp_dir().join(format!("cmdscope-types-{}.txt", std::process::id()));
        std::fs::write(&path, "contents").unwrap();
        let value = FileType::read()
            .convert(Value::Path(path.clone()), None)
            .unwrap();
        let handle = value.as_file().unwrap();
        assert_eq!(handle.read_to_string().unwrap(), "contents");
        // already-open handles pass straight through
        let again = FileType::read().convert(value.clone(), None).unwrap();
        assert_eq!(again, value);
        let _ = std::fs::remove_file(&path);

        let err = FileType::read()
            .convert(Value::from("/nonexistent/cmdscope/file"), None)
            .unwrap_err();
        assert!(message(err).starts_with("Could not open file: /nonexistent/cmdscope/file"));
    }
}
