//! Dynamic parameter values.
//!
//! Tokens come off the command line as strings; [`ParamType`](crate::ParamType)s
//! turn them into typed [`Value`]s. Values are cheap to clone and shareable, so
//! a resolved set can be handed to callbacks without tying them to the Context.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::{CliError, CliResult};

/// Zero-argument producer for lazily computed defaults.
pub type ValueProducer = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
    Uuid(Uuid),
    File(FileHandle),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            Self::Str(s) => Some(Path::new(s)),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Truthiness used when scanning flag siblings for an active default.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Path(p) => !p.as_os_str().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Uuid(_) | Self::File(_) => true,
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "text",
            Self::Path(_) => "path",
            Self::Uuid(_) => "uuid",
            Self::File(_) => "file",
            Self::Tuple(_) => "tuple",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::File(h) => f.write_str(h.name()),
            Self::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<PathBuf> for Value {
    fn from(v: PathBuf) -> Self {
        Self::Path(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<FileHandle> for Value {
    fn from(v: FileHandle) -> Self {
        Self::File(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Tuple(v.into_iter().map(Into::into).collect())
    }
}

/// Resolved parameter values of one Context, in resolution order.
///
/// A name mapped to `None` was declared but resolved to nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues {
    values: IndexMap<String, Option<Value>>,
}

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, Some(value.into()));
        self
    }

    /// Whether `name` has an entry at all (even one resolved to nothing).
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(Option::as_ref)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    pub fn get_path(&self, name: &str) -> Option<&Path> {
        self.get(name).and_then(Value::as_path)
    }

    pub fn get_file(&self, name: &str) -> Option<&FileHandle> {
        self.get(name).and_then(Value::as_file)
    }

    pub fn get_tuple(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_tuple)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

impl FileMode {
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::Append)
    }
}

enum FileState {
    Pending,
    Open(fs::File),
    Stdin,
    Stdout,
    Closed,
}

struct FileInner {
    name: String,
    mode: FileMode,
    state: Mutex<FileState>,
}

/// A file opened as a parameter value.
///
/// `-` maps to stdin or stdout depending on the mode. Write-mode files may be
/// opened lazily on first write. Release is registered with the owning
/// Context by [`FileType`](crate::types::FileType).
#[derive(Clone)]
pub struct FileHandle {
    inner: Arc<FileInner>,
}

impl FileHandle {
    pub fn open(name: impl Into<String>, mode: FileMode, lazy: bool) -> io::Result<Self> {
        let name = name.into();
        let state = if name == "-" {
            if mode.is_write() {
                FileState::Stdout
            } else {
                FileState::Stdin
            }
        } else if lazy {
            FileState::Pending
        } else {
            FileState::Open(open_file(&name, mode)?)
        };
        Ok(Self {
            inner: Arc::new(FileInner {
                name,
                mode,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> FileMode {
        self.inner.mode
    }

    pub fn is_std_stream(&self) -> bool {
        matches!(*self.state(), FileState::Stdin | FileState::Stdout)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state(), FileState::Closed)
    }

    /// Open a lazily deferred file now. Failure is reported as
    /// [`CliError::File`], which the entry points render as
    /// `Error: Could not open file <name>: <reason>`.
    pub fn open_now(&self) -> CliResult<()> {
        let mut state = self.state();
        if matches!(*state, FileState::Closed) {
            return Err(CliError::file(self.inner.name.as_str(), "file already closed"));
        }
        if matches!(*state, FileState::Pending) {
            let file = open_file(&self.inner.name, self.inner.mode)
                .map_err(|err| CliError::file(self.inner.name.as_str(), err.to_string()))?;
            *state = FileState::Open(file);
        }
        Ok(())
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        let mut out = String::new();
        let mut state = self.state();
        if matches!(*state, FileState::Pending) {
            *state = FileState::Open(open_file(&self.inner.name, self.inner.mode)?);
        }
        match &mut *state {
            FileState::Stdin => {
                io::stdin().read_to_string(&mut out)?;
            }
            FileState::Open(file) => {
                file.read_to_string(&mut out)?;
            }
            FileState::Stdout => return Err(io::Error::other("cannot read from stdout")),
            FileState::Pending | FileState::Closed => return Err(closed_error(&self.inner.name)),
        }
        Ok(out)
    }

    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if matches!(*state, FileState::Pending) {
            *state = FileState::Open(open_file(&self.inner.name, self.inner.mode)?);
        }
        match &mut *state {
            FileState::Stdout => io::stdout().write_all(buf),
            FileState::Open(file) => file.write_all(buf),
            FileState::Stdin => Err(io::Error::other("cannot write to stdin")),
            FileState::Pending | FileState::Closed => Err(closed_error(&self.inner.name)),
        }
    }

    /// Release the handle. Standard streams are only flushed. Returns `true`
    /// when this call moved the handle into the closed state.
    pub fn close(&self) -> bool {
        let mut state = self.state();
        let released = match &mut *state {
            FileState::Stdout => {
                if let Err(err) = io::stdout().flush() {
                    tracing::warn!(%err, "failed to flush stdout");
                }
                false
            }
            FileState::Stdin | FileState::Closed => false,
            FileState::Open(file) => {
                if self.inner.mode.is_write() {
                    if let Err(err) = file.flush() {
                        tracing::warn!(file = %self.inner.name, %err, "failed to flush file on close");
                    }
                }
                true
            }
            FileState::Pending => true,
        };
        if released {
            *state = FileState::Closed;
        }
        released
    }

    fn state(&self) -> MutexGuard<'_, FileState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_file(name: &str, mode: FileMode) -> io::Result<fs::File> {
    match mode {
        FileMode::Read => fs::File::open(name),
        FileMode::Write => fs::File::create(name),
        FileMode::Append => fs::OpenOptions::new().append(true).create(true).open(name),
    }
}

fn closed_error(name: &str) -> io::Error {
    io::Error::other(format!("file already closed: {name}"))
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.inner.name)
            .field("mode", &self.inner.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters() {
        let values = ParamValues::new()
            .with("name", "ada")
            .with("count", 3)
            .with("ratio", 0.5)
            .with("paths", vec!["a", "b"]);
        assert_eq!(values.get_str("name"), Some("ada"));
        assert_eq!(values.get_int("count"), Some(3));
        assert_eq!(values.get_float("count"), Some(3.0));
        assert_eq!(values.get_float("ratio"), Some(0.5));
        assert_eq!(values.get_tuple("paths").map(<[Value]>::len), Some(2));
        assert_eq!(values.get_bool("name"), None);
        assert!(!values.contains("missing"));
    }

    #[test]
    fn display_joins_tuples() {
        let v = Value::from(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(v.to_string(), "1, x");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Tuple(Vec::new()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::from("upper").is_truthy());
    }

    #[test]
    fn lazy_write_handle_closes_once() {
        let path = std::env::temp_dir().join(format!("cmdscope-value-{}.txt", std::process::id()));
        let handle = FileHandle::open(path.display().to_string(), FileMode::Write, true).unwrap();
        assert!(!path.exists(), "lazy handle must not create the file");
        handle.write_all(b"hello").unwrap();
        assert!(handle.close());
        assert!(handle.is_closed());
        assert!(!handle.close());
        assert!(handle.write_all(b"again").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn deferred_open_failure_is_a_file_error() {
        let missing_dir = std::env::temp_dir().join(format!("cmdscope-nodir-{}", std::process::id()));
        let path = missing_dir.join("out.txt").display().to_string();
        let handle = FileHandle::open(path.as_str(), FileMode::Write, true).unwrap();
        let err = handle.open_now().unwrap_err();
        assert!(matches!(&err, CliError::File { filename, .. } if *filename == path));
        assert_eq!(err.exit_code(), 1);
        let mut shown = Vec::new();
        err.show(&mut shown).unwrap();
        let shown = String::from_utf8(shown).unwrap();
        assert!(shown.starts_with(&format!("Error: Could not open file {path}: ")), "{shown}");

        assert!(handle.close());
        assert!(matches!(handle.open_now(), Err(CliError::File { .. })));
    }
}
