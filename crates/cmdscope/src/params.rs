//! Parameters: options and positional arguments.
//!
//! A [`Parameter`] is an immutable definition shared by every invocation. Its
//! value is resolved per Context in [`Parameter::handle_parse_result`]:
//! command line, then the default map, then the environment, then an
//! interactive prompt, then the declared default. The result is coerced by
//! the parameter's type, checked for presence, and handed to the optional
//! validation callback.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::{Context, ValueSource};
use crate::error::{CliError, CliResult, DeclarationError, UsageError};
use crate::parser::{Action, OptionParser, split_opt};
use crate::prompt::{self, PromptOptions};
use crate::types::{BoolType, IntRange, ParamType, StringType, TypeRef, guess_type};
use crate::value::{Value, ValueProducer};

/// Validation callback. May transform the value or reject it.
pub type ParamCallback =
    Arc<dyn Fn(&Context<'_>, &Parameter, Option<Value>) -> CliResult<Option<Value>> + Send + Sync>;

pub(crate) fn param_callback<F>(f: F) -> ParamCallback
where
    F: Fn(&Context<'_>, &Parameter, Option<Value>) -> CliResult<Option<Value>> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Producer(ValueProducer),
}

impl DefaultValue {
    fn produce(&self) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Producer(f) => f(),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Literal(v) => v.is_truthy(),
            Self::Producer(_) => true,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// How a parameter consumes tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    /// Takes no token; stores `value` when present.
    Flag { value: Value },
    /// Takes `nargs` tokens per occurrence; `-1` collects all remaining
    /// (arguments only).
    Valued { nargs: i32 },
    /// Counts occurrences.
    Counter,
    /// Accumulates every occurrence of the inner shape.
    Multiple(Box<ParameterKind>),
}

impl ParameterKind {
    fn base(&self) -> &ParameterKind {
        match self {
            Self::Multiple(inner) => inner.base(),
            other => other,
        }
    }

    /// Tokens consumed per occurrence; `-1` collects everything left.
    pub fn nargs(&self) -> i32 {
        match self.base() {
            Self::Valued { nargs } => *nargs,
            _ => 1,
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }
}

/// Option-only settings.
#[derive(Debug, Clone, Default)]
pub struct OptionSpec {
    pub prompt: Option<String>,
    pub hide_input: bool,
    pub confirmation_prompt: bool,
    pub show_default: bool,
    pub help: Option<String>,
    pub hidden: bool,
    pub allow_from_autoenv: bool,
}

#[derive(Debug, Clone)]
pub enum ParamVariant {
    Option(OptionSpec),
    Argument,
}

#[derive(Clone)]
pub struct Parameter {
    name: String,
    opts: Vec<String>,
    secondary_opts: Vec<String>,
    kind: ParameterKind,
    ty: TypeRef,
    required: bool,
    default: Option<DefaultValue>,
    callback: Option<ParamCallback>,
    expose_value: bool,
    is_eager: bool,
    envvar: Vec<String>,
    metavar: Option<String>,
    variant: ParamVariant,
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("opts", &self.opts)
            .field("secondary_opts", &self.secondary_opts)
            .field("kind", &self.kind)
            .field("type", &self.ty.name())
            .field("required", &self.required)
            .field("default", &self.default)
            .field("is_eager", &self.is_eager)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Split option declarations into `(name, opts, secondary_opts)`.
///
/// A declaration that is a plain identifier names the parameter. Others are
/// flags, where `--on/--off` (or `/on;/off` for slash prefixes) adds a
/// secondary flag. Without an explicit name, the flag with the longest
/// prefix names the parameter.
fn parse_option_decls(
    decls: &[String],
    expose_value: bool,
) -> Result<(Option<String>, Vec<String>, Vec<String>), DeclarationError> {
    let mut name: Option<String> = None;
    let mut opts = Vec::new();
    let mut secondary_opts = Vec::new();
    let mut possible_names: Vec<(usize, String)> = Vec::new();

    for decl in decls {
        if is_identifier(decl) {
            if name.is_some() {
                return Err(DeclarationError::NameDefinedTwice(decl.clone()));
            }
            name = Some(decl.clone());
            continue;
        }
        let split_char = if decl.starts_with('/') { ';' } else { '/' };
        match decl.split_once(split_char) {
            Some((first, second)) => {
                let first = first.trim_end();
                if !first.is_empty() {
                    let (prefix, rest) = split_opt(first);
                    possible_names.push((prefix.len(), rest.to_string()));
                    opts.push(first.to_string());
                }
                let second = second.trim_start();
                if !second.is_empty() {
                    secondary_opts.push(second.to_string());
                }
            }
            None => {
                let (prefix, rest) = split_opt(decl);
                possible_names.push((prefix.len(), rest.to_string()));
                opts.push(decl.clone());
            }
        }
    }

    if name.is_none() {
        // stable: the last of the longest prefixes wins
        possible_names.sort_by_key(|(prefix_len, _)| *prefix_len);
        name = possible_names
            .last()
            .map(|(_, rest)| rest.replace('-', "_").to_lowercase())
            .filter(|candidate| is_identifier(candidate));
    }
    match name {
        None if expose_value => Err(DeclarationError::NoName("option")),
        Some(name) if opts.is_empty() && secondary_opts.is_empty() => {
            Err(DeclarationError::NoOptions(name))
        }
        name => Ok((name, opts, secondary_opts)),
    }
}

/// Builder for options. Finish with [`OptionBuilder::build`].
#[must_use]
pub struct OptionBuilder {
    decls: Vec<String>,
    ty: Option<TypeRef>,
    required: bool,
    default: Option<DefaultValue>,
    callback: Option<ParamCallback>,
    expose_value: bool,
    is_eager: bool,
    envvar: Vec<String>,
    metavar: Option<String>,
    nargs: Option<usize>,
    multiple: bool,
    count: bool,
    is_flag: Option<bool>,
    flag_value: Option<Value>,
    spec: OptionSpec,
}

impl OptionBuilder {
    /// Coerce values with `ty` instead of the type guessed from the default.
    pub fn param_type(mut self, ty: impl ParamType + 'static) -> Self {
        self.ty = Some(Arc::new(ty));
        self
    }

    pub fn type_ref(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Fail with `Missing option` when no source supplies a value.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Literal default, used when the command line, default map, environment and prompt supply nothing.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Default computed on each resolution.
    pub fn default_with(mut self, producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    /// Validate or transform the resolved value. Runs after coercion.
    pub fn callback(
        mut self,
        f: impl Fn(&Context<'_>, &Parameter, Option<Value>) -> CliResult<Option<Value>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.callback = Some(Arc::new(f));
        self
    }

    /// With `false` the value is resolved but not passed to the command callback.
    pub fn expose_value(mut self, expose: bool) -> Self {
        self.expose_value = expose;
        self
    }

    /// Resolve before all non-eager parameters, e.g. for `--help`-like flags.
    pub fn eager(mut self) -> Self {
        self.is_eager = true;
        self
    }

    /// Environment variable consulted before the automatic `PREFIX_NAME` one. May be given more than once.
    pub fn envvar(mut self, name: impl Into<String>) -> Self {
        self.envvar.push(name.into());
        self
    }

    /// Placeholder shown in help, e.g. `FILE`.
    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    /// Values per occurrence; more than one yields a tuple.
    pub fn nargs(mut self, nargs: usize) -> Self {
        self.nargs = Some(nargs);
        self
    }

    /// Accept the option repeatedly and collect every occurrence.
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Count occurrences, as with `-vvv`. Typed `IntRange(min=0)`, default 0.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Take no value. Boolean unless a `flag_value` is set.
    pub fn flag(mut self) -> Self {
        self.is_flag = Some(true);
        self
    }

    /// Make this a flag that stores `value`; several such flags may share
    /// one name.
    pub fn flag_value(mut self, value: impl Into<Value>) -> Self {
        self.flag_value = Some(value.into());
        self
    }

    /// Ask for the value interactively when nothing else supplies it.
    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.spec.prompt = Some(text.into());
        self
    }

    /// Prompt with the parameter's name as text.
    pub fn prompt_named(mut self) -> Self {
        self.spec.prompt = Some(String::new());
        self
    }

    /// Read the prompted value without echoing it.
    pub fn hide_input(mut self) -> Self {
        self.spec.hide_input = true;
        self
    }

    /// Ask twice and require both answers to match.
    pub fn confirmation_prompt(mut self) -> Self {
        self.spec.confirmation_prompt = true;
        self
    }

    /// Append `[default: ...]` to the help line.
    pub fn show_default(mut self) -> Self {
        self.spec.show_default = true;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.spec.help = Some(help.into());
        self
    }

    /// Leave the option out of the help page.
    pub fn hidden(mut self) -> Self {
        self.spec.hidden = true;
        self
    }

    /// Whether the automatic `PREFIX_NAME` variable may supply this option.
    pub fn allow_from_autoenv(mut self, allow: bool) -> Self {
        self.spec.allow_from_autoenv = allow;
        self
    }

    /// Validate the declaration and produce the [`Parameter`].
    pub fn build(self) -> Result<Parameter, DeclarationError> {
        let (name, opts, secondary_opts) = parse_option_decls(&self.decls, self.expose_value)?;
        let name = name.unwrap_or_default();
        for opt in opts.iter().chain(&secondary_opts) {
            if split_opt(opt).0.is_empty() {
                return Err(DeclarationError::InvalidOption(opt.clone()));
            }
        }

        let is_flag = self
            .is_flag
            .unwrap_or(self.flag_value.is_some() || !secondary_opts.is_empty());
        if self.count && self.multiple {
            return Err(DeclarationError::Invalid(
                "options cannot be multiple and count at the same time".to_string(),
            ));
        }
        if self.count && is_flag {
            return Err(DeclarationError::Invalid(
                "options cannot be count and flags at the same time".to_string(),
            ));
        }

        let mut default = self.default;
        let mut ty = self.ty;
        let kind = if is_flag {
            let default = default.get_or_insert(DefaultValue::Literal(Value::Bool(false)));
            let value = self
                .flag_value
                .unwrap_or_else(|| Value::Bool(!default.is_truthy()));
            let bool_type = ty.as_ref().is_none_or(|t| t.is_bool());
            if matches!(value, Value::Bool(_)) && bool_type {
                ty = Some(Arc::new(BoolType));
            } else if ty.is_none() {
                ty = Some(guess_type(&value, 0));
            }
            ParameterKind::Flag { value }
        } else if self.count {
            ty.get_or_insert_with(|| Arc::new(IntRange::new(Some(0), None)));
            default.get_or_insert(DefaultValue::Literal(Value::Int(0)));
            ParameterKind::Counter
        } else {
            let arity = ty.as_ref().filter(|t| t.is_composite()).map(|t| t.arity());
            let nargs = match (self.nargs, arity) {
                (Some(n), Some(arity)) if n != arity => {
                    return Err(DeclarationError::Invalid(format!(
                        "composite type takes {arity} values but nargs is {n}"
                    )));
                }
                (Some(n), _) => n,
                (None, Some(arity)) => arity,
                (None, None) => 1,
            };
            ParameterKind::Valued {
                nargs: i32::try_from(nargs)
                    .map_err(|_| DeclarationError::Invalid(format!("nargs {nargs} is too large")))?,
            }
        };
        let kind = if self.multiple {
            ParameterKind::Multiple(Box::new(kind))
        } else {
            kind
        };

        let depth = usize::from(kind.nargs() != 1) + usize::from(kind.is_multiple());
        let ty = ty.unwrap_or_else(|| match &default {
            Some(DefaultValue::Literal(v)) => guess_type(v, depth),
            _ => Arc::new(StringType),
        });

        let is_bool_flag = matches!(kind.base(), ParameterKind::Flag { value: Value::Bool(_) }) && ty.is_bool();
        if self.spec.prompt.is_some() && is_flag && !is_bool_flag {
            return Err(DeclarationError::Invalid(
                "cannot prompt for flags that are not bools".to_string(),
            ));
        }
        if !secondary_opts.is_empty() && !is_bool_flag {
            return Err(DeclarationError::Invalid(
                "got secondary option for non boolean flag".to_string(),
            ));
        }
        if is_bool_flag && self.spec.hide_input && self.spec.prompt.is_some() {
            return Err(DeclarationError::Invalid(
                "hidden input does not work with boolean flag prompts".to_string(),
            ));
        }

        let mut spec = self.spec;
        if spec.prompt.as_deref() == Some("") {
            spec.prompt = Some(capitalize(&name.replace('_', " ")));
        }

        Ok(Parameter {
            name,
            opts,
            secondary_opts,
            kind,
            ty,
            required: self.required,
            default,
            callback: self.callback,
            expose_value: self.expose_value,
            is_eager: self.is_eager,
            envvar: self.envvar,
            metavar: self.metavar,
            variant: ParamVariant::Option(spec),
        })
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Builder for positional arguments.
#[must_use]
pub struct ArgumentBuilder {
    decl: String,
    ty: Option<TypeRef>,
    required: Option<bool>,
    default: Option<DefaultValue>,
    callback: Option<ParamCallback>,
    expose_value: bool,
    is_eager: bool,
    envvar: Vec<String>,
    metavar: Option<String>,
    nargs: Option<i32>,
}

impl ArgumentBuilder {
    pub fn param_type(mut self, ty: impl ParamType + 'static) -> Self {
        self.ty = Some(Arc::new(ty));
        self
    }

    pub fn type_ref(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Override the default requiredness (required unless a default exists or `nargs` is 0).
    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with(mut self, producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    /// Validate or transform the resolved value. Runs after coercion.
    pub fn callback(
        mut self,
        f: impl Fn(&Context<'_>, &Parameter, Option<Value>) -> CliResult<Option<Value>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.callback = Some(Arc::new(f));
        self
    }

    pub fn expose_value(mut self, expose: bool) -> Self {
        self.expose_value = expose;
        self
    }

    pub fn eager(mut self) -> Self {
        self.is_eager = true;
        self
    }

    /// Environment variable to read when the argument is absent. Arguments have no automatic variable.
    pub fn envvar(mut self, name: impl Into<String>) -> Self {
        self.envvar.push(name.into());
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    /// Token count; `-1` takes everything left over.
    pub fn nargs(mut self, nargs: i32) -> Self {
        self.nargs = Some(nargs);
        self
    }

    /// Validate the declaration and produce the [`Parameter`].
    pub fn build(self) -> Result<Parameter, DeclarationError> {
        if self.decl.is_empty() {
            return Err(DeclarationError::NoName("argument"));
        }
        let name = self.decl.replace('-', "_").to_lowercase();
        if !is_identifier(&name) {
            return Err(DeclarationError::Invalid(format!(
                "\"{}\" is not a valid argument name",
                self.decl
            )));
        }
        let arity = self.ty.as_ref().filter(|t| t.is_composite()).map(|t| t.arity());
        let nargs = match (self.nargs, arity) {
            (Some(n), Some(arity)) if usize::try_from(n).ok() != Some(arity) => {
                return Err(DeclarationError::Invalid(format!(
                    "composite type takes {arity} values but nargs is {n}"
                )));
            }
            (Some(n), _) => n,
            (None, Some(arity)) => i32::try_from(arity)
                .map_err(|_| DeclarationError::Invalid(format!("arity {arity} is too large")))?,
            (None, None) => 1,
        };
        let required = self
            .required
            .unwrap_or(self.default.is_none() && nargs > 0);
        let depth = usize::from(nargs != 1);
        let ty = self.ty.unwrap_or_else(|| match &self.default {
            Some(DefaultValue::Literal(v)) => guess_type(v, depth),
            _ => Arc::new(StringType),
        });

        Ok(Parameter {
            name,
            opts: vec![self.decl],
            secondary_opts: Vec::new(),
            kind: ParameterKind::Valued { nargs },
            ty,
            required,
            default: self.default,
            callback: self.callback,
            expose_value: self.expose_value,
            is_eager: self.is_eager,
            envvar: self.envvar,
            metavar: self.metavar,
            variant: ParamVariant::Argument,
        })
    }
}

impl Parameter {
    /// Start an option from declarations like `-v`, `--verbose`, `--shout/--no-shout` or a bare identifier naming the destination.
    pub fn option<I, S>(decls: I) -> OptionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OptionBuilder {
            decls: decls.into_iter().map(Into::into).collect(),
            ty: None,
            required: false,
            default: None,
            callback: None,
            expose_value: true,
            is_eager: false,
            envvar: Vec::new(),
            metavar: None,
            nargs: None,
            multiple: false,
            count: false,
            is_flag: None,
            flag_value: None,
            spec: OptionSpec {
                allow_from_autoenv: true,
                ..OptionSpec::default()
            },
        }
    }

    /// Start a positional argument. The destination is the lower-cased `decl` with `-` mapped to `_`.
    pub fn argument(decl: impl Into<String>) -> ArgumentBuilder {
        ArgumentBuilder {
            decl: decl.into(),
            ty: None,
            required: None,
            default: None,
            callback: None,
            expose_value: true,
            is_eager: false,
            envvar: Vec::new(),
            metavar: None,
            nargs: None,
        }
    }

    /// Eager boolean flag whose value is only seen by `callback`; used for
    /// the built-in help and version options.
    pub(crate) fn eager_flag(name: &str, opts: Vec<String>, help: &str, callback: ParamCallback) -> Self {
        Self {
            name: name.to_string(),
            opts,
            secondary_opts: Vec::new(),
            kind: ParameterKind::Flag {
                value: Value::Bool(true),
            },
            ty: Arc::new(BoolType),
            required: false,
            default: Some(DefaultValue::Literal(Value::Bool(false))),
            callback: Some(callback),
            expose_value: false,
            is_eager: true,
            envvar: Vec::new(),
            metavar: None,
            variant: ParamVariant::Option(OptionSpec {
                help: Some(help.to_string()),
                ..OptionSpec::default()
            }),
        }
    }

    /// Destination name under which the value is stored.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn opts(&self) -> &[String] {
        &self.opts
    }

    /// Negating declarations of a boolean flag (`--no-shout`).
    pub fn secondary_opts(&self) -> &[String] {
        &self.secondary_opts
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    pub fn param_type(&self) -> &TypeRef {
        &self.ty
    }

    pub fn nargs(&self) -> i32 {
        self.kind.nargs()
    }

    pub fn multiple(&self) -> bool {
        self.kind.is_multiple()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_eager(&self) -> bool {
        self.is_eager
    }

    pub fn expose_value(&self) -> bool {
        self.expose_value
    }

    pub fn envvar(&self) -> &[String] {
        &self.envvar
    }

    pub fn is_option(&self) -> bool {
        matches!(self.variant, ParamVariant::Option(_))
    }

    pub fn variant(&self) -> &ParamVariant {
        &self.variant
    }

    fn option_spec(&self) -> Option<&OptionSpec> {
        match &self.variant {
            ParamVariant::Option(spec) => Some(spec),
            ParamVariant::Argument => None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.option_spec().is_some_and(|spec| spec.hidden)
    }

    pub fn help(&self) -> Option<&str> {
        self.option_spec().and_then(|spec| spec.help.as_deref())
    }

    pub fn is_flag(&self) -> bool {
        matches!(self.kind.base(), ParameterKind::Flag { .. })
    }

    /// A boolean flag, as opposed to a flag storing a fixed `flag_value`.
    pub fn is_bool_flag(&self) -> bool {
        matches!(self.kind.base(), ParameterKind::Flag { value: Value::Bool(_) }) && self.ty.is_bool()
    }

    fn flag_value(&self) -> Option<&Value> {
        match self.kind.base() {
            ParameterKind::Flag { value } => Some(value),
            _ => None,
        }
    }

    fn value_depth(&self) -> usize {
        usize::from(self.nargs() != 1) + usize::from(self.multiple())
    }

    pub(crate) fn add_to_parser(&self, parser: &mut OptionParser, obj: usize) -> Result<(), DeclarationError> {
        if !self.is_option() {
            return parser.add_argument(&self.name, self.nargs(), obj);
        }
        let multiple = self.multiple();
        let constant = |value: Value| {
            if multiple {
                Action::AppendConst(value)
            } else {
                Action::StoreConst(value)
            }
        };
        match self.kind.base() {
            ParameterKind::Flag { value } => {
                if self.is_bool_flag() && !self.secondary_opts.is_empty() {
                    parser.add_option(self.opts.as_slice(), &self.name, constant(Value::Bool(true)), 1, obj)?;
                    parser.add_option(self.secondary_opts.as_slice(), &self.name, constant(Value::Bool(false)), 1, obj)
                } else {
                    parser.add_option(self.opts.as_slice(), &self.name, constant(value.clone()), 1, obj)
                }
            }
            ParameterKind::Counter => parser.add_option(self.opts.as_slice(), &self.name, Action::Count, 1, obj),
            ParameterKind::Valued { nargs } => {
                let action = if multiple { Action::Append } else { Action::Store };
                let nargs = usize::try_from(*nargs)
                    .map_err(|_| DeclarationError::Invalid("options cannot have nargs < 0".to_string()))?;
                parser.add_option(self.opts.as_slice(), &self.name, action, nargs, obj)
            }
            // base() never yields Multiple
            ParameterKind::Multiple(_) => Ok(()),
        }
    }

    /// Resolve this parameter for `ctx` from the raw parser output and
    /// store the result on the Context when exposed.
    pub fn handle_parse_result(
        &self,
        ctx: &Context<'_>,
        values: &IndexMap<String, Value>,
    ) -> CliResult<Option<Value>> {
        let resolved = self.resolve(ctx, values).map_err(|err| {
            err.with_param_hint(self.error_hint())
                .with_context(ctx.error_context())
        })?;
        let (value, source) = resolved;
        tracing::trace!(param = %self.name, ?source, "resolved parameter");
        if self.expose_value {
            ctx.set_param(&self.name, value.clone(), source);
        }
        Ok(value)
    }

    fn resolve(
        &self,
        ctx: &Context<'_>,
        values: &IndexMap<String, Value>,
    ) -> CliResult<(Option<Value>, ValueSource)> {
        let (value, source) = self.consume_value(ctx, values);
        let (value, source) = match self.full_process_value(ctx, value, source) {
            Ok(processed) => processed,
            Err(_) if ctx.resilient_parsing() => (None, source),
            Err(err) => return Err(err),
        };
        let Some(callback) = &self.callback else {
            return Ok((value, source));
        };
        match callback(ctx, self, value) {
            Ok(value) => Ok((value, source)),
            Err(_) if ctx.resilient_parsing() => Ok((None, source)),
            Err(err) => Err(err),
        }
    }

    /// First present source among command line, default map and
    /// environment.
    pub fn consume_value(
        &self,
        ctx: &Context<'_>,
        values: &IndexMap<String, Value>,
    ) -> (Option<Value>, ValueSource) {
        if let Some(value) = values.get(&self.name) {
            return (Some(value.clone()), ValueSource::Commandline);
        }
        if let Some(value) = ctx.lookup_default(&self.name) {
            return (Some(value), ValueSource::DefaultMap);
        }
        if let Some(value) = self.value_from_envvar(ctx) {
            return (Some(value), ValueSource::Environment);
        }
        (None, ValueSource::Default)
    }

    fn resolve_envvar_value(&self, ctx: &Context<'_>) -> Option<String> {
        if let Some(found) = self.envvar.iter().find_map(|name| ctx.env_var(name)) {
            return Some(found);
        }
        let spec = self.option_spec()?;
        if !spec.allow_from_autoenv {
            return None;
        }
        let prefix = ctx.auto_envvar_prefix()?;
        ctx.env_var(&format!("{prefix}_{}", self.name.to_uppercase()))
    }

    /// Value from the environment, split into a tuple (or tuple of
    /// tuples) when the parameter takes more than one token.
    pub fn value_from_envvar(&self, ctx: &Context<'_>) -> Option<Value> {
        let raw = self.resolve_envvar_value(ctx)?;
        if self.value_depth() == 0 {
            return Some(Value::Str(raw));
        }
        let parts: Vec<Value> = self
            .ty
            .split_envvar_value(&raw)
            .into_iter()
            .map(Value::Str)
            .collect();
        let nargs = self.nargs();
        if self.multiple() && nargs > 1 {
            let size = usize::try_from(nargs).unwrap_or(1);
            return Some(Value::Tuple(
                parts
                    .chunks_exact(size)
                    .map(|chunk| Value::Tuple(chunk.to_vec()))
                    .collect(),
            ));
        }
        Some(Value::Tuple(parts))
    }

    /// Coerce `value` through the type, once per nesting level. A missing
    /// value stays missing at the innermost level and becomes an empty
    /// tuple at outer ones.
    pub fn type_cast_value(&self, ctx: &Context<'_>, value: Option<Value>) -> CliResult<Option<Value>> {
        if self.ty.is_composite() {
            if !self.multiple() {
                return value.map(|v| self.ty.convert(v, Some(ctx))).transpose();
            }
            return tuple_items(value)
                .into_iter()
                .map(|item| self.ty.convert(item, Some(ctx)))
                .collect::<CliResult<Vec<_>>>()
                .map(|items| Some(Value::Tuple(items)));
        }
        self.convert_level(ctx, value, self.value_depth())
    }

    fn convert_level(&self, ctx: &Context<'_>, value: Option<Value>, level: usize) -> CliResult<Option<Value>> {
        if level == 0 {
            return value.map(|v| self.ty.convert(v, Some(ctx))).transpose();
        }
        let mut out = Vec::new();
        for item in tuple_items(value) {
            if let Some(converted) = self.convert_level(ctx, Some(item), level - 1)? {
                out.push(converted);
            }
        }
        Ok(Some(Value::Tuple(out)))
    }

    /// `None`, or an empty tuple for collecting parameters.
    pub fn value_is_missing(&self, value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(Value::Tuple(items)) => items.is_empty() && (self.nargs() != 1 || self.multiple()),
            Some(_) => false,
        }
    }

    /// Prompt, coerce, fall back to the default, then enforce `required`.
    fn full_process_value(
        &self,
        ctx: &Context<'_>,
        value: Option<Value>,
        source: ValueSource,
    ) -> CliResult<(Option<Value>, ValueSource)> {
        let prompts = self.option_spec().is_some_and(|spec| spec.prompt.is_some());
        if value.is_none() && prompts && !ctx.resilient_parsing() {
            return self
                .prompt_for_value(ctx)
                .map(|value| (Some(value), ValueSource::Prompt));
        }
        let (value, source) = match value {
            Some(value) => (self.type_cast_value(ctx, Some(value))?, source),
            None if ctx.resilient_parsing() => (self.type_cast_value(ctx, None)?, source),
            None => (self.default_value(ctx)?, ValueSource::Default),
        };
        if self.required && self.value_is_missing(value.as_ref()) {
            return Err(UsageError::missing_parameter(
                self.param_type_name(),
                self.ty.missing_message().unwrap_or_default(),
            )
            .into());
        }
        Ok((value, source))
    }

    /// The declared default, coerced. A flag that stores a non-boolean
    /// value takes its default from the first flag of the same name whose
    /// default is truthy.
    pub fn default_value(&self, ctx: &Context<'_>) -> CliResult<Option<Value>> {
        if self.is_flag() && !self.is_bool_flag() {
            let mut active = ctx.command().params().iter().filter(|p| {
                p.name == self.name && p.default.as_ref().is_some_and(DefaultValue::is_truthy)
            });
            let first = active.next();
            if let Some(other) = active.next() {
                tracing::warn!(
                    param = %self.name,
                    first = ?first.map(|p| p.opts.clone()),
                    other = ?other.opts,
                    "several flags sharing a name have a truthy default; using the first"
                );
            }
            let value = first.and_then(|p| p.flag_value().cloned());
            return self.type_cast_value(ctx, value);
        }
        let raw = self.default.as_ref().map(DefaultValue::produce);
        self.type_cast_value(ctx, raw)
    }

    fn prompt_for_value(&self, ctx: &Context<'_>) -> CliResult<Value> {
        let Some(spec) = self.option_spec() else {
            return Err(CliError::generic(format!("{} cannot prompt", self.name)));
        };
        let text = spec.prompt.as_deref().unwrap_or(&self.name);
        let default = self.default_value(ctx)?;
        let prompter = ctx.prompter();
        if self.is_bool_flag() {
            let default = default.as_ref().and_then(Value::as_bool).unwrap_or(false);
            return prompt::confirm(prompter.as_ref(), text, default, false).map(Value::Bool);
        }
        let options = PromptOptions {
            hide_input: spec.hide_input,
            confirmation_prompt: spec.confirmation_prompt,
            show_default: true,
        };
        prompt::prompt(prompter.as_ref(), text, default, options, |raw| {
            self.type_cast_value(ctx, Some(Value::from(raw)))?
                .ok_or_else(|| CliError::bad_parameter("a value is required"))
        })
    }

    pub fn param_type_name(&self) -> &'static str {
        if self.is_option() { "option" } else { "argument" }
    }

    /// Name used in error messages: quoted declarations for options, the metavar for arguments.
    pub fn human_readable_name(&self) -> String {
        match &self.variant {
            ParamVariant::Option(_) => self.name.clone(),
            ParamVariant::Argument => self.metavar.clone().unwrap_or_else(|| self.name.to_uppercase()),
        }
    }

    /// Quoted declarations, as shown in error messages.
    pub fn error_hint(&self) -> String {
        if self.opts.is_empty() {
            return format!("\"{}\"", self.human_readable_name());
        }
        self.opts
            .iter()
            .map(|opt| format!("\"{opt}\""))
            .collect::<Vec<_>>()
            .join(" / ")
    }

    pub fn make_metavar(&self) -> String {
        if let Some(metavar) = &self.metavar {
            return metavar.clone();
        }
        let mut metavar = match &self.variant {
            ParamVariant::Argument => {
                let name = self.name.to_uppercase();
                if self.required { name } else { format!("[{name}]") }
            }
            ParamVariant::Option(_) => self
                .ty
                .metavar()
                .unwrap_or_else(|| self.ty.name().to_uppercase()),
        };
        if self.nargs() != 1 {
            metavar.push_str("...");
        }
        metavar
    }

    pub fn usage_pieces(&self) -> Vec<String> {
        match self.variant {
            ParamVariant::Argument => vec![self.make_metavar()],
            ParamVariant::Option(_) => Vec::new(),
        }
    }

    /// `(flags, help)` row for the options listing. Arguments and hidden
    /// options have none.
    pub fn help_record(&self) -> Option<(String, String)> {
        let spec = self.option_spec()?;
        if spec.hidden {
            return None;
        }
        let mut any_slash = false;
        let mut write_opts = |opts: &[String]| {
            let (joined, slash) = join_options(opts);
            any_slash |= slash;
            if matches!(self.kind.base(), ParameterKind::Valued { .. }) {
                format!("{joined} {}", self.make_metavar())
            } else {
                joined
            }
        };
        let mut columns = vec![write_opts(self.opts.as_slice())];
        if !self.secondary_opts.is_empty() {
            columns.push(write_opts(self.secondary_opts.as_slice()));
        }

        let mut extra = Vec::new();
        if spec.show_default
            && let Some(DefaultValue::Literal(default)) = &self.default
        {
            extra.push(format!("default: {default}"));
        }
        if self.required {
            extra.push("required".to_string());
        }
        let mut help = spec.help.clone().unwrap_or_default();
        if !extra.is_empty() {
            if !help.is_empty() {
                help.push_str("  ");
            }
            help.push_str(&format!("[{}]", extra.join("; ")));
        }
        let separator = if any_slash { "; " } else { " / " };
        Some((columns.join(separator), help))
    }
}

/// Join flags shortest prefix first; reports whether any uses a `/` prefix.
fn join_options(opts: &[String]) -> (String, bool) {
    let mut sorted: Vec<(usize, &String)> = opts
        .iter()
        .map(|opt| (split_opt(opt).0.len(), opt))
        .collect();
    let any_slash = opts.iter().any(|opt| split_opt(opt).0 == "/");
    sorted.sort_by_key(|(prefix_len, _)| *prefix_len);
    let joined = sorted
        .into_iter()
        .map(|(_, opt)| opt.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    (joined, any_slash)
}

fn tuple_items(value: Option<Value>) -> Vec<Value> {
    match value {
        None => Vec::new(),
        Some(Value::Tuple(items)) => items,
        Some(scalar) => vec![scalar],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Choice, IntType, TupleType};

    fn decls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn option_names_come_from_longest_prefix() {
        let (name, opts, secondary) = parse_option_decls(&decls(&["-v", "--verbose"]), true).unwrap();
        assert_eq!(name.as_deref(), Some("verbose"));
        assert_eq!(opts, decls(&["-v", "--verbose"]));
        assert!(secondary.is_empty());

        let (name, _, _) = parse_option_decls(&decls(&["--dry-run"]), true).unwrap();
        assert_eq!(name.as_deref(), Some("dry_run"));

        let (name, _, _) = parse_option_decls(&decls(&["-n", "count"]), true).unwrap();
        assert_eq!(name.as_deref(), Some("count"));
    }

    #[test]
    fn secondary_declarations() {
        let (name, opts, secondary) = parse_option_decls(&decls(&["--shout/--no-shout"]), true).unwrap();
        assert_eq!(name.as_deref(), Some("shout"));
        assert_eq!(opts, decls(&["--shout"]));
        assert_eq!(secondary, decls(&["--no-shout"]));

        let (name, opts, secondary) = parse_option_decls(&decls(&["/debug;/no-debug"]), true).unwrap();
        assert_eq!(name.as_deref(), Some("debug"));
        assert_eq!(opts, decls(&["/debug"]));
        assert_eq!(secondary, decls(&["/no-debug"]));
    }

    #[test]
    fn declaration_errors() {
        assert_eq!(
            parse_option_decls(&decls(&["a", "b"]), true).unwrap_err(),
            DeclarationError::NameDefinedTwice("b".to_string())
        );
        assert_eq!(
            parse_option_decls(&decls(&["name"]), true).unwrap_err(),
            DeclarationError::NoOptions("name".to_string())
        );
        assert_eq!(
            parse_option_decls(&decls(&["-1"]), true).unwrap_err(),
            DeclarationError::NoName("option")
        );
        assert!(Parameter::option(["--mode"]).count().multiple().build().is_err());
        assert!(
            Parameter::option(["--up/--down"])
                .flag_value("x")
                .build()
                .is_err()
        );
        assert!(Parameter::argument("").build().is_err());
        assert!(Parameter::argument("1st").build().is_err());
    }

    #[test]
    fn flags_are_inferred() {
        let shout = Parameter::option(["--shout/--no-shout"]).build().unwrap();
        assert!(shout.is_bool_flag());
        assert!(matches!(shout.default, Some(DefaultValue::Literal(Value::Bool(false)))));
        assert_eq!(shout.param_type().name(), "boolean");

        let upper = Parameter::option(["--upper", "transform"])
            .flag_value("upper")
            .build()
            .unwrap();
        assert!(upper.is_flag());
        assert!(!upper.is_bool_flag());
        assert_eq!(upper.name(), "transform");

        let verbose = Parameter::option(["-v"]).count().build().unwrap();
        assert_eq!(verbose.kind(), &ParameterKind::Counter);
        assert_eq!(verbose.param_type().name(), "integer range");
    }

    #[test]
    fn arity_follows_composite_types() {
        let point = Parameter::option(["--point"])
            .param_type(TupleType::new(vec![Arc::new(IntType), Arc::new(IntType)]))
            .build()
            .unwrap();
        assert_eq!(point.nargs(), 2);
        assert!(
            Parameter::option(["--point"])
                .param_type(TupleType::new(vec![Arc::new(IntType)]))
                .nargs(3)
                .build()
                .is_err()
        );
    }

    #[test]
    fn argument_requiredness() {
        let arg = Parameter::argument("arg").build().unwrap();
        assert!(arg.is_required());
        assert_eq!(arg.error_hint(), "\"arg\"");
        let rest = Parameter::argument("src").nargs(-1).build().unwrap();
        assert!(!rest.is_required());
        assert_eq!(rest.make_metavar(), "[SRC]...");
        let with_default = Parameter::argument("dst").default("out").build().unwrap();
        assert!(!with_default.is_required());
    }

    #[test]
    fn help_records() {
        let count = Parameter::option(["--count", "-c"])
            .param_type(IntType)
            .default(1)
            .show_default()
            .help("How many times.")
            .build()
            .unwrap();
        assert_eq!(
            count.help_record(),
            Some((
                "-c, --count INTEGER".to_string(),
                "How many times.  [default: 1]".to_string()
            ))
        );
        assert_eq!(count.error_hint(), "\"--count\" / \"-c\"");

        let shout = Parameter::option(["--shout/--no-shout"]).build().unwrap();
        assert_eq!(shout.help_record().unwrap().0, "--shout / --no-shout");

        let mode = Parameter::option(["--mode"])
            .param_type(Choice::new(["fast", "slow"]))
            .required()
            .build()
            .unwrap();
        assert_eq!(
            mode.help_record(),
            Some(("--mode [fast|slow]".to_string(), "[required]".to_string()))
        );

        let secret = Parameter::option(["--secret"]).hidden().build().unwrap();
        assert!(secret.help_record().is_none());
        assert!(Parameter::argument("x").build().unwrap().help_record().is_none());
    }

    #[test]
    fn prompt_text_defaults_to_name() {
        let p = Parameter::option(["--user-name"]).prompt_named().build().unwrap();
        let ParamVariant::Option(spec) = p.variant() else {
            panic!("expected option");
        };
        assert_eq!(spec.prompt.as_deref(), Some("User name"));
    }
}
