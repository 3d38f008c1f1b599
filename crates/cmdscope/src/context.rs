//! The per-invocation scope chain.
//!
//! A [`Context`] borrows its [`Command`] and its parent, so a child can never
//! outlive the scope it was created in. Settings that are not given
//! explicitly read through to the parent on every access instead of being
//! copied down. Resolved values and the cleanup list are owned by exactly one
//! Context and are mutated through `&self` while callbacks hold references to
//! it.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::command::Command;
use crate::default_map::DefaultMap;
use crate::error::{CliError, ErrorContext, UsageError};
use crate::formatting::HelpFormatter;
use crate::parser::TokenNormalizer;
use crate::prompt::{Prompter, TerminalPrompter};
use crate::value::{ParamValues, Value};

/// Opaque user payload carried along the chain.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Environment lookup used instead of the process environment.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Plain callback run by [`Context::invoke`].
pub type InvokeFn<'c> = &'c dyn Fn(&Context<'_>, &ParamValues) -> crate::error::CliResult<()>;

/// What [`Context::invoke`] can run.
pub enum Invokable<'c> {
    Callback(InvokeFn<'c>),
    /// Another command's callback, in a fresh child Context.
    Delegate(&'c Command),
}

/// Where a parameter's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Commandline,
    DefaultMap,
    Environment,
    Prompt,
    Default,
}

/// Optional Context configuration. Unset fields fall back to the parent
/// Context or to the command's own defaults.
#[derive(Clone, Default)]
pub struct ContextSettings {
    pub obj: Option<Payload>,
    pub auto_envvar_prefix: Option<String>,
    pub default_map: Option<Arc<DefaultMap>>,
    pub terminal_width: Option<usize>,
    pub max_content_width: Option<usize>,
    pub allow_extra_args: Option<bool>,
    pub allow_interspersed_args: Option<bool>,
    pub ignore_unknown_options: Option<bool>,
    pub help_option_names: Option<Vec<String>>,
    pub token_normalize_func: Option<TokenNormalizer>,
    pub resilient_parsing: Option<bool>,
    pub prompter: Option<Arc<dyn Prompter>>,
    pub env: Option<EnvLookup>,
}

impl ContextSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// User payload for the root Context; children read it through unless they set their own.
    pub fn obj<T: Any + Send + Sync>(mut self, obj: T) -> Self {
        self.obj = Some(Arc::new(obj));
        self
    }

    /// Prefix for automatic environment variables. Children derive `PREFIX_NAME` from it.
    pub fn auto_envvar_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.auto_envvar_prefix = Some(prefix.into());
        self
    }

    /// Defaults looked up before the environment, scoped per subcommand.
    pub fn default_map(mut self, map: DefaultMap) -> Self {
        self.default_map = Some(Arc::new(map));
        self
    }

    /// Width used for help output instead of the detected terminal width.
    pub fn terminal_width(mut self, width: usize) -> Self {
        self.terminal_width = Some(width);
        self
    }

    /// Upper bound for help output width.
    pub fn max_content_width(mut self, width: usize) -> Self {
        self.max_content_width = Some(width);
        self
    }

    /// Keep unclaimed tokens in [`Context::args`] instead of failing.
    pub fn allow_extra_args(mut self, allow: bool) -> Self {
        self.allow_extra_args = Some(allow);
        self
    }

    /// With `false`, option scanning stops at the first positional token.
    pub fn allow_interspersed_args(mut self, allow: bool) -> Self {
        self.allow_interspersed_args = Some(allow);
        self
    }

    /// Keep unknown options as leftover tokens instead of failing.
    pub fn ignore_unknown_options(mut self, ignore: bool) -> Self {
        self.ignore_unknown_options = Some(ignore);
        self
    }

    /// Names of the built-in help option. Empty disables it.
    pub fn help_option_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.help_option_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Applied to option names and subcommand names before lookup.
    pub fn token_normalize_func(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.token_normalize_func = Some(Arc::new(f));
        self
    }

    /// Parse without prompting and ignore resolution and callback errors.
    pub fn resilient_parsing(mut self, resilient: bool) -> Self {
        self.resilient_parsing = Some(resilient);
        self
    }

    /// Where prompts are shown and answered. Defaults to the terminal.
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Lookup used instead of the process environment.
    pub fn env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Some(Arc::new(lookup));
        self
    }

    /// Field-wise: values set on `self` win over `fallback`.
    pub fn or(self, fallback: &ContextSettings) -> ContextSettings {
        ContextSettings {
            obj: self.obj.or_else(|| fallback.obj.clone()),
            auto_envvar_prefix: self
                .auto_envvar_prefix
                .or_else(|| fallback.auto_envvar_prefix.clone()),
            default_map: self.default_map.or_else(|| fallback.default_map.clone()),
            terminal_width: self.terminal_width.or(fallback.terminal_width),
            max_content_width: self.max_content_width.or(fallback.max_content_width),
            allow_extra_args: self.allow_extra_args.or(fallback.allow_extra_args),
            allow_interspersed_args: self
                .allow_interspersed_args
                .or(fallback.allow_interspersed_args),
            ignore_unknown_options: self
                .ignore_unknown_options
                .or(fallback.ignore_unknown_options),
            help_option_names: self
                .help_option_names
                .or_else(|| fallback.help_option_names.clone()),
            token_normalize_func: self
                .token_normalize_func
                .or_else(|| fallback.token_normalize_func.clone()),
            resilient_parsing: self.resilient_parsing.or(fallback.resilient_parsing),
            prompter: self.prompter.or_else(|| fallback.prompter.clone()),
            env: self.env.or_else(|| fallback.env.clone()),
        }
    }
}

impl fmt::Debug for ContextSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSettings")
            .field("auto_envvar_prefix", &self.auto_envvar_prefix)
            .field("default_map", &self.default_map)
            .field("terminal_width", &self.terminal_width)
            .field("max_content_width", &self.max_content_width)
            .field("allow_extra_args", &self.allow_extra_args)
            .field("allow_interspersed_args", &self.allow_interspersed_args)
            .field("ignore_unknown_options", &self.ignore_unknown_options)
            .field("help_option_names", &self.help_option_names)
            .field("resilient_parsing", &self.resilient_parsing)
            .finish_non_exhaustive()
    }
}

type CloseCallback = Box<dyn FnOnce()>;

pub struct Context<'p> {
    command: &'p Command,
    parent: Option<&'p Context<'p>>,
    info_name: Option<String>,
    settings: ContextSettings,
    depth: usize,
    params: RefCell<ParamValues>,
    sources: RefCell<IndexMap<String, ValueSource>>,
    args: RefCell<Vec<String>>,
    protected_args: RefCell<Vec<String>>,
    invoked_subcommand: RefCell<Option<String>>,
    obj: RefCell<Option<Payload>>,
    meta: RefCell<IndexMap<String, Payload>>,
    close_callbacks: RefCell<Vec<CloseCallback>>,
}

impl<'p> Context<'p> {
    pub fn new(
        command: &'p Command,
        parent: Option<&'p Context<'p>>,
        info_name: Option<String>,
        settings: ContextSettings,
    ) -> Self {
        let depth = parent.map_or(0, |p| p.depth + 1);
        let obj = settings.obj.clone();
        tracing::debug!(
            command = %command.name(),
            info_name = info_name.as_deref().unwrap_or(""),
            depth,
            "created context"
        );
        Self {
            command,
            parent,
            info_name,
            settings,
            depth,
            params: RefCell::default(),
            sources: RefCell::default(),
            args: RefCell::default(),
            protected_args: RefCell::default(),
            invoked_subcommand: RefCell::default(),
            obj: RefCell::new(obj),
            meta: RefCell::default(),
            close_callbacks: RefCell::default(),
        }
    }

    pub fn command(&self) -> &'p Command {
        self.command
    }

    pub fn parent(&self) -> Option<&'p Context<'p>> {
        self.parent
    }

    /// Name this level was invoked under, e.g. the subcommand name.
    pub fn info_name(&self) -> Option<&str> {
        self.info_name.as_deref()
    }

    /// Nesting level; the root Context is 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Top of the chain.
    pub fn find_root(&self) -> &Context<'p> {
        let mut node = self;
        while let Some(parent) = node.parent {
            node = parent;
        }
        node
    }

    /// Space-separated `info_name`s from the root down to this Context.
    pub fn command_path(&self) -> String {
        let own = self.info_name.as_deref().unwrap_or("");
        match self.parent {
            Some(parent) => format!("{} {own}", parent.command_path())
                .trim_start()
                .to_string(),
            None => own.to_string(),
        }
    }

    /// Snapshot of the values resolved so far.
    pub fn params(&self) -> ParamValues {
        self.params.borrow().clone()
    }

    pub fn param(&self, name: &str) -> Option<Value> {
        self.params.borrow().get(name).cloned()
    }

    pub(crate) fn set_param(&self, name: &str, value: Option<Value>, source: ValueSource) {
        self.params.borrow_mut().insert(name, value);
        self.sources.borrow_mut().insert(name.to_string(), source);
    }

    /// Which source supplied `name`, once resolved.
    pub fn parameter_source(&self, name: &str) -> Option<ValueSource> {
        self.sources.borrow().get(name).copied()
    }

    /// Tokens no parameter claimed.
    pub fn args(&self) -> Vec<String> {
        self.args.borrow().clone()
    }

    pub(crate) fn set_args(&self, args: Vec<String>) {
        *self.args.borrow_mut() = args;
    }

    pub(crate) fn take_args(&self) -> Vec<String> {
        std::mem::take(&mut *self.args.borrow_mut())
    }

    /// The subcommand name split off by a group until it is dispatched.
    pub fn protected_args(&self) -> Vec<String> {
        self.protected_args.borrow().clone()
    }

    pub(crate) fn set_protected_args(&self, args: Vec<String>) {
        *self.protected_args.borrow_mut() = args;
    }

    pub(crate) fn take_protected_args(&self) -> Vec<String> {
        std::mem::take(&mut *self.protected_args.borrow_mut())
    }

    /// Name of the subcommand dispatched from here, if any.
    pub fn invoked_subcommand(&self) -> Option<String> {
        self.invoked_subcommand.borrow().clone()
    }

    pub(crate) fn set_invoked_subcommand(&self, name: Option<String>) {
        *self.invoked_subcommand.borrow_mut() = name;
    }

    /// Payload set on this Context or the nearest ancestor.
    pub fn obj(&self) -> Option<Payload> {
        if let Some(obj) = self.obj.borrow().as_ref() {
            return Some(Arc::clone(obj));
        }
        self.parent.and_then(Context::obj)
    }

    pub fn set_obj<T: Any + Send + Sync>(&self, obj: T) {
        *self.obj.borrow_mut() = Some(Arc::new(obj));
    }

    /// Nearest payload of type `T`, starting here and walking up.
    pub fn find_object<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut node = Some(self);
        while let Some(ctx) = node {
            let own = ctx.obj.borrow().clone();
            if let Some(found) = own.and_then(|obj| obj.downcast::<T>().ok()) {
                return Some(found);
            }
            node = ctx.parent;
        }
        None
    }

    /// Like [`find_object`](Self::find_object), but stores a default `T` on
    /// this Context when none exists.
    pub fn ensure_object<T: Any + Send + Sync + Default>(&self) -> Arc<T> {
        if let Some(found) = self.find_object::<T>() {
            return found;
        }
        let created = Arc::new(T::default());
        let payload: Payload = created.clone();
        *self.obj.borrow_mut() = Some(payload);
        created
    }

    /// Read from the table shared by the whole chain.
    pub fn meta_get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let root = self.find_root();
        let meta = root.meta.borrow();
        meta.get(key).cloned().and_then(|v| v.downcast::<T>().ok())
    }

    /// Insert into the table shared by the whole chain.
    pub fn meta_insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.find_root()
            .meta
            .borrow_mut()
            .insert(key.into(), Arc::new(value));
    }

    /// Explicit prefix upper-cased, or `PARENT_PREFIX` + `_` + this scope's
    /// name when the parent has one.
    pub fn auto_envvar_prefix(&self) -> Option<String> {
        if let Some(prefix) = &self.settings.auto_envvar_prefix {
            return Some(prefix.to_uppercase());
        }
        let parent_prefix = self.parent?.auto_envvar_prefix()?;
        let name = self.info_name.as_deref()?;
        Some(format!(
            "{parent_prefix}_{}",
            name.to_uppercase().replace('-', "_")
        ))
    }

    /// Own default map, or the parent's entry for this scope's name,
    /// resolved again on every call.
    pub fn default_map(&self) -> Option<Arc<DefaultMap>> {
        if let Some(map) = &self.settings.default_map {
            return Some(Arc::clone(map));
        }
        let parent_map = self.parent?.default_map()?;
        parent_map.for_command(self.info_name.as_deref()?)
    }

    /// Default for `name` from this level's default map, with producers evaluated.
    pub fn lookup_default(&self, name: &str) -> Option<Value> {
        self.default_map()?.lookup(name)
    }

    pub fn terminal_width(&self) -> Option<usize> {
        self.settings
            .terminal_width
            .or_else(|| self.parent.and_then(Context::terminal_width))
    }

    pub fn max_content_width(&self) -> Option<usize> {
        self.settings
            .max_content_width
            .or_else(|| self.parent.and_then(Context::max_content_width))
    }

    /// Help option names in effect here, inherited when unset.
    pub fn help_option_names(&self) -> Vec<String> {
        if let Some(names) = &self.settings.help_option_names {
            return names.clone();
        }
        match self.parent {
            Some(parent) => parent.help_option_names(),
            None => vec!["--help".to_string()],
        }
    }

    pub fn token_normalize_func(&self) -> Option<TokenNormalizer> {
        self.settings
            .token_normalize_func
            .clone()
            .or_else(|| self.parent.and_then(Context::token_normalize_func))
    }

    /// Set while completing or introspecting: resolution errors, prompts
    /// and help/version exits are suppressed.
    pub fn resilient_parsing(&self) -> bool {
        self.settings
            .resilient_parsing
            .or_else(|| self.parent.map(Context::resilient_parsing))
            .unwrap_or(false)
    }

    pub fn prompter(&self) -> Arc<dyn Prompter> {
        if let Some(prompter) = &self.settings.prompter {
            return Arc::clone(prompter);
        }
        match self.parent {
            Some(parent) => parent.prompter(),
            None => Arc::new(TerminalPrompter),
        }
    }

    /// Non-empty environment value of `name`.
    pub fn env_var(&self, name: &str) -> Option<String> {
        let value = match self.env_lookup() {
            Some(lookup) => lookup(name),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    fn env_lookup(&self) -> Option<EnvLookup> {
        self.settings
            .env
            .clone()
            .or_else(|| self.parent.and_then(Context::env_lookup))
    }

    pub fn allow_extra_args(&self) -> bool {
        self.settings
            .allow_extra_args
            .unwrap_or_else(|| self.command.is_multi())
    }

    pub fn allow_interspersed_args(&self) -> bool {
        self.settings
            .allow_interspersed_args
            .unwrap_or_else(|| !self.command.is_multi())
    }

    pub fn ignore_unknown_options(&self) -> bool {
        self.settings.ignore_unknown_options.unwrap_or(false)
    }

    /// Register `f` to run when this Context closes. Callbacks run once, in
    /// registration order.
    pub fn call_on_close(&self, f: impl FnOnce() + 'static) {
        self.close_callbacks.borrow_mut().push(Box::new(f));
    }

    /// Run and clear all close callbacks. Also runs on drop.
    pub fn close(&self) {
        let callbacks = std::mem::take(&mut *self.close_callbacks.borrow_mut());
        if !callbacks.is_empty() {
            tracing::debug!(
                command = %self.command.name(),
                callbacks = callbacks.len(),
                "closing context"
            );
        }
        for callback in callbacks {
            callback();
        }
    }

    pub fn make_formatter(&self) -> HelpFormatter {
        HelpFormatter::new(self.terminal_width(), self.max_content_width())
    }

    /// Usage line for this Context's command, e.g. `Usage: tool sub [OPTIONS]`.
    pub fn get_usage(&self) -> String {
        let mut formatter = self.make_formatter();
        self.command.format_usage(self, &mut formatter);
        formatter.finish().trim_end_matches('\n').to_string()
    }

    /// Full help page for this Context's command.
    pub fn get_help(&self) -> String {
        let mut formatter = self.make_formatter();
        self.command.format_help(self, &mut formatter);
        formatter.finish().trim_end_matches('\n').to_string()
    }

    /// Snapshot attached to usage errors raised in this scope.
    pub fn error_context(&self) -> ErrorContext {
        ErrorContext {
            command_path: self.command_path(),
            usage: self.get_usage(),
            help_option: self.command.help_option_name(self),
        }
    }

    /// A usage error bound to this Context.
    pub fn fail(&self, message: impl Into<String>) -> CliError {
        CliError::Usage(UsageError::new(message).with_context(self.error_context()))
    }

    /// Error that ends the invocation with `Aborted!`.
    pub fn abort(&self) -> CliError {
        CliError::Abort
    }

    /// Error that exits early with `code` and no message.
    pub fn exit(&self, code: i32) -> CliError {
        CliError::Exit(code)
    }

    /// Run a callback with this Context, or another command's callback in a
    /// child Context. Missing values for the delegate are filled from its
    /// parameters' defaults; `overrides` win.
    pub fn invoke(&self, target: Invokable<'_>, overrides: ParamValues) -> crate::error::CliResult<()> {
        let result = match target {
            Invokable::Callback(callback) => callback(self, &overrides),
            Invokable::Delegate(command) => self.invoke_delegate(command, overrides),
        };
        result.map_err(|err| err.with_context(self.error_context()))
    }

    fn invoke_delegate(&self, command: &Command, overrides: ParamValues) -> crate::error::CliResult<()> {
        let sub = Context::new(
            command,
            Some(self),
            Some(command.name().to_string()),
            command.settings().clone(),
        );
        let mut values = overrides;
        for param in command.params() {
            if param.expose_value() && !values.contains(param.name()) {
                values.insert(param.name(), param.default_value(&sub)?);
            }
        }
        tracing::debug!(command = %command.name(), "invoking delegate");
        match command.callback_fn() {
            Some(callback) => callback(&sub, &values),
            None => Ok(()),
        }
    }

    /// [`invoke`](Self::invoke) another command, passing this Context's
    /// values for anything `overrides` does not set.
    pub fn forward(&self, command: &Command, overrides: ParamValues) -> crate::error::CliResult<()> {
        let mut values = overrides;
        for (name, value) in self.params().iter() {
            if !values.contains(name) {
                values.insert(name, value.cloned());
            }
        }
        self.invoke(Invokable::Delegate(command), values)
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("command", &self.command.name())
            .field("info_name", &self.info_name)
            .field("depth", &self.depth)
            .field("params", &self.params.borrow())
            .finish_non_exhaustive()
    }
}
