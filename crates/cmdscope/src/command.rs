//! Commands, groups and collections.
//!
//! A [`Command`] is an immutable definition: parameters, a callback and help
//! text. Groups map names to subcommands; collections merge the subcommands
//! of several groups. Running a command builds one [`Context`] per level of
//! the chain, resolves that level's parameters, runs its callback and then
//! dispatches to at most one subcommand.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::{Context, ContextSettings};
use crate::error::{CliError, CliResult};
use crate::formatting::HelpFormatter;
use crate::params::{Parameter, param_callback};
use crate::parser::{OptionParser, normalize_opt, processing_order, split_opt};
use crate::value::{ParamValues, Value};

pub type CommandCallback = Arc<dyn Fn(&Context<'_>, &ParamValues) -> CliResult<()> + Send + Sync>;

const SHORT_HELP_MAX: usize = 45;

#[derive(Debug, Clone, Default)]
pub struct MultiSettings {
    pub invoke_without_command: bool,
    pub subcommand_metavar: Option<String>,
}

#[derive(Clone)]
pub enum CommandKind {
    Leaf,
    Group {
        commands: IndexMap<String, Arc<Command>>,
        multi: MultiSettings,
    },
    /// Looks subcommands up in each source group in turn.
    Collection {
        sources: Vec<Arc<Command>>,
        multi: MultiSettings,
    },
}

#[derive(Clone)]
pub struct Command {
    name: String,
    callback: Option<CommandCallback>,
    params: Vec<Arc<Parameter>>,
    help: Option<String>,
    epilog: Option<String>,
    short_help: Option<String>,
    options_metavar: String,
    add_help_option: bool,
    hidden: bool,
    no_args_is_help: Option<bool>,
    context_settings: ContextSettings,
    kind: CommandKind,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subcommands = match &self.kind {
            CommandKind::Leaf => Vec::new(),
            _ => self.list_commands(),
        };
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("subcommands", &subcommands)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

impl Command {
    fn with_kind(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            callback: None,
            params: Vec::new(),
            help: None,
            epilog: None,
            short_help: None,
            options_metavar: "[OPTIONS]".to_string(),
            add_help_option: true,
            hidden: false,
            no_args_is_help: None,
            context_settings: ContextSettings::default(),
            kind,
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, CommandKind::Leaf)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            CommandKind::Group {
                commands: IndexMap::new(),
                multi: MultiSettings::default(),
            },
        )
    }

    pub fn collection(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            CommandKind::Collection {
                sources: Vec::new(),
                multi: MultiSettings::default(),
            },
        )
    }


    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(Arc::new(param));
        self
    }

    pub fn callback(
        mut self,
        f: impl Fn(&Context<'_>, &ParamValues) -> CliResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Arc::new(f));
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn epilog(mut self, epilog: impl Into<String>) -> Self {
        self.epilog = Some(epilog.into());
        self
    }

    pub fn short_help(mut self, short_help: impl Into<String>) -> Self {
        self.short_help = Some(short_help.into());
        self
    }

    pub fn options_metavar(mut self, metavar: impl Into<String>) -> Self {
        self.options_metavar = metavar.into();
        self
    }

    pub fn add_help_option(mut self, add: bool) -> Self {
        self.add_help_option = add;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn no_args_is_help(mut self, enabled: bool) -> Self {
        self.no_args_is_help = Some(enabled);
        self
    }

    pub fn context_settings(mut self, settings: ContextSettings) -> Self {
        self.context_settings = settings;
        self
    }

    /// Register a subcommand under its own name. Only groups hold
    /// subcommands.
    pub fn subcommand(mut self, command: Command) -> Self {
        self.add_command(command);
        self
    }

    pub fn add_command(&mut self, command: Command) {
        match &mut self.kind {
            CommandKind::Group { commands, .. } => {
                if commands.contains_key(&command.name) {
                    tracing::warn!(group = %self.name, command = %command.name, "replacing subcommand");
                }
                commands.insert(command.name.clone(), Arc::new(command));
            }
            _ => {
                tracing::warn!(
                    command = %self.name,
                    subcommand = %command.name,
                    "ignoring subcommand on a command that is not a group"
                );
            }
        }
    }

    /// Add a group whose subcommands this collection exposes.
    pub fn source(mut self, group: Command) -> Self {
        match &mut self.kind {
            CommandKind::Collection { sources, .. } => sources.push(Arc::new(group)),
            _ => {
                tracing::warn!(command = %self.name, source = %group.name, "ignoring source on a command that is not a collection");
            }
        }
        self
    }

    /// Run the group callback even when no subcommand is given.
    pub fn invoke_without_command(mut self, enabled: bool) -> Self {
        if let Some(multi) = self.multi_mut() {
            multi.invoke_without_command = enabled;
        }
        self
    }

    pub fn subcommand_metavar(mut self, metavar: impl Into<String>) -> Self {
        if let Some(multi) = self.multi_mut() {
            multi.subcommand_metavar = Some(metavar.into());
        }
        self
    }

    /// Add an eager `--version` flag that prints `"<prog>, version <v>"`
    /// and exits.
    pub fn version_option(self, version: impl Into<String>) -> Self {
        let version = version.into();
        let callback = param_callback(move |ctx, _param, value| {
            if !value.as_ref().is_some_and(Value::is_truthy) || ctx.resilient_parsing() {
                return Ok(value);
            }
            let prog = ctx.find_root().info_name().unwrap_or_default();
            println!("{prog}, version {version}");
            Err(CliError::Exit(0))
        });
        self.param(Parameter::eager_flag(
            "version",
            vec!["--version".to_string()],
            "Show the version and exit.",
            callback,
        ))
    }


    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Arc<Parameter>] {
        &self.params
    }

    pub fn callback_fn(&self) -> Option<&CommandCallback> {
        self.callback.as_ref()
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.context_settings
    }

    pub fn is_multi(&self) -> bool {
        !matches!(self.kind, CommandKind::Leaf)
    }

    fn multi(&self) -> Option<&MultiSettings> {
        match &self.kind {
            CommandKind::Leaf => None,
            CommandKind::Group { multi, .. } | CommandKind::Collection { multi, .. } => Some(multi),
        }
    }

    fn multi_mut(&mut self) -> Option<&mut MultiSettings> {
        match &mut self.kind {
            CommandKind::Leaf => None,
            CommandKind::Group { multi, .. } | CommandKind::Collection { multi, .. } => Some(multi),
        }
    }

    fn no_args_shows_help(&self) -> bool {
        self.no_args_is_help
            .unwrap_or_else(|| self.multi().is_some_and(|multi| !multi.invoke_without_command))
    }

    /// The one-line summary shown in a parent's command listing.
    pub fn get_short_help(&self) -> String {
        match (&self.short_help, &self.help) {
            (Some(short), _) => short.clone(),
            (None, Some(help)) => make_default_short_help(help, SHORT_HELP_MAX),
            (None, None) => String::new(),
        }
    }

    pub fn get_command(&self, name: &str) -> Option<&Command> {
        match &self.kind {
            CommandKind::Leaf => None,
            CommandKind::Group { commands, .. } => commands.get(name).map(Arc::as_ref),
            CommandKind::Collection { sources, .. } => {
                sources.iter().find_map(|source| source.get_command(name))
            }
        }
    }

    /// Subcommand names, sorted.
    pub fn list_commands(&self) -> Vec<String> {
        let mut names: Vec<String> = match &self.kind {
            CommandKind::Leaf => Vec::new(),
            CommandKind::Group { commands, .. } => commands.keys().cloned().collect(),
            CommandKind::Collection { sources, .. } => {
                sources.iter().flat_map(|source| source.list_commands()).collect()
            }
        };
        names.sort();
        names.dedup();
        names
    }


    fn help_option_names(&self, ctx: &Context<'_>) -> Vec<String> {
        let taken: HashSet<&str> = self
            .params
            .iter()
            .flat_map(|p| p.opts().iter().chain(p.secondary_opts()))
            .map(String::as_str)
            .collect();
        ctx.help_option_names()
            .into_iter()
            .filter(|name| !taken.contains(name.as_str()))
            .collect()
    }

    /// First help flag still free on this command, if it has a help option.
    pub fn help_option_name(&self, ctx: &Context<'_>) -> Option<String> {
        if !self.add_help_option {
            return None;
        }
        self.help_option_names(ctx).into_iter().next()
    }

    fn help_option(&self, ctx: &Context<'_>) -> Option<Parameter> {
        if !self.add_help_option {
            return None;
        }
        let names = self.help_option_names(ctx);
        if names.is_empty() {
            return None;
        }
        let callback = param_callback(|ctx, _param, value| {
            if !value.as_ref().is_some_and(Value::is_truthy) || ctx.resilient_parsing() {
                return Ok(value);
            }
            println!("{}", ctx.get_help());
            Err(CliError::Exit(0))
        });
        Some(Parameter::eager_flag("help", names, "Show this message and exit.", callback))
    }

    /// Declared parameters plus the help option.
    pub fn get_params(&self, ctx: &Context<'_>) -> Vec<Arc<Parameter>> {
        let mut params = self.params.clone();
        if let Some(help) = self.help_option(ctx) {
            params.push(Arc::new(help));
        }
        params
    }


    fn make_parser(&self, ctx: &Context<'_>, params: &[Arc<Parameter>]) -> CliResult<OptionParser> {
        let mut parser = OptionParser::new(ctx.token_normalize_func());
        parser.allow_interspersed_args = ctx.allow_interspersed_args();
        parser.ignore_unknown_options = ctx.ignore_unknown_options();
        parser.resilient = ctx.resilient_parsing();
        for (idx, param) in params.iter().enumerate() {
            param.add_to_parser(&mut parser, idx)?;
        }
        Ok(parser)
    }

    /// Create a Context for this command and resolve its parameters from
    /// `args`. `extra` settings take precedence over the command's own.
    pub fn make_context<'a>(
        &'a self,
        info_name: impl Into<String>,
        args: Vec<String>,
        parent: Option<&'a Context<'a>>,
        extra: ContextSettings,
    ) -> CliResult<Context<'a>> {
        let settings = extra.or(&self.context_settings);
        let ctx = Context::new(self, parent, Some(info_name.into()), settings);
        self.parse_args(&ctx, args)?;
        Ok(ctx)
    }

    /// Tokenize `args`, resolve every parameter in processing order and
    /// store what is left on the Context.
    pub fn parse_args(&self, ctx: &Context<'_>, args: Vec<String>) -> CliResult<()> {
        if args.is_empty() && self.no_args_shows_help() && !ctx.resilient_parsing() {
            println!("{}", ctx.get_help());
            return Err(CliError::Exit(0));
        }

        let params = self.get_params(ctx);
        let parser = self.make_parser(ctx, &params)?;
        let state = parser
            .parse_args(args)
            .map_err(|err| err.with_context(ctx.error_context()))?;
        let (values, mut rest, order) = state.into_parts();

        let eager: Vec<bool> = params.iter().map(|p| p.is_eager()).collect();
        for idx in processing_order(&order, &eager) {
            params[idx].handle_parse_result(ctx, &values)?;
        }

        if !rest.is_empty() && !ctx.allow_extra_args() && !ctx.resilient_parsing() {
            let plural = if rest.len() == 1 { "" } else { "s" };
            return Err(ctx.fail(format!(
                "Got unexpected extra argument{plural} ({})",
                rest.join(" ")
            )));
        }

        if self.is_multi() && !rest.is_empty() {
            let args = rest.split_off(1);
            ctx.set_protected_args(rest);
            ctx.set_args(args);
        } else {
            ctx.set_args(rest);
        }
        Ok(())
    }


    /// Run this command's callback, then dispatch to a subcommand when this
    /// is a group or collection.
    pub fn invoke(&self, ctx: &Context<'_>) -> CliResult<()> {
        match self.multi() {
            None => self.invoke_callback(ctx),
            Some(multi) => self.invoke_multi(ctx, multi),
        }
    }

    fn invoke_callback(&self, ctx: &Context<'_>) -> CliResult<()> {
        let Some(callback) = &self.callback else {
            return Ok(());
        };
        tracing::debug!(command = %ctx.command_path(), "invoking callback");
        callback(ctx, &ctx.params()).map_err(|err| err.with_context(ctx.error_context()))
    }

    fn invoke_multi(&self, ctx: &Context<'_>, multi: &MultiSettings) -> CliResult<()> {
        let mut args = ctx.take_protected_args();
        if args.is_empty() {
            if multi.invoke_without_command {
                return self.invoke_callback(ctx);
            }
            return Err(ctx.fail("Missing command."));
        }
        args.extend(ctx.take_args());

        let (name, command, rest) = self.resolve_command(ctx, args)?;
        ctx.set_invoked_subcommand(Some(name.clone()));
        self.invoke_callback(ctx)?;

        let sub_ctx = command.make_context(name, rest, Some(ctx), ContextSettings::default())?;
        command.invoke(&sub_ctx)
    }

    /// Look up the subcommand named by the first of `args`, normalizing the
    /// name if the plain lookup fails.
    pub fn resolve_command(
        &self,
        ctx: &Context<'_>,
        args: Vec<String>,
    ) -> CliResult<(String, &Command, Vec<String>)> {
        let mut rest = args.clone();
        if rest.is_empty() {
            return Err(ctx.fail("Missing command."));
        }
        let original = rest.remove(0);

        if let Some(command) = self.get_command(&original) {
            return Ok((original, command, rest));
        }
        if let Some(normalize) = ctx.token_normalize_func() {
            let normalized = normalize(&original);
            if let Some(command) = self.get_command(&normalized) {
                return Ok((normalized, command, rest));
            }
        }

        // a flag in command position gets the parser's error instead
        if !split_opt(&original).0.is_empty() {
            self.parse_args(ctx, args)?;
        }
        let mut message = format!("No such command \"{original}\".");
        if let Some(suggestion) = self.suggest_command(ctx, &original) {
            message.push_str(&format!(" Did you mean \"{suggestion}\"?"));
        }
        Err(ctx.fail(message))
    }

    fn suggest_command(&self, ctx: &Context<'_>, name: &str) -> Option<String> {
        let normalize = ctx.token_normalize_func();
        let wanted = normalize_opt(name, normalize.as_ref());
        self.list_commands()
            .into_iter()
            .filter(|candidate| self.get_command(candidate).is_some_and(|c| !c.hidden))
            .map(|candidate| (strsim::levenshtein(&wanted, &candidate), candidate))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate)
    }


    pub fn collect_usage_pieces(&self, ctx: &Context<'_>) -> Vec<String> {
        let mut pieces = vec![self.options_metavar.clone()];
        for param in self.get_params(ctx) {
            pieces.extend(param.usage_pieces());
        }
        if let Some(multi) = self.multi() {
            pieces.push(
                multi
                    .subcommand_metavar
                    .clone()
                    .unwrap_or_else(|| "COMMAND [ARGS]...".to_string()),
            );
        }
        pieces.retain(|piece| !piece.is_empty());
        pieces
    }

    pub fn format_usage(&self, ctx: &Context<'_>, formatter: &mut HelpFormatter) {
        let pieces = self.collect_usage_pieces(ctx);
        formatter.write_usage(&ctx.command_path(), &pieces.join(" "));
    }

    pub fn format_help(&self, ctx: &Context<'_>, formatter: &mut HelpFormatter) {
        self.format_usage(ctx, formatter);
        if let Some(help) = &self.help {
            formatter.write_paragraph();
            formatter.indented(|f| f.write_text(help));
        }

        let options: Vec<(String, String)> = self
            .get_params(ctx)
            .iter()
            .filter_map(|param| param.help_record())
            .collect();
        if !options.is_empty() {
            formatter.section("Options", |f| f.write_dl(&options));
        }

        let commands: Vec<(String, String)> = self
            .list_commands()
            .into_iter()
            .filter_map(|name| {
                let command = self.get_command(&name)?;
                (!command.hidden).then(|| (name, command.get_short_help()))
            })
            .collect();
        if !commands.is_empty() {
            formatter.section("Commands", |f| f.write_dl(&commands));
        }

        if let Some(epilog) = &self.epilog {
            formatter.write_paragraph();
            formatter.indented(|f| f.write_text(epilog));
        }
    }


    /// Parse `args` as the root invocation named `prog` and run the chain.
    /// Every Context is closed before this returns.
    pub fn run<I, S>(&self, prog: &str, args: I) -> CliResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_with(prog, args, ContextSettings::default())
    }

    pub fn run_with<I, S>(&self, prog: &str, args: I, extra: ContextSettings) -> CliResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        tracing::debug!(prog, args = args.len(), "running command");
        let ctx = self.make_context(prog, args, None, extra)?;
        let result = self.invoke(&ctx);
        drop(ctx);
        result
    }

    /// [`run`](Self::run) and translate the outcome into an exit status,
    /// printing errors to `err`.
    pub fn execute<I, S>(&self, prog: &str, args: I, err: &mut dyn Write) -> i32
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execute_with(prog, args, ContextSettings::default(), err)
    }

    pub fn execute_with<I, S>(&self, prog: &str, args: I, extra: ContextSettings, err: &mut dyn Write) -> i32
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.run_with(prog, args, extra) {
            Ok(()) => 0,
            Err(CliError::Exit(code)) => code,
            Err(error) => {
                if let Err(io_err) = error.show(err) {
                    tracing::warn!(error = %io_err, "failed to print error");
                }
                error.exit_code()
            }
        }
    }

    /// Standalone entry: parse the process arguments and exit.
    pub fn main(&self, extra: ContextSettings) -> ! {
        let mut argv = std::env::args();
        let prog = argv
            .next()
            .and_then(|arg0| {
                Path::new(&arg0)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| self.name.clone());
        let code = self.execute_with(&prog, argv, extra, &mut io::stderr());
        std::process::exit(code)
    }
}

/// First sentence of `help`, cut at `max_length` characters with `...`.
fn make_default_short_help(help: &str, max_length: usize) -> String {
    let mut result = String::new();
    let mut total = 0;
    for word in help.split_whitespace() {
        let done = word.ends_with('.');
        let len = word.chars().count() + usize::from(!result.is_empty());
        if total + len > max_length {
            result.push_str("...");
            break;
        }
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
        if done {
            break;
        }
        total += len;
    }
    result
}
