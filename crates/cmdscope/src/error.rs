//! Error taxonomy shared by the tokenizer, the parameter pipeline and dispatch.
//!
//! Every user-facing failure is a [`CliError`]. Malformed invocations are
//! [`UsageError`]s (exit code 2) whose [`UsageErrorKind`] decides how the
//! message is rendered. A `UsageError` picks up an [`ErrorContext`] snapshot
//! the first time it crosses a [`Context`](crate::Context) boundary, so it can
//! still print the usage banner after the Context chain has been torn down.

use std::io::{self, Write};

use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

/// Snapshot of the Context an error was raised in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub command_path: String,
    pub usage: String,
    pub help_option: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageErrorKind {
    Usage,
    NoSuchOption {
        option: String,
        possibilities: Vec<String>,
    },
    AmbiguousOption {
        option: String,
        possibilities: Vec<String>,
    },
    BadOptionUsage {
        option: String,
    },
    BadArgumentUsage,
    BadParameter {
        param_hint: Option<String>,
    },
    MissingParameter {
        param_hint: Option<String>,
        param_type: String,
    },
}

/// A malformed invocation. Displays as its [`format_message`](Self::format_message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.format_message())]
pub struct UsageError {
    kind: UsageErrorKind,
    message: String,
    ctx: Option<ErrorContext>,
}

impl UsageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(UsageErrorKind::Usage, message)
    }

    fn with_kind(kind: UsageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            ctx: None,
        }
    }

    pub fn no_such_option(option: impl Into<String>, possibilities: Vec<String>) -> Self {
        let option = option.into();
        let message = format!("no such option: {option}");
        Self::with_kind(
            UsageErrorKind::NoSuchOption {
                option,
                possibilities,
            },
            message,
        )
    }

    pub fn ambiguous_option(option: impl Into<String>, mut possibilities: Vec<String>) -> Self {
        let option = option.into();
        possibilities.sort();
        let message = format!("ambiguous option: {option}");
        Self::with_kind(
            UsageErrorKind::AmbiguousOption {
                option,
                possibilities,
            },
            message,
        )
    }

    pub fn bad_option_usage(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(
            UsageErrorKind::BadOptionUsage {
                option: option.into(),
            },
            message,
        )
    }

    pub fn bad_argument_usage(message: impl Into<String>) -> Self {
        Self::with_kind(UsageErrorKind::BadArgumentUsage, message)
    }

    /// A value failed coercion or validation. The parameter hint is filled in
    /// later by the resolution pipeline when it is not known here.
    pub fn bad_parameter(message: impl Into<String>) -> Self {
        Self::with_kind(UsageErrorKind::BadParameter { param_hint: None }, message)
    }

    pub fn missing_parameter(param_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(
            UsageErrorKind::MissingParameter {
                param_hint: None,
                param_type: param_type.into(),
            },
            message,
        )
    }

    pub fn kind(&self) -> &UsageErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        self.ctx.as_ref()
    }

    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Attach a Context snapshot unless one is already set.
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        if self.ctx.is_none() {
            self.ctx = Some(ctx);
        }
        self
    }

    /// Attach a parameter hint to parameter errors that lack one.
    pub fn with_param_hint(mut self, hint: impl Into<String>) -> Self {
        match &mut self.kind {
            UsageErrorKind::BadParameter { param_hint }
            | UsageErrorKind::MissingParameter { param_hint, .. }
                if param_hint.is_none() =>
            {
                *param_hint = Some(hint.into());
            }
            _ => {}
        }
        self
    }

    pub fn format_message(&self) -> String {
        match &self.kind {
            UsageErrorKind::Usage
            | UsageErrorKind::BadOptionUsage { .. }
            | UsageErrorKind::BadArgumentUsage => self.message.clone(),
            UsageErrorKind::NoSuchOption { possibilities, .. } => match possibilities.as_slice() {
                [] => self.message.clone(),
                [only] => format!("{}  Did you mean {only}?", self.message),
                many => format!("{}  (Possible options: {})", self.message, many.join(", ")),
            },
            UsageErrorKind::AmbiguousOption { possibilities, .. } => {
                format!("{} (Possible options: {})", self.message, possibilities.join(", "))
            }
            UsageErrorKind::BadParameter { param_hint } => match param_hint {
                Some(hint) => format!("Invalid value for {hint}: {}", self.message),
                None => format!("Invalid value: {}", self.message),
            },
            UsageErrorKind::MissingParameter {
                param_hint,
                param_type,
            } => {
                let mut out = format!("Missing {param_type}");
                if let Some(hint) = param_hint {
                    out.push(' ');
                    out.push_str(hint);
                }
                out.push('.');
                if !self.message.is_empty() {
                    out.push_str("  ");
                    out.push_str(&self.message);
                }
                out
            }
        }
    }

    pub fn show(&self, out: &mut dyn Write) -> io::Result<()> {
        if let Some(ctx) = &self.ctx {
            writeln!(out, "{}", ctx.usage)?;
            if let Some(help) = &ctx.help_option {
                writeln!(out, "Try \"{} {help}\" for help.", ctx.command_path)?;
            }
            writeln!(out)?;
        }
        writeln!(out, "Error: {}", self.format_message())
    }
}

/// Invalid parameter or parser declarations. These are programmer errors
/// raised while building definitions, never shown as usage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("name defined twice: {0}")]
    NameDefinedTwice(String),
    #[error("could not determine name for {0}")]
    NoName(&'static str),
    #[error("no options defined but a name was passed ({0})")]
    NoOptions(String),
    #[error("invalid start character for option ({0})")]
    InvalidOption(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("{message}")]
    Generic { message: String, exit_code: i32 },

    #[error("Could not open file {filename}: {hint}")]
    File { filename: String, hint: String },

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error("Aborted!")]
    Abort,

    /// Early, successful or explicit exit (e.g. after `--help`).
    #[error("exit with status {0}")]
    Exit(i32),
}

impl CliError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
            exit_code: 1,
        }
    }

    pub fn generic_with_code(message: impl Into<String>, exit_code: i32) -> Self {
        Self::Generic {
            message: message.into(),
            exit_code,
        }
    }

    pub fn file(filename: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::File {
            filename: filename.into(),
            hint: hint.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(UsageError::new(message))
    }

    pub fn bad_parameter(message: impl Into<String>) -> Self {
        Self::Usage(UsageError::bad_parameter(message))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(e) => e.exit_code(),
            Self::Generic { exit_code, .. } => *exit_code,
            Self::File { .. } | Self::Declaration(_) | Self::Abort => 1,
            Self::Exit(code) => *code,
        }
    }

    pub fn as_usage(&self) -> Option<&UsageError> {
        match self {
            Self::Usage(e) => Some(e),
            _ => None,
        }
    }

    pub fn with_context(self, ctx: ErrorContext) -> Self {
        match self {
            Self::Usage(e) => Self::Usage(e.with_context(ctx)),
            other => other,
        }
    }

    pub fn with_param_hint(self, hint: impl Into<String>) -> Self {
        match self {
            Self::Usage(e) => Self::Usage(e.with_param_hint(hint)),
            other => other,
        }
    }

    /// Render the error the way the standalone entry point prints it.
    pub fn show(&self, out: &mut dyn Write) -> io::Result<()> {
        match self {
            Self::Usage(e) => e.show(out),
            Self::Abort => writeln!(out, "Aborted!"),
            Self::Exit(_) => Ok(()),
            other => writeln!(out, "Error: {other}"),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CliError>() {
            Ok(cli) => cli,
            Err(err) => Self::generic(format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(err: &CliError) -> String {
        let mut buf = Vec::new();
        err.show(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn exit_codes_follow_taxonomy() {
        assert_eq!(CliError::usage("bad").exit_code(), 2);
        assert_eq!(CliError::bad_parameter("bad").exit_code(), 2);
        assert_eq!(CliError::generic("boom").exit_code(), 1);
        assert_eq!(CliError::generic_with_code("boom", 7).exit_code(), 7);
        assert_eq!(CliError::Abort.exit_code(), 1);
    }

    #[test]
    fn abort_prints_fixed_notice() {
        assert_eq!(rendered(&CliError::Abort), "Aborted!\n");
    }

    #[test]
    fn usage_error_prints_banner_before_message() {
        let err = CliError::usage("Missing command.").with_context(ErrorContext {
            command_path: "cli".to_string(),
            usage: "Usage: cli [OPTIONS] COMMAND [ARGS]...".to_string(),
            help_option: Some("--help".to_string()),
        });
        assert_eq!(
            rendered(&err),
            "Usage: cli [OPTIONS] COMMAND [ARGS]...\nTry \"cli --help\" for help.\n\nError: Missing command.\n"
        );
    }

    #[test]
    fn context_is_attached_only_once() {
        let inner = ErrorContext {
            command_path: "cli sub".to_string(),
            ..Default::default()
        };
        let outer = ErrorContext {
            command_path: "cli".to_string(),
            ..Default::default()
        };
        let err = UsageError::new("x").with_context(inner).with_context(outer);
        assert_eq!(err.context().unwrap().command_path, "cli sub");
    }

    #[test]
    fn parameter_messages() {
        let bad = UsageError::bad_parameter("abc is not a valid integer")
            .with_param_hint("\"--count\" / \"-c\"");
        assert_eq!(
            bad.format_message(),
            "Invalid value for \"--count\" / \"-c\": abc is not a valid integer"
        );
        assert_eq!(
            UsageError::bad_parameter("nope").format_message(),
            "Invalid value: nope"
        );

        let missing = UsageError::missing_parameter("argument", "").with_param_hint("\"arg\"");
        assert_eq!(missing.format_message(), "Missing argument \"arg\".");

        let choice = UsageError::missing_parameter("option", "Choose from a, b.")
            .with_param_hint("\"--mode\"");
        assert_eq!(
            choice.format_message(),
            "Missing option \"--mode\".  Choose from a, b."
        );
    }

    #[test]
    fn option_messages() {
        let one = UsageError::no_such_option("--verbsoe", vec!["--verbose".to_string()]);
        assert_eq!(
            one.format_message(),
            "no such option: --verbsoe  Did you mean --verbose?"
        );

        let ambiguous = UsageError::ambiguous_option(
            "--ver",
            vec!["--version".to_string(), "--verbose".to_string()],
        );
        assert_eq!(
            ambiguous.format_message(),
            "ambiguous option: --ver (Possible options: --verbose, --version)"
        );
    }

    #[test]
    fn anyhow_errors_become_generic() {
        let err: CliError = anyhow::anyhow!("disk full").context("writing output").into();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(rendered(&err), "Error: writing output: disk full\n");
    }

    #[test]
    fn display_uses_formatted_message() {
        let err = UsageError::bad_parameter("x is not a valid integer").with_param_hint("\"--n\"");
        assert_eq!(err.to_string(), "Invalid value for \"--n\": x is not a valid integer");
        let err = CliError::from(UsageError::no_such_option("--verb", vec!["--verbose".to_string()]));
        assert_eq!(err.to_string(), "no such option: --verb  Did you mean --verbose?");
    }
}
