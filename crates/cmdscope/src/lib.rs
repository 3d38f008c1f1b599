//! Declarative command-line construction.
//!
//! Commands are built once from [`Parameter`]s and callbacks, then run
//! against an argument vector. Each level of a nested invocation gets its own
//! [`Context`], linked to its parent, through which settings, default maps,
//! user objects and cleanup callbacks flow.
//!
//! ```no_run
//! use cmdscope::{Command, Parameter};
//!
//! let cli = Command::new("hello")
//!     .param(Parameter::option(["--count"]).default(1).build().unwrap())
//!     .param(Parameter::argument("name").build().unwrap())
//!     .callback(|_ctx, values| {
//!         for _ in 0..values.get_int("count").unwrap_or(1) {
//!             println!("Hello {}!", values.get_str("name").unwrap_or_default());
//!         }
//!         Ok(())
//!     });
//! cli.main(Default::default());
//! ```

pub mod command;
pub mod context;
pub mod default_map;
pub mod error;
pub mod formatting;
pub mod params;
pub mod parser;
pub mod prompt;
pub mod types;
pub mod value;

pub use command::{Command, CommandCallback, CommandKind};
pub use context::{Context, ContextSettings, Invokable, ValueSource};
pub use default_map::{DefaultMap, DefaultMapError};
pub use error::{CliError, CliResult, DeclarationError, ErrorContext, UsageError, UsageErrorKind};
pub use formatting::HelpFormatter;
pub use params::{ParamCallback, Parameter, ParameterKind};
pub use prompt::{Prompter, ScriptedPrompter, TerminalPrompter};
pub use types::{
    BoolType, Choice, FileType, FloatRange, FloatType, FuncType, IntRange, IntType, ParamType,
    PathType, StringType, TupleType, TypeRef, UuidType,
};
pub use value::{FileHandle, FileMode, ParamValues, Value};
