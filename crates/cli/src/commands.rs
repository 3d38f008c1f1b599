use std::fs;
use std::path::Path;

use anyhow::Context as _;
use cmdscope::{
    CliError, Command, DeclarationError, FileType, IntRange, Parameter, PathType, Value,
};

/// Verbosity chosen on the root command, visible to every subcommand.
#[derive(Debug, Default)]
struct Verbosity(i64);

pub fn build() -> Result<Command, DeclarationError> {
    Ok(Command::group("cmdscope")
        .help("Small demonstration tool for the cmdscope library.")
        .epilog("Options can also be set through CMDSCOPE_* environment variables.")
        .param(
            Parameter::option(["-v", "--verbose"])
                .count()
                .help("Increase verbosity.")
                .build()?,
        )
        .version_option(env!("CARGO_PKG_VERSION"))
        .callback(|ctx, values| {
            let verbose = values.get_int("verbose").unwrap_or(0);
            ctx.set_obj(Verbosity(verbose));
            tracing::debug!(verbose, subcommand = ?ctx.invoked_subcommand(), "root callback");
            Ok(())
        })
        .subcommand(greet()?)
        .subcommand(cat()?)
        .subcommand(copy()?)
        .subcommand(purge()?))
}

fn greet() -> Result<Command, DeclarationError> {
    Ok(Command::new("greet")
        .help("Greet NAME a number of times. The greeting can come from the environment.")
        .param(
            Parameter::option(["--count", "-c"])
                .param_type(IntRange::new(Some(1), None))
                .default(1)
                .show_default()
                .help("Number of greetings.")
                .build()?,
        )
        .param(
            Parameter::option(["--greeting"])
                .default("Hello")
                .show_default()
                .help("Word to greet with.")
                .build()?,
        )
        .param(
            Parameter::option(["--shout/--no-shout"])
                .help("Print in upper case.")
                .build()?,
        )
        .param(Parameter::argument("name").build()?)
        .callback(|ctx, values| {
            let name = values.get_str("name").unwrap_or_default();
            let greeting = values.get_str("greeting").unwrap_or("Hello");
            let mut line = format!("{greeting}, {name}!");
            if values.get_bool("shout") == Some(true) {
                line = line.to_uppercase();
            }
            let count = values.get_int("count").unwrap_or(1);
            if ctx.find_object::<Verbosity>().is_some_and(|v| v.0 > 0) {
                eprintln!("greeting {name} {count} time(s)");
            }
            for _ in 0..count {
                println!("{line}");
            }
            Ok(())
        }))
}

fn cat() -> Result<Command, DeclarationError> {
    Ok(Command::new("cat")
        .help("Print the contents of FILES. Use - for standard input.")
        .param(
            Parameter::argument("files")
                .nargs(-1)
                .required(true)
                .param_type(FileType::read())
                .build()?,
        )
        .callback(|_ctx, values| {
            for file in values.get_tuple("files").unwrap_or_default() {
                let Some(handle) = file.as_file() else {
                    continue;
                };
                let text = handle
                    .read_to_string()
                    .with_context(|| format!("failed to read {}", handle.name()))?;
                print!("{text}");
            }
            Ok(())
        }))
}

fn copy() -> Result<Command, DeclarationError> {
    Ok(Command::new("copy")
        .help("Copy SRC files to DST. DST must be a directory when several files are given.")
        .param(
            Parameter::argument("src")
                .nargs(-1)
                .required(true)
                .param_type(PathType::new().exists().file_only())
                .build()?,
        )
        .param(
            Parameter::argument("dst")
                .param_type(PathType::new())
                .build()?,
        )
        .callback(|ctx, values| {
            let Some(dst) = values.get_path("dst") else {
                return Err(ctx.fail("Missing destination."));
            };
            let sources: Vec<&Path> = values
                .get_tuple("src")
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_path)
                .collect();
            if sources.len() > 1 && !dst.is_dir() {
                return Err(ctx.fail(format!(
                    "Target \"{}\" must be a directory when copying several files.",
                    dst.display()
                )));
            }
            for src in sources {
                let target = match src.file_name() {
                    Some(file_name) if dst.is_dir() => dst.join(file_name),
                    _ => dst.to_path_buf(),
                };
                fs::copy(src, &target).with_context(|| {
                    format!("failed to copy {} to {}", src.display(), target.display())
                })?;
                tracing::debug!(src = %src.display(), dst = %target.display(), "copied");
            }
            Ok(())
        }))
}

fn purge() -> Result<Command, DeclarationError> {
    Ok(Command::new("purge")
        .help("Pretend to purge everything after confirmation.")
        .param(
            Parameter::option(["--yes"])
                .flag()
                .prompt("Do you really want to purge?")
                .help("Confirm without prompting.")
                .build()?,
        )
        .callback(|_ctx, values| {
            if values.get_bool("yes") != Some(true) {
                return Err(CliError::Abort);
            }
            println!("Purged.");
            Ok(())
        }))
}
