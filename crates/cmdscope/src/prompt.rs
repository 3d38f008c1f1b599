//! Interactive prompting.
//!
//! The resolution pipeline only talks to a [`Prompter`]; the terminal is one
//! implementation and a scripted answer queue is another.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, Once, PoisonError};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use crate::error::{CliError, CliResult};
use crate::value::Value;

pub trait Prompter: Send + Sync {
    /// Show `prompt` and read one line without its line terminator.
    /// `Ok(None)` means end of input; an [`io::ErrorKind::Interrupted`] error
    /// means the user interrupted the prompt.
    fn read_line(&self, prompt: &str, hide_input: bool) -> io::Result<Option<String>>;

    fn report_error(&self, message: &str);
}

static INTERRUPT_HANDLER: Once = Once::new();
static PROMPTING: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Route Ctrl-C to the active prompt. Outside a prompt the process exits
/// with the conventional status.
fn install_interrupt_handler() {
    INTERRUPT_HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            if PROMPTING.load(Ordering::SeqCst) {
                INTERRUPTED.store(true, Ordering::SeqCst);
            } else {
                std::process::exit(130);
            }
        });
        if let Err(err) = installed {
            tracing::warn!(%err, "could not install interrupt handler");
        }
    });
}

struct PromptingGuard;

impl PromptingGuard {
    fn enter() -> Self {
        INTERRUPTED.store(false, Ordering::SeqCst);
        PROMPTING.store(true, Ordering::SeqCst);
        Self
    }
}

impl Drop for PromptingGuard {
    fn drop(&mut self) {
        PROMPTING.store(false, Ordering::SeqCst);
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            tracing::warn!(%err, "could not restore terminal mode");
        }
    }
}

fn interrupted() -> io::Error {
    io::Error::from(io::ErrorKind::Interrupted)
}

/// Blocking stdin reads are not woken by a signal, so the read runs on its
/// own thread while this one watches the interrupt flag.
fn read_visible_line() -> io::Result<Option<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map(|n| (n > 0).then_some(line));
        tx.send(read).ok();
    });
    loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            return Err(interrupted());
        }
        match rx.recv_timeout(INTERRUPT_POLL) {
            Ok(read) => return read,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        }
    }
}

/// Read keys with echo off. In raw mode Ctrl-C arrives as a key, not a signal.
fn read_hidden_line() -> io::Result<Option<String>> {
    let _raw = RawModeGuard::enable()?;
    let mut line = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => return Ok(Some(line)),
            KeyCode::Char('c') if ctrl => return Err(interrupted()),
            KeyCode::Char('d') if ctrl && line.is_empty() => return Ok(None),
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char(c) if !ctrl => line.push(c),
            _ => {}
        }
    }
}

/// Prompts on stdout and reads stdin.
///
/// Hidden input turns terminal echo off while reading. When stdin is not a
/// terminal there is no echo to suppress and lines are read as usual.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_line(&self, prompt: &str, hide_input: bool) -> io::Result<Option<String>> {
        install_interrupt_handler();
        let _prompting = PromptingGuard::enter();
        let mut stdout = io::stdout();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let read = if hide_input && io::stdin().is_terminal() {
            read_hidden_line()
        } else {
            read_visible_line()
        };
        match read {
            Ok(Some(mut line)) => {
                if hide_input {
                    writeln!(stdout)?;
                }
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Ok(Some(line))
            }
            Ok(None) => {
                writeln!(stdout)?;
                Ok(None)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                eprintln!();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn report_error(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Answers prompts from a queue and records what was shown. Reports end of
/// input once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
    hidden: Mutex<Vec<bool>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
            hidden: Mutex::new(Vec::new()),
        }
    }

    /// Prompts and error reports, in the order they happened.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether each read asked for hidden input, one entry per prompt shown.
    pub fn hidden_reads(&self) -> Vec<bool> {
        self.hidden
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, line: &str) {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&self, prompt: &str, hide_input: bool) -> io::Result<Option<String>> {
        self.record(prompt);
        self.hidden
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hide_input);
        Ok(self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front())
    }

    fn report_error(&self, message: &str) {
        self.record(message);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptOptions {
    pub hide_input: bool,
    pub confirmation_prompt: bool,
    pub show_default: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            hide_input: false,
            confirmation_prompt: false,
            show_default: true,
        }
    }
}

fn read(prompter: &dyn Prompter, prompt: &str, hide_input: bool) -> CliResult<String> {
    match prompter.read_line(prompt, hide_input) {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(CliError::Abort),
        Err(err) if err.kind() == io::ErrorKind::Interrupted => Err(CliError::Abort),
        Err(err) => Err(CliError::generic(format!("failed to read input: {err}"))),
    }
}

/// Ask for a value until `convert` accepts it.
///
/// Empty input returns `default` untouched when there is one. Conversion
/// failures are reported and asked again; end of input aborts.
pub fn prompt(
    prompter: &dyn Prompter,
    text: &str,
    default: Option<Value>,
    options: PromptOptions,
    convert: impl Fn(&str) -> CliResult<Value>,
) -> CliResult<Value> {
    let label = match default.as_ref().filter(|_| options.show_default) {
        Some(default) => format!("{text} [{default}]: "),
        None => format!("{text}: "),
    };
    loop {
        let raw = loop {
            let line = read(prompter, &label, options.hide_input)?;
            if !line.is_empty() {
                break line;
            }
            if let Some(default) = &default {
                return Ok(default.clone());
            }
        };
        let result = match convert(&raw) {
            Ok(value) => value,
            Err(CliError::Usage(err)) => {
                prompter.report_error(&format!("Error: {}", err.message()));
                continue;
            }
            Err(err) => return Err(err),
        };
        if !options.confirmation_prompt {
            return Ok(result);
        }
        let repeated = loop {
            let line = read(prompter, "Repeat for confirmation: ", options.hide_input)?;
            if !line.is_empty() {
                break line;
            }
        };
        if raw == repeated {
            return Ok(result);
        }
        prompter.report_error("Error: the two entered values do not match");
    }
}

/// Yes/no question. With `abort`, a "no" answer is an [`CliError::Abort`].
pub fn confirm(prompter: &dyn Prompter, text: &str, default: bool, abort: bool) -> CliResult<bool> {
    let label = format!("{text} [{}]: ", if default { "Y/n" } else { "y/N" });
    loop {
        let answer = read(prompter, &label, false)?;
        let rv = match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            "" => default,
            _ => {
                prompter.report_error("Error: invalid input");
                continue;
            }
        };
        if abort && !rv {
            return Err(CliError::Abort);
        }
        return Ok(rv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntType, ParamType};

    fn to_int(raw: &str) -> CliResult<Value> {
        IntType.convert(Value::from(raw), None)
    }

    #[test]
    fn retries_invalid_input() {
        let prompter = ScriptedPrompter::new(["abc", "42"]);
        let value = prompt(&prompter, "Count", None, PromptOptions::default(), to_int).unwrap();
        assert_eq!(value, Value::Int(42));
        assert_eq!(
            prompter.transcript(),
            vec![
                "Count: ".to_string(),
                "Error: abc is not a valid integer".to_string(),
                "Count: ".to_string(),
            ]
        );
    }

    #[test]
    fn empty_input_takes_default() {
        let prompter = ScriptedPrompter::new([""]);
        let value = prompt(
            &prompter,
            "Count",
            Some(Value::Int(7)),
            PromptOptions::default(),
            to_int,
        )
        .unwrap();
        assert_eq!(value, Value::Int(7));
        assert_eq!(prompter.transcript(), vec!["Count [7]: ".to_string()]);
    }

    #[test]
    fn confirmation_must_match() {
        let prompter = ScriptedPrompter::new(["1", "2", "3", "3"]);
        let options = PromptOptions {
            confirmation_prompt: true,
            ..PromptOptions::default()
        };
        let value = prompt(&prompter, "Pin", None, options, to_int).unwrap();
        assert_eq!(value, Value::Int(3));
        assert!(
            prompter
                .transcript()
                .contains(&"Error: the two entered values do not match".to_string())
        );
    }

    #[test]
    fn end_of_input_aborts() {
        let prompter = ScriptedPrompter::new(Vec::<String>::new());
        let err = prompt(&prompter, "Name", None, PromptOptions::default(), |raw| {
            Ok(Value::from(raw))
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Abort));
    }

    #[test]
    fn confirm_answers() {
        let prompter = ScriptedPrompter::new(["maybe", "YES", ""]);
        assert!(confirm(&prompter, "Continue?", false, false).unwrap());
        assert!(!confirm(&prompter, "Continue?", false, false).unwrap());
        assert_eq!(prompter.transcript()[0], "Continue? [y/N]: ");
        assert_eq!(prompter.transcript()[1], "Error: invalid input");

        let prompter = ScriptedPrompter::new(["n"]);
        let err = confirm(&prompter, "Delete?", true, true).unwrap_err();
        assert!(matches!(err, CliError::Abort));
    }

    #[test]
    fn hidden_confirmation_reads_hidden_twice() {
        let prompter = ScriptedPrompter::new(["s3cret", "s3cret"]);
        let options = PromptOptions {
            hide_input: true,
            confirmation_prompt: true,
            ..PromptOptions::default()
        };
        let value = prompt(&prompter, "Password", None, options, |raw| Ok(Value::from(raw))).unwrap();
        assert_eq!(value, Value::from("s3cret"));
        assert_eq!(prompter.hidden_reads(), vec![true, true]);
        assert_eq!(
            prompter.transcript(),
            vec!["Password: ".to_string(), "Repeat for confirmation: ".to_string()]
        );
    }

    struct InterruptedPrompter;

    impl Prompter for InterruptedPrompter {
        fn read_line(&self, _prompt: &str, _hide_input: bool) -> io::Result<Option<String>> {
            Err(io::Error::from(io::ErrorKind::Interrupted))
        }

        fn report_error(&self, _message: &str) {}
    }

    #[test]
    fn interrupt_aborts() {
        let err = prompt(&InterruptedPrompter, "Name", None, PromptOptions::default(), |raw| {
            Ok(Value::from(raw))
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Abort));
        let err = confirm(&InterruptedPrompter, "Continue?", true, false).unwrap_err();
        assert!(matches!(err, CliError::Abort));
    }
}
