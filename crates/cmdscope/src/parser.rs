//! Low-level tokenizer.
//!
//! [`OptionParser`] knows flag strings, prefixes and arities, nothing about
//! types or defaults. One call to [`OptionParser::parse_args`] scans the
//! argument vector into raw `dest -> value` assignments, leftover positional
//! tokens and the order in which parameters were matched.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{CliError, CliResult, DeclarationError, UsageError};
use crate::value::Value;

/// Rewrites the name part of flags and subcommand names before lookup.
pub type TokenNormalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Split an option string into its prefix and name: `--foo` gives
/// `("--", "foo")`, `-f` gives `("-", "f")`, `foo` gives `("", "foo")`.
pub fn split_opt(opt: &str) -> (&str, &str) {
    let mut chars = opt.chars();
    let Some(first) = chars.next() else {
        return ("", opt);
    };
    if first.is_alphanumeric() {
        return ("", opt);
    }
    let w = first.len_utf8();
    if chars.next() == Some(first) {
        (&opt[..2 * w], &opt[2 * w..])
    } else {
        (&opt[..w], &opt[w..])
    }
}

pub fn normalize_opt(opt: &str, normalize: Option<&TokenNormalizer>) -> String {
    match normalize {
        Some(f) => {
            let (prefix, name) = split_opt(opt);
            format!("{prefix}{}", f(name))
        }
        None => opt.to_string(),
    }
}

/// What a matched option does to its destination.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Store,
    StoreConst(Value),
    Append,
    AppendConst(Value),
    Count,
}

impl Action {
    pub fn takes_value(&self) -> bool {
        matches!(self, Self::Store | Self::Append)
    }
}

#[derive(Debug, Clone)]
struct ParserOption {
    dest: String,
    action: Action,
    nargs: usize,
    obj: usize,
}

#[derive(Debug, Clone)]
struct ParserArgument {
    dest: String,
    nargs: i32,
    obj: usize,
}

/// Per-call scan state. `order` holds the `obj` index of every match, once
/// per match.
#[derive(Debug, Default)]
pub struct ParsingState {
    opts: IndexMap<String, Value>,
    largs: Vec<String>,
    rargs: VecDeque<String>,
    order: Vec<usize>,
}

impl ParsingState {
    fn new(args: Vec<String>) -> Self {
        Self {
            rargs: args.into(),
            ..Self::default()
        }
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.opts
    }

    pub fn leftover(&self) -> &[String] {
        &self.largs
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn into_parts(self) -> (IndexMap<String, Value>, Vec<String>, Vec<usize>) {
        (self.opts, self.largs, self.order)
    }
}

pub struct OptionParser {
    options: Vec<ParserOption>,
    arguments: Vec<ParserArgument>,
    short_opt: IndexMap<String, usize>,
    long_opt: IndexMap<String, usize>,
    opt_prefixes: IndexSet<String>,
    normalize: Option<TokenNormalizer>,
    /// Collect positional tokens wherever they appear. When `false`, scanning
    /// stops at the first positional and the rest is returned verbatim.
    pub allow_interspersed_args: bool,
    pub ignore_unknown_options: bool,
    /// Usage errors end the scan early instead of failing it.
    pub resilient: bool,
}

impl Default for OptionParser {
    fn default() -> Self {
        Self::new(None)
    }
}

impl OptionParser {
    pub fn new(normalize: Option<TokenNormalizer>) -> Self {
        Self {
            options: Vec::new(),
            arguments: Vec::new(),
            short_opt: IndexMap::new(),
            long_opt: IndexMap::new(),
            opt_prefixes: ["-", "--"].into_iter().map(String::from).collect(),
            normalize,
            allow_interspersed_args: true,
            ignore_unknown_options: false,
            resilient: false,
        }
    }

    fn normalize(&self, opt: &str) -> String {
        normalize_opt(opt, self.normalize.as_ref())
    }

    /// Register an option under every one of `opts`. `obj` is echoed back in
    /// the touch order.
    pub fn add_option<S: AsRef<str>>(
        &mut self,
        opts: &[S],
        dest: &str,
        action: Action,
        nargs: usize,
        obj: usize,
    ) -> Result<(), DeclarationError> {
        let idx = self.options.len();
        for opt in opts {
            let opt = self.normalize(opt.as_ref());
            let (prefix, name) = split_opt(&opt);
            let Some(first) = prefix.chars().next() else {
                return Err(DeclarationError::InvalidOption(opt));
            };
            self.opt_prefixes.insert(first.to_string());
            if prefix.chars().count() == 1 && name.chars().count() == 1 {
                self.short_opt.insert(opt, idx);
            } else {
                self.opt_prefixes.insert(prefix.to_string());
                self.long_opt.insert(opt, idx);
            }
        }
        self.options.push(ParserOption {
            dest: dest.to_string(),
            action,
            nargs,
            obj,
        });
        Ok(())
    }

    /// Register a positional argument. At most one may collect (`nargs < 0`).
    pub fn add_argument(&mut self, dest: &str, nargs: i32, obj: usize) -> Result<(), DeclarationError> {
        if nargs < 0 && self.arguments.iter().any(|a| a.nargs < 0) {
            return Err(DeclarationError::Invalid(
                "cannot have two arguments with nargs < 0".to_string(),
            ));
        }
        self.arguments.push(ParserArgument {
            dest: dest.to_string(),
            nargs,
            obj,
        });
        Ok(())
    }

    pub fn parse_args(&self, args: Vec<String>) -> CliResult<ParsingState> {
        let mut state = ParsingState::new(args);
        let result = self
            .process_args_for_options(&mut state)
            .and_then(|()| self.process_args_for_args(&mut state));
        match result {
            Ok(()) => Ok(state),
            Err(err) if self.resilient && err.as_usage().is_some() => {
                tracing::trace!(error = %err, "ignoring parse error");
                Ok(state)
            }
            Err(err) => Err(err),
        }
    }

    fn is_prefix(&self, s: &str) -> bool {
        self.opt_prefixes.contains(s)
    }

    fn process_args_for_options(&self, state: &mut ParsingState) -> CliResult<()> {
        while let Some(arg) = state.rargs.pop_front() {
            if arg == "--" {
                return Ok(());
            }
            let first: String = arg.chars().take(1).collect();
            if arg.chars().count() > 1 && self.is_prefix(&first) {
                self.process_opts(arg, state)?;
            } else if self.allow_interspersed_args {
                state.largs.push(arg);
            } else {
                state.rargs.push_front(arg);
                return Ok(());
            }
        }
        Ok(())
    }

    fn process_args_for_args(&self, state: &mut ParsingState) -> CliResult<()> {
        let mut remaining = std::mem::take(&mut state.largs);
        remaining.extend(state.rargs.drain(..));
        let spec: Vec<i32> = self.arguments.iter().map(|a| a.nargs).collect();
        let (slots, rest) = unpack_args(remaining, &spec)?;

        for (argument, slot) in self.arguments.iter().zip(slots) {
            let value = match slot {
                Slot::One(value) => value.map(Value::Str),
                Slot::Fixed(items) => {
                    let holes = items.iter().filter(|item| item.is_none()).count();
                    if holes == items.len() {
                        None
                    } else if holes > 0 {
                        return Err(UsageError::bad_argument_usage(format!(
                            "argument {} takes {} values",
                            argument.dest, argument.nargs
                        ))
                        .into());
                    } else {
                        Some(Value::Tuple(items.into_iter().flatten().map(Value::Str).collect()))
                    }
                }
                Slot::Collect(items) if items.is_empty() => None,
                Slot::Collect(items) => Some(Value::Tuple(items.into_iter().map(Value::Str).collect())),
                Slot::Empty => None,
            };
            if let Some(value) = value {
                state.opts.insert(argument.dest.clone(), value);
            }
            state.order.push(argument.obj);
        }
        state.largs = rest;
        Ok(())
    }

    fn process_opts(&self, arg: String, state: &mut ParsingState) -> CliResult<()> {
        let (long_opt, explicit_value) = match arg.split_once('=') {
            Some((opt, value)) => (opt.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        let norm = self.normalize(&long_opt);
        let head: String = arg.chars().take(2).collect();
        let long_prefixed = self.is_prefix(&head);

        if let Some(idx) = self.lookup_long(&norm, long_prefixed)? {
            return self.match_long_opt(idx, &norm, explicit_value, state);
        }
        if !long_prefixed {
            return self.match_short_opt(&arg, state);
        }
        if self.ignore_unknown_options {
            state.largs.push(arg);
            return Ok(());
        }
        Err(UsageError::no_such_option(norm.clone(), self.suggest_long(&norm)).into())
    }

    /// Exact match first, then a unique prefix among long options.
    fn lookup_long(&self, opt: &str, allow_prefix: bool) -> CliResult<Option<usize>> {
        if let Some(&idx) = self.long_opt.get(opt) {
            return Ok(Some(idx));
        }
        if !allow_prefix {
            return Ok(None);
        }
        let candidates: Vec<(&String, usize)> = self
            .long_opt
            .iter()
            .filter(|(name, _)| name.starts_with(opt))
            .map(|(name, &idx)| (name, idx))
            .collect();
        match candidates.as_slice() {
            [] => Ok(None),
            [(_, idx)] => Ok(Some(*idx)),
            many => Err(UsageError::ambiguous_option(
                opt,
                many.iter().map(|(name, _)| (*name).clone()).collect(),
            )
            .into()),
        }
    }

    fn suggest_long(&self, opt: &str) -> Vec<String> {
        self.long_opt
            .keys()
            .filter(|name| strsim::levenshtein(name, opt) <= 2)
            .cloned()
            .collect()
    }

    fn match_long_opt(
        &self,
        idx: usize,
        opt: &str,
        explicit_value: Option<String>,
        state: &mut ParsingState,
    ) -> CliResult<()> {
        let option = &self.options[idx];
        let value = if option.action.takes_value() {
            if let Some(value) = explicit_value {
                state.rargs.push_front(value);
            }
            Some(take_values(opt, option.nargs, state)?)
        } else if explicit_value.is_some() {
            return Err(
                UsageError::bad_option_usage(opt, format!("{opt} option does not take a value")).into(),
            );
        } else {
            None
        };
        tracing::trace!(option = %opt, dest = %option.dest, "matched long option");
        self.process_option(idx, value, state);
        Ok(())
    }

    fn match_short_opt(&self, arg: &str, state: &mut ParsingState) -> CliResult<()> {
        let mut chars = arg.char_indices();
        let Some((_, prefix)) = chars.next() else {
            return Ok(());
        };
        let mut unknown = String::new();
        for (pos, ch) in chars {
            let opt = self.normalize(&format!("{prefix}{ch}"));
            let Some(&idx) = self.short_opt.get(&opt) else {
                if self.ignore_unknown_options {
                    unknown.push(ch);
                    continue;
                }
                return Err(UsageError::no_such_option(opt, Vec::new()).into());
            };
            let option = &self.options[idx];
            tracing::trace!(option = %opt, dest = %option.dest, "matched short option");
            if !option.action.takes_value() {
                self.process_option(idx, None, state);
                continue;
            }
            // the rest of the cluster is this option's value
            let rest = &arg[pos + ch.len_utf8()..];
            let stop = !rest.is_empty();
            if stop {
                state.rargs.push_front(rest.to_string());
            }
            let value = take_values(&opt, option.nargs, state)?;
            self.process_option(idx, Some(value), state);
            if stop {
                break;
            }
        }
        if self.ignore_unknown_options && !unknown.is_empty() {
            state.largs.push(format!("{prefix}{unknown}"));
        }
        Ok(())
    }

    fn process_option(&self, idx: usize, value: Option<Value>, state: &mut ParsingState) {
        let option = &self.options[idx];
        let dest = option.dest.clone();
        match &option.action {
            Action::Store => {
                if let Some(value) = value {
                    state.opts.insert(dest, value);
                }
            }
            Action::StoreConst(value) => {
                state.opts.insert(dest, value.clone());
            }
            Action::Append => {
                if let Some(value) = value {
                    append(&mut state.opts, dest, value);
                }
            }
            Action::AppendConst(value) => append(&mut state.opts, dest, value.clone()),
            Action::Count => {
                let seen = state.opts.get(&dest).and_then(Value::as_int).unwrap_or(0);
                state.opts.insert(dest, Value::Int(seen + 1));
            }
        }
        state.order.push(option.obj);
    }
}

fn append(opts: &mut IndexMap<String, Value>, dest: String, value: Value) {
    let entry = opts.entry(dest).or_insert_with(|| Value::Tuple(Vec::new()));
    match entry {
        Value::Tuple(items) => items.push(value),
        other => *other = Value::Tuple(vec![other.clone(), value]),
    }
}

fn take_values(opt: &str, nargs: usize, state: &mut ParsingState) -> CliResult<Value> {
    let missing = || -> CliError {
        let message = if nargs == 1 {
            format!("{opt} option requires an argument")
        } else {
            format!("{opt} option requires {nargs} arguments")
        };
        UsageError::bad_option_usage(opt, message).into()
    };
    if nargs == 1 {
        return state.rargs.pop_front().map(Value::Str).ok_or_else(missing);
    }
    if state.rargs.len() < nargs {
        return Err(missing());
    }
    Ok(Value::Tuple(state.rargs.drain(..nargs).map(Value::Str).collect()))
}

/// One positional argument's share of the leftover tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    One(Option<String>),
    /// Fixed arity above one. Missing tokens are holes.
    Fixed(Vec<Option<String>>),
    Collect(Vec<String>),
    Empty,
}

/// Distribute `args` over arguments with the given arities.
///
/// Arguments before a collector (`nargs < 0`) take from the front, the ones
/// after it from the back, and the collector absorbs the middle. Tokens left
/// over when there is no collector are returned as the second element.
pub fn unpack_args(args: Vec<String>, nargs_spec: &[i32]) -> Result<(Vec<Slot>, Vec<String>), DeclarationError> {
    fn fetch<T>(items: &mut VecDeque<T>, from_back: bool) -> Option<T> {
        if from_back {
            items.pop_back()
        } else {
            items.pop_front()
        }
    }

    let mut args: VecDeque<String> = args.into();
    let mut spec: VecDeque<i32> = nargs_spec.iter().copied().collect();
    let mut rv = Vec::with_capacity(spec.len());
    let mut spos: Option<usize> = None;

    while let Some(nargs) = fetch(&mut spec, spos.is_some()) {
        let from_back = spos.is_some();
        match nargs {
            0 => rv.push(Slot::Empty),
            1 => rv.push(Slot::One(fetch(&mut args, from_back))),
            n if n > 1 => {
                let mut items: Vec<Option<String>> = (0..n).map(|_| fetch(&mut args, from_back)).collect();
                if from_back {
                    items.reverse();
                }
                rv.push(Slot::Fixed(items));
            }
            _ => {
                if spos.is_some() {
                    return Err(DeclarationError::Invalid(
                        "cannot have two arguments with nargs < 0".to_string(),
                    ));
                }
                spos = Some(rv.len());
                rv.push(Slot::Collect(Vec::new()));
            }
        }
    }

    if let Some(pos) = spos {
        rv[pos] = Slot::Collect(args.drain(..).collect());
        rv[pos + 1..].reverse();
    }
    Ok((rv, args.into_iter().collect()))
}

/// Processing order for one command's parameters: eager ones first, then by
/// first appearance in `invocation_order`, untouched ones last. Declaration
/// order breaks ties.
pub fn processing_order(invocation_order: &[usize], eager: &[bool]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..eager.len()).collect();
    indices.sort_by_key(|&idx| {
        let touched = invocation_order
            .iter()
            .position(|&seen| seen == idx)
            .unwrap_or(usize::MAX);
        (!eager[idx], touched)
    });
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UsageErrorKind;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn flag(parser: &mut OptionParser, opts: &[&str], dest: &str, obj: usize) {
        parser
            .add_option(opts, dest, Action::StoreConst(Value::Bool(true)), 1, obj)
            .unwrap();
    }

    fn kind(err: CliError) -> UsageErrorKind {
        err.as_usage().expect("usage error").kind().clone()
    }

    #[test]
    fn split_opt_prefixes() {
        assert_eq!(split_opt("--foo"), ("--", "foo"));
        assert_eq!(split_opt("-f"), ("-", "f"));
        assert_eq!(split_opt("+w"), ("+", "w"));
        assert_eq!(split_opt("/debug"), ("/", "debug"));
        assert_eq!(split_opt("name"), ("", "name"));
    }

    #[test]
    fn long_prefix_resolves_or_is_ambiguous() {
        let mut parser = OptionParser::default();
        flag(&mut parser, &["--verbose"], "verbose", 0);
        flag(&mut parser, &["--version"], "version", 1);

        let state = parser.parse_args(argv(&["--verb"])).unwrap();
        assert_eq!(state.values().get("verbose"), Some(&Value::Bool(true)));

        let err = parser.parse_args(argv(&["--ver"])).unwrap_err();
        assert_eq!(
            kind(err),
            UsageErrorKind::AmbiguousOption {
                option: "--ver".to_string(),
                possibilities: vec!["--verbose".to_string(), "--version".to_string()],
            }
        );
    }

    #[test]
    fn short_cluster_with_trailing_value() {
        let mut parser = OptionParser::default();
        flag(&mut parser, &["-a"], "a", 0);
        flag(&mut parser, &["-b"], "b", 1);
        parser.add_option(&["-f"], "f", Action::Store, 1, 2).unwrap();

        let state = parser.parse_args(argv(&["-abf", "out.txt"])).unwrap();
        assert_eq!(state.values().get("a"), Some(&Value::Bool(true)));
        assert_eq!(state.values().get("b"), Some(&Value::Bool(true)));
        assert_eq!(state.values().get("f"), Some(&Value::from("out.txt")));
        assert_eq!(state.order(), &[0, 1, 2]);

        let state = parser.parse_args(argv(&["-afout.txt"])).unwrap();
        assert_eq!(state.values().get("f"), Some(&Value::from("out.txt")));
        assert!(state.values().get("b").is_none());
    }

    #[test]
    fn explicit_values_and_arity_errors() {
        let mut parser = OptionParser::default();
        parser.add_option(&["--name"], "name", Action::Store, 1, 0).unwrap();
        parser.add_option(&["--point"], "point", Action::Store, 2, 1).unwrap();
        flag(&mut parser, &["--quiet"], "quiet", 2);

        let state = parser.parse_args(argv(&["--name=ada", "--point", "1", "2"])).unwrap();
        assert_eq!(state.values().get("name"), Some(&Value::from("ada")));
        assert_eq!(state.values().get("point"), Some(&Value::from(vec!["1", "2"])));

        let err = parser.parse_args(argv(&["--quiet=yes"])).unwrap_err();
        assert_eq!(
            err.as_usage().unwrap().message(),
            "--quiet option does not take a value"
        );
        let err = parser.parse_args(argv(&["--name"])).unwrap_err();
        assert_eq!(err.as_usage().unwrap().message(), "--name option requires an argument");
        let err = parser.parse_args(argv(&["--point", "1"])).unwrap_err();
        assert_eq!(err.as_usage().unwrap().message(), "--point option requires 2 arguments");
    }

    #[test]
    fn unknown_long_option_suggests_close_match() {
        let mut parser = OptionParser::default();
        flag(&mut parser, &["--verbose"], "verbose", 0);
        let err = parser.parse_args(argv(&["--verbsoe"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no such option: --verbsoe  Did you mean --verbose?"
        );
        let err = parser.parse_args(argv(&["-x"])).unwrap_err();
        assert_eq!(err.to_string(), "no such option: -x");
    }

    #[test]
    fn append_and_count_accumulate() {
        let mut parser = OptionParser::default();
        parser.add_option(&["-i", "--include"], "include", Action::Append, 1, 0).unwrap();
        parser.add_option(&["-v"], "verbose", Action::Count, 1, 1).unwrap();

        let state = parser.parse_args(argv(&["-i", "a", "-vv", "--include", "b", "-v"])).unwrap();
        assert_eq!(state.values().get("include"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(state.values().get("verbose"), Some(&Value::Int(3)));
        assert_eq!(state.order(), &[0, 1, 1, 0, 1]);
    }

    #[test]
    fn double_dash_ends_option_scanning() {
        let mut parser = OptionParser::default();
        flag(&mut parser, &["-a"], "a", 0);
        let state = parser.parse_args(argv(&["x", "--", "-a"])).unwrap();
        assert!(state.values().is_empty());
        assert_eq!(state.leftover(), &["x".to_string(), "-a".to_string()]);
    }

    #[test]
    fn non_interspersed_stops_at_first_positional() {
        let mut parser = OptionParser::default();
        parser.allow_interspersed_args = false;
        flag(&mut parser, &["--verbose"], "verbose", 0);
        parser.add_option(&["-f"], "f", Action::Store, 1, 1).unwrap();

        let state = parser.parse_args(argv(&["--verbose", "sub", "-f", "x"])).unwrap();
        assert_eq!(state.values().get("verbose"), Some(&Value::Bool(true)));
        assert!(state.values().get("f").is_none());
        assert_eq!(state.leftover(), &argv(&["sub", "-f", "x"])[..]);
    }

    #[test]
    fn unknown_options_can_pass_through() {
        let mut parser = OptionParser::default();
        parser.ignore_unknown_options = true;
        flag(&mut parser, &["-a"], "a", 0);
        let state = parser.parse_args(argv(&["--nope=1", "-axy", "file"])).unwrap();
        assert_eq!(state.values().get("a"), Some(&Value::Bool(true)));
        assert_eq!(state.leftover(), &argv(&["--nope=1", "-xy", "file"])[..]);
    }

    #[test]
    fn custom_prefixes_and_normalization() {
        let lower: TokenNormalizer = Arc::new(|s: &str| s.to_lowercase());
        let mut parser = OptionParser::new(Some(lower));
        flag(&mut parser, &["+w"], "w", 0);
        parser.add_option(&["--Name"], "name", Action::Store, 1, 1).unwrap();
        let state = parser.parse_args(argv(&["+w", "--NAME", "x"])).unwrap();
        assert_eq!(state.values().get("w"), Some(&Value::Bool(true)));
        assert_eq!(state.values().get("name"), Some(&Value::from("x")));
        assert!(parser.add_option(&["name"], "bad", Action::Store, 1, 2).is_err());
    }

    #[test]
    fn resilient_parsing_keeps_partial_state() {
        let mut parser = OptionParser::default();
        parser.resilient = true;
        flag(&mut parser, &["-a"], "a", 0);
        let state = parser.parse_args(argv(&["-a", "--missing"])).unwrap();
        assert_eq!(state.values().get("a"), Some(&Value::Bool(true)));
    }

    #[test]
    fn wildcard_collector_takes_the_middle() {
        let (slots, rest) = unpack_args(argv(&["x.txt", "y.txt", "dir"]), &[-1, 1]).unwrap();
        assert_eq!(
            slots,
            vec![
                Slot::Collect(argv(&["x.txt", "y.txt"])),
                Slot::One(Some("dir".to_string())),
            ]
        );
        assert!(rest.is_empty());

        let (slots, _) = unpack_args(argv(&["dir"]), &[-1, 1]).unwrap();
        assert_eq!(slots, vec![Slot::Collect(Vec::new()), Slot::One(Some("dir".to_string()))]);

        let (slots, _) = unpack_args(argv(&["a", "b", "c", "d", "e"]), &[1, -1, 2]).unwrap();
        assert_eq!(
            slots,
            vec![
                Slot::One(Some("a".to_string())),
                Slot::Collect(argv(&["b", "c"])),
                Slot::Fixed(vec![Some("d".to_string()), Some("e".to_string())]),
            ]
        );
        assert!(unpack_args(Vec::new(), &[-1, -1]).is_err());
    }

    #[test]
    fn fixed_arity_excess_and_holes() {
        let (slots, rest) = unpack_args(argv(&["a", "b", "c"]), &[1]).unwrap();
        assert_eq!(slots, vec![Slot::One(Some("a".to_string()))]);
        assert_eq!(rest, argv(&["b", "c"]));

        let mut parser = OptionParser::default();
        parser.add_argument("point", 2, 0).unwrap();
        let err = parser.parse_args(argv(&["1"])).unwrap_err();
        assert_eq!(err.to_string(), "argument point takes 2 values");
        let state = parser.parse_args(Vec::new()).unwrap();
        assert!(state.values().get("point").is_none());
        assert_eq!(state.order(), &[0]);
        assert!(parser.add_argument("rest", -1, 1).is_ok());
        assert!(parser.add_argument("more", -1, 2).is_err());
    }

    #[test]
    fn eager_parameters_sort_first() {
        // declared: normal, eager, untouched normal
        let order = processing_order(&[0, 1], &[false, true, false]);
        assert_eq!(order, vec![1, 0, 2]);
        let order = processing_order(&[2, 0], &[false, false, false]);
        assert_eq!(order, vec![2, 0, 1]);
    }
}
