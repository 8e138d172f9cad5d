//! Command line: `mlr-dsl [main-flags] put|filter [verb-flags] 'expr' [files...]`.

use crate::io::{IoOptions, RecordFormat};
use crate::language::compiler::Verb;
use crate::runtime::format::{FormatError, NumberFormat};
use std::{fs, io};
use thiserror::Error;

pub const USAGE: &str = "\
Usage: mlr-dsl [main-flags] {put|filter} [verb-flags] {DSL expression} [files...]
       mlr-dsl help function {name}...
       mlr-dsl help list-functions

Main flags:
  --idkvp --ijson        input format (default DKVP)
  --odkvp --ojson        output format (default DKVP)
  --json                 JSON in and out
  --jvstack              multi-line JSON output
  --ifs --ips --ofs --ops {sep}
  --fs --ps {sep}        set input and output separators together
  --ofmt {format}        printf-style format for float output, e.g. %.4lf
  --oflatsep {sep}       separator for flattened map keys (default :)
  --from {file}          read this file; may be repeated
  -n                     read no input
  --norc                 skip .mlrrc (first argument only)
  -h, --help             show this message
  --version              show the version

Verb flags:
  -q                     don't pass the current record through
  -S                     keep field values as strings
  -x                     invert the filter condition
  -v                     print the parsed expression before running
  -f {file}              read the expression from a file
  -e {expr}              expression text; -f and -e may be repeated
  -s {name=value}        preset @name before the begin blocks
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("mlr: option \"{flag}\" missing argument(s).")]
    MissingValue { flag: String },
    #[error("mlr: option \"{flag}\" not recognized.\nPlease run \"mlr-dsl --help\" for usage information.")]
    UnknownFlag { flag: String },
    #[error("mlr: no verb supplied.\nPlease run \"mlr-dsl --help\" for usage information.")]
    MissingVerb,
    #[error("mlr: verb \"{verb}\" not found.")]
    UnknownVerb { verb: String },
    #[error("mlr help: topic \"{topic}\" not found.\nTry \"mlr-dsl help function {{name}}\" or \"mlr-dsl help list-functions\".")]
    UnknownHelpTopic { topic: String },
    #[error("mlr {verb}: needs an expression.")]
    MissingExpression { verb: &'static str },
    #[error("mlr {verb}: -s requires name=value; got \"{arg}\".")]
    Preset { verb: &'static str, arg: String },
    #[error("mlr: --ofmt: {0}")]
    Ofmt(#[from] FormatError),
    #[error("mlr: cannot read \"{path}\": {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{message}\n(from {path} line {line})")]
    Config {
        path: String,
        line: usize,
        message: String,
    },
}

/// Flags that may appear both in `.mlrrc` and before the verb.
#[derive(Clone, Debug, Default)]
pub struct MainFlags {
    pub io: IoOptions,
    pub from: Vec<String>,
    pub no_input: bool,
}

impl MainFlags {
    /// Number of values `flag` consumes, `None` when it is not a main flag.
    pub fn arity(flag: &str) -> Option<usize> {
        match flag {
            "--idkvp" | "--ijson" | "--odkvp" | "--ojson" | "--json" | "--jvstack" | "--no-jvstack" | "-n" => Some(0),
            "--ifs" | "--ips" | "--ofs" | "--ops" | "--fs" | "--ps" | "--ofmt" | "--oflatsep" | "--from" => Some(1),
            _ => None,
        }
    }

    pub fn apply(&mut self, flag: &str, value: Option<&str>) -> Result<(), CliError> {
        let io = &mut self.io;
        match (flag, value) {
            ("--idkvp", _) => io.input_format = RecordFormat::Dkvp,
            ("--ijson", _) => io.input_format = RecordFormat::Json,
            ("--odkvp", _) => io.output_format = RecordFormat::Dkvp,
            ("--ojson", _) => io.output_format = RecordFormat::Json,
            ("--json", _) => {
                io.input_format = RecordFormat::Json;
                io.output_format = RecordFormat::Json;
            }
            ("--jvstack", _) => io.jvstack = true,
            ("--no-jvstack", _) => io.jvstack = false,
            ("-n", _) => self.no_input = true,
            ("--ifs", Some(sep)) => io.ifs = separator(sep),
            ("--ips", Some(sep)) => io.ips = separator(sep),
            ("--ofs", Some(sep)) => io.ofs = separator(sep),
            ("--ops", Some(sep)) => io.ops = separator(sep),
            ("--fs", Some(sep)) => {
                io.ifs = separator(sep);
                io.ofs = separator(sep);
            }
            ("--ps", Some(sep)) => {
                io.ips = separator(sep);
                io.ops = separator(sep);
            }
            ("--ofmt", Some(format)) => io.ofmt = NumberFormat::parse(format)?,
            ("--oflatsep", Some(sep)) => io.oflatsep = separator(sep),
            ("--from", Some(path)) => self.from.push(path.to_string()),
            (flag, None) if Self::arity(flag) == Some(1) => {
                return Err(CliError::MissingValue { flag: flag.to_string() })
            }
            (flag, _) => return Err(CliError::UnknownFlag { flag: flag.to_string() }),
        }
        Ok(())
    }
}

/// Named separators, so that shells and `.mlrrc` files need no quoting.
fn separator(name: &str) -> String {
    match name {
        "comma" => ",",
        "tab" => "\t",
        "space" => " ",
        "semicolon" => ";",
        "colon" => ":",
        "pipe" => "|",
        "equals" => "=",
        "newline" => "\n",
        other => other,
    }
    .to_string()
}

#[derive(Debug)]
pub struct Invocation {
    pub main: MainFlags,
    pub verb: Verb,
    pub expression: String,
    pub invert: bool,
    pub quiet: bool,
    pub infer_types: bool,
    pub print_ast: bool,
    pub presets: Vec<(String, String)>,
    pub files: Vec<String>,
}

#[derive(Debug)]
pub enum Command {
    Help,
    Version,
    FunctionHelp(Vec<String>),
    ListFunctions,
    Run(Box<Invocation>),
}

/// Parses everything after the program name. `main` carries whatever
/// `.mlrrc` already set.
pub fn parse_args(args: &[String], mut main: MainFlags) -> Result<Command, CliError> {
    let mut rest = args;
    if rest.first().map(String::as_str) == Some("--norc") {
        rest = &rest[1..];
    }

    loop {
        let Some((flag, after)) = rest.split_first() else {
            return Err(CliError::MissingVerb);
        };
        match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--version" => return Ok(Command::Version),
            flag if flag.starts_with('-') => {
                let arity = MainFlags::arity(flag).ok_or_else(|| CliError::UnknownFlag { flag: flag.to_string() })?;
                let value = match arity {
                    0 => None,
                    _ => Some(after.first().ok_or_else(|| CliError::MissingValue { flag: flag.to_string() })?),
                };
                main.apply(flag, value.map(String::as_str))?;
                rest = &after[arity..];
            }
            _ => break,
        }
    }

    let (verb_name, mut rest) = match rest.split_first() {
        Some((verb, rest)) => (verb.as_str(), rest),
        None => return Err(CliError::MissingVerb),
    };
    if verb_name == "help" {
        return help_topic(rest);
    }
    let (verb, verb_name) = match verb_name {
        "put" => (Verb::Put, "put"),
        "filter" => (Verb::Filter, "filter"),
        other => return Err(CliError::UnknownVerb { verb: other.to_string() }),
    };

    let mut invocation = Invocation {
        main,
        verb,
        expression: String::new(),
        invert: false,
        quiet: false,
        infer_types: true,
        print_ast: false,
        presets: Vec::new(),
        files: Vec::new(),
    };
    let mut pieces: Vec<String> = Vec::new();

    while let Some((flag, after)) = rest.split_first() {
        let take_value = || {
            after
                .first()
                .cloned()
                .ok_or_else(|| CliError::MissingValue { flag: flag.clone() })
        };
        match flag.as_str() {
            "-q" => invocation.quiet = true,
            "-S" => invocation.infer_types = false,
            "-x" => invocation.invert = true,
            "-v" => invocation.print_ast = true,
            "-f" => {
                let path = take_value()?;
                let text = fs::read_to_string(&path).map_err(|source| CliError::Read { path, source })?;
                pieces.push(text);
                rest = &after[1..];
                continue;
            }
            "-e" => {
                pieces.push(take_value()?);
                rest = &after[1..];
                continue;
            }
            "-s" => {
                let arg = take_value()?;
                let (name, value) = arg.split_once('=').ok_or_else(|| CliError::Preset {
                    verb: verb_name,
                    arg: arg.clone(),
                })?;
                invocation.presets.push((name.to_string(), value.to_string()));
                rest = &after[1..];
                continue;
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(CliError::UnknownFlag { flag: flag.to_string() })
            }
            _ => break,
        }
        rest = after;
    }

    if pieces.is_empty() {
        let (expression, after) = rest
            .split_first()
            .ok_or(CliError::MissingExpression { verb: verb_name })?;
        pieces.push(expression.clone());
        rest = after;
    }
    invocation.expression = pieces.join("\n");
    invocation.files = invocation.main.from.iter().cloned().chain(rest.iter().cloned()).collect();
    Ok(Command::Run(Box::new(invocation)))
}

fn help_topic(rest: &[String]) -> Result<Command, CliError> {
    match rest.split_first() {
        None => Ok(Command::Help),
        Some((topic, names)) if topic == "function" && !names.is_empty() => Ok(Command::FunctionHelp(names.to_vec())),
        Some((topic, [])) if topic == "list-functions" => Ok(Command::ListFunctions),
        Some((topic, _)) => Err(CliError::UnknownHelpTopic { topic: topic.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn invocation(line: &str) -> Invocation {
        match parse_args(&args(line), MainFlags::default()).expect("parse") {
            Command::Run(invocation) => *invocation,
            other => panic!("expected a run, got {other:?}"),
        }
    }

    #[test]
    fn help_topics() {
        let parse = |line: &str| parse_args(&args(line), MainFlags::default());
        assert!(matches!(parse("help"), Ok(Command::Help)));
        assert!(matches!(parse("help list-functions"), Ok(Command::ListFunctions)));
        match parse("help function strlen sec2gmt") {
            Ok(Command::FunctionHelp(names)) => assert_eq!(names, ["strlen", "sec2gmt"]),
            other => panic!("expected function help, got {other:?}"),
        }
        assert!(matches!(parse("help function"), Err(CliError::UnknownHelpTopic { .. })));
        assert!(matches!(parse("help verbs"), Err(CliError::UnknownHelpTopic { .. })));
    }

    #[test]
    fn verb_expression_and_files() {
        let run = invocation("--ojson put -q $y=1 a.dkvp b.dkvp");
        assert_eq!(run.verb, Verb::Put);
        assert!(run.quiet);
        assert_eq!(run.expression, "$y=1");
        assert_eq!(run.files, ["a.dkvp", "b.dkvp"]);
        assert_eq!(run.main.io.output_format, RecordFormat::Json);
    }

    #[test]
    fn separators_accept_names() {
        let run = invocation("--ifs semicolon --ps colon filter -x true");
        assert_eq!(run.main.io.ifs, ";");
        assert_eq!(run.main.io.ips, ":");
        assert_eq!(run.main.io.ops, ":");
        assert!(run.invert);
    }

    #[test]
    fn expressions_from_e_flags_join_with_newlines() {
        let run = invocation("put -e $a=1 -e $b=2 -s limit=3 in.dkvp");
        assert_eq!(run.expression, "$a=1\n$b=2");
        assert_eq!(run.presets, [("limit".to_string(), "3".to_string())]);
        assert_eq!(run.files, ["in.dkvp"]);
    }

    #[test]
    fn from_files_come_first() {
        let run = invocation("--from x.dkvp -n put -S $z=1 y.dkvp");
        assert_eq!(run.files, ["x.dkvp", "y.dkvp"]);
        assert!(run.main.no_input);
        assert!(!run.infer_types);
    }

    #[test]
    fn errors_name_the_problem() {
        let err = parse_args(&args("--ifs"), MainFlags::default()).expect_err("missing value");
        assert_eq!(err.to_string(), "mlr: option \"--ifs\" missing argument(s).");
        let err = parse_args(&args("sort -f a"), MainFlags::default()).expect_err("unknown verb");
        assert_eq!(err.to_string(), "mlr: verb \"sort\" not found.");
        let err = parse_args(&args("put -q"), MainFlags::default()).expect_err("no expression");
        assert_eq!(err.to_string(), "mlr put: needs an expression.");
        assert!(matches!(
            parse_args(&args("--ofmt %z put 1"), MainFlags::default()),
            Err(CliError::Ofmt(_))
        ));
    }

    #[test]
    fn help_and_version() {
        assert!(matches!(parse_args(&args("--help"), MainFlags::default()), Ok(Command::Help)));
        assert!(matches!(parse_args(&args("--norc --version"), MainFlags::default()), Ok(Command::Version)));
    }
}
