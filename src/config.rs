//! `.mlrrc` defaults, applied before the command line.

use crate::cli::{CliError, MainFlags};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const DISABLE: &str = "__none__";

/// Files to read, in order. `MLRRC` names a single file, or disables
/// loading with `__none__`.
pub fn rc_paths(mlrrc: Option<String>, home: Option<PathBuf>) -> Vec<PathBuf> {
    match mlrrc {
        Some(value) if value == DISABLE => Vec::new(),
        Some(value) => vec![PathBuf::from(value)],
        None => home
            .map(|home| home.join(".mlrrc"))
            .into_iter()
            .chain([PathBuf::from(".mlrrc")])
            .collect(),
    }
}

/// Loads every applicable `.mlrrc` unless `--norc` comes first.
pub fn load(args: &[String]) -> Result<MainFlags, CliError> {
    let mut flags = MainFlags::default();
    if args.first().map(String::as_str) == Some("--norc") {
        return Ok(flags);
    }
    let paths = rc_paths(env::var("MLRRC").ok(), env::var_os("HOME").map(PathBuf::from));
    for path in paths {
        load_file(&path, &mut flags)?;
    }
    Ok(flags)
}

/// A missing file is skipped silently and an unreadable one with a warning.
pub fn load_file(path: &Path, flags: &mut MainFlags) -> Result<(), CliError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable .mlrrc");
            return Ok(());
        }
    };
    debug!(path = %path.display(), "loading .mlrrc");
    apply_text(&text, &path.display().to_string(), flags)
}

pub fn apply_text(text: &str, path: &str, flags: &mut MainFlags) -> Result<(), CliError> {
    for (index, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let line = if line.starts_with('-') {
            line.to_string()
        } else {
            format!("--{line}")
        };
        let (flag, value) = match line.split_once(char::is_whitespace) {
            Some((flag, value)) => (flag, Some(value.trim())),
            None => (line.as_str(), None),
        };
        let config_error = |message: String| CliError::Config {
            path: path.to_string(),
            line: index + 1,
            message,
        };
        match (MainFlags::arity(flag), value) {
            (None, _) => return Err(config_error(format!("mlr: option \"{flag}\" not recognized in .mlrrc."))),
            (Some(0), Some(_)) => {
                return Err(config_error(format!("mlr: option \"{flag}\" takes no argument.")))
            }
            _ => flags
                .apply(flag, value)
                .map_err(|err| config_error(err.to_string()))?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::RecordFormat;
    use crate::runtime::infer::Number;
    use std::io::Write;

    #[test]
    fn paths_follow_the_environment() {
        assert!(rc_paths(Some("__none__".into()), Some("/home/u".into())).is_empty());
        assert_eq!(rc_paths(Some("/etc/rc".into()), None), [PathBuf::from("/etc/rc")]);
        assert_eq!(
            rc_paths(None, Some("/home/u".into())),
            [PathBuf::from("/home/u/.mlrrc"), PathBuf::from(".mlrrc")]
        );
    }

    #[test]
    fn lines_accept_comments_and_bare_flags() {
        let mut flags = MainFlags::default();
        apply_text("# defaults\nojson\n--ofs semicolon  # trailing\n\nofmt %.3f\n", "rc", &mut flags)
            .expect("valid rc");
        assert_eq!(flags.io.output_format, RecordFormat::Json);
        assert_eq!(flags.io.ofs, ";");
        assert_eq!(flags.io.ofmt.format(Number::Float(0.5)), "0.500");
    }

    #[test]
    fn errors_carry_the_line_number() {
        let mut flags = MainFlags::default();
        let err = apply_text("ojson\nnosuch\n", "/tmp/rc", &mut flags).expect_err("unknown flag");
        match err {
            CliError::Config { path, line, .. } => {
                assert_eq!(path, "/tmp/rc");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn files_load_and_missing_ones_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "--ijson").expect("write");
        let mut flags = MainFlags::default();
        load_file(file.path(), &mut flags).expect("load");
        assert_eq!(flags.io.input_format, RecordFormat::Json);

        let dir = tempfile::tempdir().expect("temp dir");
        load_file(&dir.path().join("absent"), &mut flags).expect("missing is fine");
    }
}
