use crate::io::{writer::RecordWriter, Record};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use indexmap::IndexMap;
use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    process::{Child, ChildStdin, Command, Stdio},
};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RedirectMode {
    Write,
    Append,
    Pipe,
}

/// Where redirected output goes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    Stdout,
    Stderr,
    Redirect { mode: RedirectMode, name: String },
}

impl OutputTarget {
    fn describe(&self) -> String {
        match self {
            OutputTarget::Stdout => "(stdout)".to_string(),
            OutputTarget::Stderr => "(stderr)".to_string(),
            OutputTarget::Redirect { name, .. } => name.clone(),
        }
    }
}

enum Sink {
    File(BufWriter<File>),
    Pipe { child: Child, stdin: BufWriter<ChildStdin> },
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::File(file) => file as &mut dyn Write,
            Sink::Pipe { stdin, .. } => stdin as &mut dyn Write,
        }
    }
}

/// Keeps one handle per distinct file or command, opened on first use and
/// closed by [`OutputManager::close_all`]. A file opened for writing is
/// truncated once and then appended to for the rest of the run.
pub struct OutputManager {
    writer: RecordWriter,
    sinks: IndexMap<(RedirectMode, String), Sink>,
}

impl OutputManager {
    pub fn new(writer: RecordWriter) -> Self {
        Self {
            writer,
            sinks: IndexMap::new(),
        }
    }

    pub fn write_text(&mut self, target: &OutputTarget, text: &str) -> RuntimeResult<()> {
        let io_error = |source| RuntimeError::Io {
            action: "write to",
            target: target.describe(),
            source,
        };
        match target {
            OutputTarget::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush()).map_err(io_error)
            }
            OutputTarget::Stderr => io::stderr().write_all(text.as_bytes()).map_err(io_error),
            OutputTarget::Redirect { mode, name } => {
                let sink = self.sink(*mode, name)?;
                sink.writer().write_all(text.as_bytes()).map_err(io_error)
            }
        }
    }

    pub fn write_record(&mut self, target: &OutputTarget, record: &Record) -> RuntimeResult<()> {
        let text = self.writer.format(record);
        self.write_text(target, &text)
    }

    fn sink(&mut self, mode: RedirectMode, name: &str) -> RuntimeResult<&mut Sink> {
        let key = (mode, name.to_string());
        if !self.sinks.contains_key(&key) {
            let sink = open(mode, name)?;
            debug!(redirect = name, ?mode, "opened output redirect");
            self.sinks.insert(key.clone(), sink);
        }
        self.sinks
            .get_mut(&key)
            .ok_or_else(|| crate::internal_error!("redirect handle for \"{name}\" vanished"))
    }

    /// Flushes and closes every handle, waiting for piped commands to exit.
    pub fn close_all(&mut self) -> RuntimeResult<()> {
        for ((_, name), sink) in self.sinks.drain(..) {
            let io_error = |source| RuntimeError::Io {
                action: "close",
                target: name.clone(),
                source,
            };
            match sink {
                Sink::File(mut file) => file.flush().map_err(io_error)?,
                Sink::Pipe { mut child, mut stdin } => {
                    stdin.flush().map_err(io_error)?;
                    drop(stdin);
                    child.wait().map_err(io_error)?;
                }
            }
        }
        Ok(())
    }
}

fn open(mode: RedirectMode, name: &str) -> RuntimeResult<Sink> {
    let io_error = |source| RuntimeError::Io {
        action: "open",
        target: name.to_string(),
        source,
    };
    match mode {
        RedirectMode::Write | RedirectMode::Append => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(mode == RedirectMode::Append)
                .truncate(mode == RedirectMode::Write)
                .open(name)
                .map_err(io_error)?;
            Ok(Sink::File(BufWriter::new(file)))
        }
        RedirectMode::Pipe => {
            let mut child = Command::new("sh")
                .arg("-c")
                .arg(name)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(io_error)?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| crate::internal_error!("piped command \"{name}\" has no stdin"))?;
            Ok(Sink::Pipe {
                child,
                stdin: BufWriter::new(stdin),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{reader::parse_dkvp_line, IoOptions};
    use std::fs;

    fn manager() -> OutputManager {
        OutputManager::new(RecordWriter::new(&IoOptions::default()))
    }

    #[test]
    fn write_truncates_once_then_accumulates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.dkvp");
        fs::write(&path, "stale\n").expect("seed");
        let target = OutputTarget::Redirect {
            mode: RedirectMode::Write,
            name: path.display().to_string(),
        };
        let mut outputs = manager();
        outputs.write_record(&target, &parse_dkvp_line("a=1", ",", "=")).expect("write");
        outputs.write_record(&target, &parse_dkvp_line("a=2", ",", "=")).expect("write");
        outputs.close_all().expect("close");
        assert_eq!(fs::read_to_string(&path).expect("read"), "a=1\na=2\n");
    }

    #[test]
    fn append_keeps_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.txt");
        fs::write(&path, "first\n").expect("seed");
        let target = OutputTarget::Redirect {
            mode: RedirectMode::Append,
            name: path.display().to_string(),
        };
        let mut outputs = manager();
        outputs.write_text(&target, "second\n").expect("write");
        outputs.close_all().expect("close");
        assert_eq!(fs::read_to_string(&path).expect("read"), "first\nsecond\n");
    }

    #[test]
    fn pipes_feed_the_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("piped.txt");
        let target = OutputTarget::Redirect {
            mode: RedirectMode::Pipe,
            name: format!("cat > '{}'", path.display()),
        };
        let mut outputs = manager();
        outputs.write_text(&target, "through the pipe\n").expect("write");
        outputs.close_all().expect("close");
        assert_eq!(fs::read_to_string(&path).expect("read"), "through the pipe\n");
    }

    #[test]
    fn unopenable_files_are_io_errors() {
        let target = OutputTarget::Redirect {
            mode: RedirectMode::Write,
            name: "/nonexistent-dir/for/sure/out.txt".to_string(),
        };
        let err = manager().write_text(&target, "x").expect_err("no such dir");
        assert!(err.to_string().starts_with("mlr: open \"/nonexistent-dir"));
    }
}
