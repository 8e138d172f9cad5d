//! Drives a compiled program over the record stream: `begin` blocks, the
//! main block once per record, then `end` blocks.

use crate::io::{reader::read_records, writer::RecordWriter, IoOptions, Record};
use crate::language::compiler::{Program, Verb};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    state::{Context, State},
    value::Mlrval,
    xvalue::{MapKey, Xvalue},
};
use std::{
    io::{BufRead, Write},
    mem,
    rc::Rc,
};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug)]
pub struct RunSettings {
    pub verb: Verb,
    /// `-x`: keep the records the filter rejects.
    pub invert: bool,
    /// `-q`: never pass the current record through.
    pub quiet: bool,
    /// Cleared by `-S`.
    pub infer_types: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            verb: Verb::Put,
            invert: false,
            quiet: false,
            infer_types: true,
        }
    }
}

/// What one record produced, in output order.
#[derive(Debug, Default, PartialEq)]
pub struct RecordOutcome {
    pub emitted: Vec<Record>,
    pub record: Option<Record>,
}

impl RecordOutcome {
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        self.emitted.into_iter().chain(self.record)
    }
}

pub struct Input {
    pub filename: String,
    pub reader: Box<dyn BufRead>,
}

pub struct Interpreter {
    program: Program,
    state: State,
    settings: RunSettings,
}

impl Interpreter {
    pub fn new(program: Program, options: IoOptions, settings: RunSettings) -> Self {
        let state = State::new(Rc::clone(&program.functions), options, settings.infer_types);
        Self {
            program,
            state,
            settings,
        }
    }

    /// `-s name=value`: sets `@name` before any block runs.
    pub fn preset(&mut self, name: &str, value: &str) {
        let value = Mlrval::from_data(value, self.settings.infer_types);
        self.state.oosvars.put(&[MapKey::from(name)], Xvalue::Terminal(value));
    }

    pub fn oosvars(&self) -> &Xvalue {
        &self.state.oosvars
    }

    #[tracing::instrument(level = "debug", skip_all, fields(blocks = self.program.begin.len()))]
    pub fn begin(&mut self) -> RuntimeResult<Vec<Record>> {
        self.state.start_record(None, Context::default());
        for block in &self.program.begin {
            block.execute(&mut self.state)?;
        }
        Ok(mem::take(&mut self.state.emitted))
    }

    pub fn process_record(&mut self, record: Record, context: Context) -> RuntimeResult<RecordOutcome> {
        trace!(nr = context.nr, fields = record.len(), "processing record");
        self.state.start_record(Some(record), context);
        self.program.main.execute(&mut self.state)?;

        let keep = self.state.filter != self.settings.invert && !self.settings.quiet;
        let record = self.state.record.take().filter(|_| keep);
        Ok(RecordOutcome {
            emitted: mem::take(&mut self.state.emitted),
            record,
        })
    }

    /// Runs the `end` blocks with the last record's counters still visible,
    /// then closes every redirected output.
    #[tracing::instrument(level = "debug", skip_all, fields(blocks = self.program.end.len()))]
    pub fn end(&mut self) -> RuntimeResult<Vec<Record>> {
        let context = self.state.context.clone();
        self.state.start_record(None, context);
        for block in &self.program.end {
            block.execute(&mut self.state)?;
        }
        let emitted = mem::take(&mut self.state.emitted);
        self.state.outputs.close_all()?;
        Ok(emitted)
    }

    /// Streams every input through the program, writing to `out`.
    #[tracing::instrument(level = "debug", skip_all, fields(inputs = inputs.len(), verb = ?self.settings.verb))]
    pub fn run<W: Write>(&mut self, inputs: Vec<Input>, out: &mut W) -> RuntimeResult<()> {
        let writer = RecordWriter::new(&self.state.options);
        let write = |out: &mut W, record: &Record| {
            writer.write(out, record).map_err(|source| RuntimeError::Io {
                action: "write to",
                target: "(stdout)".to_string(),
                source,
            })
        };

        for record in self.begin()? {
            write(out, &record)?;
        }

        let options = Rc::clone(&self.state.options);
        let mut nr = 0;
        for (index, input) in inputs.into_iter().enumerate() {
            debug!(filename = %input.filename, "reading input");
            for (fnr, record) in read_records(input.reader, &input.filename, &options).enumerate() {
                nr += 1;
                let context = Context {
                    nr,
                    fnr: fnr as u64 + 1,
                    filename: input.filename.clone(),
                    filenum: index as u64 + 1,
                };
                for record in self.process_record(record?, context)?.into_records() {
                    write(out, &record)?;
                }
            }
        }

        for record in self.end()? {
            write(out, &record)?;
        }
        debug!(records = nr, "finished stream");
        out.flush().map_err(|source| RuntimeError::Io {
            action: "write to",
            target: "(stdout)".to_string(),
            source,
        })
    }
}
