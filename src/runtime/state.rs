//! Mutable per-run state threaded through every compiled closure.

use crate::io::{
    reader::flatten_into,
    redirect::OutputManager,
    writer::RecordWriter,
    IoOptions, Record,
};
use crate::language::compiler::functions::FunctionTable;
use crate::runtime::{
    environment::Environment,
    value::Mlrval,
    xvalue::{BoxedXvalue, Level, MapKey, Xvalue},
};
use std::rc::Rc;

/// Position in the input stream, as seen by `NR`, `FNR`, `FILENAME` and
/// `FILENUM`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub nr: u64,
    pub fnr: u64,
    pub filename: String,
    pub filenum: u64,
}

pub struct State {
    /// `None` inside `begin` and `end` blocks.
    pub record: Option<Record>,
    /// Always a map; `@*`.
    pub oosvars: Xvalue,
    pub locals: Environment,
    /// Set by a successful `=~`; `None` until then.
    pub captures: Option<Vec<String>>,
    pub context: Context,
    pub options: Rc<IoOptions>,
    pub infer_types: bool,
    /// Output decision for the current record.
    pub filter: bool,
    /// Records emitted into the main stream, in order.
    pub emitted: Vec<Record>,
    pub outputs: OutputManager,
    pub functions: Rc<FunctionTable>,
}

impl State {
    pub fn new(functions: Rc<FunctionTable>, options: IoOptions, infer_types: bool) -> Self {
        let outputs = OutputManager::new(RecordWriter::new(&options));
        Self {
            record: None,
            oosvars: Xvalue::empty_map(),
            locals: Environment::new(),
            captures: None,
            context: Context::default(),
            options: Rc::new(options),
            infer_types,
            filter: true,
            emitted: Vec::new(),
            outputs,
            functions,
        }
    }

    /// Resets the per-record parts of the state.
    pub fn start_record(&mut self, record: Option<Record>, context: Context) {
        self.record = record;
        self.context = context;
        self.locals.reset();
        self.captures = None;
        self.filter = true;
    }

    pub fn field(&self, name: &str) -> Mlrval {
        self.record
            .as_ref()
            .and_then(|record| record.get(name))
            .map_or(Mlrval::Absent, |text| Mlrval::from_data(text, self.infer_types))
    }

    /// Writes a field. Absent is a no-op; maps flatten into `name:key` fields.
    pub fn set_field(&mut self, name: &str, value: &Xvalue) {
        let Some(record) = self.record.as_mut() else {
            return;
        };
        match value {
            Xvalue::Terminal(Mlrval::Absent) => {}
            Xvalue::Terminal(scalar) => {
                record.insert(name.to_string(), scalar.render(&self.options.ofmt));
            }
            Xvalue::Map(_) => {
                flatten_into(record, name, value, &self.options.oflatsep, &self.options.ofmt);
            }
        }
    }

    /// Name of the `n`-th field, 1-up.
    pub fn positional_name(&self, n: i64) -> Option<&str> {
        let index = usize::try_from(n).ok()?.checked_sub(1)?;
        let (name, _) = self.record.as_ref()?.get_index(index)?;
        Some(name)
    }

    /// Renames the `n`-th field in place, keeping its value. A field that
    /// already had the new name is dropped.
    pub fn rename_positional(&mut self, n: i64, new_name: &str) {
        let Some(index) = usize::try_from(n).ok().and_then(|n| n.checked_sub(1)) else {
            return;
        };
        let Some(record) = self.record.as_mut() else {
            return;
        };
        let Some((_, value)) = record.shift_remove_index(index) else {
            return;
        };
        let index = match record.get_index_of(new_name) {
            Some(existing) => {
                record.shift_remove_index(existing);
                if existing < index {
                    index - 1
                } else {
                    index
                }
            }
            None => index,
        };
        record.shift_insert(index, new_name.to_string(), value);
    }

    /// `$*` as a map of type-inferred values.
    pub fn record_as_map(&self) -> Option<Xvalue> {
        let record = self.record.as_ref()?;
        let level: Level = record
            .iter()
            .map(|(key, text)| {
                (
                    MapKey::String(key.clone()),
                    Xvalue::Terminal(Mlrval::from_data(text, self.infer_types)),
                )
            })
            .collect();
        Some(Xvalue::Map(level))
    }

    pub fn render(&self, value: &Mlrval) -> String {
        value.render(&self.options.ofmt)
    }
}

/// Result of a map-context evaluator: either a freshly built value or the
/// location of one in persistent storage. Callers evaluate every argument to
/// a handle before resolving any of them, so no alias outlives a mutation.
#[derive(Debug)]
pub enum XvalueHandle {
    Ephemeral(Xvalue),
    /// Path under `@*`; empty for `@*` itself.
    Oosvar(Vec<MapKey>),
    Local { name: Rc<str>, keys: Vec<MapKey> },
    Absent,
}

impl XvalueHandle {
    pub fn terminal(value: Mlrval) -> Self {
        if value.is_absent() {
            XvalueHandle::Absent
        } else {
            XvalueHandle::Ephemeral(Xvalue::Terminal(value))
        }
    }

    pub fn owned(value: Xvalue) -> Self {
        if value.is_absent() {
            XvalueHandle::Absent
        } else {
            XvalueHandle::Ephemeral(value)
        }
    }

    pub fn peek<'s>(&'s self, state: &'s State) -> Option<&'s Xvalue> {
        match self {
            XvalueHandle::Ephemeral(value) => Some(value),
            XvalueHandle::Oosvar(keys) => state.oosvars.lookup(keys),
            XvalueHandle::Local { name, keys } => state.locals.lookup(name, keys),
            XvalueHandle::Absent => None,
        }
    }

    pub fn resolve(self, state: &State) -> BoxedXvalue<'_> {
        match self {
            XvalueHandle::Ephemeral(value) => BoxedXvalue::Ephemeral(value),
            XvalueHandle::Oosvar(keys) => state
                .oosvars
                .lookup(&keys)
                .map_or_else(BoxedXvalue::absent, BoxedXvalue::Aliased),
            XvalueHandle::Local { name, keys } => state
                .locals
                .lookup(&name, &keys)
                .map_or_else(BoxedXvalue::absent, BoxedXvalue::Aliased),
            XvalueHandle::Absent => BoxedXvalue::absent(),
        }
    }

    pub fn into_owned(self, state: &State) -> Xvalue {
        self.resolve(state).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::parse_dkvp_line;
    use crate::language::types::DeclaredType;
    use crate::runtime::xvalue::tests::{int, key, map_of};

    fn state() -> State {
        State::new(Rc::new(FunctionTable::default()), IoOptions::default(), true)
    }

    #[test]
    fn field_reads_infer_unless_disabled() {
        let mut state = state();
        state.start_record(Some(parse_dkvp_line("x=3,y=abc", ",", "=")), Context::default());
        assert_eq!(state.field("x"), Mlrval::Int(3));
        assert_eq!(state.field("nosuch"), Mlrval::Absent);
        state.infer_types = false;
        assert_eq!(state.field("x"), Mlrval::String("3".into()));
    }

    #[test]
    fn map_field_writes_flatten() {
        let mut state = state();
        state.start_record(Some(parse_dkvp_line("a=1", ",", "=")), Context::default());
        state.set_field("m", &map_of(&[("x", int(1)), ("y", map_of(&[("z", int(2))]))]));
        state.set_field("gone", &Xvalue::Terminal(Mlrval::Absent));
        let record = state.record.as_ref().expect("record");
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "m:x", "m:y:z"]);
    }

    #[test]
    fn handles_resolve_against_storage() {
        let mut state = state();
        state.oosvars.put(&[key("sum"), key("pan")], int(5));
        state
            .locals
            .define("m", DeclaredType::Any, map_of(&[("k", int(7))]))
            .expect("define");

        let oosvar = XvalueHandle::Oosvar(vec![key("sum"), key("pan")]);
        assert_eq!(oosvar.peek(&state), Some(&int(5)));
        let resolved = oosvar.resolve(&state);
        assert!(!resolved.is_ephemeral());
        assert_eq!(*resolved, int(5));

        let local = XvalueHandle::Local {
            name: Rc::from("m"),
            keys: vec![key("k")],
        };
        assert_eq!(local.into_owned(&state), int(7));
        assert!(XvalueHandle::Oosvar(vec![key("nosuch")]).resolve(&state).is_absent());
        assert!(matches!(XvalueHandle::terminal(Mlrval::Absent), XvalueHandle::Absent));
    }
}
