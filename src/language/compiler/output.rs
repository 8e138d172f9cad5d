//! Emit family, dump, print and tee.

use super::*;
use crate::io::{
    reader::flatten_to_record,
    redirect::{OutputTarget, RedirectMode},
};
use crate::runtime::{
    json,
    xvalue::{Level, MapKey},
};

/// Where a statement's output goes, decided per execution for computed
/// file names.
pub(super) enum Redirect {
    /// Into the record stream, ahead of the current record.
    MainStream,
    Fixed(OutputTarget),
    Dynamic { mode: RedirectMode, target: ScalarFn },
}

impl Redirect {
    fn resolve(&self, state: &mut State) -> RuntimeResult<Option<OutputTarget>> {
        match self {
            Redirect::MainStream => Ok(None),
            Redirect::Fixed(target) => Ok(Some(target.clone())),
            Redirect::Dynamic { mode, target } => match target(state)? {
                name @ (Mlrval::String(_) | Mlrval::Int(_) | Mlrval::Float(_)) => Ok(Some(OutputTarget::Redirect {
                    mode: *mode,
                    name: name.to_string(),
                })),
                other => Err(RuntimeError::RedirectTarget {
                    type_name: other.type_name(),
                }),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum EmitKind {
    Emit,
    EmitP,
}

/// One thing to emit and the name it goes under. `None` merges a map's
/// entries without a prefix.
struct Emittable {
    fallback: Option<String>,
    value: MapFn,
}

impl<'r> Compiler<'r> {
    fn build_redirect(&mut self, node: &AstNode, default: Redirect) -> Result<Redirect, CompileError> {
        let mode = match node.node_type {
            NodeType::NoRedirect => return Ok(default),
            NodeType::Stdout => return Ok(Redirect::Fixed(OutputTarget::Stdout)),
            NodeType::Stderr => return Ok(Redirect::Fixed(OutputTarget::Stderr)),
            NodeType::RedirectWrite => RedirectMode::Write,
            NodeType::RedirectAppend => RedirectMode::Append,
            NodeType::RedirectPipe => RedirectMode::Pipe,
            _ => return Err(CompileError::malformed(node)),
        };
        let target = child(node, 0)?;
        match target.node_type {
            NodeType::Stdout => Ok(Redirect::Fixed(OutputTarget::Stdout)),
            NodeType::Stderr => Ok(Redirect::Fixed(OutputTarget::Stderr)),
            _ => Ok(Redirect::Dynamic {
                mode,
                target: self.build_scalar(target)?,
            }),
        }
    }

    pub(super) fn build_emit(&mut self, node: &AstNode, kind: EmitKind) -> Result<StatementFn, CompileError> {
        let [emittables, names, redirect] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let emittables = emittables
            .children()
            .iter()
            .map(|emittable| {
                let fallback = match emittable.node_type {
                    NodeType::FieldName => Some(emittable.text.clone()),
                    _ => None,
                };
                Ok(Emittable {
                    fallback,
                    value: self.build_map(emittable)?,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        let names = names
            .children()
            .iter()
            .map(|name| self.build_scalar(name))
            .collect::<Result<Vec<_>, _>>()?;
        let redirect = self.build_redirect(redirect, Redirect::MainStream)?;

        Ok(Box::new(move |state| {
            let mut pairs = Vec::with_capacity(emittables.len());
            for emittable in &emittables {
                let handle = (emittable.value)(state)?;
                let name = emittable_name(&handle, &emittable.fallback, &state.options.oflatsep);
                pairs.push((name, handle.into_owned(state)));
            }
            let mut indices = Vec::with_capacity(names.len());
            for name in &names {
                match name(state)? {
                    Mlrval::Absent | Mlrval::Error => return Ok(None),
                    name => indices.push(name.to_string()),
                }
            }
            let records = emit_records(kind, pairs, &indices, &state.options.oflatsep);
            let target = redirect.resolve(state)?;
            write_records(state, target.as_ref(), records)?;
            Ok(None)
        }))
    }

    pub(super) fn build_emitf(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [items, redirect] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let items = items
            .children()
            .iter()
            .map(|item| Ok((MapKey::String(item.text.clone()), self.build_map(item)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        let redirect = self.build_redirect(redirect, Redirect::MainStream)?;
        Ok(Box::new(move |state| {
            let mut record = Level::new();
            for (name, value) in &items {
                let value = value(state)?.into_owned(state);
                if !value.is_absent() {
                    record.insert(name.clone(), value);
                }
            }
            let target = redirect.resolve(state)?;
            write_records(state, target.as_ref(), vec![record])?;
            Ok(None)
        }))
    }

    /// `dump` and `edump`: all oosvars, or one value, as multi-line JSON.
    pub(super) fn build_dump(&mut self, node: &AstNode, default: OutputTarget) -> Result<StatementFn, CompileError> {
        let redirect = self.build_redirect(child(node, 0)?, Redirect::Fixed(default))?;
        let value = node.child(1).map(|value| self.build_map(value)).transpose()?;
        Ok(Box::new(move |state| {
            let text = match &value {
                None => Some(json::encode(&state.oosvars, true, &state.options.ofmt)),
                Some(value) => {
                    let handle = value(state)?;
                    match handle.peek(state) {
                        Some(map @ Xvalue::Map(_)) => Some(json::encode(map, true, &state.options.ofmt)),
                        Some(Xvalue::Terminal(scalar)) if !scalar.is_absent() => Some(state.render(scalar)),
                        _ => None,
                    }
                }
            };
            if let Some(mut text) = text {
                text.push('\n');
                if let Some(target) = redirect.resolve(state)? {
                    state.outputs.write_text(&target, &text)?;
                }
            }
            Ok(None)
        }))
    }

    /// `print`, `printn`, `eprint` and `eprintn`. Arguments are joined with
    /// spaces; maps print as JSON.
    pub(super) fn build_print(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [redirect, values @ ..] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let redirect = self.build_redirect(redirect, Redirect::Fixed(OutputTarget::Stdout))?;
        let values = values
            .iter()
            .map(|value| self.build_map(value))
            .collect::<Result<Vec<_>, _>>()?;
        let newline = matches!(node.text.as_str(), "print" | "eprint");
        Ok(Box::new(move |state| {
            let mut pieces = Vec::with_capacity(values.len());
            for value in &values {
                let handle = value(state)?;
                pieces.push(match handle.peek(state) {
                    Some(map @ Xvalue::Map(_)) => json::encode(map, true, &state.options.ofmt),
                    Some(Xvalue::Terminal(scalar)) => state.render(scalar),
                    None => String::new(),
                });
            }
            let mut text = pieces.join(" ");
            if newline {
                text.push('\n');
            }
            if let Some(target) = redirect.resolve(state)? {
                state.outputs.write_text(&target, &text)?;
            }
            Ok(None)
        }))
    }

    pub(super) fn build_tee(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [redirect, value] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let redirect = self.build_redirect(redirect, Redirect::MainStream)?;
        let value = self.build_map(value)?;
        Ok(Box::new(move |state| {
            let value = value(state)?.into_owned(state);
            if let Xvalue::Map(level) = value {
                let target = redirect.resolve(state)?;
                write_records(state, target.as_ref(), vec![level])?;
            }
            Ok(None)
        }))
    }
}

/// Storage handles name themselves by their path: `@sum["pan"]` is
/// `sum:pan`. `@*` has no name.
fn emittable_name(handle: &XvalueHandle, fallback: &Option<String>, separator: &str) -> Option<String> {
    let join = |head: Option<&str>, keys: &[MapKey]| {
        head.map(str::to_string)
            .into_iter()
            .chain(keys.iter().map(MapKey::to_string))
            .collect::<Vec<_>>()
            .join(separator)
    };
    match handle {
        XvalueHandle::Oosvar(keys) if keys.is_empty() => None,
        XvalueHandle::Oosvar(keys) => Some(join(None, keys)),
        XvalueHandle::Local { name, keys } => Some(join(Some(&**name), keys)),
        _ => fallback.clone(),
    }
}

/// Flattens and routes records; empty ones are dropped.
fn write_records(state: &mut State, target: Option<&OutputTarget>, records: Vec<Level>) -> RuntimeResult<()> {
    for level in records {
        let record = flatten_to_record(&Xvalue::Map(level), &state.options.oflatsep, &state.options.ofmt);
        if record.is_empty() {
            continue;
        }
        match target {
            None => state.emitted.push(record),
            Some(target) => state.outputs.write_record(target, &record)?,
        }
    }
    Ok(())
}

/// Builds the records for one `emit` or `emitp`. Without index names every
/// emittable lands in a single record. With them, every emittable must be a
/// map; the first one's keys drive the split and the others are indexed in
/// parallel.
pub(super) fn emit_records(
    kind: EmitKind,
    emittables: Vec<(Option<String>, Xvalue)>,
    indices: &[String],
    separator: &str,
) -> Vec<Level> {
    if indices.is_empty() {
        let mut record = Level::new();
        for (name, value) in emittables {
            place(kind, &mut record, name.as_deref(), value);
        }
        return vec![record];
    }

    let mut names = Vec::with_capacity(emittables.len());
    let mut maps = Vec::with_capacity(emittables.len());
    for (name, value) in &emittables {
        match value {
            Xvalue::Map(level) => {
                names.push(name.clone());
                maps.push(Some(level));
            }
            _ => return Vec::new(),
        }
    }
    let mut out = Vec::new();
    emit_indexed(kind, &names, &Level::new(), &maps, indices, separator, &mut out);
    out
}

fn emit_indexed(
    kind: EmitKind,
    names: &[Option<String>],
    template: &Level,
    maps: &[Option<&Level>],
    indices: &[String],
    separator: &str,
    out: &mut Vec<Level>,
) {
    let (Some((index, rest)), Some(Some(first))) = (indices.split_first(), maps.first()) else {
        return;
    };
    for key in first.keys() {
        let mut record = template.clone();
        record.insert(MapKey::String(index.clone()), Xvalue::Terminal(key.to_mlrval()));

        let next: Vec<Option<&Xvalue>> = maps.iter().map(|map| map.and_then(|map| map.get(key))).collect();
        let next_maps: Vec<Option<&Level>> = next.iter().map(|value| value.and_then(Xvalue::as_map)).collect();
        let next_names: Vec<Option<String>> = match kind {
            EmitKind::Emit => names.to_vec(),
            EmitKind::EmitP => names
                .iter()
                .map(|name| {
                    Some(match name {
                        Some(name) => format!("{name}{separator}{key}"),
                        None => key.to_string(),
                    })
                })
                .collect(),
        };

        if next_maps[0].is_some() && !rest.is_empty() {
            emit_indexed(kind, &next_names, &record, &next_maps, rest, separator, out);
        } else {
            for (name, value) in next_names.iter().zip(next) {
                if let Some(value) = value {
                    place(kind, &mut record, name.as_deref(), value.clone());
                }
            }
            out.push(record);
        }
    }
}

/// `emit` merges maps into the record; `emitp` nests them under their name
/// so that flattening prefixes every field.
fn place(kind: EmitKind, record: &mut Level, name: Option<&str>, value: Xvalue) {
    match (kind, name, value) {
        (_, _, value) if value.is_absent() => {}
        (EmitKind::EmitP, Some(name), value) => record.insert(MapKey::from(name), value),
        (_, _, Xvalue::Map(level)) => {
            for (key, value) in level {
                record.insert(key, value);
            }
        }
        (_, name, terminal) => record.insert(MapKey::from(name.unwrap_or("_")), terminal),
    }
}
