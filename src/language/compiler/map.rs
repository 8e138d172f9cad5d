use super::scalar::{eval_keys, holds};
use super::*;
use crate::runtime::{
    builtins::{BuiltinImpl, BuiltinInfo},
    xvalue::{Level, MapKey},
};
use functions::{CallContext, FunctionDefSite, Slot};

impl<'r> Compiler<'r> {
    pub(super) fn build_map(&mut self, node: &AstNode) -> Result<MapFn, CompileError> {
        match node.node_type {
            NodeType::MapLiteral => self.map_literal(node),
            NodeType::FullSrec => Ok(Box::new(|state| {
                Ok(state.record_as_map().map_or(XvalueHandle::Absent, XvalueHandle::Ephemeral))
            })),
            NodeType::OosvarName => {
                let key = MapKey::String(node.text.clone());
                Ok(Box::new(move |_| Ok(XvalueHandle::Oosvar(vec![key.clone()]))))
            }
            NodeType::IndirectOosvarName => {
                let name = self.build_scalar(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    Ok(match MapKey::from_mlrval(&name(state)?)? {
                        Some(key) => XvalueHandle::Oosvar(vec![key]),
                        None => XvalueHandle::Absent,
                    })
                }))
            }
            NodeType::FullOosvar => Ok(Box::new(|_| Ok(XvalueHandle::Oosvar(Vec::new())))),
            NodeType::LocalVariable => {
                let name: Rc<str> = Rc::from(node.text.as_str());
                Ok(Box::new(move |_| {
                    Ok(XvalueHandle::Local {
                        name: Rc::clone(&name),
                        keys: Vec::new(),
                    })
                }))
            }
            NodeType::IndexedValue => self.indexed(node),
            NodeType::FunctionCallsite => self.map_call(node),
            NodeType::Operator if node.text == "?:" && node.children().len() == 3 => {
                let test = self.build_scalar(child(node, 0)?)?;
                let if_true = self.build_map(child(node, 1)?)?;
                let if_false = self.build_map(child(node, 2)?)?;
                Ok(Box::new(move |state| {
                    if condition(&test(state)?, "ternary")? {
                        if_true(state)
                    } else {
                        if_false(state)
                    }
                }))
            }
            _ => Ok(Evaluator::Scalar(self.build_scalar(node)?).into_map()),
        }
    }

    /// Absent keys and values leave their pair out.
    fn map_literal(&mut self, node: &AstNode) -> Result<MapFn, CompileError> {
        let pairs = node
            .children()
            .iter()
            .map(|pair| Ok((self.build_scalar(child(pair, 0)?)?, self.build_map(child(pair, 1)?)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        Ok(Box::new(move |state| {
            let mut level = Level::new();
            for (key, value) in &pairs {
                let key = MapKey::from_mlrval(&key(state)?)?;
                let value = value(state)?.into_owned(state);
                if let Some(key) = key {
                    if !value.is_absent() {
                        level.insert(key, value);
                    }
                }
            }
            Ok(XvalueHandle::Ephemeral(Xvalue::Map(level)))
        }))
    }

    /// Indexing storage extends the handle's path without touching the
    /// value. Indexing a temporary takes the indexed subtree out of it.
    fn indexed(&mut self, node: &AstNode) -> Result<MapFn, CompileError> {
        let [base, keys @ ..] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let base = self.build_map(base)?;
        let keys = keys
            .iter()
            .map(|key| self.build_scalar(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(move |state| {
            let handle = base(state)?;
            let Some(path) = eval_keys(&keys, state)? else {
                return Ok(XvalueHandle::Absent);
            };
            Ok(match handle {
                XvalueHandle::Ephemeral(mut value) => value
                    .remove(&path)
                    .map_or(XvalueHandle::Absent, XvalueHandle::owned),
                XvalueHandle::Oosvar(mut prefix) => {
                    prefix.extend(path);
                    XvalueHandle::Oosvar(prefix)
                }
                XvalueHandle::Local { name, keys: mut prefix } => {
                    prefix.extend(path);
                    XvalueHandle::Local { name, keys: prefix }
                }
                XvalueHandle::Absent => XvalueHandle::Absent,
            })
        }))
    }

    fn map_call(&mut self, node: &AstNode) -> Result<MapFn, CompileError> {
        let site = self
            .functions
            .build_callsite(&node.text, node.children().len(), node.span, CallContext::Map)?;
        match site {
            FunctionDefSite::Builtin(info) => self.map_builtin(info, node),
            FunctionDefSite::Udf(slot) => self.udf_call(slot, node),
        }
    }

    /// Every argument is evaluated to a handle before any is resolved, so
    /// borrowed inputs see the state as it stands after all side effects.
    pub(super) fn map_builtin(&mut self, info: &'r BuiltinInfo, node: &AstNode) -> Result<MapFn, CompileError> {
        match info.implementation {
            BuiltinImpl::MapUnary(f) => {
                let a = self.build_map(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    let a = a(state)?;
                    let view: &State = state;
                    Ok(XvalueHandle::owned(f(a.resolve(view))))
                }))
            }
            BuiltinImpl::MapBinary(f) => {
                let a = self.build_map(child(node, 0)?)?;
                let b = self.build_map(child(node, 1)?)?;
                Ok(Box::new(move |state| {
                    let a = a(state)?;
                    let b = b(state)?;
                    let view: &State = state;
                    Ok(XvalueHandle::owned(f(a.resolve(view), b.resolve(view))))
                }))
            }
            BuiltinImpl::MapTernary(f) => {
                let a = self.build_map(child(node, 0)?)?;
                let b = self.build_map(child(node, 1)?)?;
                let c = self.build_map(child(node, 2)?)?;
                Ok(Box::new(move |state| {
                    let a = a(state)?;
                    let b = b(state)?;
                    let c = c(state)?;
                    let view: &State = state;
                    Ok(XvalueHandle::owned(f(a.resolve(view), b.resolve(view), c.resolve(view))))
                }))
            }
            BuiltinImpl::MapVariadic(f) => {
                let args = self.map_arguments(node)?;
                Ok(Box::new(move |state| {
                    let handles = args.iter().map(|arg| arg(state)).collect::<RuntimeResult<Vec<_>>>()?;
                    let view: &State = state;
                    let boxed = handles.into_iter().map(|handle| handle.resolve(view)).collect();
                    Ok(XvalueHandle::owned(f(boxed)?))
                }))
            }
            BuiltinImpl::Predicate(predicate) => {
                let arg = self.build_map(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    let handle = arg(state)?;
                    Ok(XvalueHandle::terminal(Mlrval::Boolean(holds(predicate, &handle, state))))
                }))
            }
            BuiltinImpl::Asserting(predicate) => {
                let arg = self.build_map(child(node, 0)?)?;
                let name = format!("is_{}", info.name.trim_start_matches("asserting_"));
                Ok(Box::new(move |state| {
                    let handle = arg(state)?;
                    if holds(predicate, &handle, state) {
                        return Ok(handle);
                    }
                    Err(RuntimeError::TypeAssertion {
                        predicate: name.clone(),
                        nr: state.context.nr,
                        fnr: state.context.fnr,
                        filename: state.context.filename.clone(),
                    })
                }))
            }
            _ => Ok(Evaluator::Scalar(self.scalar_builtin(info, node)?).into_map()),
        }
    }

    /// Arguments are copied into the callee's frame; the result comes back
    /// ephemeral.
    pub(super) fn udf_call(&mut self, slot: Slot, node: &AstNode) -> Result<MapFn, CompileError> {
        let args = self.map_arguments(node)?;
        Ok(Box::new(move |state| {
            let handles = args.iter().map(|arg| arg(state)).collect::<RuntimeResult<Vec<_>>>()?;
            let values = handles.into_iter().map(|handle| handle.into_owned(state)).collect();
            let udf = state.functions.udf(&slot)?;
            Ok(XvalueHandle::owned(udf.invoke(state, values)?))
        }))
    }

    fn map_arguments(&mut self, node: &AstNode) -> Result<Vec<MapFn>, CompileError> {
        node.children().iter().map(|arg| self.build_map(arg)).collect()
    }
}
