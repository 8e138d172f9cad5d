//! Function manager: the builtin registry plus user-defined functions and
//! subroutines. Call-sites naming a function that is not defined yet get an
//! empty slot which [`FunctionManager::resolve_callsites`] fills once the
//! whole program has been seen.

use super::{Block, CompileError, FlowSignal};
use crate::language::{
    span::Span,
    types::{DeclaredType, Shape},
};
use crate::runtime::{
    builtins::{ArityCheck, BuiltinInfo, BuiltinRegistry},
    environment::type_error,
    error::RuntimeResult,
    state::State,
    value::Mlrval,
    xvalue::Xvalue,
};
use std::{cell::OnceCell, collections::HashMap, mem, rc::Rc};
use tracing::debug;

pub type UdfId = usize;
pub type SubrId = usize;

/// Binding from a call-site to a table entry, filled at most once.
pub type Slot = Rc<OnceCell<usize>>;

#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: Rc<str>,
    pub declared: DeclaredType,
}

pub struct Udf {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: DeclaredType,
    pub body: Block,
}

impl Udf {
    /// Runs the body in a fresh frame. Falling off the end returns absent.
    pub fn invoke(&self, state: &mut State, args: Vec<Xvalue>) -> RuntimeResult<Xvalue> {
        let captures = state.captures.take();
        state.locals.push_frame();
        let result = bind_parameters(state, &self.params, args).and_then(|()| self.body.execute(state));
        state.locals.pop_frame();
        state.captures = captures;

        let value = match result? {
            Some(FlowSignal::Return(value)) => value,
            _ => Xvalue::Terminal(Mlrval::Absent),
        };
        if self.return_type.accepts(&value) {
            Ok(value)
        } else {
            Err(type_error(self.return_type, &self.name, &value, "return"))
        }
    }
}

pub struct Subroutine {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Block,
}

impl Subroutine {
    pub fn invoke(&self, state: &mut State, args: Vec<Xvalue>) -> RuntimeResult<()> {
        let captures = state.captures.take();
        state.locals.push_frame();
        let result = bind_parameters(state, &self.params, args).and_then(|()| self.body.execute(state));
        state.locals.pop_frame();
        state.captures = captures;
        result.map(|_| ())
    }
}

fn bind_parameters(state: &mut State, params: &[Parameter], args: Vec<Xvalue>) -> RuntimeResult<()> {
    for (param, value) in params.iter().zip(args) {
        state.locals.define(&param.name, param.declared, value)?;
    }
    Ok(())
}

/// Compiled functions, shared read-only with the runtime.
#[derive(Default)]
pub struct FunctionTable {
    udfs: Vec<Rc<Udf>>,
    subroutines: Vec<Rc<Subroutine>>,
}

impl FunctionTable {
    pub fn udf(&self, slot: &OnceCell<UdfId>) -> RuntimeResult<Rc<Udf>> {
        slot.get()
            .and_then(|&id| self.udfs.get(id))
            .cloned()
            .ok_or_else(|| crate::internal_error!("function call-site was never resolved"))
    }

    pub fn subroutine(&self, slot: &OnceCell<SubrId>) -> RuntimeResult<Rc<Subroutine>> {
        slot.get()
            .and_then(|&id| self.subroutines.get(id))
            .cloned()
            .ok_or_else(|| crate::internal_error!("subroutine call-site was never resolved"))
    }
}

/// What a call-site is bound to.
#[derive(Debug)]
pub enum FunctionDefSite<'r> {
    Builtin(&'r BuiltinInfo),
    /// Possibly still empty; see [`FunctionManager::resolve_callsites`].
    Udf(Slot),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallContext {
    Scalar,
    Map,
}

#[derive(Debug)]
struct PendingCall {
    name: String,
    arg_count: usize,
    span: Span,
    slot: Slot,
}

pub struct FunctionManager<'r> {
    builtins: &'r BuiltinRegistry,
    udf_ids: HashMap<String, UdfId>,
    udfs: Vec<Rc<Udf>>,
    subr_ids: HashMap<String, SubrId>,
    subroutines: Vec<Rc<Subroutine>>,
    pending_scalar: Vec<PendingCall>,
    pending_map: Vec<PendingCall>,
    pending_subr: Vec<PendingCall>,
}

impl<'r> FunctionManager<'r> {
    pub fn new(builtins: &'r BuiltinRegistry) -> Self {
        Self {
            builtins,
            udf_ids: HashMap::new(),
            udfs: Vec::new(),
            subr_ids: HashMap::new(),
            subroutines: Vec::new(),
            pending_scalar: Vec::new(),
            pending_map: Vec::new(),
            pending_subr: Vec::new(),
        }
    }

    pub fn builtins(&self) -> &'r BuiltinRegistry {
        self.builtins
    }

    /// Registered return shape of a builtin, `None` for anything else.
    pub fn builtin_shape(&self, name: &str, arg_count: usize) -> Option<Shape> {
        match self.builtins.lookup(name, arg_count) {
            ArityCheck::Pass(info) => Some(info.shape),
            _ => None,
        }
    }

    pub fn install_udf(&mut self, udf: Udf, span: Span) -> Result<UdfId, CompileError> {
        if self.builtins.contains(&udf.name) {
            return Err(CompileError::BuiltinOverride { name: udf.name, span });
        }
        if self.udf_ids.contains_key(&udf.name) {
            return Err(CompileError::DuplicateFunction { name: udf.name, span });
        }
        let id = self.udfs.len();
        debug!(function = %udf.name, params = udf.params.len(), "installed function");
        self.udf_ids.insert(udf.name.clone(), id);
        self.udfs.push(Rc::new(udf));
        Ok(id)
    }

    pub fn install_subroutine(&mut self, subroutine: Subroutine, span: Span) -> Result<SubrId, CompileError> {
        if self.subr_ids.contains_key(&subroutine.name) {
            return Err(CompileError::DuplicateSubroutine {
                name: subroutine.name,
                span,
            });
        }
        let id = self.subroutines.len();
        debug!(subroutine = %subroutine.name, params = subroutine.params.len(), "installed subroutine");
        self.subr_ids.insert(subroutine.name.clone(), id);
        self.subroutines.push(Rc::new(subroutine));
        Ok(id)
    }

    /// Binds a function call-site. Builtins and already-defined functions
    /// bind now; other names are queued until [`Self::resolve_callsites`].
    pub fn build_callsite(
        &mut self,
        name: &str,
        arg_count: usize,
        span: Span,
        context: CallContext,
    ) -> Result<FunctionDefSite<'r>, CompileError> {
        match self.builtins.lookup(name, arg_count) {
            ArityCheck::Pass(info) => return Ok(FunctionDefSite::Builtin(info)),
            ArityCheck::Mismatch(expected) => {
                return Err(CompileError::Arity {
                    kind: "function",
                    name: name.to_string(),
                    expected,
                    got: arg_count,
                    span,
                })
            }
            ArityCheck::Unknown => {}
        }

        if let Some(&id) = self.udf_ids.get(name) {
            check_arity("function", name, self.udfs[id].params.len(), arg_count, span)?;
            return Ok(FunctionDefSite::Udf(Rc::new(OnceCell::from(id))));
        }

        let slot: Slot = Rc::new(OnceCell::new());
        let pending = PendingCall {
            name: name.to_string(),
            arg_count,
            span,
            slot: Rc::clone(&slot),
        };
        debug!(function = name, ?context, "queued forward reference");
        match context {
            CallContext::Scalar => self.pending_scalar.push(pending),
            CallContext::Map => self.pending_map.push(pending),
        }
        Ok(FunctionDefSite::Udf(slot))
    }

    pub fn build_subr_callsite(&mut self, name: &str, arg_count: usize, span: Span) -> Result<Slot, CompileError> {
        if let Some(&id) = self.subr_ids.get(name) {
            check_arity("subroutine", name, self.subroutines[id].params.len(), arg_count, span)?;
            return Ok(Rc::new(OnceCell::from(id)));
        }
        let slot: Slot = Rc::new(OnceCell::new());
        debug!(subroutine = name, "queued forward reference");
        self.pending_subr.push(PendingCall {
            name: name.to_string(),
            arg_count,
            span,
            slot: Rc::clone(&slot),
        });
        Ok(slot)
    }

    /// Fills every queued slot. Runs once, after the last definition.
    pub fn resolve_callsites(&mut self) -> Result<(), CompileError> {
        let mut pending = mem::take(&mut self.pending_scalar);
        pending.append(&mut self.pending_map);
        pending.sort_by_key(|call| call.span.start);
        let resolved = pending.len();
        for call in pending {
            let Some(&id) = self.udf_ids.get(&call.name) else {
                return Err(CompileError::UnknownFunction {
                    name: call.name,
                    span: call.span,
                });
            };
            check_arity("function", &call.name, self.udfs[id].params.len(), call.arg_count, call.span)?;
            let _ = call.slot.set(id);
        }

        let subroutine_calls = mem::take(&mut self.pending_subr);
        let resolved_subroutines = subroutine_calls.len();
        for call in subroutine_calls {
            let Some(&id) = self.subr_ids.get(&call.name) else {
                return Err(CompileError::UnknownSubroutine {
                    name: call.name,
                    span: call.span,
                });
            };
            check_arity("subroutine", &call.name, self.subroutines[id].params.len(), call.arg_count, call.span)?;
            let _ = call.slot.set(id);
        }
        debug!(functions = resolved, subroutines = resolved_subroutines, "resolved forward references");
        Ok(())
    }

    pub fn into_table(self) -> FunctionTable {
        FunctionTable {
            udfs: self.udfs,
            subroutines: self.subroutines,
        }
    }
}

fn check_arity(kind: &'static str, name: &str, expected: usize, got: usize, span: Span) -> Result<(), CompileError> {
    if expected == got {
        return Ok(());
    }
    let plural = if expected == 1 { "argument" } else { "arguments" };
    Err(CompileError::Arity {
        kind,
        name: name.to_string(),
        expected: format!("{expected} {plural}"),
        got,
        span,
    })
}
