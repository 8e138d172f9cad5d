//! Typed local variables. Each function or subroutine call gets its own
//! frame; curly-braced blocks push scopes within the frame. Callees never see
//! their caller's locals.

use crate::language::types::DeclaredType;
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    xvalue::{MapKey, Xvalue},
};
use std::collections::HashMap;

#[derive(Debug)]
struct Binding {
    value: Xvalue,
    declared: DeclaredType,
}

#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<String, Binding>,
}

#[derive(Debug, Default)]
struct Frame {
    scopes: Vec<Scope>,
}

#[derive(Debug)]
pub struct Environment {
    frames: Vec<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                scopes: vec![Scope::default()],
            }],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame {
            scopes: vec![Scope::default()],
        });
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.frames.push(Frame {
                scopes: vec![Scope::default()],
            });
        }
    }

    pub fn push_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.push(Scope::default());
        }
    }

    pub fn pop_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.pop();
            if frame.scopes.is_empty() {
                frame.scopes.push(Scope::default());
            }
        }
    }

    /// Drops every binding. Used between records so that top-level locals
    /// never leak from one record to the next.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Declares `name` in the innermost scope, shadowing outer bindings.
    pub fn define(&mut self, name: &str, declared: DeclaredType, value: Xvalue) -> RuntimeResult<()> {
        check(declared, name, &value, "define")?;
        if let Some(scope) = self.frames.last_mut().and_then(|frame| frame.scopes.last_mut()) {
            scope.bindings.insert(name.to_string(), Binding { value, declared });
            Ok(())
        } else {
            Err(crate::internal_error!("no scope available for local `{name}`"))
        }
    }

    /// Writes `value` at `keys` under the nearest binding of `name`, defining
    /// an untyped local in the innermost scope when there is none.
    pub fn assign(&mut self, name: &str, keys: &[MapKey], value: Xvalue) -> RuntimeResult<()> {
        match self.binding_mut(name) {
            Some(binding) => {
                if keys.is_empty() {
                    check(binding.declared, name, &value, "assign")?;
                    binding.value = value;
                } else {
                    if binding.declared != DeclaredType::Any && binding.declared != DeclaredType::Map {
                        return Err(type_error(binding.declared, name, &Xvalue::empty_map(), "assign"));
                    }
                    binding.value.put(keys, value);
                }
                Ok(())
            }
            None => {
                let fresh = if keys.is_empty() {
                    value
                } else {
                    let mut map = Xvalue::empty_map();
                    map.put(keys, value);
                    map
                };
                self.define(name, DeclaredType::Any, fresh)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Xvalue> {
        let frame = self.frames.last()?;
        frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
            .map(|binding| &binding.value)
    }

    pub fn lookup(&self, name: &str, keys: &[MapKey]) -> Option<&Xvalue> {
        self.get(name)?.lookup(keys)
    }

    /// `unset x` resets the binding to absent; `unset x[k]` removes the entry.
    pub fn unset(&mut self, name: &str, keys: &[MapKey]) {
        if let Some(binding) = self.binding_mut(name) {
            if keys.is_empty() {
                binding.value = Xvalue::Terminal(crate::runtime::value::Mlrval::Absent);
            } else {
                binding.value.remove(keys);
            }
        }
    }

    fn binding_mut(&mut self, name: &str) -> Option<&mut Binding> {
        let frame = self.frames.last_mut()?;
        frame
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.bindings.get_mut(name))
    }
}

fn check(declared: DeclaredType, name: &str, value: &Xvalue, action: &'static str) -> RuntimeResult<()> {
    if declared.accepts(value) {
        Ok(())
    } else {
        Err(type_error(declared, name, value, action))
    }
}

pub(crate) fn type_error(declared: DeclaredType, name: &str, value: &Xvalue, action: &'static str) -> RuntimeError {
    let shown = match value {
        Xvalue::Terminal(scalar) => scalar.to_string(),
        Xvalue::Map(_) => "(map)".to_string(),
    };
    RuntimeError::TypeDeclaration {
        action,
        type_name: declared.to_string(),
        name: name.to_string(),
        value: shown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Mlrval;
    use crate::runtime::xvalue::tests::{int, key};

    #[test]
    fn inner_scopes_shadow_and_assign_reaches_outer() {
        let mut env = Environment::new();
        env.define("x", DeclaredType::Any, int(1)).expect("define");
        env.push_scope();
        env.assign("x", &[], int(2)).expect("assign");
        env.define("y", DeclaredType::Int, int(3)).expect("define");
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&int(2)));
        assert!(env.get("y").is_none());
    }

    #[test]
    fn frames_hide_caller_locals() {
        let mut env = Environment::new();
        env.define("x", DeclaredType::Any, int(1)).expect("define");
        env.push_frame();
        assert!(env.get("x").is_none());
        env.assign("x", &[], int(5)).expect("assign");
        env.pop_frame();
        assert_eq!(env.get("x"), Some(&int(1)));
    }

    #[test]
    fn typed_locals_reject_mismatches_but_allow_absent() {
        let mut env = Environment::new();
        env.define("n", DeclaredType::Int, int(1)).expect("define");
        let err = env
            .assign("n", &[], Xvalue::Terminal(Mlrval::String("abc".into())))
            .expect_err("type mismatch");
        assert!(err.to_string().contains("couldn't assign variable int n from value abc"));
        env.assign("n", &[], Xvalue::Terminal(Mlrval::Absent)).expect("absent is fine");
    }

    #[test]
    fn indexed_assignment_autocreates_maps() {
        let mut env = Environment::new();
        env.assign("m", &[key("a"), key("b")], int(1)).expect("assign");
        assert_eq!(env.lookup("m", &[key("a"), key("b")]), Some(&int(1)));
        env.unset("m", &[key("a")]);
        assert_eq!(env.get("m").map(Xvalue::length), Some(0));
    }
}
