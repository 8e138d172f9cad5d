use super::*;
use crate::runtime::{
    bifs::{arithmetic, matching},
    builtins::{ArityCheck, BuiltinImpl, BuiltinInfo},
    infer::scan_number,
    xvalue::MapKey,
};
use functions::{CallContext, FunctionDefSite};
use regex::Regex;
use std::{cell::RefCell, env, f64::consts};

/// Regex operand. String literals compile once here; anything else compiles
/// per call, reusing the last pattern when it repeats.
pub(super) enum RegexArg {
    Literal(Regex),
    Dynamic {
        pattern: ScalarFn,
        cache: RefCell<Option<(String, Regex)>>,
    },
}

impl RegexArg {
    pub(super) fn apply<T>(&self, state: &mut State, f: impl FnOnce(&Regex) -> T) -> RuntimeResult<T> {
        match self {
            RegexArg::Literal(regex) => Ok(f(regex)),
            RegexArg::Dynamic { pattern, cache } => {
                let pattern = pattern(state)?.to_string();
                let mut cache = cache.borrow_mut();
                let stale = cache.as_ref().map_or(true, |(cached, _)| *cached != pattern);
                if stale {
                    let regex = matching::compile(&pattern, false)?;
                    *cache = Some((pattern, regex));
                }
                match cache.as_ref() {
                    Some((_, regex)) => Ok(f(regex)),
                    None => Err(crate::internal_error!("regex cache is empty after compiling")),
                }
            }
        }
    }
}

/// `@x`, `@[e]`, `x` and indexed forms of those: read straight from storage.
fn is_storage_read(node: &AstNode) -> bool {
    match node.node_type {
        NodeType::OosvarName | NodeType::IndirectOosvarName | NodeType::LocalVariable => true,
        NodeType::IndexedValue => node.child(0).is_some_and(|base| {
            matches!(
                base.node_type,
                NodeType::OosvarName | NodeType::IndirectOosvarName | NodeType::FullOosvar | NodeType::LocalVariable
            )
        }),
        _ => false,
    }
}

impl<'r> Compiler<'r> {
    pub(super) fn build_scalar(&mut self, node: &AstNode) -> Result<ScalarFn, CompileError> {
        match node.node_type {
            NodeType::StringLiteral | NodeType::RegexCaseInsensitive => Ok(string_literal(&node.text)),
            NodeType::NumericLiteral => {
                let value = scan_number(&node.text).map(Mlrval::from).ok_or_else(|| CompileError::Invalid {
                    message: format!("cannot scan \"{}\" as a number", node.text),
                    span: node.span,
                })?;
                Ok(Box::new(move |_| Ok(value.clone())))
            }
            NodeType::BooleanLiteral => {
                let value = Mlrval::Boolean(node.text == "true");
                Ok(Box::new(move |_| Ok(value.clone())))
            }
            NodeType::ContextVariable => context_variable(node),
            NodeType::EnvironmentVariable => {
                let name = self.build_scalar(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    let name = name(state)?;
                    if name.is_absent() {
                        return Ok(Mlrval::Absent);
                    }
                    Ok(env::var(name.to_string()).map_or(Mlrval::Absent, |value| {
                        Mlrval::from_data(&value, state.infer_types)
                    }))
                }))
            }
            NodeType::FieldName => {
                let name = node.text.clone();
                Ok(Box::new(move |state| Ok(state.field(&name))))
            }
            NodeType::IndirectFieldName => {
                let name = self.build_scalar(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    let name = name(state)?;
                    if name.is_absent() {
                        return Ok(Mlrval::Absent);
                    }
                    Ok(state.field(&name.to_string()))
                }))
            }
            NodeType::PositionalFieldName | NodeType::PositionalFieldValue => {
                let index = self.build_scalar(child(node, 0)?)?;
                let by_value = node.is(NodeType::PositionalFieldValue);
                Ok(Box::new(move |state| {
                    let Some(n) = index(state)?.as_int() else {
                        return Ok(Mlrval::Absent);
                    };
                    Ok(match state.positional_name(n) {
                        Some(name) if by_value => state.field(name),
                        Some(name) => Mlrval::String(name.to_string()),
                        None => Mlrval::Absent,
                    })
                }))
            }
            _ if is_storage_read(node) => {
                let handle = self.build_map(node)?;
                Ok(Box::new(move |state| {
                    let handle = handle(state)?;
                    Ok(match handle.peek(state) {
                        Some(Xvalue::Terminal(value)) => value.clone(),
                        _ => Mlrval::Absent,
                    })
                }))
            }
            NodeType::Operator => self.operator(node),
            NodeType::FunctionCallsite => self.scalar_call(node),
            _ if self.shape(node) != Shape::Scalar => Ok(Evaluator::Map(self.build_map(node)?).into_scalar()),
            _ => Err(CompileError::malformed(node)),
        }
    }

    fn operator(&mut self, node: &AstNode) -> Result<ScalarFn, CompileError> {
        match (node.text.as_str(), node.children()) {
            ("&&", [left, right]) => self.short_circuit(left, right, true),
            ("||", [left, right]) => self.short_circuit(left, right, false),
            ("?:", [test, if_true, if_false]) => {
                let test = self.build_scalar(test)?;
                let if_true = self.build_scalar(if_true)?;
                let if_false = self.build_scalar(if_false)?;
                Ok(Box::new(move |state| {
                    if condition(&test(state)?, "ternary")? {
                        if_true(state)
                    } else {
                        if_false(state)
                    }
                }))
            }
            ("=~", [input, pattern]) => {
                let input = self.build_scalar(input)?;
                let regex = self.regex_arg(pattern)?;
                Ok(Box::new(move |state| {
                    let input = input(state)?;
                    let (result, captures) = regex.apply(state, |regex| matching::matches(&input, regex))?;
                    if captures.is_some() {
                        state.captures = captures;
                    }
                    Ok(result)
                }))
            }
            ("!=~", [input, pattern]) => {
                let input = self.build_scalar(input)?;
                let regex = self.regex_arg(pattern)?;
                Ok(Box::new(move |state| {
                    let input = input(state)?;
                    regex.apply(state, |regex| matching::does_not_match(&input, regex))
                }))
            }
            (op, args) => match self.functions.builtins().lookup(op, args.len()) {
                ArityCheck::Pass(info) => self.scalar_builtin(info, node),
                _ => Err(CompileError::malformed(node)),
            },
        }
    }

    /// `&&` and `||`. The right side runs only when the left does not decide
    /// the result; an absent operand defers to the other one.
    fn short_circuit(&mut self, left: &AstNode, right: &AstNode, is_and: bool) -> Result<ScalarFn, CompileError> {
        let left = self.build_scalar(left)?;
        let right = self.build_scalar(right)?;
        Ok(Box::new(move |state| {
            let lhs = match arithmetic::logical_operand(&left(state)?) {
                Ok(lhs) => lhs,
                Err(error) => return Ok(error),
            };
            if lhs == Some(!is_and) {
                return Ok(Mlrval::Boolean(!is_and));
            }
            Ok(match arithmetic::logical_operand(&right(state)?) {
                Err(error) => error,
                Ok(Some(rhs)) => Mlrval::Boolean(rhs),
                Ok(None) => lhs.map_or(Mlrval::Absent, Mlrval::Boolean),
            })
        }))
    }

    pub(super) fn regex_arg(&mut self, node: &AstNode) -> Result<RegexArg, CompileError> {
        match node.node_type {
            NodeType::StringLiteral | NodeType::RegexCaseInsensitive => {
                matching::compile(&node.text, node.is(NodeType::RegexCaseInsensitive))
                    .map(RegexArg::Literal)
                    .map_err(|err| CompileError::from_regex(err, node.span))
            }
            _ => Ok(RegexArg::Dynamic {
                pattern: self.build_scalar(node)?,
                cache: RefCell::new(None),
            }),
        }
    }

    fn scalar_call(&mut self, node: &AstNode) -> Result<ScalarFn, CompileError> {
        let site = self
            .functions
            .build_callsite(&node.text, node.children().len(), node.span, CallContext::Scalar)?;
        match site {
            FunctionDefSite::Builtin(info) => self.scalar_builtin(info, node),
            FunctionDefSite::Udf(slot) => {
                let call = self.udf_call(slot, node)?;
                // A function returning a map yields absent in scalar context.
                Ok(Box::new(move |state| match call(state)? {
                    XvalueHandle::Ephemeral(Xvalue::Terminal(value)) => Ok(value),
                    _ => Ok(Mlrval::Absent),
                }))
            }
        }
    }

    pub(super) fn scalar_builtin(&mut self, info: &'r BuiltinInfo, node: &AstNode) -> Result<ScalarFn, CompileError> {
        let args = node.children();
        match info.implementation {
            BuiltinImpl::Unary(f) => {
                let a = self.build_scalar(child(node, 0)?)?;
                Ok(Box::new(move |state| Ok(f(&a(state)?))))
            }
            BuiltinImpl::Binary(f) => {
                let a = self.build_scalar(child(node, 0)?)?;
                let b = self.build_scalar(child(node, 1)?)?;
                Ok(Box::new(move |state| {
                    let a = a(state)?;
                    let b = b(state)?;
                    Ok(f(&a, &b))
                }))
            }
            BuiltinImpl::Ternary(f) => {
                let a = self.build_scalar(child(node, 0)?)?;
                let b = self.build_scalar(child(node, 1)?)?;
                let c = self.build_scalar(child(node, 2)?)?;
                Ok(Box::new(move |state| {
                    let a = a(state)?;
                    let b = b(state)?;
                    let c = c(state)?;
                    Ok(f(&a, &b, &c))
                }))
            }
            BuiltinImpl::Variadic(f) => {
                let args = args
                    .iter()
                    .map(|arg| self.build_scalar(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(move |state| {
                    let values = args.iter().map(|arg| arg(state)).collect::<RuntimeResult<Vec<_>>>()?;
                    Ok(f(&values))
                }))
            }
            BuiltinImpl::RegexBinary(f) => {
                let input = self.build_scalar(child(node, 0)?)?;
                let regex = self.regex_arg(child(node, 1)?)?;
                Ok(Box::new(move |state| {
                    let input = input(state)?;
                    regex.apply(state, |regex| f(&input, regex))
                }))
            }
            BuiltinImpl::RegexTernary(f) => {
                let input = self.build_scalar(child(node, 0)?)?;
                let regex = self.regex_arg(child(node, 1)?)?;
                let third = self.build_scalar(child(node, 2)?)?;
                Ok(Box::new(move |state| {
                    let input = input(state)?;
                    let third = third(state)?;
                    regex.apply(state, |regex| f(&input, regex, &third))
                }))
            }
            BuiltinImpl::Predicate(predicate) => {
                let arg = self.build_map(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    let handle = arg(state)?;
                    Ok(Mlrval::Boolean(holds(predicate, &handle, state)))
                }))
            }
            BuiltinImpl::MapUnary(_)
            | BuiltinImpl::MapBinary(_)
            | BuiltinImpl::MapTernary(_)
            | BuiltinImpl::MapVariadic(_)
            | BuiltinImpl::Asserting(_) => Ok(Evaluator::Map(self.map_builtin(info, node)?).into_scalar()),
            BuiltinImpl::Special => Err(CompileError::malformed(node)),
        }
    }
}

pub(super) fn holds(predicate: fn(&Xvalue) -> bool, handle: &XvalueHandle, state: &State) -> bool {
    handle
        .peek(state)
        .map_or_else(|| predicate(&Xvalue::Terminal(Mlrval::Absent)), predicate)
}

/// String literals mentioning `\1`-style captures interpolate them once a
/// `=~` has set any.
fn string_literal(text: &str) -> ScalarFn {
    let value = Mlrval::from_string(text);
    if !matching::has_capture_refs(text) {
        return Box::new(move |_| Ok(value.clone()));
    }
    let text = text.to_string();
    Box::new(move |state| match state.captures.as_deref() {
        Some(captures) => Ok(Mlrval::from_string(matching::interpolate_captures(&text, Some(captures)))),
        None => Ok(value.clone()),
    })
}

fn context_variable(node: &AstNode) -> Result<ScalarFn, CompileError> {
    let read: ScalarFn = match node.text.as_str() {
        "NR" => Box::new(|state| Ok(Mlrval::from(state.context.nr as i64))),
        "FNR" => Box::new(|state| Ok(Mlrval::from(state.context.fnr as i64))),
        "FILENUM" => Box::new(|state| Ok(Mlrval::from(state.context.filenum as i64))),
        "FILENAME" => Box::new(|state| {
            Ok(if state.context.filename.is_empty() {
                Mlrval::Absent
            } else {
                Mlrval::from_string(state.context.filename.clone())
            })
        }),
        "NF" => Box::new(|state| {
            Ok(state
                .record
                .as_ref()
                .map_or(Mlrval::Absent, |record| Mlrval::from(record.len() as i64)))
        }),
        "M_PI" => Box::new(|_| Ok(Mlrval::Float(consts::PI))),
        "M_E" => Box::new(|_| Ok(Mlrval::Float(consts::E))),
        "IPS" => Box::new(|state| Ok(Mlrval::from_string(state.options.ips.clone()))),
        "IFS" => Box::new(|state| Ok(Mlrval::from_string(state.options.ifs.clone()))),
        "IRS" => Box::new(|state| Ok(Mlrval::from_string(state.options.irs.clone()))),
        "OPS" => Box::new(|state| Ok(Mlrval::from_string(state.options.ops.clone()))),
        "OFS" => Box::new(|state| Ok(Mlrval::from_string(state.options.ofs.clone()))),
        "ORS" => Box::new(|state| Ok(Mlrval::from_string(state.options.ors.clone()))),
        _ => return Err(CompileError::malformed(node)),
    };
    Ok(read)
}

/// Evaluates index expressions to a key path. `None` when any key is absent.
pub(super) fn eval_keys(keys: &[ScalarFn], state: &mut State) -> RuntimeResult<Option<Vec<MapKey>>> {
    let mut path = Vec::with_capacity(keys.len());
    for key in keys {
        match MapKey::from_mlrval(&key(state)?)? {
            Some(key) => path.push(key),
            None => return Ok(None),
        }
    }
    Ok(Some(path))
}
