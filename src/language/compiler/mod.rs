//! Compiles the AST once into trees of closures over [`State`].
//!
//! Every expression node becomes either a scalar-context or a map-context
//! evaluator, chosen from its inferred [`Shape`] and from what its consumer
//! needs. Statements become closures returning an optional [`FlowSignal`].

pub mod functions;
mod map;
mod output;
mod scalar;
mod statements;

#[cfg(test)]
mod tests;

use crate::language::{
    ast::{AstNode, NodeType},
    span::Span,
    types::{infer_shape, DeclaredType, Shape},
};
use crate::runtime::{
    builtins::BuiltinRegistry,
    error::{RuntimeError, RuntimeResult},
    state::{State, XvalueHandle},
    value::Mlrval,
    xvalue::Xvalue,
};
use functions::{FunctionManager, FunctionTable, Parameter, Subroutine, Udf};
use std::{mem, rc::Rc};
use thiserror::Error;
use tracing::debug;

pub type ScalarFn = Box<dyn Fn(&mut State) -> RuntimeResult<Mlrval>>;
pub type MapFn = Box<dyn Fn(&mut State) -> RuntimeResult<XvalueHandle>>;
pub type StatementFn = Box<dyn Fn(&mut State) -> RuntimeResult<Option<FlowSignal>>>;

/// One compiled expression in either context.
pub enum Evaluator {
    Scalar(ScalarFn),
    Map(MapFn),
}

impl Evaluator {
    /// Terminals pass through; a map where a scalar is needed is an error
    /// value.
    pub fn into_scalar(self) -> ScalarFn {
        match self {
            Evaluator::Scalar(eval) => eval,
            Evaluator::Map(eval) => Box::new(move |state| {
                let handle = eval(state)?;
                if let XvalueHandle::Ephemeral(Xvalue::Terminal(value)) = handle {
                    return Ok(value);
                }
                Ok(match handle.peek(state) {
                    None => Mlrval::Absent,
                    Some(Xvalue::Terminal(value)) => value.clone(),
                    Some(Xvalue::Map(_)) => Mlrval::Error,
                })
            }),
        }
    }

    pub fn into_map(self) -> MapFn {
        match self {
            Evaluator::Scalar(eval) => Box::new(move |state| Ok(XvalueHandle::terminal(eval(state)?))),
            Evaluator::Map(eval) => eval,
        }
    }
}

#[derive(Debug)]
pub enum FlowSignal {
    Break,
    Continue,
    Return(Xvalue),
}

/// Statements run inside their own local scope.
pub struct Block {
    statements: Vec<StatementFn>,
}

impl Block {
    pub fn new(statements: Vec<StatementFn>) -> Self {
        Self { statements }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn execute(&self, state: &mut State) -> RuntimeResult<Option<FlowSignal>> {
        state.locals.push_scope();
        let result = self.execute_in_scope(state);
        state.locals.pop_scope();
        result
    }

    fn execute_in_scope(&self, state: &mut State) -> RuntimeResult<Option<FlowSignal>> {
        for statement in &self.statements {
            if let Some(flow) = statement(state)? {
                return Ok(Some(flow));
            }
        }
        Ok(None)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verb {
    #[default]
    Put,
    Filter,
}

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    pub verb: Verb,
}

pub struct Program {
    pub begin: Vec<Block>,
    pub main: Block,
    pub end: Vec<Block>,
    pub functions: Rc<FunctionTable>,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("mlr: function name \"{name}\" not found")]
    UnknownFunction { name: String, span: Span },
    #[error("mlr: subroutine name \"{name}\" not found")]
    UnknownSubroutine { name: String, span: Span },
    #[error("mlr: {kind} named \"{name}\" takes {expected}; got {got}")]
    Arity {
        kind: &'static str,
        name: String,
        expected: String,
        got: usize,
        span: Span,
    },
    #[error("mlr: function named \"{name}\" must not override a built-in function of the same name")]
    BuiltinOverride { name: String, span: Span },
    #[error("mlr: function named \"{name}\" has already been defined")]
    DuplicateFunction { name: String, span: Span },
    #[error("mlr: subroutine named \"{name}\" has already been defined")]
    DuplicateSubroutine { name: String, span: Span },
    #[error("mlr: {message}")]
    Misplaced { message: String, span: Span },
    #[error("mlr: could not compile regex \"{pattern}\": {message}")]
    Regex {
        pattern: String,
        message: String,
        span: Span,
    },
    #[error("mlr: {message}")]
    Invalid { message: String, span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::UnknownFunction { span, .. }
            | CompileError::UnknownSubroutine { span, .. }
            | CompileError::Arity { span, .. }
            | CompileError::BuiltinOverride { span, .. }
            | CompileError::DuplicateFunction { span, .. }
            | CompileError::DuplicateSubroutine { span, .. }
            | CompileError::Misplaced { span, .. }
            | CompileError::Regex { span, .. }
            | CompileError::Invalid { span, .. } => *span,
        }
    }

    /// Short label for the highlighted span.
    pub fn label(&self) -> &'static str {
        match self {
            CompileError::UnknownFunction { .. } | CompileError::UnknownSubroutine { .. } => "not defined",
            CompileError::Arity { .. } => "wrong number of arguments",
            CompileError::BuiltinOverride { .. }
            | CompileError::DuplicateFunction { .. }
            | CompileError::DuplicateSubroutine { .. } => "defined here",
            CompileError::Misplaced { .. } => "not allowed here",
            CompileError::Regex { .. } => "invalid regex",
            CompileError::Invalid { .. } => "here",
        }
    }

    fn misplaced(message: impl Into<String>, node: &AstNode) -> Self {
        CompileError::Misplaced {
            message: message.into(),
            span: node.span,
        }
    }

    /// The parser never builds such a node.
    fn malformed(node: &AstNode) -> Self {
        CompileError::Invalid {
            message: format!("internal coding error: malformed {} node", node.node_type),
            span: node.span,
        }
    }

    fn from_regex(err: RuntimeError, span: Span) -> Self {
        match err {
            RuntimeError::InvalidRegex { pattern, message } => CompileError::Regex { pattern, message, span },
            other => CompileError::Invalid {
                message: other.to_string(),
                span,
            },
        }
    }
}

/// Which kind of block the compiler is inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockKind {
    Main,
    Begin,
    End,
    Func,
    Subr,
}

#[derive(Clone, Copy, Debug)]
struct Placement {
    kind: BlockKind,
    loop_depth: usize,
}

impl Placement {
    fn new(kind: BlockKind) -> Self {
        Self { kind, loop_depth: 0 }
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(statements = ast.children().len(), verb = ?options.verb))]
pub fn compile(ast: &AstNode, builtins: &BuiltinRegistry, options: &CompileOptions) -> Result<Program, CompileError> {
    Compiler::new(builtins, options.clone()).compile_root(ast)
}

pub(crate) struct Compiler<'r> {
    functions: FunctionManager<'r>,
    options: CompileOptions,
    placement: Placement,
}

impl<'r> Compiler<'r> {
    fn new(builtins: &'r BuiltinRegistry, options: CompileOptions) -> Self {
        Self {
            functions: FunctionManager::new(builtins),
            options,
            placement: Placement::new(BlockKind::Main),
        }
    }

    /// Top-level statements compile in source order; call-sites naming
    /// functions defined further down are resolved at the end.
    fn compile_root(mut self, root: &AstNode) -> Result<Program, CompileError> {
        if !root.is(NodeType::StatementList) {
            return Err(CompileError::malformed(root));
        }
        let mut begin = Vec::new();
        let mut main = Vec::new();
        let mut end = Vec::new();

        for node in root.children() {
            match node.node_type {
                NodeType::BeginBlock => {
                    let body = child(node, 0)?;
                    begin.push(self.within(Placement::new(BlockKind::Begin), |c| c.build_block(body))?);
                }
                NodeType::EndBlock => {
                    let body = child(node, 0)?;
                    end.push(self.within(Placement::new(BlockKind::End), |c| c.build_block(body))?);
                }
                NodeType::FuncDef => self.compile_func(node)?,
                NodeType::SubrDef => self.compile_subr(node)?,
                _ => {
                    let statement = self.within(Placement::new(BlockKind::Main), |c| c.build_statement(node))?;
                    main.push(statement);
                }
            }
        }

        self.functions.resolve_callsites()?;
        debug!(
            begin_blocks = begin.len(),
            main_statements = main.len(),
            end_blocks = end.len(),
            "compiled program"
        );
        Ok(Program {
            begin,
            main: Block::new(main),
            end,
            functions: Rc::new(self.functions.into_table()),
        })
    }

    fn compile_func(&mut self, node: &AstNode) -> Result<(), CompileError> {
        let [params, return_type, body] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let params = parameters(params)?;
        let return_type = declared_type(return_type)?;
        let body = self.within(Placement::new(BlockKind::Func), |c| c.build_block(body))?;
        let udf = Udf {
            name: node.text.clone(),
            params,
            return_type,
            body,
        };
        self.functions.install_udf(udf, node.span).map(|_| ())
    }

    fn compile_subr(&mut self, node: &AstNode) -> Result<(), CompileError> {
        let [params, body] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let params = parameters(params)?;
        let body = self.within(Placement::new(BlockKind::Subr), |c| c.build_block(body))?;
        let subroutine = Subroutine {
            name: node.text.clone(),
            params,
            body,
        };
        self.functions.install_subroutine(subroutine, node.span).map(|_| ())
    }

    fn within<T>(
        &mut self,
        placement: Placement,
        build: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let saved = mem::replace(&mut self.placement, placement);
        let result = build(self);
        self.placement = saved;
        result
    }

    fn within_loop<T>(&mut self, build: impl FnOnce(&mut Self) -> Result<T, CompileError>) -> Result<T, CompileError> {
        let placement = Placement {
            loop_depth: self.placement.loop_depth + 1,
            ..self.placement
        };
        self.within(placement, build)
    }

    fn shape(&self, node: &AstNode) -> Shape {
        infer_shape(node, &self.functions)
    }
}

fn child(node: &AstNode, index: usize) -> Result<&AstNode, CompileError> {
    node.child(index).ok_or_else(|| CompileError::malformed(node))
}

fn declared_type(node: &AstNode) -> Result<DeclaredType, CompileError> {
    DeclaredType::from_name(&node.text).ok_or_else(|| CompileError::Invalid {
        message: format!("unknown type name \"{}\"", node.text),
        span: node.span,
    })
}

fn parameters(node: &AstNode) -> Result<Vec<Parameter>, CompileError> {
    node.children()
        .iter()
        .map(|param| {
            Ok(Parameter {
                name: Rc::from(param.text.as_str()),
                declared: declared_type(child(param, 0)?)?,
            })
        })
        .collect()
}

/// Conditions must be boolean; absent counts as false.
pub(crate) fn condition(value: &Mlrval, construct: &'static str) -> RuntimeResult<bool> {
    match value {
        Mlrval::Absent => Ok(false),
        other => other.as_boolean().ok_or(RuntimeError::NonBooleanCondition {
            construct,
            type_name: other.type_name(),
        }),
    }
}
