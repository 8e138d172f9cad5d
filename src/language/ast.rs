//! Tagged syntax tree. Every node carries its source text, a node type and
//! optional children; the compiler walks it once and then drops it.

use crate::language::span::Span;
use std::fmt::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    StatementList,
    BeginBlock,
    EndBlock,
    FuncDef,
    SubrDef,
    ParameterList,
    Parameter,
    TypeDecl,
    SubrCallsite,

    StringLiteral,
    RegexCaseInsensitive,
    NumericLiteral,
    BooleanLiteral,
    MapLiteral,
    MapLiteralPair,
    ContextVariable,
    EnvironmentVariable,

    FieldName,
    IndirectFieldName,
    /// `$[[n]]`: the name of the n-th field, 1-up.
    PositionalFieldName,
    /// `$[[[n]]]`: the value of the n-th field.
    PositionalFieldValue,
    FullSrec,
    OosvarName,
    IndirectOosvarName,
    FullOosvar,
    LocalVariable,
    IndexedValue,

    Operator,
    FunctionCallsite,

    SrecAssignment,
    PositionalNameAssignment,
    FullSrecAssignment,
    OosvarAssignment,
    FullOosvarAssignment,
    LocalDefinition,
    LocalAssignment,
    EnvAssignment,
    Unset,

    FilterStatement,
    BareBoolean,
    PatternAction,
    IfChain,
    IfItem,
    WhileLoop,
    DoWhileLoop,
    ForSingle,
    ForKeyValue,
    ForMultiKey,
    ForKeyList,
    TripleFor,
    Break,
    Continue,
    Return,

    Emit,
    EmitP,
    EmitLashed,
    EmitKeys,
    EmitF,
    Dump,
    Edump,
    Print,
    Tee,
    NoRedirect,
    RedirectWrite,
    RedirectAppend,
    RedirectPipe,
    Stdout,
    Stderr,
}

impl NodeType {
    pub fn name(self) -> &'static str {
        match self {
            NodeType::StatementList => "statement_list",
            NodeType::BeginBlock => "begin_block",
            NodeType::EndBlock => "end_block",
            NodeType::FuncDef => "func_def",
            NodeType::SubrDef => "subr_def",
            NodeType::ParameterList => "parameter_list",
            NodeType::Parameter => "parameter",
            NodeType::TypeDecl => "type_decl",
            NodeType::SubrCallsite => "subr_callsite",
            NodeType::StringLiteral => "string_literal",
            NodeType::RegexCaseInsensitive => "regex_case_insensitive",
            NodeType::NumericLiteral => "numeric_literal",
            NodeType::BooleanLiteral => "boolean_literal",
            NodeType::MapLiteral => "map_literal",
            NodeType::MapLiteralPair => "map_literal_pair",
            NodeType::ContextVariable => "context_variable",
            NodeType::EnvironmentVariable => "environment_variable",
            NodeType::FieldName => "field_name",
            NodeType::IndirectFieldName => "indirect_field_name",
            NodeType::PositionalFieldName => "positional_field_name",
            NodeType::PositionalFieldValue => "positional_field_value",
            NodeType::FullSrec => "full_srec",
            NodeType::OosvarName => "oosvar_name",
            NodeType::IndirectOosvarName => "indirect_oosvar_name",
            NodeType::FullOosvar => "full_oosvar",
            NodeType::LocalVariable => "local_variable",
            NodeType::IndexedValue => "indexed_value",
            NodeType::Operator => "operator",
            NodeType::FunctionCallsite => "function_callsite",
            NodeType::SrecAssignment => "srec_assignment",
            NodeType::PositionalNameAssignment => "positional_name_assignment",
            NodeType::FullSrecAssignment => "full_srec_assignment",
            NodeType::OosvarAssignment => "oosvar_assignment",
            NodeType::FullOosvarAssignment => "full_oosvar_assignment",
            NodeType::LocalDefinition => "local_definition",
            NodeType::LocalAssignment => "local_assignment",
            NodeType::EnvAssignment => "env_assignment",
            NodeType::Unset => "unset",
            NodeType::FilterStatement => "filter_statement",
            NodeType::BareBoolean => "bare_boolean",
            NodeType::PatternAction => "cond_block",
            NodeType::IfChain => "if_chain",
            NodeType::IfItem => "if_item",
            NodeType::WhileLoop => "while_loop",
            NodeType::DoWhileLoop => "do_while_loop",
            NodeType::ForSingle => "for_single",
            NodeType::ForKeyValue => "for_key_value",
            NodeType::ForMultiKey => "for_multi_key",
            NodeType::ForKeyList => "for_key_list",
            NodeType::TripleFor => "triple_for",
            NodeType::Break => "break",
            NodeType::Continue => "continue",
            NodeType::Return => "return",
            NodeType::Emit => "emit",
            NodeType::EmitP => "emitp",
            NodeType::EmitLashed => "emit_lashed",
            NodeType::EmitKeys => "emit_keys",
            NodeType::EmitF => "emitf",
            NodeType::Dump => "dump",
            NodeType::Edump => "edump",
            NodeType::Print => "print",
            NodeType::Tee => "tee",
            NodeType::NoRedirect => "no_redirect",
            NodeType::RedirectWrite => "redirect_write",
            NodeType::RedirectAppend => "redirect_append",
            NodeType::RedirectPipe => "redirect_pipe",
            NodeType::Stdout => "stdout",
            NodeType::Stderr => "stderr",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AstNode {
    pub text: String,
    pub node_type: NodeType,
    /// `None`: the node never takes children. `Some(vec![])`: it could, but
    /// has none (a zero-argument call, an empty block).
    pub children: Option<Vec<AstNode>>,
    pub span: Span,
}

impl AstNode {
    pub fn new(text: impl Into<String>, node_type: NodeType, span: Span) -> Self {
        Self {
            text: text.into(),
            node_type,
            children: None,
            span,
        }
    }

    pub fn with_children(
        text: impl Into<String>,
        node_type: NodeType,
        span: Span,
        children: Vec<AstNode>,
    ) -> Self {
        Self {
            text: text.into(),
            node_type,
            children: Some(children),
            span,
        }
    }

    pub fn zary(text: impl Into<String>, node_type: NodeType, span: Span) -> Self {
        Self::with_children(text, node_type, span, Vec::new())
    }

    pub fn unary(text: impl Into<String>, node_type: NodeType, a: AstNode) -> Self {
        let span = a.span;
        Self::with_children(text, node_type, span, vec![a])
    }

    pub fn binary(text: impl Into<String>, node_type: NodeType, a: AstNode, b: AstNode) -> Self {
        let span = a.span.join(b.span);
        Self::with_children(text, node_type, span, vec![a, b])
    }

    pub fn ternary(
        text: impl Into<String>,
        node_type: NodeType,
        a: AstNode,
        b: AstNode,
        c: AstNode,
    ) -> Self {
        let span = a.span.join(c.span);
        Self::with_children(text, node_type, span, vec![a, b, c])
    }

    pub fn quaternary(
        text: impl Into<String>,
        node_type: NodeType,
        a: AstNode,
        b: AstNode,
        c: AstNode,
        d: AstNode,
    ) -> Self {
        let span = a.span.join(d.span);
        Self::with_children(text, node_type, span, vec![a, b, c, d])
    }

    pub fn append_child(&mut self, child: AstNode) {
        self.span = self.span.join(child.span);
        self.children.get_or_insert_with(Vec::new).push(child);
    }

    pub fn prepend_child(&mut self, child: AstNode) {
        self.span = self.span.join(child.span);
        self.children.get_or_insert_with(Vec::new).insert(0, child);
    }

    pub fn copy_subtree(&self) -> AstNode {
        self.clone()
    }

    /// Widens the node's span to cover `span` as well.
    pub fn spanning(mut self, span: Span) -> Self {
        self.span = self.span.join(span);
        self
    }

    pub fn set_function_name(&mut self, name: impl Into<String>) {
        self.text = name.into();
    }

    pub fn children(&self) -> &[AstNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn child(&self, index: usize) -> Option<&AstNode> {
        self.children().get(index)
    }

    pub fn is(&self, node_type: NodeType) -> bool {
        self.node_type == node_type
    }

    /// Parenthesized dump, one node per line.
    pub fn print_tree(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, 0);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        match self.children.as_deref() {
            None | Some([]) => {
                let _ = writeln!(out, "{indent}* {self}.");
            }
            Some(children) => {
                let _ = writeln!(out, "{indent}* {self}");
                let _ = writeln!(out, "{indent}(");
                for child in children {
                    child.write_tree(out, depth + 1);
                }
                let _ = writeln!(out, "{indent})");
            }
        }
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text=\"{}\", type={}", self.text, self.node_type)
    }
}
