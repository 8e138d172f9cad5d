use crate::language::{
    ast::{AstNode, NodeType},
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};

/// Type keywords accepted in local definitions, parameters and return types.
pub const TYPE_NAMES: &[&str] = &["var", "any", "str", "num", "int", "float", "bool", "map"];

pub const CONTEXT_VARIABLES: &[&str] = &[
    "NR", "FNR", "NF", "FILENAME", "FILENUM", "M_PI", "M_E", "IPS", "IFS", "IRS", "OPS", "OFS",
    "ORS",
];

/// Compound assignments and the binary operator each one applies.
const COMPOUND_ASSIGNMENTS: &[(&str, &str)] = &[
    ("+=", "+"),
    ("-=", "-"),
    ("*=", "*"),
    ("/=", "/"),
    ("//=", "//"),
    ("%=", "%"),
    ("**=", "**"),
    (".=", "."),
    ("<<=", "<<"),
    (">>=", ">>"),
    (">>>=", ">>>"),
    ("&=", "&"),
    ("|=", "|"),
    ("^=", "^"),
    ("&&=", "&&"),
    ("||=", "||"),
    ("^^=", "^^"),
    ("min=", "min"),
    ("max=", "max"),
];

pub fn parse_program(source: &str) -> Result<AstNode, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors.into_iter().map(SyntaxError::from).collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<AstNode, SyntaxErrors> {
        let mut root = AstNode::zary("statement_list", NodeType::StatementList, Span::new(0, 0));

        while !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            match self.parse_statement() {
                Ok(statement) => {
                    let ended_with_block = self.previous_was(TokenKind::RBrace);
                    root.append_child(statement);
                    if !self.at_statement_end(ended_with_block) {
                        let err = self.error_here("Expected `;` between statements");
                        self.report(err);
                        self.synchronize();
                    }
                }
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(root)
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn at_statement_end(&self, ended_with_block: bool) -> bool {
        ended_with_block || self.is_eof() || self.check(TokenKind::Semi) || self.check(TokenKind::RBrace)
    }

    fn parse_block(&mut self) -> Result<AstNode, SyntaxError> {
        let open = self.expect(TokenKind::LBrace)?.span;
        let mut block = AstNode::zary("statement_list", NodeType::StatementList, open);
        loop {
            while self.matches(TokenKind::Semi) {}
            if self.check(TokenKind::RBrace) || self.is_eof() {
                break;
            }
            let statement = self.parse_statement()?;
            let ended_with_block = self.previous_was(TokenKind::RBrace);
            block.append_child(statement);
            if !self.at_statement_end(ended_with_block) {
                return Err(self.error_here("Expected `;` or `}` after statement"));
            }
        }
        let close = self.expect(TokenKind::RBrace)?.span;
        block.span = block.span.join(close);
        Ok(block)
    }

    fn parse_statement(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        match self.peek_kind() {
            Some(TokenKind::Begin) | Some(TokenKind::End) => {
                let (text, node_type) = if self.check(TokenKind::Begin) {
                    ("begin", NodeType::BeginBlock)
                } else {
                    ("end", NodeType::EndBlock)
                };
                self.advance();
                let block = self.parse_block()?;
                Ok(AstNode::unary(text, node_type, block).spanning(start))
            }
            Some(TokenKind::Func) => self.parse_func_def(),
            Some(TokenKind::Subr) => self.parse_subr_def(),
            Some(TokenKind::Call) => {
                self.advance();
                let name = self.expect_identifier("Expected subroutine name after `call`")?;
                let mut call = AstNode::zary(name, NodeType::SubrCallsite, start);
                for arg in self.parse_arguments()? {
                    call.append_child(arg);
                }
                Ok(call.spanning(self.span_from(start)))
            }
            Some(TokenKind::If) => self.parse_if_chain(),
            Some(TokenKind::While) => {
                self.advance();
                let condition = self.parse_parenthesized()?;
                let block = self.parse_block()?;
                Ok(AstNode::binary("while", NodeType::WhileLoop, condition, block).spanning(start))
            }
            Some(TokenKind::Do) => {
                self.advance();
                let block = self.parse_block()?;
                if !self.matches(TokenKind::While) {
                    return Err(self.error_here("Expected `while` after `do` block"));
                }
                let condition = self.parse_parenthesized()?;
                Ok(AstNode::binary("do", NodeType::DoWhileLoop, block, condition).spanning(start))
            }
            Some(TokenKind::For) => self.parse_for(),
            Some(TokenKind::Break) => {
                self.advance();
                Ok(AstNode::new("break", NodeType::Break, start))
            }
            Some(TokenKind::Continue) => {
                self.advance();
                Ok(AstNode::new("continue", NodeType::Continue, start))
            }
            Some(TokenKind::Return) => {
                self.advance();
                let mut node = AstNode::zary("return", NodeType::Return, start);
                if !self.check(TokenKind::Semi) && !self.check(TokenKind::RBrace) && !self.is_eof() {
                    node.append_child(self.parse_expression()?);
                }
                Ok(node)
            }
            Some(TokenKind::Filter) => {
                self.advance();
                let condition = self.parse_expression()?;
                Ok(AstNode::unary("filter", NodeType::FilterStatement, condition).spanning(start))
            }
            Some(TokenKind::Unset) => self.parse_unset(),
            Some(TokenKind::Emit) => self.parse_emit(NodeType::Emit, "emit"),
            Some(TokenKind::Emitp) => self.parse_emit(NodeType::EmitP, "emitp"),
            Some(TokenKind::Emitf) => self.parse_emitf(),
            Some(TokenKind::Tee) => {
                self.advance();
                let redirect = self.parse_redirect()?;
                if redirect.is(NodeType::NoRedirect) {
                    return Err(self.error_here("tee requires a redirect such as `> \"file\"`"));
                }
                self.expect(TokenKind::Comma)?;
                let value = self.parse_expression()?;
                Ok(AstNode::binary("tee", NodeType::Tee, redirect, value).spanning(start))
            }
            Some(TokenKind::Dump) | Some(TokenKind::Edump) => {
                let (text, node_type) = if self.check(TokenKind::Dump) {
                    ("dump", NodeType::Dump)
                } else {
                    ("edump", NodeType::Edump)
                };
                self.advance();
                let redirect = if node_type == NodeType::Dump {
                    self.parse_redirect()?
                } else {
                    AstNode::new("no_redirect", NodeType::NoRedirect, start)
                };
                let redirected = !redirect.is(NodeType::NoRedirect);
                let mut node = AstNode::unary(text, node_type, redirect).spanning(start);
                if redirected {
                    if self.matches(TokenKind::Comma) {
                        node.append_child(self.parse_expression()?);
                    }
                } else if !self.check(TokenKind::Semi) && !self.check(TokenKind::RBrace) && !self.is_eof() {
                    node.append_child(self.parse_expression()?);
                }
                Ok(node)
            }
            Some(TokenKind::Print)
            | Some(TokenKind::Printn)
            | Some(TokenKind::Eprint)
            | Some(TokenKind::Eprintn) => self.parse_print(),
            Some(TokenKind::Identifier(name)) if self.is_definition(&name) => self.parse_local_definition(),
            _ => self.parse_expression_statement(),
        }
    }

    /// `var x = ...`, but not `int(...)`.
    fn is_definition(&self, name: &str) -> bool {
        TYPE_NAMES.contains(&name) && matches!(self.peek_kind_n(1), Some(TokenKind::Identifier(_)))
    }

    fn parse_local_definition(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        let type_name = self.expect_identifier("Expected type name")?;
        let type_decl = AstNode::new(type_name, NodeType::TypeDecl, start);
        let name = self.expect_identifier("Expected local variable name")?;
        if !self.matches_op("=") {
            return Err(self
                .error_here("Expected `=` in local variable definition")
                .with_help("local definitions need an initial value, e.g. `var x = 1`"));
        }
        let value = self.parse_expression()?;
        Ok(AstNode::binary(name, NodeType::LocalDefinition, type_decl, value))
    }

    fn parse_expression_statement(&mut self) -> Result<AstNode, SyntaxError> {
        let lhs = self.parse_expression()?;

        if self.check(TokenKind::LBrace) {
            let block = self.parse_block()?;
            return Ok(AstNode::binary("cond", NodeType::PatternAction, lhs, block));
        }

        if self.matches_op("=") {
            let rhs = self.parse_expression()?;
            return self.assignment(lhs, rhs);
        }

        if let Some(TokenKind::Op(op)) = self.peek_kind() {
            if let Some(&(_, base)) = COMPOUND_ASSIGNMENTS.iter().find(|(compound, _)| *compound == op) {
                let op_span = self.advance().span;
                let rhs = self.parse_expression()?;
                let current = lhs.copy_subtree();
                let combined = if base == "min" || base == "max" {
                    AstNode::binary(base, NodeType::FunctionCallsite, current, rhs)
                } else {
                    AstNode::binary(base, NodeType::Operator, current, rhs)
                };
                return self
                    .assignment(lhs, combined)
                    .map_err(|err| SyntaxError::new(err.message, op_span));
            }
        }

        Ok(AstNode::unary("bare_boolean", NodeType::BareBoolean, lhs))
    }

    fn assignment(&self, lhs: AstNode, rhs: AstNode) -> Result<AstNode, SyntaxError> {
        let node_type = match lhs.node_type {
            NodeType::FieldName | NodeType::IndirectFieldName | NodeType::PositionalFieldValue => {
                NodeType::SrecAssignment
            }
            NodeType::PositionalFieldName => NodeType::PositionalNameAssignment,
            NodeType::FullSrec => NodeType::FullSrecAssignment,
            NodeType::OosvarName | NodeType::IndirectOosvarName => NodeType::OosvarAssignment,
            NodeType::FullOosvar => NodeType::FullOosvarAssignment,
            NodeType::LocalVariable => NodeType::LocalAssignment,
            NodeType::EnvironmentVariable => NodeType::EnvAssignment,
            NodeType::IndexedValue => match lhs.child(0).map(|base| base.node_type) {
                Some(NodeType::OosvarName) | Some(NodeType::IndirectOosvarName) | Some(NodeType::FullOosvar) => {
                    NodeType::OosvarAssignment
                }
                Some(NodeType::LocalVariable) => NodeType::LocalAssignment,
                _ => {
                    return Err(SyntaxError::new("Indexed assignment needs an oosvar or local base", lhs.span)
                        .with_label("not assignable"))
                }
            },
            _ => {
                return Err(SyntaxError::new(
                    format!("Cannot assign to {}", lhs.node_type),
                    lhs.span,
                )
                .with_label("not assignable"))
            }
        };
        Ok(AstNode::binary("=", node_type, lhs, rhs))
    }

    fn parse_func_def(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        self.advance();
        let name = self.expect_identifier("Expected function name after `func`")?;
        let params = self.parse_parameters()?;
        let return_type = if self.matches(TokenKind::Colon) {
            let span = self.current_span();
            let type_name = self.expect_type_name()?;
            AstNode::new(type_name, NodeType::TypeDecl, span)
        } else {
            AstNode::new("any", NodeType::TypeDecl, self.current_span())
        };
        let body = self.parse_block()?;
        Ok(AstNode::ternary(name, NodeType::FuncDef, params, return_type, body).spanning(start))
    }

    fn parse_subr_def(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        self.advance();
        let name = self.expect_identifier("Expected subroutine name after `subr`")?;
        let params = self.parse_parameters()?;
        let body = self.parse_block()?;
        Ok(AstNode::binary(name, NodeType::SubrDef, params, body).spanning(start))
    }

    fn parse_parameters(&mut self) -> Result<AstNode, SyntaxError> {
        let open = self.expect(TokenKind::LParen)?.span;
        let mut params = AstNode::zary("parameter_list", NodeType::ParameterList, open);
        if !self.check(TokenKind::RParen) {
            loop {
                let span = self.current_span();
                let first = self.expect_identifier("Expected parameter name")?;
                let param = match self.peek_kind() {
                    Some(TokenKind::Identifier(name)) if TYPE_NAMES.contains(&first.as_str()) => {
                        let name_span = self.advance().span;
                        let decl = AstNode::new(first, NodeType::TypeDecl, span);
                        AstNode::with_children(name, NodeType::Parameter, span.join(name_span), vec![decl])
                    }
                    _ => {
                        let decl = AstNode::new("any", NodeType::TypeDecl, span);
                        AstNode::with_children(first, NodeType::Parameter, span, vec![decl])
                    }
                };
                params.append_child(param);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_if_chain(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        let mut chain = AstNode::zary("if", NodeType::IfChain, start);
        self.advance();
        let condition = self.parse_parenthesized()?;
        let block = self.parse_block()?;
        chain.append_child(AstNode::binary("if", NodeType::IfItem, condition, block));
        loop {
            if self.matches(TokenKind::Elif) {
                let condition = self.parse_parenthesized()?;
                let block = self.parse_block()?;
                chain.append_child(AstNode::binary("elif", NodeType::IfItem, condition, block));
            } else if self.matches(TokenKind::Else) {
                let block = self.parse_block()?;
                chain.append_child(AstNode::unary("else", NodeType::IfItem, block));
                break;
            } else {
                break;
            }
        }
        Ok(chain)
    }

    fn parse_for(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        self.advance();
        self.expect(TokenKind::LParen)?;

        // for ((k1, k2), v in ...)
        if self.check(TokenKind::LParen) {
            self.advance();
            let mut keys = AstNode::zary("key_list", NodeType::ForKeyList, self.current_span());
            loop {
                keys.append_child(self.expect_local("Expected key variable name")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::Comma)?;
            let value = self.expect_local("Expected value variable name")?;
            self.expect(TokenKind::In)?;
            let iterable = self.parse_expression()?;
            self.expect(TokenKind::RParen)?;
            let block = self.parse_block()?;
            return Ok(
                AstNode::quaternary("for", NodeType::ForMultiKey, keys, value, iterable, block).spanning(start),
            );
        }

        let key_value_form = matches!(self.peek_kind(), Some(TokenKind::Identifier(_)))
            && matches!(self.peek_kind_n(1), Some(TokenKind::Comma) | Some(TokenKind::In));
        if key_value_form {
            let key = self.expect_local("Expected key variable name")?;
            if self.matches(TokenKind::In) {
                let iterable = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                let block = self.parse_block()?;
                return Ok(AstNode::ternary("for", NodeType::ForSingle, key, iterable, block).spanning(start));
            }
            self.expect(TokenKind::Comma)?;
            let value = self.expect_local("Expected value variable name")?;
            self.expect(TokenKind::In)?;
            let iterable = self.parse_expression()?;
            self.expect(TokenKind::RParen)?;
            let block = self.parse_block()?;
            return Ok(
                AstNode::quaternary("for", NodeType::ForKeyValue, key, value, iterable, block).spanning(start),
            );
        }

        // for (init; cond; update)
        let init = self.parse_for_clause(TokenKind::Semi)?;
        self.expect(TokenKind::Semi)?;
        let mut condition = AstNode::zary("statement_list", NodeType::StatementList, self.current_span());
        if !self.check(TokenKind::Semi) {
            let expr = self.parse_expression()?;
            condition.append_child(AstNode::unary("bare_boolean", NodeType::BareBoolean, expr));
        }
        self.expect(TokenKind::Semi)?;
        let update = self.parse_for_clause(TokenKind::RParen)?;
        self.expect(TokenKind::RParen)?;
        let block = self.parse_block()?;
        Ok(AstNode::quaternary("for", NodeType::TripleFor, init, condition, update, block).spanning(start))
    }

    fn parse_for_clause(&mut self, terminator: TokenKind) -> Result<AstNode, SyntaxError> {
        let mut clause = AstNode::zary("statement_list", NodeType::StatementList, self.current_span());
        while !self.check(terminator.clone()) && !self.is_eof() {
            let statement = match self.peek_kind() {
                Some(TokenKind::Identifier(name)) if self.is_definition(&name) => self.parse_local_definition()?,
                _ => self.parse_expression_statement()?,
            };
            clause.append_child(statement);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(clause)
    }

    fn parse_unset(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        self.advance();
        let mut node = AstNode::zary("unset", NodeType::Unset, start);
        loop {
            let span = self.current_span();
            let target = if self.check_identifier("all") {
                self.advance();
                AstNode::new("@*", NodeType::FullOosvar, span)
            } else {
                self.parse_expression()?
            };
            match target.node_type {
                NodeType::FieldName
                | NodeType::IndirectFieldName
                | NodeType::PositionalFieldName
                | NodeType::PositionalFieldValue
                | NodeType::FullSrec
                | NodeType::OosvarName
                | NodeType::IndirectOosvarName
                | NodeType::FullOosvar
                | NodeType::LocalVariable
                | NodeType::IndexedValue => node.append_child(target),
                _ => {
                    return Err(SyntaxError::new("Cannot unset this expression", target.span)
                        .with_label("not a variable"))
                }
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(node)
    }

    fn parse_emit(&mut self, node_type: NodeType, text: &str) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        self.advance();
        let redirect = self.parse_redirect()?;
        if !redirect.is(NodeType::NoRedirect) {
            self.expect(TokenKind::Comma)?;
        }

        let mut emittables = AstNode::zary("emittables", NodeType::EmitLashed, self.current_span());
        if self.check_identifier("all") || self.check(TokenKind::OosvarStar) {
            let span = self.advance().span;
            emittables.append_child(AstNode::new("@*", NodeType::FullOosvar, span));
        } else if self.check(TokenKind::LParen) && self.is_lashed() {
            self.advance();
            loop {
                emittables.append_child(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        } else {
            emittables.append_child(self.parse_expression()?);
        }

        let mut names = AstNode::zary("emit_keys", NodeType::EmitKeys, self.current_span());
        while self.matches(TokenKind::Comma) {
            names.append_child(self.parse_expression()?);
        }

        Ok(AstNode::ternary(text, node_type, emittables, names, redirect).spanning(start))
    }

    /// `(` starting an emit is a lashed list when a top-level comma appears
    /// before its matching `)`.
    fn is_lashed(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return false;
                    }
                }
                TokenKind::Comma if depth == 1 => return true,
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_emitf(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        self.advance();
        let redirect = self.parse_redirect()?;
        if !redirect.is(NodeType::NoRedirect) {
            self.expect(TokenKind::Comma)?;
        }
        let mut items = AstNode::zary("emittables", NodeType::EmitLashed, self.current_span());
        loop {
            let item = self.parse_expression()?;
            if !matches!(
                item.node_type,
                NodeType::OosvarName | NodeType::LocalVariable | NodeType::FieldName
            ) {
                return Err(SyntaxError::new("emitf arguments must be named variables", item.span)
                    .with_help("use e.g. `emitf @count, @sum`"));
            }
            items.append_child(item);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(AstNode::binary("emitf", NodeType::EmitF, items, redirect).spanning(start))
    }

    fn parse_print(&mut self) -> Result<AstNode, SyntaxError> {
        let start = self.current_span();
        let text = match self.peek_kind() {
            Some(TokenKind::Print) => "print",
            Some(TokenKind::Printn) => "printn",
            Some(TokenKind::Eprint) => "eprint",
            _ => "eprintn",
        };
        self.advance();
        let redirect = if text.starts_with('e') {
            AstNode::new("stderr", NodeType::Stderr, start)
        } else {
            let redirect = self.parse_redirect()?;
            if !redirect.is(NodeType::NoRedirect) {
                self.expect(TokenKind::Comma)?;
            }
            redirect
        };
        let mut node = AstNode::unary(text, NodeType::Print, redirect).spanning(start);
        if !self.check(TokenKind::Semi) && !self.check(TokenKind::RBrace) && !self.is_eof() {
            loop {
                node.append_child(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(node)
    }

    /// Optional `> target`, `>> target` or `| command` right after an output
    /// keyword.
    fn parse_redirect(&mut self) -> Result<AstNode, SyntaxError> {
        let span = self.current_span();
        let node_type = if self.check_op(">") {
            NodeType::RedirectWrite
        } else if self.check_op(">>") {
            NodeType::RedirectAppend
        } else if self.check_op("|") {
            NodeType::RedirectPipe
        } else {
            return Ok(AstNode::new("no_redirect", NodeType::NoRedirect, span));
        };
        let op_text = match self.advance().kind {
            TokenKind::Op(op) => op,
            _ => ">",
        };
        let target_span = self.current_span();
        let target = if node_type != NodeType::RedirectPipe && self.check_identifier("stdout") {
            self.advance();
            AstNode::new("stdout", NodeType::Stdout, target_span)
        } else if node_type != NodeType::RedirectPipe && self.check_identifier("stderr") {
            self.advance();
            AstNode::new("stderr", NodeType::Stderr, target_span)
        } else {
            self.parse_expression()?
        };
        Ok(AstNode::unary(op_text, node_type, target).spanning(span))
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Result<AstNode, SyntaxError> {
        let condition = self.parse_binary(2)?;
        if self.matches(TokenKind::Question) {
            let if_true = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let if_false = self.parse_expression()?;
            return Ok(AstNode::ternary("?:", NodeType::Operator, condition, if_true, if_false));
        }
        Ok(condition)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<AstNode, SyntaxError> {
        let mut left = self.parse_unary()?;

        loop {
            let (op, prec) = match self.current_binary_op() {
                Some(info) => info,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            left = AstNode::binary(op, NodeType::Operator, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<AstNode, SyntaxError> {
        if let Some(TokenKind::Op(op @ ("!" | "~" | "+" | "-" | ".+" | ".-"))) = self.peek_kind() {
            let span = self.advance().span;
            let operand = self.parse_unary()?;
            if op == "-" && operand.is(NodeType::NumericLiteral) && !operand.text.starts_with(['-', '+']) {
                let text = format!("-{}", operand.text);
                return Ok(AstNode::new(text, NodeType::NumericLiteral, span.join(operand.span)));
            }
            return Ok(AstNode::unary(op, NodeType::Operator, operand).spanning(span));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<AstNode, SyntaxError> {
        let base = self.parse_postfix()?;
        if self.matches_op("**") {
            let exponent = self.parse_unary()?;
            return Ok(AstNode::binary("**", NodeType::Operator, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<AstNode, SyntaxError> {
        let mut expr = self.parse_primary()?;
        if !self.check(TokenKind::LBracket) {
            return Ok(expr);
        }
        if !matches!(
            expr.node_type,
            NodeType::OosvarName
                | NodeType::IndirectOosvarName
                | NodeType::FullOosvar
                | NodeType::LocalVariable
                | NodeType::FullSrec
                | NodeType::FunctionCallsite
                | NodeType::MapLiteral
        ) {
            return Err(self.error_here(&format!("Cannot index {}", expr.node_type)));
        }
        let base_span = expr.span;
        let mut indexed = AstNode::zary("[]", NodeType::IndexedValue, base_span);
        indexed.append_child(expr);
        while self.matches(TokenKind::LBracket) {
            indexed.append_child(self.parse_expression()?);
            let close = self.expect(TokenKind::RBracket)?.span;
            indexed.span = indexed.span.join(close);
        }
        expr = indexed;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<AstNode, SyntaxError> {
        let span = self.current_span();
        match self.peek_kind() {
            Some(TokenKind::Number(text)) => {
                self.advance();
                Ok(AstNode::new(text, NodeType::NumericLiteral, span))
            }
            Some(TokenKind::String(text)) => {
                self.advance();
                Ok(AstNode::new(text, NodeType::StringLiteral, span))
            }
            Some(TokenKind::RegexI(text)) => {
                self.advance();
                Ok(AstNode::new(text, NodeType::RegexCaseInsensitive, span))
            }
            Some(TokenKind::True) => {
                self.advance();
                Ok(AstNode::new("true", NodeType::BooleanLiteral, span))
            }
            Some(TokenKind::False) => {
                self.advance();
                Ok(AstNode::new("false", NodeType::BooleanLiteral, span))
            }
            Some(TokenKind::Field(name)) => {
                self.advance();
                Ok(AstNode::new(name, NodeType::FieldName, span))
            }
            Some(TokenKind::FieldStar) => {
                self.advance();
                Ok(AstNode::new("$*", NodeType::FullSrec, span))
            }
            Some(TokenKind::FieldBracket) => {
                self.advance();
                if self.check(TokenKind::LBracket) {
                    return self.parse_positional(span);
                }
                let name = self.parse_expression()?;
                let close = self.expect(TokenKind::RBracket)?.span;
                Ok(AstNode::unary("$[]", NodeType::IndirectFieldName, name).spanning(span.join(close)))
            }
            Some(TokenKind::Oosvar(name)) => {
                self.advance();
                Ok(AstNode::new(name, NodeType::OosvarName, span))
            }
            Some(TokenKind::OosvarStar) => {
                self.advance();
                Ok(AstNode::new("@*", NodeType::FullOosvar, span))
            }
            Some(TokenKind::OosvarBracket) => {
                self.advance();
                let name = self.parse_expression()?;
                let close = self.expect(TokenKind::RBracket)?.span;
                Ok(AstNode::unary("@[]", NodeType::IndirectOosvarName, name).spanning(span.join(close)))
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            Some(TokenKind::LBrace) => self.parse_map_literal(),
            Some(TokenKind::Identifier(name)) => self.parse_identifier_expression(name),
            Some(other) => Err(self
                .error_here(&format!("Unexpected {}", other.describe()))
                .with_label("expected an expression")),
            None => Err(self.error_here("Unexpected end of expression")),
        }
    }

    /// `$[[n]]` or `$[[[n]]]`, entered with `$[` already consumed.
    fn parse_positional(&mut self, start: Span) -> Result<AstNode, SyntaxError> {
        self.expect(TokenKind::LBracket)?;
        let by_value = self.matches(TokenKind::LBracket);
        let index = self.parse_expression()?;
        let closers = if by_value { 3 } else { 2 };
        let mut close = start;
        for _ in 0..closers {
            close = self.expect(TokenKind::RBracket)?.span;
        }
        let (text, node_type) = if by_value {
            ("$[[[]]]", NodeType::PositionalFieldValue)
        } else {
            ("$[[]]", NodeType::PositionalFieldName)
        };
        Ok(AstNode::unary(text, node_type, index).spanning(start.join(close)))
    }

    fn parse_identifier_expression(&mut self, name: String) -> Result<AstNode, SyntaxError> {
        let span = self.advance().span;
        if self.check(TokenKind::LParen) {
            let mut call = AstNode::zary(name, NodeType::FunctionCallsite, span);
            for arg in self.parse_arguments()? {
                call.append_child(arg);
            }
            return Ok(call.spanning(self.span_from(span)));
        }
        if name == "ENV" && self.matches(TokenKind::LBracket) {
            let key = self.parse_expression()?;
            let close = self.expect(TokenKind::RBracket)?.span;
            return Ok(AstNode::unary("ENV", NodeType::EnvironmentVariable, key).spanning(span.join(close)));
        }
        if CONTEXT_VARIABLES.contains(&name.as_str()) {
            return Ok(AstNode::new(name, NodeType::ContextVariable, span));
        }
        Ok(AstNode::new(name, NodeType::LocalVariable, span))
    }

    fn parse_arguments(&mut self) -> Result<Vec<AstNode>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_map_literal(&mut self) -> Result<AstNode, SyntaxError> {
        let open = self.expect(TokenKind::LBrace)?.span;
        let mut map = AstNode::zary("{}", NodeType::MapLiteral, open);
        if !self.check(TokenKind::RBrace) {
            loop {
                let key = self.parse_expression()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expression()?;
                map.append_child(AstNode::binary(":", NodeType::MapLiteralPair, key, value));
                if !self.matches(TokenKind::Comma) || self.check(TokenKind::RBrace) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBrace)?.span;
        map.span = map.span.join(close);
        Ok(map)
    }

    fn parse_parenthesized(&mut self) -> Result<AstNode, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    fn current_binary_op(&self) -> Option<(&'static str, u8)> {
        let Some(TokenKind::Op(op)) = self.peek_kind() else {
            return None;
        };
        let prec = match op {
            "||" => 2,
            "^^" => 3,
            "&&" => 4,
            "=~" | "!=~" => 5,
            "==" | "!=" | "<" | "<=" | ">" | ">=" => 6,
            "|" => 7,
            "^" => 8,
            "&" => 9,
            "<<" | ">>" | ">>>" => 10,
            "+" | "-" | ".+" | ".-" | "." => 11,
            "*" | "/" | "//" | "%" | ".*" | "./" | ".//" => 12,
            _ => return None,
        };
        Some((op, prec))
    }

    // ---- token helpers ----

    fn expect_identifier(&mut self, msg: &str) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect_type_name(&mut self) -> Result<String, SyntaxError> {
        let name = self.expect_identifier("Expected a type name")?;
        if TYPE_NAMES.contains(&name.as_str()) {
            Ok(name)
        } else {
            self.rewind();
            Err(self
                .error_here(&format!("Unknown type `{name}`"))
                .with_help(format!("types are {}", TYPE_NAMES.join(", "))))
        }
    }

    fn expect_local(&mut self, msg: &str) -> Result<AstNode, SyntaxError> {
        let span = self.current_span();
        let name = self.expect_identifier(msg)?;
        Ok(AstNode::new(name, NodeType::LocalVariable, span))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, SyntaxError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            let found = self
                .peek_kind()
                .map(|found| found.describe())
                .unwrap_or_else(|| "end of expression".to_string());
            Err(self
                .error_here(&format!("Expected {}, found {found}", kind.describe()))
                .with_label("unexpected token"))
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        matches!(self.peek_kind(), Some(tk) if tk == kind)
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Op(found)) if found == op)
    }

    fn check_identifier(&self, name: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Identifier(found)) if found == name)
    }

    fn previous_was(&self, kind: TokenKind) -> bool {
        self.pos > 0 && self.tokens.get(self.pos - 1).is_some_and(|token| token.kind == kind)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind.clone())
    }

    fn peek_kind_n(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        self.pos = (self.pos + 1).min(self.tokens.len());
        &self.tokens[index]
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn span_from(&self, start: Span) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(previous) => start.join(previous.span),
            None => start,
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message.to_string(), self.current_span())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    /// Skips to just past the next `;` so that later statements still get
    /// checked.
    fn synchronize(&mut self) {
        while !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                return;
            }
            self.advance();
        }
    }

    fn rewind(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> AstNode {
        parse_program(source).unwrap_or_else(|errs| panic!("parse failed: {:?}", errs.errors))
    }

    fn first_statement(source: &str) -> AstNode {
        parse(source).children()[0].clone()
    }

    #[test]
    fn precedence_follows_the_table() {
        let statement = first_statement("$z = 1 + 2 * 3 . 4");
        let rhs = &statement.children()[1];
        assert_eq!(rhs.text, ".");
        assert_eq!(rhs.children()[0].text, "+");
        assert_eq!(rhs.children()[0].children()[1].text, "*");
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_unary_minus() {
        let statement = first_statement("$z = -2 ** 3 ** 2");
        let rhs = &statement.children()[1];
        assert_eq!(rhs.text, "-");
        let power = &rhs.children()[0];
        assert_eq!(power.text, "**");
        assert_eq!(power.children()[1].text, "**");
    }

    #[test]
    fn ternary_is_lowest() {
        let statement = first_statement("$z = $x > 1 || $y ? \"a\" : \"b\"");
        let rhs = &statement.children()[1];
        assert_eq!(rhs.text, "?:");
        assert_eq!(rhs.children()[0].text, "||");
    }

    #[test]
    fn assignment_kinds() {
        let ast = parse("$x = 1; @s[$a][$b] = 2; var m = {}; m[1] = 3; $* = {}; @* = {}; ENV[\"HOME\"] = \"/\"");
        let types: Vec<NodeType> = ast.children().iter().map(|s| s.node_type).collect();
        assert_eq!(
            types,
            [
                NodeType::SrecAssignment,
                NodeType::OosvarAssignment,
                NodeType::LocalDefinition,
                NodeType::LocalAssignment,
                NodeType::FullSrecAssignment,
                NodeType::FullOosvarAssignment,
                NodeType::EnvAssignment,
            ]
        );
    }

    #[test]
    fn compound_assignment_desugars_with_a_copy() {
        let statement = first_statement("@sum[$a] += $x");
        assert_eq!(statement.node_type, NodeType::OosvarAssignment);
        let rhs = &statement.children()[1];
        assert_eq!(rhs.text, "+");
        assert_eq!(rhs.children()[0], statement.children()[0]);

        let statement = first_statement("@low min= $x");
        let rhs = &statement.children()[1];
        assert_eq!(rhs.node_type, NodeType::FunctionCallsite);
        assert_eq!(rhs.text, "min");
    }

    #[test]
    fn typed_keyword_is_a_call_when_followed_by_paren() {
        let statement = first_statement("$y = int($x)");
        assert_eq!(statement.children()[1].node_type, NodeType::FunctionCallsite);
        let statement = first_statement("int n = 1");
        assert_eq!(statement.node_type, NodeType::LocalDefinition);
        assert_eq!(statement.text, "n");
        assert_eq!(statement.children()[0].text, "int");
    }

    #[test]
    fn blocks_need_no_trailing_semicolon() {
        let ast = parse("begin { @count = 0 } @count += 1; end { emit @count }");
        let types: Vec<NodeType> = ast.children().iter().map(|s| s.node_type).collect();
        assert_eq!(types, [NodeType::BeginBlock, NodeType::OosvarAssignment, NodeType::EndBlock]);
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let errs = parse_program("$x = 1 $y = 2").expect_err("should fail");
        assert!(errs.errors[0].message.contains("Expected `;`"));
    }

    #[test]
    fn func_and_subr_definitions() {
        let ast = parse("func f(str s, n): num { return strlen(s) + n } subr p(a) { print a } call p(1)");
        let func = &ast.children()[0];
        assert_eq!(func.node_type, NodeType::FuncDef);
        assert_eq!(func.text, "f");
        let params = &func.children()[0];
        assert_eq!(params.children()[0].text, "s");
        assert_eq!(params.children()[0].children()[0].text, "str");
        assert_eq!(params.children()[1].children()[0].text, "any");
        assert_eq!(func.children()[1].text, "num");
        assert_eq!(ast.children()[1].node_type, NodeType::SubrDef);
        assert_eq!(ast.children()[2].node_type, NodeType::SubrCallsite);
    }

    #[test]
    fn zero_argument_call_has_empty_children() {
        let statement = first_statement("$y = mapsum()");
        assert_eq!(statement.children()[1].children, Some(Vec::new()));
    }

    #[test]
    fn for_loop_forms() {
        let ast = parse(
            "for (k, v in $*) { } for ((k1, k2), v in @s) { } for (k in @s) { } \
             for (int i = 0; i < 10; i += 1) { }",
        );
        let types: Vec<NodeType> = ast.children().iter().map(|s| s.node_type).collect();
        assert_eq!(
            types,
            [NodeType::ForKeyValue, NodeType::ForMultiKey, NodeType::ForSingle, NodeType::TripleFor]
        );
        let triple = &ast.children()[3];
        assert_eq!(triple.children()[0].children()[0].node_type, NodeType::LocalDefinition);
        assert_eq!(triple.children()[1].children()[0].node_type, NodeType::BareBoolean);
        assert_eq!(triple.children()[2].children()[0].node_type, NodeType::LocalAssignment);
    }

    #[test]
    fn emit_variants() {
        let statement = first_statement("emit @sum, \"a\", \"b\"");
        assert_eq!(statement.node_type, NodeType::Emit);
        assert_eq!(statement.children()[0].children().len(), 1);
        assert_eq!(statement.children()[1].children().len(), 2);
        assert!(statement.children()[2].is(NodeType::NoRedirect));

        let statement = first_statement("emitp (@count, @sum), \"a\"");
        assert_eq!(statement.node_type, NodeType::EmitP);
        assert_eq!(statement.children()[0].children().len(), 2);

        let statement = first_statement("emit > \"out.txt\", mapsum({\"a\":1}, @x)");
        assert!(statement.children()[2].is(NodeType::RedirectWrite));
        assert_eq!(statement.children()[0].children()[0].node_type, NodeType::FunctionCallsite);

        let statement = first_statement("emit all");
        assert!(statement.children()[0].children()[0].is(NodeType::FullOosvar));
    }

    #[test]
    fn redirects() {
        let statement = first_statement("tee > $a . \".csv\", $*");
        assert!(statement.children()[0].is(NodeType::RedirectWrite));
        let statement = first_statement("print > stderr, \"x\", $y");
        assert!(statement.children()[0].children()[0].is(NodeType::Stderr));
        assert_eq!(statement.children().len(), 3);
        let statement = first_statement("print | \"sort\", $x");
        assert!(statement.children()[0].is(NodeType::RedirectPipe));
        let statement = first_statement("eprint \"oops\"");
        assert!(statement.children()[0].is(NodeType::Stderr));
    }

    #[test]
    fn dump_forms() {
        let statement = first_statement("dump");
        assert_eq!(statement.children().len(), 1);
        let statement = first_statement("dump @x");
        assert_eq!(statement.children().len(), 2);
        let statement = first_statement("dump > \"f\", @x");
        assert!(statement.children()[0].is(NodeType::RedirectWrite));
        assert_eq!(statement.children().len(), 2);
    }

    #[test]
    fn pattern_action_and_bare_boolean() {
        let ast = parse("NR == 1 { $first = true } $x > 0");
        assert_eq!(ast.children()[0].node_type, NodeType::PatternAction);
        assert_eq!(ast.children()[0].children()[0].children()[0].node_type, NodeType::ContextVariable);
        assert_eq!(ast.children()[1].node_type, NodeType::BareBoolean);
    }

    #[test]
    fn if_chain_items() {
        let statement = first_statement("if ($x > 1) { $y = 1 } elif ($x > 0) { $y = 2 } else { $y = 3 }");
        let texts: Vec<&str> = statement.children().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["if", "elif", "else"]);
    }

    #[test]
    fn unset_targets() {
        let statement = first_statement("unset $x, @y[1], all");
        let types: Vec<NodeType> = statement.children().iter().map(|s| s.node_type).collect();
        assert_eq!(types, [NodeType::FieldName, NodeType::IndexedValue, NodeType::FullOosvar]);
        assert!(parse_program("unset 1").is_err());
    }

    #[test]
    fn cannot_assign_to_literal() {
        let errs = parse_program("1 = 2").expect_err("should fail");
        assert!(errs.errors[0].message.contains("Cannot assign"));
    }

    #[test]
    fn lexer_errors_become_syntax_errors() {
        let errs = parse_program("$x = \"unterminated").expect_err("should fail");
        assert_eq!(errs.errors.len(), 1);
        assert!(errs.to_string().starts_with("mlr: cannot parse DSL expression"));
    }
}
