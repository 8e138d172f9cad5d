use super::output::EmitKind;
use super::*;
use crate::io::{redirect::OutputTarget, reader::flatten_to_record};
use crate::runtime::xvalue::{Level, MapKey};
use std::{env, ops::ControlFlow};

impl<'r> Compiler<'r> {
    pub(super) fn build_block(&mut self, node: &AstNode) -> Result<Block, CompileError> {
        if !node.is(NodeType::StatementList) {
            return Err(CompileError::malformed(node));
        }
        let statements = node
            .children()
            .iter()
            .map(|statement| self.build_statement(statement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Block::new(statements))
    }

    pub(super) fn build_statement(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        match node.node_type {
            NodeType::BeginBlock | NodeType::EndBlock | NodeType::FuncDef | NodeType::SubrDef => {
                Err(CompileError::misplaced(
                    format!("{} blocks may only be declared at top level", node.text),
                    node,
                ))
            }
            NodeType::SrecAssignment => self.field_assignment(node),
            NodeType::PositionalNameAssignment => self.positional_name_assignment(node),
            NodeType::FullSrecAssignment => self.full_srec_assignment(node),
            NodeType::OosvarAssignment => self.oosvar_assignment(node),
            NodeType::FullOosvarAssignment => self.full_oosvar_assignment(node),
            NodeType::LocalDefinition => self.local_definition(node),
            NodeType::LocalAssignment => self.local_assignment(node),
            NodeType::EnvAssignment => self.env_assignment(node),
            NodeType::Unset => self.unset(node),
            NodeType::FilterStatement => self.filter_statement(node),
            NodeType::BareBoolean => self.bare_boolean(node),
            NodeType::PatternAction => self.pattern_action(node),
            NodeType::IfChain => self.if_chain(node),
            NodeType::WhileLoop => self.while_loop(node),
            NodeType::DoWhileLoop => self.do_while_loop(node),
            NodeType::ForSingle | NodeType::ForKeyValue => self.for_map(node),
            NodeType::ForMultiKey => self.for_multi_key(node),
            NodeType::TripleFor => self.triple_for(node),
            NodeType::Break | NodeType::Continue => {
                if self.placement.loop_depth == 0 {
                    return Err(CompileError::misplaced(
                        format!("{} statements are only valid within for/do/while loops", node.text),
                        node,
                    ));
                }
                if node.is(NodeType::Break) {
                    Ok(Box::new(|_| Ok(Some(FlowSignal::Break))))
                } else {
                    Ok(Box::new(|_| Ok(Some(FlowSignal::Continue))))
                }
            }
            NodeType::Return => self.return_statement(node),
            NodeType::SubrCallsite => self.subr_call(node),
            NodeType::Emit => self.build_emit(node, EmitKind::Emit),
            NodeType::EmitP => self.build_emit(node, EmitKind::EmitP),
            NodeType::EmitF => self.build_emitf(node),
            NodeType::Dump => self.build_dump(node, OutputTarget::Stdout),
            NodeType::Edump => self.build_dump(node, OutputTarget::Stderr),
            NodeType::Print => self.build_print(node),
            NodeType::Tee => self.build_tee(node),
            _ => Err(CompileError::malformed(node)),
        }
    }

    /// `$`-writes need a record: not in `begin`/`end`, and not in `filter`.
    fn check_record_write(&self, node: &AstNode) -> Result<(), CompileError> {
        if matches!(self.placement.kind, BlockKind::Begin | BlockKind::End) {
            return Err(CompileError::misplaced(
                "assignments to $-variables are not valid within begin or end blocks",
                node,
            ));
        }
        if self.options.verb == Verb::Filter {
            return Err(CompileError::misplaced("filter: assignments to $-variables are not valid", node));
        }
        Ok(())
    }

    fn assignment_sides<'n>(&self, node: &'n AstNode) -> Result<(&'n AstNode, &'n AstNode), CompileError> {
        match node.children() {
            [lhs, rhs] => Ok((lhs, rhs)),
            _ => Err(CompileError::malformed(node)),
        }
    }

    fn field_name(&mut self, node: &AstNode) -> Result<ScalarFn, CompileError> {
        match node.node_type {
            NodeType::FieldName => {
                let name = Mlrval::from_string(node.text.clone());
                Ok(Box::new(move |_| Ok(name.clone())))
            }
            NodeType::IndirectFieldName => self.build_scalar(child(node, 0)?),
            NodeType::PositionalFieldName | NodeType::PositionalFieldValue => {
                let index = self.build_scalar(child(node, 0)?)?;
                Ok(Box::new(move |state| {
                    let Some(n) = positional_index(&index(state)?)? else {
                        return Ok(Mlrval::Absent);
                    };
                    Ok(state
                        .positional_name(n)
                        .map_or(Mlrval::Absent, |name| Mlrval::String(name.to_string())))
                }))
            }
            _ => Err(CompileError::malformed(node)),
        }
    }

    fn field_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        self.check_record_write(node)?;
        let (lhs, rhs) = self.assignment_sides(node)?;
        let name = self.field_name(lhs)?;
        let rhs = self.build_map(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?.into_owned(state);
            let name = name(state)?;
            if !name.is_absent() {
                state.set_field(&name.to_string(), &value);
            }
            Ok(None)
        }))
    }

    /// `$[[n]] = "new"` renames field `n` and keeps its value.
    fn positional_name_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        self.check_record_write(node)?;
        let (lhs, rhs) = self.assignment_sides(node)?;
        let index = self.build_scalar(child(lhs, 0)?)?;
        let rhs = self.build_scalar(rhs)?;
        Ok(Box::new(move |state| {
            let new_name = rhs(state)?;
            let Some(n) = positional_index(&index(state)?)? else {
                return Ok(None);
            };
            if !new_name.is_absent() {
                let new_name = state.render(&new_name);
                state.rename_positional(n, &new_name);
            }
            Ok(None)
        }))
    }

    fn full_srec_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        self.check_record_write(node)?;
        let (_, rhs) = self.assignment_sides(node)?;
        let rhs = self.build_map(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?.into_owned(state);
            if value.is_map() && state.record.is_some() {
                let record = flatten_to_record(&value, &state.options.oflatsep, &state.options.ofmt);
                state.record = Some(record);
            }
            Ok(None)
        }))
    }

    fn oosvar_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let (lhs, rhs) = self.assignment_sides(node)?;
        let lhs = self.build_map(lhs)?;
        let rhs = self.build_map(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?.into_owned(state);
            if value.is_absent() {
                return Ok(None);
            }
            if let XvalueHandle::Oosvar(path) = lhs(state)? {
                state.oosvars.put(&path, value);
            }
            Ok(None)
        }))
    }

    fn full_oosvar_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let (_, rhs) = self.assignment_sides(node)?;
        let rhs = self.build_map(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?.into_owned(state);
            if value.is_map() {
                state.oosvars = value;
            }
            Ok(None)
        }))
    }

    fn local_definition(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [type_decl, rhs] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let declared = declared_type(type_decl)?;
        let name = node.text.clone();
        let rhs = self.build_map(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?.into_owned(state);
            state.locals.define(&name, declared, value)?;
            Ok(None)
        }))
    }

    fn local_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let (lhs, rhs) = self.assignment_sides(node)?;
        let lhs = self.build_map(lhs)?;
        let rhs = self.build_map(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?.into_owned(state);
            if value.is_absent() {
                return Ok(None);
            }
            if let XvalueHandle::Local { name, keys } = lhs(state)? {
                state.locals.assign(&name, &keys, value)?;
            }
            Ok(None)
        }))
    }

    fn env_assignment(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let (lhs, rhs) = self.assignment_sides(node)?;
        let name = self.build_scalar(child(lhs, 0)?)?;
        let rhs = self.build_scalar(rhs)?;
        Ok(Box::new(move |state| {
            let value = rhs(state)?;
            let name = name(state)?;
            if !name.is_absent() && !value.is_absent() {
                env::set_var(name.to_string(), value.to_string());
            }
            Ok(None)
        }))
    }

    fn unset(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let targets = node
            .children()
            .iter()
            .map(|target| self.unset_target(target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(move |state| {
            for target in &targets {
                target(state)?;
            }
            Ok(None)
        }))
    }

    fn unset_target(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        match node.node_type {
            NodeType::FieldName
            | NodeType::IndirectFieldName
            | NodeType::PositionalFieldName
            | NodeType::PositionalFieldValue => {
                self.check_record_write(node)?;
                let name = self.field_name(node)?;
                Ok(Box::new(move |state| {
                    let name = name(state)?;
                    if let (false, Some(record)) = (name.is_absent(), state.record.as_mut()) {
                        record.shift_remove(&name.to_string());
                    }
                    Ok(None)
                }))
            }
            NodeType::FullSrec => {
                self.check_record_write(node)?;
                Ok(Box::new(|state| {
                    if let Some(record) = state.record.as_mut() {
                        record.clear();
                    }
                    Ok(None)
                }))
            }
            NodeType::IndexedValue if node.child(0).is_some_and(|base| base.is(NodeType::FullSrec)) => {
                self.check_record_write(node)?;
                let [_, key] = node.children() else {
                    return Err(CompileError::misplaced("$* may only be unset one level deep", node));
                };
                let key = self.build_scalar(key)?;
                Ok(Box::new(move |state| {
                    let key = key(state)?;
                    if let (false, Some(record)) = (key.is_absent(), state.record.as_mut()) {
                        record.shift_remove(&key.to_string());
                    }
                    Ok(None)
                }))
            }
            _ => {
                let target = self.build_map(node)?;
                Ok(Box::new(move |state| {
                    match target(state)? {
                        XvalueHandle::Oosvar(path) if path.is_empty() => state.oosvars = Xvalue::empty_map(),
                        XvalueHandle::Oosvar(path) => {
                            state.oosvars.remove(&path);
                        }
                        XvalueHandle::Local { name, keys } => state.locals.unset(&name, &keys),
                        XvalueHandle::Ephemeral(_) | XvalueHandle::Absent => {}
                    }
                    Ok(None)
                }))
            }
        }
    }

    fn filter_statement(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        if self.options.verb == Verb::Filter {
            return Err(CompileError::misplaced(
                "filter expressions must not also contain the \"filter\" keyword",
                node,
            ));
        }
        self.filter_condition(child(node, 0)?)
    }

    /// In the `filter` verb a bare boolean in the main block decides the
    /// record's fate; anywhere else it is evaluated for its side effects.
    fn bare_boolean(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let expression = child(node, 0)?;
        if self.options.verb == Verb::Filter && self.placement.kind == BlockKind::Main {
            return self.filter_condition(expression);
        }
        let expression = self.build_map(expression)?;
        Ok(Box::new(move |state| {
            expression(state)?;
            Ok(None)
        }))
    }

    /// Absent leaves the current decision alone.
    fn filter_condition(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let test = self.build_scalar(node)?;
        Ok(Box::new(move |state| {
            let value = test(state)?;
            if !value.is_absent() {
                state.filter = condition(&value, "filter")?;
            }
            Ok(None)
        }))
    }

    fn pattern_action(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [test, block] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let test = self.build_scalar(test)?;
        let block = self.build_block(block)?;
        Ok(Box::new(move |state| {
            if condition(&test(state)?, "pattern-action")? {
                block.execute(state)
            } else {
                Ok(None)
            }
        }))
    }

    fn if_chain(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let mut branches = Vec::with_capacity(node.children().len());
        for item in node.children() {
            let branch = match item.children() {
                [test, block] => (Some(self.build_scalar(test)?), self.build_block(block)?),
                [block] => (None, self.build_block(block)?),
                _ => return Err(CompileError::malformed(item)),
            };
            branches.push(branch);
        }
        Ok(Box::new(move |state| {
            for (test, block) in &branches {
                let taken = match test {
                    Some(test) => condition(&test(state)?, "if")?,
                    None => true,
                };
                if taken {
                    return block.execute(state);
                }
            }
            Ok(None)
        }))
    }

    fn while_loop(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [test, block] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let test = self.build_scalar(test)?;
        let block = self.within_loop(|c| c.build_block(block))?;
        Ok(Box::new(move |state| {
            while condition(&test(state)?, "while")? {
                if let ControlFlow::Break(flow) = after_body(block.execute(state)?) {
                    return Ok(flow);
                }
            }
            Ok(None)
        }))
    }

    fn do_while_loop(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [block, test] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let block = self.within_loop(|c| c.build_block(block))?;
        let test = self.build_scalar(test)?;
        Ok(Box::new(move |state| {
            loop {
                if let ControlFlow::Break(flow) = after_body(block.execute(state)?) {
                    return Ok(flow);
                }
                if !condition(&test(state)?, "do-while")? {
                    return Ok(None);
                }
            }
        }))
    }

    /// `for (k in m)` and `for (k, v in m)`. The loop walks a copy, so the
    /// body may modify the map it iterates over.
    fn for_map(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let (key, value, iterable, block) = match node.children() {
            [key, iterable, block] => (key, None, iterable, block),
            [key, value, iterable, block] => (key, Some(value), iterable, block),
            _ => return Err(CompileError::malformed(node)),
        };
        let key: Rc<str> = Rc::from(key.text.as_str());
        let value: Option<Rc<str>> = value.map(|value| Rc::from(value.text.as_str()));
        let iterable = self.build_map(iterable)?;
        let block = self.within_loop(|c| c.build_block(block))?;
        Ok(Box::new(move |state| {
            let Xvalue::Map(level) = iterable(state)?.into_owned(state) else {
                return Ok(None);
            };
            for (k, v) in level {
                let mut bindings = vec![(Rc::clone(&key), Xvalue::Terminal(k.to_mlrval()))];
                if let Some(value) = &value {
                    bindings.push((Rc::clone(value), v));
                }
                if let ControlFlow::Break(flow) = after_body(run_bound(state, &block, bindings)?) {
                    return Ok(flow);
                }
            }
            Ok(None)
        }))
    }

    /// `for ((k1, k2), v in m)` descends one level per key variable.
    fn for_multi_key(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [keys, value, iterable, block] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let keys: Vec<Rc<str>> = keys.children().iter().map(|key| Rc::from(key.text.as_str())).collect();
        let value: Rc<str> = Rc::from(value.text.as_str());
        let iterable = self.build_map(iterable)?;
        let block = self.within_loop(|c| c.build_block(block))?;
        Ok(Box::new(move |state| {
            let Xvalue::Map(level) = iterable(state)?.into_owned(state) else {
                return Ok(None);
            };
            let mut rows = Vec::new();
            collect_rows(level, keys.len(), &mut Vec::new(), &mut rows);
            for (path, leaf) in rows {
                let mut bindings: Vec<(Rc<str>, Xvalue)> = keys
                    .iter()
                    .cloned()
                    .zip(path.iter().map(|key| Xvalue::Terminal(key.to_mlrval())))
                    .collect();
                bindings.push((Rc::clone(&value), leaf));
                if let ControlFlow::Break(flow) = after_body(run_bound(state, &block, bindings)?) {
                    return Ok(flow);
                }
            }
            Ok(None)
        }))
    }

    fn triple_for(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let [init, test, update, block] = node.children() else {
            return Err(CompileError::malformed(node));
        };
        let init = self.statement_list(init)?;
        let test = match test.children() {
            [] => None,
            [bare] => Some(self.build_scalar(child(bare, 0)?)?),
            _ => return Err(CompileError::misplaced("for-loop continuation must be a single expression", test)),
        };
        let update = self.statement_list(update)?;
        let block = self.within_loop(|c| c.build_block(block))?;
        Ok(Box::new(move |state| {
            state.locals.push_scope();
            let result = run_triple_for(state, &init, test.as_ref(), &update, &block);
            state.locals.pop_scope();
            result
        }))
    }

    fn statement_list(&mut self, node: &AstNode) -> Result<Vec<StatementFn>, CompileError> {
        node.children()
            .iter()
            .map(|statement| self.build_statement(statement))
            .collect()
    }

    fn return_statement(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        match (self.placement.kind, node.child(0)) {
            (BlockKind::Func, Some(value)) => {
                let value = self.build_map(value)?;
                Ok(Box::new(move |state| {
                    let value = value(state)?.into_owned(state);
                    Ok(Some(FlowSignal::Return(value)))
                }))
            }
            (BlockKind::Func, None) => Err(CompileError::misplaced(
                "return statements in func blocks must return a value",
                node,
            )),
            (BlockKind::Subr, None) => Ok(Box::new(|_| {
                Ok(Some(FlowSignal::Return(Xvalue::Terminal(Mlrval::Absent))))
            })),
            (BlockKind::Subr, Some(_)) => Err(CompileError::misplaced(
                "return statements in subr blocks must not return a value",
                node,
            )),
            _ => Err(CompileError::misplaced(
                "return statements are only valid within func/subr blocks",
                node,
            )),
        }
    }

    fn subr_call(&mut self, node: &AstNode) -> Result<StatementFn, CompileError> {
        let slot = self
            .functions
            .build_subr_callsite(&node.text, node.children().len(), node.span)?;
        let args = node
            .children()
            .iter()
            .map(|arg| self.build_map(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(move |state| {
            let handles = args.iter().map(|arg| arg(state)).collect::<RuntimeResult<Vec<_>>>()?;
            let values = handles.into_iter().map(|handle| handle.into_owned(state)).collect();
            let subroutine = state.functions.subroutine(&slot)?;
            subroutine.invoke(state, values)?;
            Ok(None)
        }))
    }
}

/// `Break` ends the loop; `Return` ends it and travels outward.
fn after_body(flow: Option<FlowSignal>) -> ControlFlow<Option<FlowSignal>> {
    match flow {
        Some(FlowSignal::Break) => ControlFlow::Break(None),
        Some(ret @ FlowSignal::Return(_)) => ControlFlow::Break(Some(ret)),
        Some(FlowSignal::Continue) | None => ControlFlow::Continue(()),
    }
}

/// Runs a loop body with its loop variables bound in a scope of their own.
fn run_bound(state: &mut State, block: &Block, bindings: Vec<(Rc<str>, Xvalue)>) -> RuntimeResult<Option<FlowSignal>> {
    state.locals.push_scope();
    let result = bindings
        .into_iter()
        .try_for_each(|(name, value)| state.locals.define(&name, DeclaredType::Any, value))
        .and_then(|()| block.execute(state));
    state.locals.pop_scope();
    result
}

fn run_triple_for(
    state: &mut State,
    init: &[StatementFn],
    test: Option<&ScalarFn>,
    update: &[StatementFn],
    block: &Block,
) -> RuntimeResult<Option<FlowSignal>> {
    for statement in init {
        statement(state)?;
    }
    loop {
        if let Some(test) = test {
            if !condition(&test(state)?, "for-loop")? {
                return Ok(None);
            }
        }
        if let ControlFlow::Break(flow) = after_body(block.execute(state)?) {
            return Ok(flow);
        }
        for statement in update {
            statement(state)?;
        }
    }
}

/// Rows of `depth` keys plus the value found under them. Branches that end
/// early in a terminal are skipped.
fn collect_rows(level: Level, depth: usize, prefix: &mut Vec<MapKey>, rows: &mut Vec<(Vec<MapKey>, Xvalue)>) {
    for (key, value) in level {
        prefix.push(key);
        match value {
            value if depth <= 1 => rows.push((prefix.clone(), value)),
            Xvalue::Map(child) => collect_rows(child, depth - 1, prefix, rows),
            Xvalue::Terminal(_) => {}
        }
        prefix.pop();
    }
}

/// Index of a positional-name write; absent skips the write.
fn positional_index(index: &Mlrval) -> RuntimeResult<Option<i64>> {
    match index {
        Mlrval::Absent => Ok(None),
        other => other
            .as_int()
            .map(Some)
            .ok_or_else(|| RuntimeError::PositionalIndex { got: other.to_string() }),
    }
}
