//! Code block and flow control management for the semantic builder.

use crate::builder::{BlockEntry, SemanticBuilder, StackEntry};
use crate::ir::block::Block;
use crate::ir::error::IrError;
use crate::ir::ids::ScopeId;
use crate::ir::operation::Operation;
use crate::ir::response::ResponseMapEntry;
use crate::ir::scope::Scope;
use crate::ir::types::ValueType;

/// Discriminator for an open (or expected) code block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Free,
    /// Function definition during preparse; the function is created on
    /// exit.
    Function,
    /// Function body during the main parse; the function already exists.
    FunctionBody,
    DoLoop,
    If,
    ElseIf,
    /// The wrapper block borrowed out of an `If` while an `elseif` arm is
    /// parsed; reinstalled on exit.
    ElseIfWrapper {
        if_index: usize,
    },
    Else,
    WhileLoop,
    Task,
    Thread,
    MessageDispatch {
        message: crate::ir::ids::StringId,
        payload_types: Vec<ValueType>,
        aux: ScopeId,
    },
    ResponseEntry {
        message: crate::ir::ids::StringId,
        payload_types: Vec<ValueType>,
        aux: ScopeId,
    },
    ParallelFor,
    ExtensionControl,
    Global,
}

impl SemanticBuilder {
    /// Registers a flow control keyword and prepares for its block.
    ///
    /// During preparse most keywords only record the expected block kind;
    /// `elseif` and `while` do real work in the main parse.
    pub fn register_control(&mut self, keyword: &str, preparse: bool) -> Result<(), IrError> {
        match keyword {
            "do" => self.expected_kinds.push(BlockKind::DoLoop),
            "if" => self.expected_kinds.push(BlockKind::If),
            "elseif" => {
                if !preparse {
                    self.open_else_if_wrapper()?;
                }
                self.expected_kinds.push(BlockKind::ElseIf);
            }
            "else" => self.expected_kinds.push(BlockKind::Else),
            "while" => {
                if !preparse {
                    // The block opens early so the conditional check can
                    // be injected before the body.
                    let scope = self
                        .program
                        .scopes
                        .alloc(Scope::with_parent(self.current_scope));
                    self.current_scope = scope;
                    self.blocks.push(BlockEntry {
                        block: Block::with_scope(scope),
                        kind: BlockKind::WhileLoop,
                    });
                }
                self.expected_kinds.push(BlockKind::WhileLoop);
            }
            "parallelfor" => self.expected_kinds.push(BlockKind::ParallelFor),
            other => {
                if !self.extension_keywords.contains(other) {
                    return Err(IrError::structural(format!(
                        "unrecognized control keyword {other}"
                    )));
                }
                let id = self.program.intern(other);
                self.push_entry(StackEntry::Identifier(id))?;
                self.extension_controls.push(id);
                self.expected_kinds.push(BlockKind::ExtensionControl);
            }
        }
        Ok(())
    }

    /// Declares an extension control keyword as available.
    pub fn register_extension_keyword(&mut self, keyword: &str) {
        self.extension_keywords.insert(keyword.to_string());
    }

    fn open_else_if_wrapper(&mut self) -> Result<(), IrError> {
        let scope = self.current_scope;
        let if_index = {
            let ctx = self.program.type_context();
            let Some(entry) = self.blocks.last() else {
                return Err(IrError::structural("elseif() without an open block"));
            };

            let mut offset = 0usize;
            loop {
                let Some(op) = entry.block.operation_from_end(offset, scope, &ctx) else {
                    return Err(IrError::structural("elseif() without matching if()"));
                };
                if matches!(op, Operation::If { .. }) {
                    break entry
                        .block
                        .index_from_end(offset, scope, &ctx)
                        .ok_or_else(|| IrError::structural("elseif() without matching if()"))?;
                }
                offset += 1;
            }
        };

        // Borrow the wrapper block out of the If; it is reinstalled when
        // the elseif arm closes.
        let need_fresh = {
            let entry = self
                .blocks
                .last()
                .ok_or_else(|| IrError::structural("elseif() without an open block"))?;
            match entry.block.op_at(if_index) {
                Some(Operation::If {
                    else_if_wrapper, ..
                }) => else_if_wrapper.is_none(),
                _ => return Err(IrError::structural("elseif() target is not an if()")),
            }
        };

        let wrapper = if need_fresh {
            let wrapper_scope = self
                .program
                .scopes
                .alloc(Scope::with_parent(self.current_scope));
            Block::with_scope(wrapper_scope)
        } else {
            let entry = self
                .blocks
                .last_mut()
                .ok_or_else(|| IrError::structural("elseif() without an open block"))?;
            match entry.block.op_at_mut(if_index) {
                Some(Operation::If {
                    else_if_wrapper, ..
                }) => else_if_wrapper
                    .take()
                    .ok_or_else(|| IrError::structural("elseif() wrapper disappeared"))?,
                _ => return Err(IrError::structural("elseif() target is not an if()")),
            }
        };

        self.blocks.push(BlockEntry {
            block: wrapper,
            kind: BlockKind::ElseIfWrapper { if_index },
        });
        Ok(())
    }

    /// Enters a new code block level: allocates the block's scope and
    /// performs the bindings and validation the block kind requires.
    pub fn enter_block(&mut self) -> Result<(), IrError> {
        if matches!(self.expected_kinds.last(), Some(BlockKind::WhileLoop)) {
            // While loops opened their block early.
            self.expected_kinds.pop();
            return Ok(());
        }

        if self.blocks.len() >= self.options.max_block_depth {
            return Err(IrError::limit_exceeded(
                "block nesting limit exceeded",
                format!("max_block_depth={}", self.options.max_block_depth),
            ));
        }

        // Message handlers run against an auxiliary scope that is entered
        // before the handler's own scope is created.
        if let Some(BlockKind::MessageDispatch { aux, .. } | BlockKind::ResponseEntry { aux, .. }) =
            self.expected_kinds.last()
        {
            let aux = *aux;
            if let Some(scope) = self.program.scopes.get_mut(aux) {
                scope.parent = Some(self.current_scope);
            }
            self.current_scope = aux;
            self.push_entry(StackEntry::Scope(aux))?;
        }

        let kind = self.expected_kinds.pop().unwrap_or(BlockKind::Free);
        let enclosing_scope = self.current_scope;

        let scope = match &kind {
            BlockKind::Task | BlockKind::Thread => {
                // Concurrency bodies do not capture enclosing locals.
                self.displaced_scopes.push(self.current_scope);
                self.program
                    .scopes
                    .alloc(Scope::with_parent(self.program.global_scope))
            }
            BlockKind::ParallelFor | BlockKind::ExtensionControl => {
                let mut scope = Scope::with_parent(self.current_scope);
                if let Some((name, ty)) = self.control_var.take() {
                    scope.add_variable(name, ty)?;
                }
                self.program.scopes.alloc(scope)
            }
            _ => self
                .program
                .scopes
                .alloc(Scope::with_parent(self.current_scope)),
        };
        self.current_scope = scope;

        let mut block = Block::with_scope(scope);

        match &kind {
            BlockKind::FunctionBody => {
                self.bind_function_body(enclosing_scope, &mut block)?;
            }
            BlockKind::If => {
                if !self.enclosing_condition_is_boolean() {
                    self.report_fatal_error("condition in if() statement must be a boolean expression");
                }
            }
            BlockKind::ElseIf => {
                if !self.enclosing_condition_is_boolean() {
                    self.report_fatal_error(
                        "condition in elseif() statement must be a boolean expression",
                    );
                }
            }
            _ => {}
        }

        self.blocks.push(BlockEntry { block, kind });
        Ok(())
    }

    fn enclosing_condition_is_boolean(&self) -> bool {
        let scope = self.current_scope;
        let ctx = self.program.type_context();
        self.blocks
            .last()
            .and_then(|entry| entry.block.tail())
            .map(|op| op.result_type(scope, &ctx) == ValueType::Boolean)
            .unwrap_or(false)
    }

    fn bind_function_body(&mut self, parent: ScopeId, block: &mut Block) -> Result<(), IrError> {
        let name = match self.stack.last() {
            Some(StackEntry::Identifier(id)) => *id,
            _ => {
                return Err(IrError::structural(
                    "entering a function block but no function identifier is on the parse stack",
                ))
            }
        };

        let Some(function_id) = self.program.scopes.function_id(parent, name) else {
            return Err(IrError::structural(
                "function not found; the internal parse stacks are corrupted",
            ));
        };
        let (params, returns) = match self.program.functions.get(function_id) {
            Some(crate::ir::function::FunctionKind::User(function)) => {
                (function.params, function.returns)
            }
            _ => {
                return Err(IrError::structural(
                    "function is not user-defined; the internal parse stacks are corrupted",
                ))
            }
        };

        let body_scope = self.current_scope;
        if let Some(scope) = self.program.scopes.get_mut(body_scope) {
            scope.push_ghost_set();
        }
        self.program.scopes.ghost_into_scope(body_scope, params)?;
        if let Some(scope) = self.program.scopes.get_mut(returns) {
            scope.parent = None;
        }
        self.program.scopes.ghost_into_scope(body_scope, returns)?;

        // Replay queued return-value initialization, downgrading stores
        // to one-time initialization.
        if let Some(init) = self.return_init_blocks.remove(&name) {
            for op in init.into_ops() {
                match op {
                    Operation::AssignValue(target) => {
                        block.append(Operation::InitializeValue(target));
                    }
                    other => block.append(other),
                }
            }
        }
        Ok(())
    }

    /// Exits the innermost code block, attaching it to the operation or
    /// function it belongs to.
    pub fn exit_block(&mut self) -> Result<(), IrError> {
        let Some(entry) = self.blocks.pop() else {
            return Err(IrError::structural("exit from a block that never opened"));
        };
        let BlockEntry { block, kind } = entry;

        match kind {
            BlockKind::Function => Err(IrError::structural(
                "function-creation blocks close only during preparse",
            )),

            BlockKind::FunctionBody => {
                let name = match self.stack.pop() {
                    Some(StackEntry::Identifier(id)) => id,
                    _ => {
                        return Err(IrError::structural(
                            "expected a function identifier on the parse stack",
                        ))
                    }
                };
                let Some(function_id) = self.program.scopes.function_id(self.current_scope, name)
                else {
                    return Err(IrError::structural(
                        "function not found; the internal parse stacks are corrupted",
                    ));
                };
                match self.program.functions.get_mut(function_id) {
                    Some(crate::ir::function::FunctionKind::User(function)) => {
                        function.body = Some(block);
                    }
                    _ => {
                        return Err(IrError::structural(
                            "function is not user-defined; the internal parse stacks are corrupted",
                        ))
                    }
                }
                self.restore_parent_scope();
                Ok(())
            }

            BlockKind::DoLoop => {
                // The loop is finished by pop_do_while_loop once the
                // condition has been parsed into the still-open block.
                self.blocks.push(BlockEntry {
                    block,
                    kind: BlockKind::DoLoop,
                });
                self.restore_parent_scope();
                Ok(())
            }

            BlockKind::If => {
                let entry = self.stack.pop();
                if !self.condition_entry_is_boolean(entry.as_ref()) {
                    self.report_fatal_error("conditional expression must be of the boolean type");
                    self.restore_parent_scope();
                    return Ok(());
                }

                self.restore_parent_scope();
                self.add_operation(Operation::If {
                    true_block: Some(block),
                    false_block: None,
                    else_if_wrapper: None,
                })
            }

            BlockKind::ElseIf => {
                let mut body = block;
                body.append(Operation::ExitIfChain);

                let entry = self.stack.pop();
                let condition_ok = self.condition_entry_is_boolean(entry.as_ref());
                if !condition_ok {
                    self.report_fatal_error("conditional expression must be of the boolean type");
                }

                self.restore_parent_scope();

                // The wrapper entry is next on the block stack: emit the
                // arm into it, then hand the wrapper back to its If.
                if condition_ok {
                    self.add_operation(Operation::ElseIf { block: body })?;
                }
                let Some(wrapper_entry) = self.blocks.pop() else {
                    return Err(IrError::structural("elseif arm closed without its wrapper"));
                };
                let BlockKind::ElseIfWrapper { if_index } = wrapper_entry.kind else {
                    return Err(IrError::structural("elseif arm closed without its wrapper"));
                };
                let Some(owner) = self.blocks.last_mut() else {
                    return Err(IrError::structural("elseif wrapper has no owning block"));
                };
                match owner.block.op_at_mut(if_index) {
                    Some(Operation::If {
                        else_if_wrapper, ..
                    }) => {
                        *else_if_wrapper = Some(wrapper_entry.block);
                        Ok(())
                    }
                    _ => Err(IrError::structural("elseif wrapper lost its if()")),
                }
            }

            BlockKind::Else => {
                self.restore_parent_scope();
                let scope = self.current_scope;
                let target = {
                    let ctx = self.program.type_context();
                    let Some(owner) = self.blocks.last() else {
                        return Err(IrError::structural("else block has no owning block"));
                    };
                    owner.block.index_from_end(0, scope, &ctx)
                };
                let Some(index) = target else {
                    self.report_fatal_error("unexpected else block with no matching if block");
                    return Ok(());
                };
                let Some(owner) = self.blocks.last_mut() else {
                    return Err(IrError::structural("else block has no owning block"));
                };
                match owner.block.op_at_mut(index) {
                    Some(Operation::If { false_block, .. }) => {
                        *false_block = Some(block);
                        Ok(())
                    }
                    _ => {
                        self.report_fatal_error("unexpected else block with no matching if block");
                        Ok(())
                    }
                }
            }

            BlockKind::WhileLoop => {
                self.stack.pop();
                self.restore_parent_scope();
                self.add_operation(Operation::WhileLoop { body: block })
            }

            BlockKind::Free => {
                self.restore_parent_scope();
                self.add_operation(Operation::ExecuteBlock { block })
            }

            BlockKind::Task => {
                self.current_scope = self
                    .displaced_scopes
                    .pop()
                    .ok_or_else(|| IrError::structural("task block lost its displaced scope"))?;

                let name_ok = self
                    .stack
                    .last()
                    .map(|entry| {
                        entry.effective_type(self.current_scope, &self.program)
                            == ValueType::String
                    })
                    .unwrap_or(false);
                if !name_ok {
                    return Err(IrError::structural("task identifiers must be string values"));
                }
                self.stack.pop();

                if let Some(name) = self.saved_task_names.pop() {
                    self.program.debug.track_task_name(name);
                }
                self.add_operation(Operation::ForkTask { body: block })
            }

            BlockKind::Thread => {
                self.current_scope = self
                    .displaced_scopes
                    .pop()
                    .ok_or_else(|| IrError::structural("thread block lost its displaced scope"))?;

                for what in ["thread pool", "thread"] {
                    let name_ok = self
                        .stack
                        .last()
                        .map(|entry| {
                            entry.effective_type(self.current_scope, &self.program)
                                == ValueType::String
                        })
                        .unwrap_or(false);
                    if !name_ok {
                        return Err(IrError::structural(format!(
                            "{what} identifiers must be string values"
                        )));
                    }
                    self.stack.pop();
                }

                if let Some(name) = self.saved_task_names.pop() {
                    self.program.debug.track_task_name(name);
                }
                self.add_operation(Operation::ForkThread { body: block })
            }

            BlockKind::MessageDispatch {
                message,
                payload_types,
                aux,
            } => {
                match self.stack.pop() {
                    Some(StackEntry::Scope(_)) => {}
                    _ => {
                        return Err(IrError::structural(
                            "message dispatch lost its scope marker",
                        ))
                    }
                }
                self.current_scope = self
                    .program
                    .scopes
                    .get(aux)
                    .and_then(|scope| scope.parent)
                    .unwrap_or(self.program.global_scope);

                self.add_operation(Operation::AcceptMessage {
                    message,
                    payload_types,
                    handler: block,
                    aux_scope: aux,
                })
            }

            BlockKind::ResponseEntry {
                message,
                payload_types,
                aux,
            } => {
                match self.stack.pop() {
                    Some(StackEntry::Scope(_)) => {}
                    _ => {
                        return Err(IrError::structural(
                            "response map entry lost its scope marker",
                        ))
                    }
                }
                self.current_scope = self
                    .program
                    .scopes
                    .get(aux)
                    .and_then(|scope| scope.parent)
                    .unwrap_or(self.program.global_scope);

                let Some((_, map)) = self.response_maps.last_mut() else {
                    return Err(IrError::structural(
                        "response map entry closed outside a response map",
                    ));
                };
                map.add_entry(ResponseMapEntry {
                    message,
                    payload_types,
                    handler: block,
                    aux_scope: aux,
                });
                Ok(())
            }

            BlockKind::ParallelFor => {
                self.restore_parent_scope();

                let bounds = ["thread count", "upper boundary", "lower boundary"];
                for (popped, what) in bounds.iter().enumerate() {
                    let bound_ok = self
                        .stack
                        .last()
                        .map(|entry| {
                            entry.effective_type(self.current_scope, &self.program)
                                == ValueType::Integer
                        })
                        .unwrap_or(false);
                    self.stack.pop();
                    if !bound_ok {
                        self.report_fatal_error(format!(
                            "parallelfor() {what} must be an integer value"
                        ));
                        // Discard the remaining bounds and the counter.
                        for _ in 0..bounds.len() - popped {
                            self.stack.pop();
                        }
                        return self.add_operation(Operation::NoOp);
                    }
                }

                let counter = match self.stack.pop() {
                    Some(StackEntry::Identifier(id)) => id,
                    _ => {
                        self.report_fatal_error(
                            "first parameter to parallelfor() should be a loop counter variable name",
                        );
                        return self.add_operation(Operation::NoOp);
                    }
                };

                self.add_operation(Operation::ParallelFor {
                    body: block,
                    counter,
                    use_threads: true,
                    code_handle: 0,
                })
            }

            BlockKind::ExtensionControl => {
                self.restore_parent_scope();

                let keyword = self
                    .extension_controls
                    .pop()
                    .ok_or_else(|| IrError::structural("extension control keyword is missing"))?;

                // Entries above the keyword identifier are the control's
                // parameters; the first identifier among them names the
                // counter variable.
                let mut counter = None;
                loop {
                    match self.stack.pop() {
                        Some(StackEntry::Identifier(id)) if id == keyword => break,
                        Some(StackEntry::Identifier(id)) => counter = Some(id),
                        Some(_) => {}
                        None => {
                            return Err(IrError::structural(
                                "mismatched extension control keywords",
                            ))
                        }
                    }
                }

                let scope = block.scope().unwrap_or(self.current_scope);
                let counter = match counter {
                    Some(id) => id,
                    None => self.program.intern(""),
                };
                self.add_operation(Operation::HandoffControl {
                    library: keyword,
                    body: block,
                    counter,
                    scope,
                    code_handle: 0,
                })
            }

            BlockKind::ElseIfWrapper { .. } => Err(IrError::structural(
                "elseif wrapper closed without its arm",
            )),

            BlockKind::Global => Err(IrError::structural(
                "global blocks close through exit_global_block",
            )),
        }
    }

    fn condition_entry_is_boolean(&self, entry: Option<&StackEntry>) -> bool {
        match entry {
            Some(entry) => entry.effective_type(self.current_scope, &self.program) == ValueType::Boolean,
            None => false,
        }
    }

    pub(crate) fn restore_parent_scope(&mut self) {
        self.current_scope = self
            .program
            .scopes
            .get(self.current_scope)
            .and_then(|scope| scope.parent)
            .unwrap_or(self.program.global_scope);
    }

    /// Enters a code block during preparse; blocks are otherwise ignored
    /// in that phase.
    pub fn enter_block_preparse(&mut self) {
        let kind = self.expected_kinds.pop().unwrap_or(BlockKind::Free);
        self.preparse_blocks.push(kind);
    }

    /// Exits a code block during preparse. Function definitions are the
    /// one construct that does real work here.
    pub fn exit_block_preparse(&mut self) -> Result<(), IrError> {
        let Some(kind) = self.preparse_blocks.pop() else {
            return Err(IrError::structural("preparse exit from a block that never opened"));
        };

        match kind {
            BlockKind::Function => self.finish_function_preparse(),
            BlockKind::FunctionBody => {
                self.stack.pop();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------

    /// Injects the while-loop conditional check at the end of the
    /// condition expression.
    pub fn register_end_of_while_loop_conditional(&mut self) -> Result<(), IrError> {
        self.pop_parameter_count();
        self.merge_deferred_operations()?;
        self.add_operation(Operation::WhileLoopConditional)
    }

    /// Closes a do-while loop: validates the condition parsed into the
    /// loop's still-open block and emits the loop operation.
    pub fn pop_do_while_loop(&mut self) -> Result<(), IrError> {
        let condition_ok = matches!(self.stack.last(), Some(StackEntry::Expression { .. }));
        if !condition_ok {
            self.report_fatal_error("expected condition for do/while loop");
            self.blocks.pop();
            self.stack.pop();
            return Ok(());
        }

        let boolean = {
            let scope = self.current_scope;
            let ctx = self.program.type_context();
            self.blocks
                .last()
                .and_then(|entry| entry.block.tail())
                .map(|op| op.result_type(scope, &ctx) == ValueType::Boolean)
                .unwrap_or(false)
        };
        if !boolean {
            self.report_fatal_error(
                "condition in do-while() statement must be a boolean expression",
            );
        }

        let Some(entry) = self.blocks.pop() else {
            return Err(IrError::structural("do-while loop lost its block"));
        };
        self.add_operation(Operation::DoWhileLoop { body: entry.block })?;
        self.stack.pop();
        self.pop_parameter_count();
        Ok(())
    }

    /// Validates the parallel-for argument list and records the counter
    /// variable for the upcoming block scope.
    pub fn register_end_of_parallel_for(&mut self) -> Result<(), IrError> {
        if self.parameter_count() != 4 {
            self.report_fatal_error("parallelfor() expects 4 parameters");
            self.pop_parameter_count();
            return self.add_operation(Operation::NoOp);
        }

        let counter = self.stack.len().checked_sub(4).and_then(|at| {
            match self.stack.get(at) {
                Some(StackEntry::Identifier(id)) => Some(*id),
                _ => None,
            }
        });
        if let Some(counter) = counter {
            self.control_var = Some((counter, ValueType::Integer));
        }

        self.pop_parameter_count();
        Ok(())
    }

    // -----------------------------------------------------------------
    // Global data block
    // -----------------------------------------------------------------

    /// Enters the special global data block.
    pub fn enter_global_block(&mut self) {
        let block = self
            .program
            .global_init
            .take()
            .unwrap_or_else(|| Block::with_scope(self.program.global_scope));
        self.blocks.push(BlockEntry {
            block,
            kind: BlockKind::Global,
        });
    }

    /// Exits the special global data block.
    pub fn exit_global_block(&mut self) -> Result<(), IrError> {
        let Some(entry) = self.blocks.pop() else {
            return Err(IrError::structural("global block exit without entry"));
        };
        if entry.kind != BlockKind::Global {
            return Err(IrError::structural("global block exit closed a different block"));
        }
        self.program.replace_global_init_block(entry.block);
        Ok(())
    }
}
