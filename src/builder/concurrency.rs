//! Tasks, threads, messaging, response maps, and futures.

use crate::builder::{BlockKind, SemanticBuilder, StackEntry};
use crate::ir::error::IrError;
use crate::ir::operation::Operation;
use crate::ir::response::ResponseMap;
use crate::ir::scope::Scope;
use crate::ir::types::ValueType;

impl SemanticBuilder {
    /// Prepares a task block; the task name literal is already on the
    /// operand stack.
    pub fn register_task(&mut self) -> Result<(), IrError> {
        let name = match self.stack.last() {
            Some(StackEntry::StringLiteral(id)) => *id,
            _ => self.program.intern(""),
        };
        self.saved_task_names.push(name);
        self.expected_kinds.push(BlockKind::Task);
        Ok(())
    }

    /// Prepares a thread block; the thread and pool name literals are
    /// already on the operand stack.
    pub fn register_thread(&mut self) -> Result<(), IrError> {
        let name = match self.stack.len().checked_sub(2).and_then(|at| self.stack.get(at)) {
            Some(StackEntry::StringLiteral(id)) => *id,
            _ => self.program.intern(""),
        };
        self.saved_task_names.push(name);
        self.expected_kinds.push(BlockKind::Thread);
        Ok(())
    }

    /// Creates a thread pool from the counted name and size operands.
    pub fn register_thread_pool(&mut self) -> Result<(), IrError> {
        let count = self.parameter_count();
        if count != 2 {
            self.report_fatal_error("threadpool() expects a name and a worker count");
            for _ in 0..count {
                self.stack.pop();
            }
            return self.add_operation(Operation::NoOp);
        }

        let scope = self.current_scope;
        let size_ok = self
            .stack
            .pop()
            .map(|entry| entry.effective_type(scope, &self.program) == ValueType::Integer)
            .unwrap_or(false);
        let name_ok = self
            .stack
            .pop()
            .map(|entry| entry.effective_type(scope, &self.program) == ValueType::String)
            .unwrap_or(false);
        if !size_ok || !name_ok {
            self.report_fatal_error("threadpool() expects a string name and an integer size");
            return self.add_operation(Operation::NoOp);
        }

        self.add_operation(Operation::CreateThreadPool)
    }

    /// Opens an inline message handler: the payload parameters populate
    /// an auxiliary scope the executor binds per message.
    pub fn begin_accept_message(
        &mut self,
        message: &str,
        params: &[(&str, ValueType)],
    ) -> Result<(), IrError> {
        let message = self.program.intern(message);

        let mut aux = Scope::new();
        let mut payload_types = Vec::with_capacity(params.len());
        for (name, ty) in params {
            let id = self.program.intern(*name);
            aux.add_variable(id, *ty)?;
            payload_types.push(*ty);
        }
        let aux = self.program.scopes.alloc(aux);

        self.expected_kinds.push(BlockKind::MessageDispatch {
            message,
            payload_types,
            aux,
        });
        Ok(())
    }

    /// Opens a response map under construction.
    pub fn begin_response_map(&mut self, name: &str) {
        let id = self.program.intern(name);
        self.response_maps.push((id, ResponseMap::new()));
    }

    /// Opens one response map entry; closes like a message handler.
    pub fn begin_response_map_entry(
        &mut self,
        message: &str,
        params: &[(&str, ValueType)],
    ) -> Result<(), IrError> {
        if self.response_maps.is_empty() {
            return Err(IrError::structural(
                "response map entry outside a response map",
            ));
        }

        let message = self.program.intern(message);
        let mut aux = Scope::new();
        let mut payload_types = Vec::with_capacity(params.len());
        for (name, ty) in params {
            let id = self.program.intern(*name);
            aux.add_variable(id, *ty)?;
            payload_types.push(*ty);
        }
        let aux = self.program.scopes.alloc(aux);

        self.expected_kinds.push(BlockKind::ResponseEntry {
            message,
            payload_types,
            aux,
        });
        Ok(())
    }

    /// Closes the response map under construction and registers it.
    pub fn end_response_map(&mut self) -> Result<(), IrError> {
        let Some((name, map)) = self.response_maps.pop() else {
            return Err(IrError::structural("no response map is open"));
        };
        self.scope_mut()?.add_response_map(name, map);
        Ok(())
    }

    /// Emits a message accept that dispatches through a registered
    /// response map.
    pub fn register_accept_from_response_map(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);

        let mut current = Some(self.current_scope);
        let mut found = false;
        while let Some(scope_id) = current {
            let Some(scope) = self.program.scopes.get(scope_id) else {
                break;
            };
            if scope.response_map(id).is_some() {
                found = true;
                break;
            }
            current = scope.parent;
        }
        if !found {
            self.report_fatal_error(format!("unknown response map {name}"));
            return self.add_operation(Operation::NoOp);
        }

        self.add_operation(Operation::AcceptMessageFromResponseMap { map: id })
    }

    /// Emits a message send; payload types come from the counted
    /// operands. When the target is addressed by handle rather than by
    /// name, the handle operand sits below the payload.
    pub fn register_send_message(&mut self, by_name: bool, message: &str) -> Result<(), IrError> {
        let message = self.program.intern(message);
        let count = self.parameter_count();

        let scope = self.current_scope;
        let mut payload_types = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(entry) = self.stack.pop() else {
                return Err(IrError::structural("operand stack underflow"));
            };
            payload_types.push(entry.effective_type(scope, &self.program));
        }
        payload_types.reverse();

        if !by_name {
            let handle_ok = self
                .stack
                .pop()
                .map(|entry| {
                    entry.effective_type(scope, &self.program) == ValueType::TaskHandle
                })
                .unwrap_or(false);
            if !handle_ok {
                self.report_fatal_error("message targets addressed by handle must be task handles");
                return self.add_operation(Operation::NoOp);
            }
        }

        self.add_operation(Operation::SendTaskMessage {
            by_name,
            message,
            payload_types,
        })
    }

    /// Pushes the handle of the task that sent the current message.
    pub fn register_get_message_sender(&mut self) -> Result<(), IrError> {
        let scope = self.current_scope;
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetMessageSender, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::TaskHandle,
            cons_element: None,
        })
    }

    /// Pushes the handle of the task that spawned the current one.
    pub fn register_get_task_caller(&mut self) -> Result<(), IrError> {
        let scope = self.current_scope;
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetTaskCaller, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::TaskHandle,
            cons_element: None,
        })
    }

    /// Registers a future: captures the just-emitted producer expression
    /// and binds the future's name in the current scope.
    pub fn register_future(&mut self, name: &str, use_thread_pool: bool) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;

        let group = {
            let ctx = self.program.type_context();
            self.blocks
                .last()
                .map(|entry| entry.block.count_tail_ops(1, scope, &ctx))
                .unwrap_or(0)
        };
        if group != 1 {
            self.report_fatal_error("future producers must be a single expression");
            return self.add_operation(Operation::NoOp);
        }

        let Some(producer) = self.blocks.last_mut().and_then(|entry| entry.block.pop_tail())
        else {
            return Err(IrError::structural("future producer is missing"));
        };
        self.stack.pop();

        let value_type = {
            let ctx = self.program.type_context();
            producer.result_type(scope, &ctx)
        };

        if self.scope_declares(id) {
            self.report_fatal_error(format!("variable {name} is already declared in this scope"));
            return self.add_operation(Operation::NoOp);
        }
        let scope_ref = self.scope_mut()?;
        scope_ref.add_variable(id, value_type)?;
        scope_ref.add_future(id, producer);

        self.add_operation(Operation::ForkFuture {
            name: id,
            value_type,
            use_thread_pool,
        })
    }
}
