//! Sequential evaluator for the operation contract.
//!
//! Covers the sequential subset: literals, variables, composites,
//! arithmetic and comparison, short-circuit compound logic, flow,
//! casts, arrays, futures (evaluated eagerly), parallel-for (run
//! sequentially; the thread count is advisory), and debug I/O. Task,
//! thread, and message scheduling belong to an external executor and
//! surface as `Unsupported`.

use std::collections::BTreeMap;

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecError;
use crate::exec::value::RValue;
use crate::ir::block::Block;
use crate::ir::function::FunctionKind;
use crate::ir::ids::{CompositeId, ScopeId, StringId};
use crate::ir::operation::{ArithmeticKind, ComparisonKind, Operation};
use crate::ir::program::Program;
use crate::ir::types::ValueType;

/// Control-flow outcome of executing one operation or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Normal,
    Break,
    Return,
    /// A successful elseif arm; skips the remaining alternatives.
    ExitChain,
    /// The while-loop conditional observed false.
    LoopExit,
}

/// Walks blocks of operations against an execution context.
pub struct Evaluator<'a> {
    program: &'a Program,
    pub ctx: ExecutionContext,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator rooted at the program's global scope.
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            ctx: ExecutionContext::new(program.global_scope),
        }
    }

    /// Runs the global initialization block, if any. Global variables
    /// activate into the root frame first.
    pub fn run_global_init(&mut self) -> Result<(), ExecError> {
        let global = self.program.global_scope;
        let names: Vec<StringId> = match self.program.scopes.get(global) {
            Some(scope) => scope.member_order().to_vec(),
            None => Vec::new(),
        };
        for name in names {
            let Some(variable) = self
                .program
                .scopes
                .get(global)
                .and_then(|scope| scope.variable(name))
            else {
                continue;
            };
            if variable.is_reference {
                continue;
            }
            let value = self.default_value(global, name, variable.ty)?;
            if self.ctx.lookup(name).is_none() {
                self.ctx.define(name, value);
            }
        }

        if let Some(block) = &self.program.global_init {
            // The init block shares the global frame.
            for operation in block.ops() {
                match self.execute(operation)? {
                    Signal::Normal => {}
                    other => {
                        return Err(ExecError::internal(format!(
                            "global initialization produced signal {other:?}"
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs a block in a fresh frame bound to the block's scope.
    pub fn run_block(&mut self, block: &Block) -> Result<Signal, ExecError> {
        self.activate_frame(block.scope())?;
        let mut signal = Signal::Normal;
        for operation in block.ops() {
            signal = self.execute(operation)?;
            if signal != Signal::Normal {
                break;
            }
        }
        self.ctx.pop_frame();
        Ok(signal)
    }

    /// Pushes a frame and materializes the scope's declared variables,
    /// the way scope activation does in a full interpreter.
    fn activate_frame(&mut self, scope: Option<ScopeId>) -> Result<(), ExecError> {
        self.ctx.push_frame(scope);
        let Some(scope) = scope else {
            return Ok(());
        };

        let names: Vec<StringId> = match self.program.scopes.get(scope) {
            Some(scope) => scope.member_order().to_vec(),
            None => Vec::new(),
        };
        for name in names {
            let Some(variable) = self
                .program
                .scopes
                .get(scope)
                .and_then(|scope| scope.variable(name))
            else {
                continue;
            };
            if variable.is_reference {
                continue;
            }
            let value = self.default_value(scope, name, variable.ty)?;
            self.ctx.define(name, value);
        }
        Ok(())
    }

    fn current_scope(&self) -> ScopeId {
        self.ctx.current_scope().unwrap_or(self.program.global_scope)
    }

    /// Executes one operation for its effects.
    pub fn execute(&mut self, operation: &Operation) -> Result<Signal, ExecError> {
        match operation {
            Operation::NoOp => Ok(Signal::Normal),

            Operation::PushInteger(value) => {
                self.ctx.stack.push(RValue::Integer(*value));
                Ok(Signal::Normal)
            }
            Operation::PushInteger16(value) => {
                self.ctx.stack.push(RValue::Integer16(*value));
                Ok(Signal::Normal)
            }
            Operation::PushReal(value) => {
                self.ctx.stack.push(RValue::Real(*value));
                Ok(Signal::Normal)
            }
            Operation::PushBoolean(value) => {
                self.ctx.stack.push(RValue::Boolean(*value));
                Ok(Signal::Normal)
            }
            Operation::PushString(value) => {
                let text = self.program.strings.resolve(*value).to_string();
                self.ctx.stack.push(RValue::Str(text));
                Ok(Signal::Normal)
            }
            Operation::Push(source) => {
                let value = self.eval_value(&source.op)?;
                self.ctx.stack.push(value);
                Ok(Signal::Normal)
            }

            Operation::AssignValue(name) => {
                let value = self.ctx.pop()?;
                self.ctx.store(*name, value);
                Ok(Signal::Normal)
            }
            Operation::InitializeValue(name) => {
                let scope = self.current_scope();
                let ty = self
                    .program
                    .scopes
                    .variable_type(scope, *name)
                    .unwrap_or(ValueType::Null);
                // A value pushed within this frame with the declared type
                // is consumed as the initial value; otherwise the slot
                // binds to a type default. Replayed return-value
                // initialization relies on the former.
                let pushed = self.ctx.frame_depth() > 0
                    && self
                        .ctx
                        .stack
                        .last()
                        .map(|value| value.type_of() == ty)
                        .unwrap_or(false);
                let value = if pushed {
                    self.ctx.pop()?
                } else {
                    self.default_value(scope, *name, ty)?
                };
                self.ctx.define(*name, value);
                Ok(Signal::Normal)
            }

            Operation::AssignTuple { variable, member }
            | Operation::AssignStructure { variable, member } => {
                let value = self.ctx.pop()?;
                let slot = self.ctx.lookup_mut(*variable).ok_or_else(|| {
                    ExecError::unknown_variable("composite store target is not bound")
                })?;
                match slot {
                    RValue::Tuple { members, .. } | RValue::Structure { members, .. } => {
                        members.insert(*member, value);
                        Ok(Signal::Normal)
                    }
                    other => Err(ExecError::type_mismatch(format!(
                        "composite store into a {:?} value",
                        other.type_of()
                    ))),
                }
            }

            Operation::AssignStructureIndirect { member } => {
                let first = self.ctx.pop()?;
                let second = self.ctx.pop()?;
                let (address, value) = match (first, second) {
                    (RValue::Address { variable, path }, value) => ((variable, path), value),
                    (value, RValue::Address { variable, path }) => ((variable, path), value),
                    _ => {
                        return Err(ExecError::type_mismatch(
                            "indirect store expects an address and a value",
                        ))
                    }
                };

                let (variable, path) = address;
                let slot = self.ctx.lookup_mut(variable).ok_or_else(|| {
                    ExecError::unknown_variable("indirect store target is not bound")
                })?;

                let mut target = slot;
                for step in &path {
                    target = match target {
                        RValue::Structure { members, .. } => {
                            members.entry(*step).or_insert(RValue::Null)
                        }
                        _ => {
                            return Err(ExecError::type_mismatch(
                                "indirect store path crosses a non-structure value",
                            ))
                        }
                    };
                }
                match target {
                    RValue::Structure { members, .. } => {
                        members.insert(*member, value);
                        Ok(Signal::Normal)
                    }
                    _ => Err(ExecError::type_mismatch(
                        "indirect store path ends at a non-structure value",
                    )),
                }
            }

            Operation::WriteArray { array } => {
                let value = self.ctx.pop()?;
                let index = self.ctx.pop_integer()?;
                let slot = self
                    .ctx
                    .lookup_mut(*array)
                    .ok_or_else(|| ExecError::unknown_variable("array is not bound"))?;
                match slot {
                    RValue::Array(items) => {
                        let index = index as usize;
                        if index >= items.len() {
                            items.resize(index + 1, RValue::Null);
                        }
                        items[index] = value;
                        Ok(Signal::Normal)
                    }
                    other => Err(ExecError::type_mismatch(format!(
                        "array store into a {:?} value",
                        other.type_of()
                    ))),
                }
            }

            Operation::If {
                true_block,
                false_block,
                else_if_wrapper,
            } => {
                let condition = self.ctx.pop_boolean()?;
                if condition {
                    if let Some(block) = true_block {
                        return self.run_block(block);
                    }
                    return Ok(Signal::Normal);
                }

                let mut handled = false;
                if let Some(wrapper) = else_if_wrapper {
                    self.activate_frame(wrapper.scope())?;
                    for operation in wrapper.ops() {
                        match self.execute(operation)? {
                            Signal::Normal => {}
                            Signal::ExitChain => {
                                handled = true;
                                break;
                            }
                            other => {
                                self.ctx.pop_frame();
                                return Ok(other);
                            }
                        }
                    }
                    self.ctx.pop_frame();
                }

                if !handled {
                    if let Some(block) = false_block {
                        return self.run_block(block);
                    }
                }
                Ok(Signal::Normal)
            }

            Operation::ElseIf { block } => {
                let condition = self.ctx.pop_boolean()?;
                if condition {
                    // The arm ends in ExitIfChain, which surfaces here.
                    return self.run_block(block);
                }
                Ok(Signal::Normal)
            }
            Operation::ExitIfChain => Ok(Signal::ExitChain),

            Operation::WhileLoop { body } => loop {
                match self.run_block(body)? {
                    Signal::Normal => {}
                    Signal::LoopExit | Signal::Break => return Ok(Signal::Normal),
                    other => return Ok(other),
                }
            },
            Operation::WhileLoopConditional => {
                if self.ctx.pop_boolean()? {
                    Ok(Signal::Normal)
                } else {
                    Ok(Signal::LoopExit)
                }
            }
            Operation::DoWhileLoop { body } => loop {
                match self.run_block(body)? {
                    Signal::Normal => {
                        if !self.ctx.pop_boolean()? {
                            return Ok(Signal::Normal);
                        }
                    }
                    Signal::Break | Signal::LoopExit => return Ok(Signal::Normal),
                    other => return Ok(other),
                }
            },
            Operation::ExecuteBlock { block } => self.run_block(block),
            Operation::Break => Ok(Signal::Break),
            Operation::Return => Ok(Signal::Return),

            Operation::DebugWriteString => {
                let text = self.ctx.pop_string()?;
                self.ctx.output.push_str(&text);
                self.ctx.output.push('\n');
                Ok(Signal::Normal)
            }

            Operation::Invoke { .. } | Operation::InvokeIndirect { .. } => {
                let value = self.eval_value(operation)?;
                if value != RValue::Null {
                    self.ctx.stack.push(value);
                }
                Ok(Signal::Normal)
            }

            Operation::ForkFuture { name, .. } => {
                // Futures evaluate eagerly: any read observes a completed
                // single-assignment cell.
                let scope = self.current_scope();
                let producer = self.find_future(scope, *name)?.clone();
                let value = self.eval_value(&producer)?;
                self.ctx.store(*name, value);
                Ok(Signal::Normal)
            }

            Operation::ParallelFor { body, counter, .. } => {
                let threads = self.ctx.pop_integer()?;
                let upper = self.ctx.pop_integer()?;
                let lower = self.ctx.pop_integer()?;
                let _ = threads;

                for index in lower..upper {
                    self.activate_frame(body.scope())?;
                    self.ctx.define(*counter, RValue::Integer(index));
                    let mut broke = false;
                    for operation in body.ops() {
                        match self.execute(operation)? {
                            Signal::Normal => {}
                            Signal::Break => {
                                broke = true;
                                break;
                            }
                            other => {
                                self.ctx.pop_frame();
                                return Ok(other);
                            }
                        }
                    }
                    self.ctx.pop_frame();
                    if broke {
                        break;
                    }
                }
                Ok(Signal::Normal)
            }

            Operation::ForkTask { .. }
            | Operation::ForkThread { .. }
            | Operation::CreateThreadPool
            | Operation::AcceptMessage { .. }
            | Operation::AcceptMessageFromResponseMap { .. }
            | Operation::SendTaskMessage { .. }
            | Operation::GetMessageSender
            | Operation::GetTaskCaller
            | Operation::Handoff { .. }
            | Operation::HandoffControl { .. } => Err(ExecError::unsupported(
                "task scheduling and extension handoff belong to the host executor",
            )),

            other => {
                let value = self.eval_value(other)?;
                self.ctx.stack.push(value);
                Ok(Signal::Normal)
            }
        }
    }

    /// Evaluates a value-producing operation without pushing its result.
    pub fn eval_value(&mut self, operation: &Operation) -> Result<RValue, ExecError> {
        match operation {
            Operation::NoOp => Ok(RValue::Null),
            Operation::PushInteger(value) => Ok(RValue::Integer(*value)),
            Operation::PushInteger16(value) => Ok(RValue::Integer16(*value)),
            Operation::PushReal(value) => Ok(RValue::Real(*value)),
            Operation::PushBoolean(value) => Ok(RValue::Boolean(*value)),
            Operation::PushString(value) => {
                Ok(RValue::Str(self.program.strings.resolve(*value).to_string()))
            }
            Operation::Push(source) => self.eval_value(&source.op),

            Operation::GetVariableValue(name) => match self.ctx.lookup(*name) {
                Some(value) => Ok(value.clone()),
                None => Err(ExecError::unknown_variable(format!(
                    "variable {} is not bound",
                    self.program.strings.resolve(*name)
                ))),
            },

            Operation::BindReference(name) => Ok(RValue::Address {
                variable: *name,
                path: Vec::new(),
            }),
            Operation::BindFunctionReference(name) => {
                let scope = self.current_scope();
                self.program
                    .scopes
                    .function_id(scope, *name)
                    .map(RValue::Function)
                    .ok_or_else(|| {
                        ExecError::unknown_variable(format!(
                            "function {} is not declared",
                            self.program.strings.resolve(*name)
                        ))
                    })
            }

            Operation::SizeOf(name) => {
                let scope = self.current_scope();
                let ty = self
                    .program
                    .scopes
                    .variable_type(scope, *name)
                    .ok_or_else(|| ExecError::unknown_variable("sizeof of an unknown variable"))?;
                let size = match ty {
                    ValueType::Structure => self
                        .program
                        .scopes
                        .variable_structure_hint(scope, *name)
                        .and_then(|hint| self.program.registry.structure(hint))
                        .and_then(|def| def.size(&self.program.registry).ok())
                        .unwrap_or(0),
                    ValueType::Tuple => self
                        .program
                        .scopes
                        .variable_tuple_hint(scope, *name)
                        .and_then(|hint| self.program.registry.tuple(hint))
                        .and_then(|def| def.size(&self.program.registry).ok())
                        .unwrap_or(0),
                    other => other.storage_size().unwrap_or(0),
                };
                Ok(RValue::Integer(size as i32))
            }

            Operation::ReadTuple { variable, member }
            | Operation::ReadStructure { variable, member } => {
                let value = self.ctx.lookup(*variable).ok_or_else(|| {
                    ExecError::unknown_variable("composite read target is not bound")
                })?;
                match value {
                    RValue::Tuple { members, .. } | RValue::Structure { members, .. } => members
                        .get(member)
                        .cloned()
                        .ok_or_else(|| ExecError::unknown_variable("member is not initialized")),
                    other => Err(ExecError::type_mismatch(format!(
                        "composite read from a {:?} value",
                        other.type_of()
                    ))),
                }
            }

            Operation::ReadStructureIndirect { member, .. } => {
                let prior = self.ctx.pop()?;
                match prior {
                    RValue::Structure { members, .. } => members
                        .get(member)
                        .cloned()
                        .ok_or_else(|| ExecError::unknown_variable("member is not initialized")),
                    other => Err(ExecError::type_mismatch(format!(
                        "indirect read from a {:?} value",
                        other.type_of()
                    ))),
                }
            }

            Operation::BindStructMemberReference { variable, member } => match variable {
                Some(variable) => Ok(RValue::Address {
                    variable: *variable,
                    path: vec![*member],
                }),
                None => match self.ctx.pop()? {
                    RValue::Address { variable, mut path } => {
                        path.push(*member);
                        Ok(RValue::Address { variable, path })
                    }
                    other => Err(ExecError::type_mismatch(format!(
                        "chained bind expects an address, found {:?}",
                        other.type_of()
                    ))),
                },
            },

            Operation::Arithmetic {
                kind,
                operand_type,
                operand_count,
                ..
            } => self.eval_arithmetic(*kind, *operand_type, *operand_count),

            Operation::Compare { kind, .. } => {
                let second = self.ctx.pop()?;
                let first = self.ctx.pop()?;
                compare_values(*kind, &first, &second).map(RValue::Boolean)
            }

            Operation::LogicalAnd { operations } => {
                let scope = self.current_scope();
                for sub in operations {
                    self.execute(sub)?;
                    let boolean = {
                        let ctx = self.program.type_context();
                        sub.result_type(scope, &ctx) == ValueType::Boolean
                    };
                    if boolean && !self.ctx.pop_boolean()? {
                        return Ok(RValue::Boolean(false));
                    }
                }
                Ok(RValue::Boolean(true))
            }
            Operation::LogicalOr { operations } => {
                let scope = self.current_scope();
                for sub in operations {
                    self.execute(sub)?;
                    let boolean = {
                        let ctx = self.program.type_context();
                        sub.result_type(scope, &ctx) == ValueType::Boolean
                    };
                    if boolean && self.ctx.pop_boolean()? {
                        return Ok(RValue::Boolean(true));
                    }
                }
                Ok(RValue::Boolean(false))
            }
            Operation::LogicalXor => {
                let second = self.ctx.pop_boolean()?;
                let first = self.ctx.pop_boolean()?;
                Ok(RValue::Boolean(first ^ second))
            }
            Operation::LogicalNot => {
                let value = self.ctx.pop_boolean()?;
                Ok(RValue::Boolean(!value))
            }

            Operation::BitwiseAnd {
                operand_type,
                operations,
            } => self.eval_bitwise_fold(*operand_type, operations, |a, b| a & b, -1),
            Operation::BitwiseOr {
                operand_type,
                operations,
            } => self.eval_bitwise_fold(*operand_type, operations, |a, b| a | b, 0),
            Operation::BitwiseXor { operand_type } => {
                let second = self.pop_numeric_bits(*operand_type)?;
                let first = self.pop_numeric_bits(*operand_type)?;
                Ok(self.bits_to_value(*operand_type, first ^ second))
            }
            Operation::BitwiseNot { operand_type } => {
                let value = self.pop_numeric_bits(*operand_type)?;
                Ok(self.bits_to_value(*operand_type, !value))
            }

            Operation::Invoke { function, .. } => self.call_function(*function),
            Operation::InvokeIndirect { name } => {
                let function = match self.ctx.lookup(*name) {
                    Some(RValue::Function(function)) => *function,
                    Some(other) => {
                        return Err(ExecError::type_mismatch(format!(
                            "indirect call through a {:?} value",
                            other.type_of()
                        )))
                    }
                    None => {
                        return Err(ExecError::unknown_variable(
                            "indirect call target is not bound",
                        ))
                    }
                };
                self.call_function(function)
            }

            Operation::ConsArray { element_count, .. } => {
                let mut items = Vec::with_capacity(*element_count as usize);
                for _ in 0..*element_count {
                    items.push(self.ctx.pop()?);
                }
                items.reverse();
                Ok(RValue::Array(items))
            }
            Operation::ConsArrayIndirect { producer, .. } => {
                let value = self.eval_value(producer)?;
                match value {
                    RValue::Array(items) => Ok(RValue::Array(items)),
                    other => Ok(RValue::Array(vec![other])),
                }
            }
            Operation::ReadArray { array } => {
                let index = self.ctx.pop_integer()?;
                let value = self
                    .ctx
                    .lookup(*array)
                    .ok_or_else(|| ExecError::unknown_variable("array is not bound"))?;
                match value {
                    RValue::Array(items) => items.get(index as usize).cloned().ok_or_else(|| {
                        ExecError::type_mismatch(format!("array index {index} is out of range"))
                    }),
                    other => Err(ExecError::type_mismatch(format!(
                        "array read from a {:?} value",
                        other.type_of()
                    ))),
                }
            }
            Operation::ArrayLength { array } => {
                let value = self
                    .ctx
                    .lookup(*array)
                    .ok_or_else(|| ExecError::unknown_variable("array is not bound"))?;
                match value {
                    RValue::Array(items) => Ok(RValue::Integer(items.len() as i32)),
                    other => Err(ExecError::type_mismatch(format!(
                        "array length of a {:?} value",
                        other.type_of()
                    ))),
                }
            }

            Operation::MapOperation { inner } => {
                let items = match self.ctx.pop()? {
                    RValue::Array(items) => items,
                    other => {
                        return Err(ExecError::type_mismatch(format!(
                            "map over a {:?} value",
                            other.type_of()
                        )))
                    }
                };
                let mut mapped = Vec::with_capacity(items.len());
                for item in items {
                    self.ctx.stack.push(item);
                    let value = self.eval_value(inner)?;
                    mapped.push(value);
                }
                Ok(RValue::Array(mapped))
            }
            Operation::ReduceOperation { inner } => {
                let items = match self.ctx.pop()? {
                    RValue::Array(items) => items,
                    other => {
                        return Err(ExecError::type_mismatch(format!(
                            "reduce over a {:?} value",
                            other.type_of()
                        )))
                    }
                };
                let mut iter = items.into_iter();
                let mut accumulator = iter
                    .next()
                    .ok_or_else(|| ExecError::type_mismatch("reduce over an empty array"))?;
                for item in iter {
                    self.ctx.stack.push(accumulator);
                    self.ctx.stack.push(item);
                    accumulator = self.eval_value(inner)?;
                }
                Ok(accumulator)
            }

            Operation::Concatenate { operand_count, .. } => {
                if *operand_count == 1 {
                    let items = match self.ctx.pop()? {
                        RValue::Array(items) => items,
                        other => {
                            return Err(ExecError::type_mismatch(format!(
                                "concat fold over a {:?} value",
                                other.type_of()
                            )))
                        }
                    };
                    let mut text = String::new();
                    for item in items {
                        match item {
                            RValue::Str(part) => text.push_str(&part),
                            other => {
                                return Err(ExecError::type_mismatch(format!(
                                    "concat fold over {:?} elements",
                                    other.type_of()
                                )))
                            }
                        }
                    }
                    return Ok(RValue::Str(text));
                }

                let second = self.ctx.pop_string()?;
                let first = self.ctx.pop_string()?;
                Ok(RValue::Str(format!("{first}{second}")))
            }
            Operation::Length { name } => {
                let value = self
                    .ctx
                    .lookup(*name)
                    .ok_or_else(|| ExecError::unknown_variable("length of an unbound variable"))?;
                match value {
                    RValue::Str(text) => Ok(RValue::Integer(text.chars().count() as i32)),
                    RValue::Array(items) => Ok(RValue::Integer(items.len() as i32)),
                    other => Err(ExecError::type_mismatch(format!(
                        "length of a {:?} value",
                        other.type_of()
                    ))),
                }
            }

            Operation::TypeCast {
                target, operand, ..
            } => {
                let value = self.eval_value(operand)?;
                cast_value(&value, *target)
            }
            Operation::TypeCastToString { operand, .. } => {
                let value = self.eval_value(operand)?;
                cast_to_string(&value)
            }

            Operation::DebugReadStaticString => {
                Ok(RValue::Str(self.ctx.input.pop_front().unwrap_or_default()))
            }

            other => Err(ExecError::unsupported(format!(
                "operation {} produces no value in this evaluator",
                other.mnemonic()
            ))),
        }
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn eval_arithmetic(
        &mut self,
        kind: ArithmeticKind,
        operand_type: ValueType,
        operand_count: u32,
    ) -> Result<RValue, ExecError> {
        if operand_count == 1 {
            let items = match self.ctx.pop()? {
                RValue::Array(items) => items,
                other => {
                    return Err(ExecError::type_mismatch(format!(
                        "arithmetic fold over a {:?} value",
                        other.type_of()
                    )))
                }
            };
            let mut iter = items.into_iter();
            let mut accumulator = iter
                .next()
                .ok_or_else(|| ExecError::type_mismatch("arithmetic fold over an empty array"))?;
            for item in iter {
                accumulator = apply_arithmetic(kind, &accumulator, &item)?;
            }
            return Ok(accumulator);
        }

        let second = self.ctx.pop()?;
        let first = self.ctx.pop()?;
        let _ = operand_type;

        match (&first, &second) {
            (RValue::Array(lhs), RValue::Array(rhs)) => {
                if lhs.len() != rhs.len() {
                    return Err(ExecError::type_mismatch(
                        "element-wise arithmetic over arrays of different lengths",
                    ));
                }
                let mut items = Vec::with_capacity(lhs.len());
                for (a, b) in lhs.iter().zip(rhs.iter()) {
                    items.push(apply_arithmetic(kind, a, b)?);
                }
                Ok(RValue::Array(items))
            }
            (RValue::Array(lhs), scalar) => {
                let mut items = Vec::with_capacity(lhs.len());
                for a in lhs {
                    items.push(apply_arithmetic(kind, a, scalar)?);
                }
                Ok(RValue::Array(items))
            }
            (scalar, RValue::Array(rhs)) => {
                let mut items = Vec::with_capacity(rhs.len());
                for b in rhs {
                    items.push(apply_arithmetic(kind, scalar, b)?);
                }
                Ok(RValue::Array(items))
            }
            _ => apply_arithmetic(kind, &first, &second),
        }
    }

    fn eval_bitwise_fold(
        &mut self,
        operand_type: ValueType,
        operations: &[Operation],
        fold: fn(i32, i32) -> i32,
        seed: i32,
    ) -> Result<RValue, ExecError> {
        // Bitwise folds over integers are complete: every sub-operation
        // evaluates.
        let mut accumulator = seed;
        for sub in operations {
            self.execute(sub)?;
            let value = self.pop_numeric_bits(operand_type)?;
            accumulator = fold(accumulator, value);
        }
        Ok(self.bits_to_value(operand_type, accumulator))
    }

    fn pop_numeric_bits(&mut self, operand_type: ValueType) -> Result<i32, ExecError> {
        match (operand_type, self.ctx.pop()?) {
            (ValueType::Integer, RValue::Integer(value)) => Ok(value),
            (ValueType::Integer16, RValue::Integer16(value)) => Ok(i32::from(value)),
            (_, other) => Err(ExecError::type_mismatch(format!(
                "bitwise operand of type {:?}",
                other.type_of()
            ))),
        }
    }

    fn bits_to_value(&self, operand_type: ValueType, bits: i32) -> RValue {
        match operand_type {
            ValueType::Integer16 => RValue::Integer16(bits as i16),
            _ => RValue::Integer(bits),
        }
    }

    fn call_function(&mut self, function: crate::ir::ids::FunctionId) -> Result<RValue, ExecError> {
        let (params, returns, body) = match self.program.functions.get(function) {
            Some(FunctionKind::User(func)) => {
                let Some(body) = &func.body else {
                    return Err(ExecError::internal("called function has no body"));
                };
                (func.params, func.returns, body)
            }
            Some(FunctionKind::Native(_)) => {
                return Err(ExecError::unsupported(
                    "native-call marshalling belongs to the host executor",
                ))
            }
            None => return Err(ExecError::internal("call references an unknown function")),
        };

        // The parameter scope lists parameters in reverse declaration
        // order, which matches stack pop order exactly.
        let mut bound = Vec::new();
        {
            let Some(params_scope) = self.program.scopes.get(params) else {
                return Err(ExecError::internal("parameter scope is not allocated"));
            };
            for name in params_scope.member_order() {
                bound.push(*name);
            }
        }

        self.activate_frame(body.scope())?;
        for name in bound {
            let value = match self.ctx.pop() {
                Ok(value) => value,
                Err(error) => {
                    self.ctx.pop_frame();
                    return Err(error);
                }
            };
            self.ctx.define(name, value);
        }

        let mut result = Ok(Signal::Normal);
        for operation in body.ops() {
            result = self.execute(operation);
            match &result {
                Ok(Signal::Normal) => {}
                _ => break,
            }
        }
        if let Err(error) = result {
            self.ctx.pop_frame();
            return Err(error);
        }

        // Collect the first return slot, if any.
        let mut returned = RValue::Null;
        if let Some(returns_scope) = self.program.scopes.get(returns) {
            if let Some(name) = returns_scope.member_order().first() {
                if let Some(value) = self.ctx.lookup(*name) {
                    returned = value.clone();
                }
            }
        }
        self.ctx.pop_frame();
        Ok(returned)
    }

    fn find_future(&self, from: ScopeId, name: StringId) -> Result<&Operation, ExecError> {
        let mut current = Some(from);
        while let Some(id) = current {
            let Some(scope) = self.program.scopes.get(id) else {
                break;
            };
            if let Some(producer) = scope.future(name) {
                return Ok(producer);
            }
            current = scope.parent;
        }
        Err(ExecError::unknown_variable(format!(
            "future {} has no registered producer",
            self.program.strings.resolve(name)
        )))
    }

    fn default_value(
        &self,
        scope: ScopeId,
        name: StringId,
        ty: ValueType,
    ) -> Result<RValue, ExecError> {
        Ok(match ty {
            ValueType::Integer => RValue::Integer(0),
            ValueType::Integer16 => RValue::Integer16(0),
            ValueType::Real => RValue::Real(0.0),
            ValueType::Boolean => RValue::Boolean(false),
            ValueType::String => RValue::Str(String::new()),
            ValueType::Array => RValue::Array(Vec::new()),
            ValueType::Tuple => {
                let hint = self.program.scopes.variable_tuple_hint(scope, name);
                self.default_composite(hint, false)?
            }
            ValueType::Structure => {
                let hint = self.program.scopes.variable_structure_hint(scope, name);
                self.default_composite(hint, true)?
            }
            _ => RValue::Null,
        })
    }

    fn default_composite(
        &self,
        hint: Option<CompositeId>,
        structure: bool,
    ) -> Result<RValue, ExecError> {
        let Some(hint) = hint else {
            return Err(ExecError::internal("composite variable carries no type hint"));
        };
        let def = if structure {
            self.program.registry.structure(hint)
        } else {
            self.program.registry.tuple(hint)
        };
        let Some(def) = def else {
            return Err(ExecError::internal(
                "composite hint does not resolve in the type registry",
            ));
        };

        let mut members = BTreeMap::new();
        for member in def.member_order() {
            let info = def
                .member(*member)
                .ok_or_else(|| ExecError::internal("composite member order is inconsistent"))?;
            let value = match info.ty {
                ValueType::Tuple => self.default_composite(info.type_hint, false)?,
                ValueType::Structure => self.default_composite(info.type_hint, true)?,
                ValueType::Integer => RValue::Integer(0),
                ValueType::Integer16 => RValue::Integer16(0),
                ValueType::Real => RValue::Real(0.0),
                ValueType::Boolean => RValue::Boolean(false),
                ValueType::String => RValue::Str(String::new()),
                ValueType::Array => RValue::Array(Vec::new()),
                _ => RValue::Null,
            };
            members.insert(*member, value);
        }

        Ok(if structure {
            RValue::Structure {
                type_id: hint,
                members,
            }
        } else {
            RValue::Tuple {
                type_id: hint,
                members,
            }
        })
    }
}

fn apply_arithmetic(kind: ArithmeticKind, a: &RValue, b: &RValue) -> Result<RValue, ExecError> {
    match (a, b) {
        (RValue::Integer(a), RValue::Integer(b)) => Ok(RValue::Integer(match kind {
            ArithmeticKind::Sum => a.wrapping_add(*b),
            ArithmeticKind::Subtract => a.wrapping_sub(*b),
            ArithmeticKind::Multiply => a.wrapping_mul(*b),
            ArithmeticKind::Divide => {
                if *b == 0 {
                    return Err(ExecError::divide_by_zero());
                }
                a.wrapping_div(*b)
            }
        })),
        (RValue::Integer16(a), RValue::Integer16(b)) => Ok(RValue::Integer16(match kind {
            ArithmeticKind::Sum => a.wrapping_add(*b),
            ArithmeticKind::Subtract => a.wrapping_sub(*b),
            ArithmeticKind::Multiply => a.wrapping_mul(*b),
            ArithmeticKind::Divide => {
                if *b == 0 {
                    return Err(ExecError::divide_by_zero());
                }
                a.wrapping_div(*b)
            }
        })),
        (RValue::Real(a), RValue::Real(b)) => Ok(RValue::Real(match kind {
            ArithmeticKind::Sum => a + b,
            ArithmeticKind::Subtract => a - b,
            ArithmeticKind::Multiply => a * b,
            ArithmeticKind::Divide => a / b,
        })),
        _ => Err(ExecError::type_mismatch(format!(
            "arithmetic over {:?} and {:?}",
            a.type_of(),
            b.type_of()
        ))),
    }
}

fn compare_values(kind: ComparisonKind, a: &RValue, b: &RValue) -> Result<bool, ExecError> {
    use std::cmp::Ordering;

    let ordering = match (a, b) {
        (RValue::Integer(a), RValue::Integer(b)) => a.cmp(b),
        (RValue::Integer16(a), RValue::Integer16(b)) => a.cmp(b),
        (RValue::Real(a), RValue::Real(b)) => {
            a.partial_cmp(b).unwrap_or(Ordering::Greater)
        }
        (RValue::Boolean(a), RValue::Boolean(b)) => a.cmp(b),
        (RValue::Str(a), RValue::Str(b)) => a.cmp(b),
        _ => {
            return Err(ExecError::type_mismatch(format!(
                "comparison over {:?} and {:?}",
                a.type_of(),
                b.type_of()
            )))
        }
    };

    Ok(match kind {
        ComparisonKind::Equal => ordering == Ordering::Equal,
        ComparisonKind::NotEqual => ordering != Ordering::Equal,
        ComparisonKind::Less => ordering == Ordering::Less,
        ComparisonKind::Greater => ordering == Ordering::Greater,
        ComparisonKind::LessOrEqual => ordering != Ordering::Greater,
        ComparisonKind::GreaterOrEqual => ordering != Ordering::Less,
    })
}

fn cast_value(value: &RValue, target: ValueType) -> Result<RValue, ExecError> {
    let result = match target {
        ValueType::Integer => RValue::Integer(match value {
            RValue::Integer(v) => *v,
            RValue::Integer16(v) => i32::from(*v),
            RValue::Real(v) => *v as i32,
            RValue::Boolean(v) => i32::from(*v),
            RValue::Str(v) => v.trim().parse::<i32>().unwrap_or(0),
            _ => return cast_failure(value, target),
        }),
        ValueType::Integer16 => RValue::Integer16(match value {
            RValue::Integer(v) => *v as i16,
            RValue::Integer16(v) => *v,
            RValue::Real(v) => *v as i16,
            RValue::Boolean(v) => i16::from(*v),
            RValue::Str(v) => v.trim().parse::<i16>().unwrap_or(0),
            _ => return cast_failure(value, target),
        }),
        ValueType::Real => RValue::Real(match value {
            RValue::Integer(v) => *v as f32,
            RValue::Integer16(v) => f32::from(*v),
            RValue::Real(v) => *v,
            RValue::Boolean(v) => f32::from(u8::from(*v)),
            RValue::Str(v) => v.trim().parse::<f32>().unwrap_or(0.0),
            _ => return cast_failure(value, target),
        }),
        _ => return cast_failure(value, target),
    };
    Ok(result)
}

fn cast_to_string(value: &RValue) -> Result<RValue, ExecError> {
    let text = match value {
        RValue::Integer(v) => v.to_string(),
        RValue::Integer16(v) => v.to_string(),
        RValue::Real(v) => v.to_string(),
        RValue::Boolean(v) => if *v { "true" } else { "false" }.to_string(),
        RValue::Buffer(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            return Err(ExecError::type_mismatch(format!(
                "cannot cast a {:?} value to string",
                value.type_of()
            )))
        }
    };
    Ok(RValue::Str(text))
}

fn cast_failure(value: &RValue, target: ValueType) -> Result<RValue, ExecError> {
    Err(ExecError::type_mismatch(format!(
        "cannot cast a {:?} value to {:?}",
        value.type_of(),
        target
    )))
}
