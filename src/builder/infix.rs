//! Infix operator handling: precedence, infix units, and expression
//! finalization.

use std::collections::{BTreeMap, VecDeque};

use crate::builder::{SemanticBuilder, StackEntry};
use crate::ir::error::IrError;
use crate::ir::operation::{ArithmeticKind, Operation};
use crate::ir::types::ValueType;

/// Defined operator precedence levels, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Precedence {
    Min = 0,
    Assignment,
    Bitwise,
    Logical,
    Equality,
    Comparison,
    User,
    CalcAssign,
    Addition,
    Multiplication,
    Boolean,
    Concatenation,
    Increment,
    Member,
    Max,
}

/// Metadata for one infix operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfixOperator {
    pub precedence: Precedence,
    /// The operation builder this operator routes to.
    pub function: String,
}

/// The built-in operator table; user-defined operators join at the User
/// level.
pub(crate) fn default_infix_table() -> BTreeMap<String, InfixOperator> {
    let mut table = BTreeMap::new();
    let mut define = |op: &str, function: &str, precedence: Precedence| {
        table.insert(
            op.to_string(),
            InfixOperator {
                precedence,
                function: function.to_string(),
            },
        );
    };

    define("+", "add", Precedence::Addition);
    define("-", "subtract", Precedence::Addition);
    define("*", "multiply", Precedence::Multiplication);
    define("/", "divide", Precedence::Multiplication);

    define("+=", "add", Precedence::CalcAssign);
    define("-=", "subtract", Precedence::CalcAssign);
    define("*=", "multiply", Precedence::CalcAssign);
    define("/=", "divide", Precedence::CalcAssign);

    define("++", "add", Precedence::Increment);
    define("--", "subtract", Precedence::Increment);

    define(">", "greater", Precedence::Comparison);
    define(">=", "greaterequal", Precedence::Comparison);
    define("<", "less", Precedence::Comparison);
    define("<=", "lessequal", Precedence::Comparison);
    define("==", "equal", Precedence::Equality);
    define("!=", "notequal", Precedence::Equality);

    define("&", "and", Precedence::Boolean);
    define("|", "or", Precedence::Boolean);
    define("^", "xor", Precedence::Boolean);

    define(".", "concat", Precedence::Concatenation);
    define(".=", "concat", Precedence::CalcAssign);

    define("=", "assign", Precedence::Assignment);

    table
}

/// One cohesive unit of operations in an infix expression: an operand's
/// push together with its precomputation, or a combined sub-expression.
struct InfixUnit {
    ops: Vec<Operation>,
    operands: Vec<StackEntry>,
}

impl SemanticBuilder {
    /// Adds an infix operator to the current phrase.
    pub fn push_infix_operator(&mut self, operator: &str) {
        if let Some(list) = self.infix_operators.last_mut() {
            list.push(operator.to_string());
        }
    }

    /// Tracks the presence of one more operand in the current phrase.
    pub fn register_infix_operand(&mut self) {
        if let Some(count) = self.infix_operand_count.last_mut() {
            *count += 1;
        }
    }

    /// Registers the current phrase as an assignment's right side and
    /// records its l-value.
    pub fn register_infix_operand_as_lvalue(&mut self, name: &str) -> Result<(), IrError> {
        self.register_infix_operand();

        let id = self.program.intern(name);
        self.push_entry(StackEntry::Identifier(id))?;

        self.infix_operators.push(vec!["=".to_string()]);
        self.passed_parameter_count.push(0);
        self.infix_operand_count.push(0);
        Ok(())
    }

    /// Opens a fresh infix phrase.
    pub fn reset_infix_tracking(&mut self) {
        self.infix_operand_count.push(0);
        self.infix_operators.push(Vec::new());
    }

    /// Registers that a parenthetical expression just finished.
    pub fn terminate_parenthetical(&mut self) {
        self.pop_parameter_count();
        self.count_parameter();
    }

    /// Finishes the current infix phrase, lowering it to operations.
    /// Runs finalization passes until none makes progress.
    pub fn terminate_infix_expression(&mut self) -> Result<(), IrError> {
        self.reset_member_access()?;

        let mut first_run = true;
        while self.finalize_infix_expression(first_run)? {
            first_run = false;
        }

        self.last_member_level_rvalue = self.member_level_rvalue;
        self.member_level_rvalue = 0;
        Ok(())
    }

    /// Looks up the precedence of an operator.
    pub fn infix_precedence(&self, operator: &str) -> Result<Precedence, IrError> {
        self.infix_table
            .get(operator)
            .map(|info| info.precedence)
            .ok_or_else(|| IrError::structural(format!("unrecognized infix operator {operator}")))
    }

    /// Translates an operator's short name into its operation builder.
    pub fn infix_alias(&self, operator: &str) -> Result<String, IrError> {
        self.infix_table
            .get(operator)
            .map(|info| info.function.clone())
            .ok_or_else(|| IrError::structural(format!("unrecognized infix operator {operator}")))
    }

    /// Records that the next defined function joins the operator table.
    pub fn register_user_defined_infix(&mut self) {
        self.function_is_infix = true;
    }

    /// Adds a function to the infix operator table at the user level.
    pub fn register_infix_function(&mut self, name: &str) {
        self.infix_table.insert(
            name.to_string(),
            InfixOperator {
                precedence: Precedence::User,
                function: name.to_string(),
            },
        );
        self.user_infix_operators.insert(name.to_string());
    }

    /// One reduction pass over the current infix phrase.
    fn finalize_infix_expression(&mut self, first_run: bool) -> Result<bool, IrError> {
        if self.infix_operators.is_empty() || self.infix_operand_count.is_empty() {
            return Ok(false);
        }

        let operand_count = *self
            .infix_operand_count
            .last()
            .ok_or_else(|| IrError::structural("infix operand tracking lost"))?;
        let tail_is_assign = self
            .infix_operators
            .last()
            .and_then(|list| list.last())
            .map(|op| op == "=")
            .unwrap_or(false);
        let list_empty = self
            .infix_operators
            .last()
            .map(|list| list.is_empty())
            .unwrap_or(true);

        if list_empty || (operand_count == 1 && !tail_is_assign) {
            self.infix_operators.pop();
            self.infix_operand_count.pop();
            return Ok(false);
        }

        // Chained assignment: re-read the previous target and store it
        // into the next one.
        if operand_count == 1 && tail_is_assign && !first_run {
            return self.finalize_chained_assignment();
        }

        let scope = self.current_scope;

        let expression_type = {
            let ctx = self.program.type_context();
            match self.blocks.last().and_then(|entry| entry.block.tail()) {
                Some(op) => op.result_type(scope, &ctx),
                None => {
                    return Err(IrError::structural(
                        "infix expression terminated with no operations emitted",
                    ))
                }
            }
        };

        // Partition the emitted operations into one unit per operand.
        let mut units: VecDeque<InfixUnit> = VecDeque::new();
        let mut bailout = false;
        for _ in 0..operand_count {
            let group = {
                let ctx = self.program.type_context();
                match self.blocks.last() {
                    Some(entry) => entry.block.count_tail_ops(1, scope, &ctx),
                    None => 0,
                }
            };

            let mut ops: Vec<Operation> = Vec::with_capacity(group);
            for _ in 0..group {
                let Some(op) = self.blocks.last_mut().and_then(|entry| entry.block.pop_tail())
                else {
                    return Err(IrError::structural("infix operand lost its operations"));
                };

                if !bailout {
                    let op_type = {
                        let ctx = self.program.type_context();
                        op.result_type(scope, &ctx)
                    };
                    if op_type != expression_type {
                        if op_type == ValueType::Array {
                            if op.cons_element_type() != Some(expression_type) {
                                self.report_fatal_error(
                                    "all values in the expression must be of the same type",
                                );
                                bailout = true;
                            }
                        } else {
                            self.report_fatal_error(
                                "all values in the expression must be of the same type",
                            );
                            bailout = true;
                        }
                    }
                }

                ops.insert(0, op);
            }

            let Some(operand) = self.stack.pop() else {
                return Err(IrError::structural(
                    "operand stack underflow while partitioning an infix expression",
                ));
            };
            units.push_front(InfixUnit {
                ops,
                operands: vec![operand],
            });
        }

        if bailout {
            while let Some(list) = self.infix_operators.pop() {
                let assigns = list.iter().filter(|op| op.as_str() == "=").count();
                for _ in 0..assigns {
                    self.stack.pop();
                }
            }
            self.infix_operand_count.clear();
            return Ok(false);
        }

        let mut operators = self
            .infix_operators
            .pop()
            .ok_or_else(|| IrError::structural("infix operator tracking lost"))?;

        let mut ret = false;
        let mut inject_lvalue = None;

        // Combine units by precedence, highest level first.
        for level in ((Precedence::Min as u32 + 1)..(Precedence::Max as u32)).rev() {
            let mut unit_idx = 0usize;
            let mut i = 0usize;
            while i < operators.len() {
                let operator = operators[i].clone();
                let info = self
                    .infix_table
                    .get(&operator)
                    .cloned()
                    .ok_or_else(|| {
                        IrError::structural(format!("unrecognized infix operator {operator}"))
                    })?;

                if info.precedence as u32 != level {
                    if operator != "=" {
                        unit_idx += 1;
                    }
                    i += 1;
                    continue;
                }

                if operator == "=" {
                    let Some(StackEntry::Identifier(lvalue)) = self.stack.pop() else {
                        self.report_fatal_error(
                            "expected a variable name on the left side of the assignment operator",
                        );
                        self.infix_operand_count.pop();
                        return Ok(false);
                    };
                    ret = true;

                    if self.program.scopes.variable_type(scope, lvalue) != Some(expression_type) {
                        self.report_fatal_error(
                            "variable must have the same type as the expression",
                        );
                        self.infix_operand_count.pop();
                        return Ok(false);
                    }
                    if self.program.scopes.is_constant(scope, lvalue) {
                        self.report_fatal_error("constants cannot be reassigned");
                        self.infix_operand_count.pop();
                        return Ok(false);
                    }
                    inject_lvalue = Some(lvalue);
                    operators.remove(i);
                    continue;
                }

                let Some(mut first) = units.remove(unit_idx) else {
                    return Err(IrError::structural("infix unit list desynchronized"));
                };
                let Some(second) = units.remove(unit_idx) else {
                    return Err(IrError::structural("infix unit list desynchronized"));
                };

                let saved_count = self.passed_parameter_count.pop().unwrap_or(0);
                self.passed_parameter_count.push(2);

                let function = info.function.as_str();
                let combined = if function == "and" || function == "or" {
                    // Compound operators take ownership of the child
                    // operations so precedence and short-circuiting both
                    // hold.
                    let mut second = second;
                    let mut children = Vec::new();
                    children.append(&mut first.ops);
                    children.append(&mut second.ops);

                    let compound = match (function, expression_type) {
                        ("and", ValueType::Integer) | ("and", ValueType::Integer16) => {
                            Operation::BitwiseAnd {
                                operand_type: expression_type,
                                operations: children,
                            }
                        }
                        ("or", ValueType::Integer) | ("or", ValueType::Integer16) => {
                            Operation::BitwiseOr {
                                operand_type: expression_type,
                                operations: children,
                            }
                        }
                        ("and", ValueType::Boolean) => Operation::LogicalAnd {
                            operations: children,
                        },
                        ("or", ValueType::Boolean) => Operation::LogicalOr {
                            operations: children,
                        },
                        _ => {
                            return Err(IrError::structural(
                                "invalid type for boolean operator",
                            ))
                        }
                    };

                    let pushed = {
                        let ctx = self.program.type_context();
                        Operation::push(compound, scope, &ctx)
                    };
                    first.operands.clear();
                    InfixUnit {
                        ops: vec![pushed],
                        operands: second.operands,
                    }
                } else {
                    for entry in first.operands.drain(..) {
                        self.push_entry(entry)?;
                    }
                    for entry in second.operands.iter().cloned() {
                        self.push_entry(entry)?;
                    }

                    let op = self.build_operation(function)?;
                    let pushed = {
                        let ctx = self.program.type_context();
                        Operation::push(op, scope, &ctx)
                    };

                    let mut second = second;
                    let mut ops = Vec::new();
                    ops.append(&mut first.ops);
                    ops.append(&mut second.ops);
                    ops.push(pushed);
                    InfixUnit {
                        ops,
                        operands: second.operands,
                    }
                };

                self.passed_parameter_count.pop();
                self.passed_parameter_count
                    .push(saved_count.saturating_sub(1));

                units.insert(unit_idx, combined);
                operators.remove(i);
            }
        }

        // Emit the surviving units in order.
        for unit in units {
            for op in unit.ops {
                self.add_operation(op)?;
            }
        }

        if let Some(lvalue) = inject_lvalue {
            self.add_operation(Operation::AssignValue(lvalue))?;
        } else {
            let snapshot = {
                let ctx = self.program.type_context();
                self.blocks
                    .last()
                    .and_then(|entry| entry.block.tail())
                    .map(|op| (op.result_type(scope, &ctx), op.cons_element_type()))
            };
            if let Some((ty, cons_element)) = snapshot {
                self.push_entry(StackEntry::Expression { ty, cons_element })?;
            }
        }

        self.infix_operand_count.pop();
        Ok(ret)
    }

    fn finalize_chained_assignment(&mut self) -> Result<bool, IrError> {
        let scope = self.current_scope;

        let lvalue = match self.stack.last() {
            Some(StackEntry::Identifier(id)) => *id,
            _ => {
                self.report_fatal_error(
                    "expected a variable name on the left side of the assignment operator",
                );
                return Ok(false);
            }
        };

        let previous = match self.blocks.last().and_then(|entry| entry.block.tail()) {
            Some(Operation::AssignValue(id)) => *id,
            _ => {
                return Err(IrError::structural(
                    "chained assignment without a prior assignment at the block tail",
                ))
            }
        };

        if self.program.scopes.is_constant(scope, lvalue) {
            self.report_fatal_error("constants cannot be reassigned");
            self.stack.pop();
            self.infix_operand_count.pop();
            self.infix_operators.pop();
            return Ok(true);
        }

        self.stack.pop();

        let read = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetVariableValue(previous), scope, &ctx)
        };
        self.add_operation(read)?;
        self.add_operation(Operation::AssignValue(lvalue))?;

        self.infix_operand_count.pop();
        self.infix_operators.pop();
        Ok(true)
    }

    // -----------------------------------------------------------------
    // Operate-and-assign
    // -----------------------------------------------------------------

    /// Tracks the operate-and-assign operator being parsed and opens its
    /// tracking frames.
    pub fn register_op_assignment_operator(&mut self, operator: &str) {
        self.op_assignment_operator = Some(operator.to_string());
        self.infix_operand_count.push(0);
        self.infix_operators.push(Vec::new());
        self.passed_parameter_count.push(0);
    }

    /// Emits an operate-and-assign sequence: read the target, swap the
    /// value above the read, apply the operator, store back.
    pub fn register_op_assignment(&mut self) -> Result<(), IrError> {
        let Some(value) = self.stack.pop() else {
            self.report_fatal_error("expected a value on the right side");
            return Ok(());
        };
        let lvalue = match self.stack.pop() {
            Some(StackEntry::Identifier(id)) => id,
            _ => {
                self.report_fatal_error("expected a variable name on the left side");
                return Ok(());
            }
        };

        let scope = self.current_scope;
        let left_type = self
            .program
            .scopes
            .variable_type(scope, lvalue)
            .unwrap_or(ValueType::Error);
        let value_type = value.effective_type(scope, &self.program);

        if left_type != value_type {
            self.report_fatal_error("variable type and expression type do not match");
            return Ok(());
        }
        if self.program.scopes.is_constant(scope, lvalue) {
            self.report_fatal_error("constants cannot be reassigned");
            return Ok(());
        }

        let read = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetVariableValue(lvalue), scope, &ctx)
        };
        self.add_operation(read)?;
        {
            let ctx = self.program.type_context();
            if let Some(entry) = self.blocks.last_mut() {
                entry.block.reverse_tail_groups(scope, &ctx);
            }
        }

        let operator = self
            .op_assignment_operator
            .take()
            .ok_or_else(|| IrError::structural("operate-and-assign operator is missing"))?;

        let inner = match operator.as_str() {
            "+=" => self.numeric_op(ArithmeticKind::Sum, value_type)?,
            "-=" => self.numeric_op(ArithmeticKind::Subtract, value_type)?,
            "*=" => self.numeric_op(ArithmeticKind::Multiply, value_type)?,
            "/=" => self.numeric_op(ArithmeticKind::Divide, value_type)?,
            ".=" => {
                if value_type != ValueType::String {
                    return Err(IrError::structural("invalid type for this operation"));
                }
                Operation::Concatenate {
                    first_is_array: false,
                    second_is_array: false,
                    operand_count: 2,
                }
            }
            other => {
                return Err(IrError::structural(format!(
                    "unrecognized infix assignment operator {other}"
                )))
            }
        };

        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(inner, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.add_operation(Operation::AssignValue(lvalue))
    }

    fn numeric_op(&self, kind: ArithmeticKind, ty: ValueType) -> Result<Operation, IrError> {
        if !ty.is_numeric() {
            return Err(IrError::structural("invalid type for this operation"));
        }
        Ok(Operation::Arithmetic {
            kind,
            operand_type: ty,
            first_is_array: false,
            second_is_array: false,
            operand_count: 2,
        })
    }

    // -----------------------------------------------------------------
    // Increment and decrement
    // -----------------------------------------------------------------

    /// Saves the variable name an increment or decrement applies to.
    pub fn save_incdec_name(&mut self, name: &str) {
        let id = self.program.intern(name);
        self.saved_incdec_name = Some(id);
    }

    /// Injects a preincrement: the sequence lands in the current block
    /// immediately.
    pub fn preincrement_variable(&mut self) -> Result<(), IrError> {
        self.emit_incdec(ArithmeticKind::Sum, false)
    }

    /// Injects a predecrement.
    pub fn predecrement_variable(&mut self) -> Result<(), IrError> {
        self.emit_incdec(ArithmeticKind::Subtract, false)
    }

    /// Queues a postincrement for the next statement boundary.
    pub fn postincrement_variable(&mut self) -> Result<(), IrError> {
        self.emit_incdec(ArithmeticKind::Sum, true)
    }

    /// Queues a postdecrement for the next statement boundary.
    pub fn postdecrement_variable(&mut self) -> Result<(), IrError> {
        self.emit_incdec(ArithmeticKind::Subtract, true)
    }

    fn emit_incdec(&mut self, kind: ArithmeticKind, deferred: bool) -> Result<(), IrError> {
        let Some(name) = self.saved_incdec_name else {
            return Err(IrError::structural("no variable saved for increment"));
        };

        let scope = self.current_scope;
        let ty = self
            .program
            .scopes
            .variable_type(scope, name)
            .unwrap_or(ValueType::Error);
        if !ty.is_numeric() {
            self.report_fatal_error("cannot increment a non-numeric variable");
            return Ok(());
        }

        let literal = match ty {
            ValueType::Integer => Operation::PushInteger(1),
            ValueType::Integer16 => Operation::PushInteger16(1),
            _ => Operation::PushReal(1.0),
        };
        let read = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetVariableValue(name), scope, &ctx)
        };
        let apply = {
            let ctx = self.program.type_context();
            Operation::push(
                Operation::Arithmetic {
                    kind,
                    operand_type: ty,
                    first_is_array: false,
                    second_is_array: false,
                    operand_count: 2,
                },
                scope,
                &ctx,
            )
        };

        if deferred {
            self.add_operation_deferred(read);
            self.add_operation_deferred(literal);
            self.add_operation_deferred(apply);
            self.add_operation_deferred(Operation::AssignValue(name));
            Ok(())
        } else {
            self.add_operation(read)?;
            self.add_operation(literal)?;
            self.add_operation(apply)?;
            self.add_operation(Operation::AssignValue(name))
        }
    }

    /// Pushes the saved increment/decrement variable as an inline
    /// expression operand.
    pub fn handle_inline_incdec(&mut self) -> Result<(), IrError> {
        let Some(name) = self.saved_incdec_name else {
            return Err(IrError::structural("no variable saved for increment"));
        };

        let scope = self.current_scope;
        let read = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetVariableValue(name), scope, &ctx)
        };
        self.add_operation(read)?;

        let snapshot = {
            let ctx = self.program.type_context();
            self.blocks
                .last()
                .and_then(|entry| entry.block.tail())
                .map(|op| op.result_type(scope, &ctx))
        };
        if let Some(ty) = snapshot {
            self.push_entry(StackEntry::Expression {
                ty,
                cons_element: None,
            })?;
        }

        self.count_parameter();
        Ok(())
    }
}
