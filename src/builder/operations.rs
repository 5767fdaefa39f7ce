//! Operation factories: arithmetic, comparison, concatenation, casts,
//! invocation, containers, and debugging.

use crate::builder::{SemanticBuilder, StackEntry};
use crate::ir::error::IrError;
use crate::ir::operation::{ArithmeticKind, ComparisonKind, Operation};
use crate::ir::types::ValueType;

impl SemanticBuilder {
    /// Builds the operation a named builder routes to, consuming its
    /// operand entries from the stack. Soft failures yield `NoOp`.
    pub(crate) fn build_operation(&mut self, name: &str) -> Result<Operation, IrError> {
        match name {
            "add" => self.create_arithmetic(name, ArithmeticKind::Sum),
            "subtract" => self.create_arithmetic(name, ArithmeticKind::Subtract),
            "multiply" => self.create_arithmetic(name, ArithmeticKind::Multiply),
            "divide" => self.create_arithmetic(name, ArithmeticKind::Divide),
            "equal" => self.create_comparison(ComparisonKind::Equal),
            "notequal" => self.create_comparison(ComparisonKind::NotEqual),
            "less" => self.create_comparison(ComparisonKind::Less),
            "greater" => self.create_comparison(ComparisonKind::Greater),
            "lessequal" => self.create_comparison(ComparisonKind::LessOrEqual),
            "greaterequal" => self.create_comparison(ComparisonKind::GreaterOrEqual),
            "concat" => self.create_concatenation(),
            "xor" => self.create_xor(),
            other => self.create_user_invocation(other),
        }
    }

    fn create_arithmetic(
        &mut self,
        name: &str,
        kind: ArithmeticKind,
    ) -> Result<Operation, IrError> {
        let count = self.parameter_count();

        // One operand means folding over a single array constructor.
        if count == 1 {
            let entry = self.stack.pop();
            let element = match entry {
                Some(StackEntry::Expression {
                    ty: ValueType::Array,
                    cons_element: Some(element),
                }) => element,
                _ => {
                    self.report_fatal_error(format!(
                        "{name}() function expects 2 parameters or 1 array"
                    ));
                    return Ok(Operation::NoOp);
                }
            };

            if !element.is_numeric() {
                self.report_fatal_error(format!(
                    "cannot {name}() an array of this type of element"
                ));
                return Ok(Operation::NoOp);
            }

            return Ok(Operation::Arithmetic {
                kind,
                operand_type: element,
                first_is_array: false,
                second_is_array: false,
                operand_count: 1,
            });
        }

        if count != 2 {
            self.report_fatal_error(format!("{name}() function expects 2 parameters"));
            for _ in 0..count {
                self.stack.pop();
            }
            return Ok(Operation::NoOp);
        }

        let Some(second) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };
        let Some(first) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };

        let scope = self.current_scope;
        let first_type = first.effective_type(scope, &self.program);
        let second_type = second.effective_type(scope, &self.program);

        if first_type != second_type {
            self.report_fatal_error(format!("parameters to {name}() must be of the same type"));
            return Ok(Operation::NoOp);
        }
        if !first_type.is_numeric() {
            self.report_fatal_error(format!("{name}() cannot use parameters of this type"));
            return Ok(Operation::NoOp);
        }

        Ok(Operation::Arithmetic {
            kind,
            operand_type: first_type,
            first_is_array: first.is_array(scope, &self.program),
            second_is_array: second.is_array(scope, &self.program),
            operand_count: 2,
        })
    }

    fn create_comparison(&mut self, kind: ComparisonKind) -> Result<Operation, IrError> {
        let count = self.parameter_count();
        if count != 2 {
            self.report_fatal_error("comparison operators expect 2 parameters");
            for _ in 0..count {
                self.stack.pop();
            }
            return Ok(Operation::NoOp);
        }

        let Some(second) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };
        let Some(first) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };

        let scope = self.current_scope;
        let first_type = first.effective_type(scope, &self.program);
        let second_type = second.effective_type(scope, &self.program);

        if first_type != second_type {
            self.report_fatal_error("compared values must be of the same type");
            return Ok(Operation::NoOp);
        }

        Ok(Operation::Compare {
            kind,
            operand_type: first_type,
        })
    }

    fn create_concatenation(&mut self) -> Result<Operation, IrError> {
        let count = self.parameter_count();

        if count == 1 {
            let entry = self.stack.pop();
            match entry {
                Some(StackEntry::Expression {
                    ty: ValueType::Array,
                    cons_element: Some(ValueType::String),
                }) => {
                    return Ok(Operation::Concatenate {
                        first_is_array: false,
                        second_is_array: false,
                        operand_count: 1,
                    })
                }
                _ => {
                    self.report_fatal_error(
                        "concat() function expects 2 parameters or 1 array of strings",
                    );
                    return Ok(Operation::NoOp);
                }
            }
        }

        if count != 2 {
            self.report_fatal_error("concat() function expects 2 parameters");
            for _ in 0..count {
                self.stack.pop();
            }
            return Ok(Operation::NoOp);
        }

        let Some(second) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };
        let Some(first) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };

        let scope = self.current_scope;
        if first.effective_type(scope, &self.program) != ValueType::String
            || second.effective_type(scope, &self.program) != ValueType::String
        {
            self.report_fatal_error("concat() operands must be strings");
            return Ok(Operation::NoOp);
        }

        Ok(Operation::Concatenate {
            first_is_array: first.is_array(scope, &self.program),
            second_is_array: second.is_array(scope, &self.program),
            operand_count: 2,
        })
    }

    fn create_xor(&mut self) -> Result<Operation, IrError> {
        let count = self.parameter_count();
        if count != 2 {
            self.report_fatal_error("xor() expects 2 parameters");
            for _ in 0..count {
                self.stack.pop();
            }
            return Ok(Operation::NoOp);
        }

        let Some(second) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };
        let Some(first) = self.stack.pop() else {
            return Err(IrError::structural("operand stack underflow"));
        };

        let scope = self.current_scope;
        let first_type = first.effective_type(scope, &self.program);
        let second_type = second.effective_type(scope, &self.program);

        if first_type != second_type {
            self.report_fatal_error("xor() operands must be of the same type");
            return Ok(Operation::NoOp);
        }

        match first_type {
            ValueType::Boolean => Ok(Operation::LogicalXor),
            ValueType::Integer | ValueType::Integer16 => Ok(Operation::BitwiseXor {
                operand_type: first_type,
            }),
            _ => {
                self.report_fatal_error("xor() cannot use parameters of this type");
                Ok(Operation::NoOp)
            }
        }
    }

    fn create_user_invocation(&mut self, name: &str) -> Result<Operation, IrError> {
        let id = self.program.intern(name);
        let Some(function) = self.program.scopes.function_id(self.current_scope, id) else {
            return Err(IrError::structural(format!(
                "no operation builder or function named {name}"
            )));
        };

        let arity = self.parameter_count();
        let expected = {
            let ctx = self.program.type_context();
            self.program
                .functions
                .get(function)
                .and_then(|kind| ctx.scopes.get(kind.params()))
                .map(|params| params.member_order().len())
                .unwrap_or(0)
        };

        for _ in 0..arity {
            self.stack.pop();
        }
        if arity != expected {
            self.report_fatal_error(format!(
                "{name}() expects {expected} parameters, received {arity}"
            ));
            return Ok(Operation::NoOp);
        }

        Ok(Operation::Invoke {
            function,
            indirect: false,
        })
    }

    // -----------------------------------------------------------------
    // Statement- and operand-level factories
    // -----------------------------------------------------------------

    /// Emits a direct or indirect function call with its arity checked
    /// against the callee.
    pub fn register_function_call(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let arity = self.parameter_count();

        if let Some(function) = self.program.scopes.function_id(self.current_scope, id) {
            let expected = {
                let ctx = self.program.type_context();
                self.program
                    .functions
                    .get(function)
                    .and_then(|kind| ctx.scopes.get(kind.params()))
                    .map(|params| params.member_order().len())
                    .unwrap_or(0)
            };

            for _ in 0..arity {
                self.stack.pop();
            }
            if arity != expected {
                self.report_fatal_error(format!(
                    "{name}() expects {expected} parameters, received {arity}"
                ));
                return self.add_operation(Operation::NoOp);
            }

            let op = Operation::Invoke {
                function,
                indirect: false,
            };
            self.add_operation(op.clone())?;
            return self.push_expression_entry(&op);
        }

        if self.program.scopes.variable_type(self.current_scope, id) == Some(ValueType::Function) {
            let expected = self
                .program
                .scopes
                .function_signature(self.current_scope, id)
                .map(|signature| signature.param_count())
                .unwrap_or(0);

            for _ in 0..arity {
                self.stack.pop();
            }
            if arity != expected {
                self.report_fatal_error(format!(
                    "{name}() expects {expected} parameters, received {arity}"
                ));
                return self.add_operation(Operation::NoOp);
            }

            let op = Operation::InvokeIndirect { name: id };
            self.add_operation(op.clone())?;
            return self.push_expression_entry(&op);
        }

        self.report_fatal_error(format!("unknown function {name}"));
        for _ in 0..arity {
            self.stack.pop();
        }
        self.add_operation(Operation::NoOp)
    }

    /// Emits a cast of the just-pushed operand to the target type.
    pub fn register_cast(&mut self, target: ValueType) -> Result<(), IrError> {
        let Some(entry) = self.stack.pop() else {
            self.report_fatal_error("cast() expects a value to convert");
            return self.add_operation(Operation::NoOp);
        };
        let source = entry.effective_type(self.current_scope, &self.program);

        let valid = match target {
            ValueType::String => matches!(
                source,
                ValueType::Integer
                    | ValueType::Integer16
                    | ValueType::Real
                    | ValueType::Boolean
                    | ValueType::Buffer
            ),
            ValueType::Integer | ValueType::Integer16 | ValueType::Real => {
                source != target
                    && matches!(
                        source,
                        ValueType::String
                            | ValueType::Real
                            | ValueType::Integer
                            | ValueType::Integer16
                            | ValueType::Boolean
                    )
            }
            _ => false,
        };
        if !valid {
            self.report_fatal_error("cannot cast between these types");
            return self.add_operation(Operation::NoOp);
        }

        let Some(producer) = self.blocks.last_mut().and_then(|entry| entry.block.pop_tail())
        else {
            return Err(IrError::structural("cast() has no producing operation"));
        };
        // The cast wraps the raw producer so the pair travels as one unit.
        let inner = match producer {
            Operation::Push(source_op) => *source_op.op,
            other => other,
        };

        let scope = self.current_scope;
        let cast = if target == ValueType::String {
            Operation::TypeCastToString {
                source,
                operand: Box::new(inner),
            }
        } else {
            Operation::TypeCast {
                source,
                target,
                operand: Box::new(inner),
            }
        };

        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(cast, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: target,
            cons_element: None,
        })
    }

    /// Emits the debug write of a string expression.
    pub fn register_debug_write(&mut self) -> Result<(), IrError> {
        let Some(entry) = self.stack.pop() else {
            self.report_fatal_error("debugwritestring() expects a string expression");
            return self.add_operation(Operation::NoOp);
        };
        if entry.effective_type(self.current_scope, &self.program) != ValueType::String {
            self.report_fatal_error("debugwritestring() expects a string expression");
            return self.add_operation(Operation::NoOp);
        }
        self.add_operation(Operation::DebugWriteString)
    }

    /// Pushes a read of the debug input as a string operand.
    pub fn register_debug_read(&mut self) -> Result<(), IrError> {
        let scope = self.current_scope;
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::DebugReadStaticString, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::String,
            cons_element: None,
        })
    }

    /// Emits a return from the current function.
    pub fn register_return_statement(&mut self) -> Result<(), IrError> {
        self.add_operation(Operation::Return)
    }

    /// Emits a loop break.
    pub fn register_break_statement(&mut self) -> Result<(), IrError> {
        self.add_operation(Operation::Break)
    }

    /// Constructs an array from the counted operands.
    pub fn register_cons_array(&mut self) -> Result<(), IrError> {
        let count = self.parameter_count();
        if count == 0 {
            self.report_fatal_error("array() expects at least one element");
            return self.add_operation(Operation::NoOp);
        }

        let scope = self.current_scope;
        let mut element = None;
        for _ in 0..count {
            let Some(entry) = self.stack.pop() else {
                return Err(IrError::structural("operand stack underflow"));
            };
            let ty = entry.effective_type(scope, &self.program);
            match element {
                None => element = Some(ty),
                Some(previous) if previous == ty => {}
                Some(_) => {
                    self.report_fatal_error("array elements must all be of the same type");
                    return self.add_operation(Operation::NoOp);
                }
            }
        }

        let element = element.unwrap_or(ValueType::Null);
        let op = Operation::ConsArray {
            element_type: element,
            element_count: count as u32,
        };
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(op, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::Array,
            cons_element: Some(element),
        })
    }

    /// Reads one element of a named array; the index is already pushed.
    pub fn register_read_array(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;

        let index_ok = self
            .stack
            .pop()
            .map(|entry| entry.effective_type(scope, &self.program) == ValueType::Integer)
            .unwrap_or(false);
        if !index_ok {
            self.report_fatal_error("array indices must be integer values");
            return self.add_operation(Operation::NoOp);
        }

        let Some(element) = self.program.scopes.array_element_type(scope, id) else {
            self.report_fatal_error(format!("{name} is not a declared array"));
            return self.add_operation(Operation::NoOp);
        };

        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::ReadArray { array: id }, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: element,
            cons_element: None,
        })
    }

    /// Writes one element of a named array; index and value are pushed.
    pub fn register_write_array(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;

        let Some(element) = self.program.scopes.array_element_type(scope, id) else {
            self.report_fatal_error(format!("{name} is not a declared array"));
            return self.add_operation(Operation::NoOp);
        };

        let value_ok = self
            .stack
            .pop()
            .map(|entry| entry.effective_type(scope, &self.program) == element)
            .unwrap_or(false);
        let index_ok = self
            .stack
            .pop()
            .map(|entry| entry.effective_type(scope, &self.program) == ValueType::Integer)
            .unwrap_or(false);
        if !value_ok || !index_ok {
            self.report_fatal_error("array writes take an integer index and an element value");
            return self.add_operation(Operation::NoOp);
        }

        self.add_operation(Operation::WriteArray { array: id })
    }

    /// Pushes the length of a named array.
    pub fn register_array_length(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::ArrayLength { array: id }, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::Integer,
            cons_element: None,
        })
    }

    /// Pushes the storage size of a named variable.
    pub fn register_size_of(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::SizeOf(id), scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::Integer,
            cons_element: None,
        })
    }

    /// Pushes the length of a named string variable.
    pub fn register_length(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(Operation::Length { name: id }, scope, &ctx)
        };
        self.add_operation(pushed)?;
        self.push_entry(StackEntry::Expression {
            ty: ValueType::Integer,
            cons_element: None,
        })
    }

    /// Pushes a reference binding for a by-reference argument.
    pub fn register_bind_reference(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.current_scope;
        if self.program.scopes.variable_type(scope, id).is_none() {
            self.report_fatal_error(format!("variable {name} is not declared in this scope"));
            return self.add_operation(Operation::NoOp);
        }

        let op = Operation::BindReference(id);
        self.add_operation(op.clone())?;
        self.push_expression_entry(&op)
    }

    /// Pushes a function binding for a function-valued argument.
    pub fn register_bind_function_reference(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        if self
            .program
            .scopes
            .function_id(self.current_scope, id)
            .is_none()
        {
            self.report_fatal_error(format!("unknown function {name}"));
            return self.add_operation(Operation::NoOp);
        }

        let op = Operation::BindFunctionReference(id);
        self.add_operation(op.clone())?;
        self.push_expression_entry(&op)
    }

    /// Wraps the just-emitted operation in a map over an array.
    pub fn register_map_operation(&mut self) -> Result<(), IrError> {
        let Some(inner) = self.blocks.last_mut().and_then(|entry| entry.block.pop_tail()) else {
            return Err(IrError::structural("map() has no operation to apply"));
        };
        self.stack.pop();

        let op = Operation::MapOperation {
            inner: Box::new(inner),
        };
        self.add_operation(op.clone())?;
        self.push_expression_entry(&op)
    }

    /// Wraps the just-emitted operation in a reduction over an array.
    pub fn register_reduce_operation(&mut self) -> Result<(), IrError> {
        let Some(inner) = self.blocks.last_mut().and_then(|entry| entry.block.pop_tail()) else {
            return Err(IrError::structural("reduce() has no operation to apply"));
        };
        self.stack.pop();

        let op = Operation::ReduceOperation {
            inner: Box::new(inner),
        };
        self.add_operation(op.clone())?;
        self.push_expression_entry(&op)
    }
}
