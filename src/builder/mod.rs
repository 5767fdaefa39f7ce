//! The semantic builder: a single-threaded state machine driven by
//! grammar actions.
//!
//! The builder consumes parser events (identifiers, literals, operators,
//! block boundaries, keywords) and emits typed operations into the
//! current block. Type, arity, and syntax violations are soft failures:
//! they append a diagnostic, latch the Program's fatal flag, and emit
//! `NoOp` so later semantic actions stay stable. Grammar-impossible
//! states return a `Structural` error and abort the build.

mod concurrency;
mod flow;
mod functions;
mod infix;
mod operations;
mod structures;

pub use flow::BlockKind;
pub use infix::{InfixOperator, Precedence};

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ir::block::Block;
use crate::ir::composite::CompositeType;
use crate::ir::error::IrError;
use crate::ir::ids::{CompositeId, ScopeId, StringId};
use crate::ir::operation::Operation;
use crate::ir::program::Program;
use crate::ir::response::ResponseMap;
use crate::ir::signature::FunctionSignature;
use crate::ir::types::ValueType;

/// Resource guardrails for one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Maximum nesting of open code blocks.
    pub max_block_depth: usize,
    /// Maximum operand-stack depth.
    pub max_stack_depth: usize,
    /// Maximum members per composite type.
    pub max_composite_members: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            max_block_depth: 128,
            max_stack_depth: 4_096,
            max_composite_members: 1_024,
        }
    }
}

/// One soft-failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
}

/// One operand on the builder's stack.
///
/// Expression entries snapshot the type facts of the operation they
/// represent; the operation itself stays owned by its block.
#[derive(Debug, Clone, PartialEq)]
pub enum StackEntry {
    Identifier(StringId),
    IntegerLiteral(i32),
    Integer16Literal(i16),
    RealLiteral(f32),
    BooleanLiteral(bool),
    StringLiteral(StringId),
    Expression {
        ty: ValueType,
        cons_element: Option<ValueType>,
    },
    Scope(ScopeId),
}

impl StackEntry {
    /// The type this operand contributes to an expression. Array
    /// constructors contribute their element type.
    pub fn effective_type(&self, scope: ScopeId, program: &Program) -> ValueType {
        match self {
            StackEntry::Identifier(name) => program
                .scopes
                .variable_type(scope, *name)
                .unwrap_or(ValueType::Error),
            StackEntry::IntegerLiteral(_) => ValueType::Integer,
            StackEntry::Integer16Literal(_) => ValueType::Integer16,
            StackEntry::RealLiteral(_) => ValueType::Real,
            StackEntry::BooleanLiteral(_) => ValueType::Boolean,
            StackEntry::StringLiteral(_) => ValueType::String,
            StackEntry::Expression { ty, cons_element } => cons_element.unwrap_or(*ty),
            StackEntry::Scope(_) => ValueType::Null,
        }
    }

    /// Returns `true` when the operand is array-valued.
    pub fn is_array(&self, scope: ScopeId, program: &Program) -> bool {
        match self {
            StackEntry::Expression { ty, cons_element } => {
                cons_element.is_some() || *ty == ValueType::Array
            }
            StackEntry::Identifier(name) => {
                program.scopes.variable_type(scope, *name) == Some(ValueType::Array)
            }
            _ => false,
        }
    }
}

/// One open code block.
#[derive(Debug)]
pub(crate) struct BlockEntry {
    pub block: Block,
    pub kind: BlockKind,
}

/// One collected function parameter.
#[derive(Debug, Clone)]
pub(crate) struct ParamRecord {
    pub name: StringId,
    pub ty: ValueType,
    pub by_ref: bool,
    pub hint: Option<CompositeId>,
    pub signature: Option<FunctionSignature>,
    pub array_element: Option<ValueType>,
}

/// The parser-driven semantic builder.
pub struct SemanticBuilder {
    pub(crate) program: Program,
    pub(crate) options: BuilderOptions,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) current_scope: ScopeId,
    pub(crate) stack: Vec<StackEntry>,
    pub(crate) blocks: Vec<BlockEntry>,
    pub(crate) preparse_blocks: Vec<BlockKind>,
    pub(crate) expected_kinds: Vec<BlockKind>,
    pub(crate) passed_parameter_count: Vec<usize>,
    pub(crate) infix_operators: Vec<Vec<String>>,
    pub(crate) infix_operand_count: Vec<usize>,
    pub(crate) infix_table: BTreeMap<String, InfixOperator>,
    pub(crate) user_infix_operators: BTreeSet<String>,
    pub(crate) extension_keywords: BTreeSet<String>,
    pub(crate) extension_controls: Vec<StringId>,
    pub(crate) displaced_scopes: Vec<ScopeId>,
    pub(crate) saved_task_names: Vec<StringId>,
    pub(crate) response_maps: Vec<(StringId, ResponseMap)>,
    pub(crate) deferred_operations: Vec<Operation>,
    pub(crate) member_accesses: VecDeque<StringId>,
    pub(crate) member_level_lvalue: usize,
    pub(crate) member_level_rvalue: usize,
    pub(crate) last_member_level_rvalue: usize,
    pub(crate) function_name: Option<StringId>,
    pub(crate) function_returns: Option<ScopeId>,
    pub(crate) return_init_blocks: BTreeMap<StringId, Block>,
    pub(crate) params: Vec<ParamRecord>,
    pub(crate) function_is_infix: bool,
    pub(crate) created_structure: Option<(StringId, CompositeType)>,
    pub(crate) created_tuple: Option<(StringId, CompositeType)>,
    pub(crate) upcoming_member_type: Option<String>,
    pub(crate) op_assignment_operator: Option<String>,
    pub(crate) saved_incdec_name: Option<StringId>,
    pub(crate) saved_lvalue_name: Option<StringId>,
    pub(crate) inject_not: bool,
    pub(crate) inject_negate: bool,
    pub(crate) control_var: Option<(StringId, ValueType)>,
    pub(crate) pending_initialization: Vec<StringId>,
}

impl SemanticBuilder {
    /// Creates a builder with default guardrails.
    pub fn new() -> Self {
        Self::with_options(BuilderOptions::default())
    }

    /// Creates a builder with explicit guardrails.
    pub fn with_options(options: BuilderOptions) -> Self {
        let program = Program::new();
        let current_scope = program.global_scope;

        Self {
            program,
            options,
            diagnostics: Vec::new(),
            current_scope,
            stack: Vec::new(),
            blocks: Vec::new(),
            preparse_blocks: Vec::new(),
            expected_kinds: Vec::new(),
            passed_parameter_count: Vec::new(),
            infix_operators: Vec::new(),
            infix_operand_count: Vec::new(),
            infix_table: infix::default_infix_table(),
            user_infix_operators: BTreeSet::new(),
            extension_keywords: BTreeSet::new(),
            extension_controls: Vec::new(),
            displaced_scopes: Vec::new(),
            saved_task_names: Vec::new(),
            response_maps: Vec::new(),
            deferred_operations: Vec::new(),
            member_accesses: VecDeque::new(),
            member_level_lvalue: 0,
            member_level_rvalue: 0,
            last_member_level_rvalue: 0,
            function_name: None,
            function_returns: None,
            return_init_blocks: BTreeMap::new(),
            params: Vec::new(),
            function_is_infix: false,
            created_structure: None,
            created_tuple: None,
            upcoming_member_type: None,
            op_assignment_operator: None,
            saved_incdec_name: None,
            saved_lvalue_name: None,
            inject_not: false,
            inject_negate: false,
            control_var: None,
            pending_initialization: Vec::new(),
        }
    }

    /// The program under construction.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Soft-failure reports accumulated so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The scope semantic actions currently target.
    pub fn current_scope(&self) -> ScopeId {
        self.current_scope
    }

    /// Finishes the build, yielding the program and its diagnostics.
    pub fn finish(self) -> (Program, Vec<Diagnostic>) {
        (self.program, self.diagnostics)
    }

    /// Reports a soft failure: records a diagnostic and latches the
    /// Program's fatal flag.
    pub(crate) fn report_fatal_error(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            message: message.into(),
        });
        self.program.set_fatal();
    }

    /// Appends one operation to the innermost open block.
    pub(crate) fn add_operation(&mut self, op: Operation) -> Result<(), IrError> {
        match self.blocks.last_mut() {
            Some(entry) => {
                entry.block.append(op);
                Ok(())
            }
            None => Err(IrError::structural(
                "no open code block to receive an operation",
            )),
        }
    }

    /// Queues one operation for injection at the next statement boundary.
    pub(crate) fn add_operation_deferred(&mut self, op: Operation) {
        self.deferred_operations.push(op);
    }

    /// Flushes deferred operations into the current block.
    pub fn merge_deferred_operations(&mut self) -> Result<(), IrError> {
        if self.deferred_operations.is_empty() {
            return Ok(());
        }
        let ops: Vec<Operation> = self.deferred_operations.drain(..).collect();
        for op in ops {
            self.add_operation(op)?;
        }
        Ok(())
    }

    /// Pushes one operand entry, honoring the stack guardrail.
    pub(crate) fn push_entry(&mut self, entry: StackEntry) -> Result<(), IrError> {
        if self.stack.len() >= self.options.max_stack_depth {
            return Err(IrError::limit_exceeded(
                "operand stack limit exceeded",
                format!("max_stack_depth={}", self.options.max_stack_depth),
            ));
        }
        self.stack.push(entry);
        Ok(())
    }

    /// Pushes an expression entry snapshotting the given operation.
    pub(crate) fn push_expression_entry(&mut self, op: &Operation) -> Result<(), IrError> {
        let ty = {
            let ctx = self.program.type_context();
            op.result_type(self.current_scope, &ctx)
        };
        let cons_element = op.cons_element_type();
        self.push_entry(StackEntry::Expression { ty, cons_element })
    }

    // -----------------------------------------------------------------
    // Operand events
    // -----------------------------------------------------------------

    /// Pushes an identifier entry without emitting a read. Used for
    /// l-values, loop counters, and other name-only positions.
    pub fn push_identifier(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.push_entry(StackEntry::Identifier(id))
    }

    /// Pushes a variable read as an expression operand.
    pub fn push_variable_operand(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let ty = self
            .program
            .scopes
            .variable_type(self.current_scope, id)
            .unwrap_or(ValueType::Error);

        if ty == ValueType::Error {
            self.report_fatal_error(format!("variable {name} is not declared in this scope"));
            self.add_operation(Operation::NoOp)?;
            return self.push_entry(StackEntry::Expression {
                ty: ValueType::Error,
                cons_element: None,
            });
        }

        let scope = self.current_scope;
        let read = {
            let ctx = self.program.type_context();
            Operation::push(Operation::GetVariableValue(id), scope, &ctx)
        };
        self.add_operation(read)?;

        if self.inject_not {
            self.inject_not = false;
            if ty != ValueType::Boolean {
                self.report_fatal_error("cannot apply a logical not to a non-boolean value");
            } else {
                let wrapped = {
                    let ctx = self.program.type_context();
                    Operation::push(Operation::LogicalNot, scope, &ctx)
                };
                self.add_operation(wrapped)?;
            }
            return self.push_entry(StackEntry::Expression {
                ty: ValueType::Boolean,
                cons_element: None,
            });
        }

        if self.inject_negate {
            self.inject_negate = false;
            if !ty.is_numeric() {
                self.report_fatal_error("cannot negate a non-numeric value");
            } else {
                let literal = match ty {
                    ValueType::Integer => Operation::PushInteger(-1),
                    ValueType::Integer16 => Operation::PushInteger16(-1),
                    _ => Operation::PushReal(-1.0),
                };
                self.add_operation(literal)?;
                let multiply = {
                    let ctx = self.program.type_context();
                    Operation::push(
                        Operation::Arithmetic {
                            kind: crate::ir::operation::ArithmeticKind::Multiply,
                            operand_type: ty,
                            first_is_array: false,
                            second_is_array: false,
                            operand_count: 2,
                        },
                        scope,
                        &ctx,
                    )
                };
                self.add_operation(multiply)?;
            }
            return self.push_entry(StackEntry::Expression {
                ty,
                cons_element: None,
            });
        }

        // The operand entry keeps the identifier so member accesses can
        // undo the eager read and take the name.
        self.push_entry(StackEntry::Identifier(id))
    }

    /// Pushes an integer literal operand.
    pub fn push_integer_literal(&mut self, value: i32) -> Result<(), IrError> {
        let value = if self.take_negate() { -value } else { value };
        self.add_operation(Operation::PushInteger(value))?;
        self.push_entry(StackEntry::IntegerLiteral(value))
    }

    /// Pushes a 16-bit integer literal operand.
    pub fn push_integer16_literal(&mut self, value: i16) -> Result<(), IrError> {
        let value = if self.take_negate() { -value } else { value };
        self.add_operation(Operation::PushInteger16(value))?;
        self.push_entry(StackEntry::Integer16Literal(value))
    }

    /// Pushes a real literal operand.
    pub fn push_real_literal(&mut self, value: f32) -> Result<(), IrError> {
        let value = if self.take_negate() { -value } else { value };
        self.add_operation(Operation::PushReal(value))?;
        self.push_entry(StackEntry::RealLiteral(value))
    }

    /// Pushes a boolean literal operand.
    pub fn push_boolean_literal(&mut self, value: bool) -> Result<(), IrError> {
        let value = if self.inject_not {
            self.inject_not = false;
            !value
        } else {
            value
        };
        self.add_operation(Operation::PushBoolean(value))?;
        self.push_entry(StackEntry::BooleanLiteral(value))
    }

    /// Pushes a string literal operand.
    pub fn push_string_literal(&mut self, value: &str) -> Result<(), IrError> {
        let id = self.program.intern(value);
        self.add_operation(Operation::PushString(id))?;
        self.push_entry(StackEntry::StringLiteral(id))
    }

    fn take_negate(&mut self) -> bool {
        let negate = self.inject_negate;
        self.inject_negate = false;
        negate
    }

    // -----------------------------------------------------------------
    // Parameter counting
    // -----------------------------------------------------------------

    /// Notes one more argument for the call in progress.
    pub fn count_parameter(&mut self) {
        if let Some(count) = self.passed_parameter_count.last_mut() {
            *count += 1;
        }
    }

    /// Opens a fresh argument count for a nested call.
    pub fn push_parameter_count(&mut self) {
        self.passed_parameter_count.push(0);
    }

    /// Closes the innermost argument count.
    pub fn pop_parameter_count(&mut self) {
        self.passed_parameter_count.pop();
    }

    /// The innermost argument count.
    pub(crate) fn parameter_count(&self) -> usize {
        self.passed_parameter_count.last().copied().unwrap_or(0)
    }

    // -----------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------

    /// Declares a primitive-typed variable and opens its initialization.
    pub fn declare_variable(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        let id = self.program.intern(name);
        if self.scope_declares(id) {
            self.report_fatal_error(format!("variable {name} is already declared in this scope"));
            return self.add_operation(Operation::NoOp);
        }

        self.scope_mut()?.add_variable(id, ty)?;
        self.add_operation(Operation::InitializeValue(id))?;
        self.pending_initialization.push(id);
        Ok(())
    }

    /// Declares a constant: a variable whose value may not be reassigned
    /// after initialization.
    pub fn declare_constant(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        self.declare_variable(name, ty)?;
        let id = self.program.intern(name);
        self.scope_mut()?.set_constant(id);
        Ok(())
    }

    /// Declares a reference variable.
    pub fn declare_reference(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        let id = self.program.intern(name);
        if self.scope_declares(id) {
            self.report_fatal_error(format!("variable {name} is already declared in this scope"));
            return Ok(());
        }
        self.scope_mut()?.add_reference(id, ty)
    }

    /// Declares a tuple-typed variable with its type binding.
    pub fn declare_tuple_variable(&mut self, name: &str, type_name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let type_id = self.program.intern(type_name);
        let Some(hint) = self.program.scopes.tuple_type_id(self.current_scope, type_id) else {
            self.report_fatal_error(format!("unknown tuple type {type_name}"));
            return Ok(());
        };
        let scope = self.scope_mut()?;
        scope.add_variable(id, ValueType::Tuple)?;
        scope.set_tuple_hint(id, hint);
        Ok(())
    }

    /// Declares a structure-typed variable with its type binding.
    pub fn declare_structure_variable(
        &mut self,
        name: &str,
        type_name: &str,
    ) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let type_id = self.program.intern(type_name);
        let Some(hint) = self
            .program
            .scopes
            .structure_type_id(self.current_scope, type_id)
        else {
            self.report_fatal_error(format!("unknown structure type {type_name}"));
            return Ok(());
        };
        let scope = self.scope_mut()?;
        scope.add_variable(id, ValueType::Structure)?;
        scope.set_structure_hint(id, hint);
        Ok(())
    }

    /// Declares an array variable with its element type and length.
    pub fn declare_array_variable(
        &mut self,
        name: &str,
        element: ValueType,
        size: usize,
    ) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let scope = self.scope_mut()?;
        scope.add_variable(id, ValueType::Array)?;
        scope.set_array_type(id, element);
        scope.set_array_size(id, size);
        Ok(())
    }

    /// Declares a function-typed variable carrying a signature name.
    pub fn declare_function_variable(
        &mut self,
        name: &str,
        signature_name: &str,
    ) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let signature_id = self.program.intern(signature_name);
        let Some(signature) = self
            .program
            .scopes
            .function_signature(self.current_scope, signature_id)
            .cloned()
        else {
            self.report_fatal_error(format!("unknown function signature {signature_name}"));
            return Ok(());
        };
        let scope = self.scope_mut()?;
        scope.add_variable(id, ValueType::Function)?;
        scope.add_function_signature(id, signature);
        Ok(())
    }

    /// Closes a variable declaration: assigns the pushed initial value.
    pub fn complete_variable_initialization(&mut self) -> Result<(), IrError> {
        let Some(name) = self.pending_initialization.pop() else {
            return Err(IrError::structural(
                "no variable declaration is awaiting initialization",
            ));
        };

        let Some(entry) = self.stack.pop() else {
            self.report_fatal_error("expected an initial value for the declared variable");
            return self.add_operation(Operation::NoOp);
        };

        let declared = self
            .program
            .scopes
            .variable_type(self.current_scope, name)
            .unwrap_or(ValueType::Error);
        let provided = entry.effective_type(self.current_scope, &self.program);
        if declared != provided {
            self.report_fatal_error("initial value type does not match the declared type");
            return self.add_operation(Operation::NoOp);
        }

        self.add_operation(Operation::AssignValue(name))
    }

    // -----------------------------------------------------------------
    // Negation injection
    // -----------------------------------------------------------------

    /// Notes that a logical not applies to the next operand.
    pub fn register_not_operation(&mut self) {
        self.inject_not = true;
    }

    /// Notes that a numeric negation applies to the next operand.
    pub fn register_negate_operation(&mut self) {
        self.inject_negate = true;
    }

    /// Cancels a pending negation; used when the grammar backs out of a
    /// partially matched production.
    pub fn undo_negate_operation(&mut self) {
        self.inject_negate = false;
    }

    // -----------------------------------------------------------------
    // Shared lookups
    // -----------------------------------------------------------------

    pub(crate) fn scope_mut(&mut self) -> Result<&mut crate::ir::scope::Scope, IrError> {
        let id = self.current_scope;
        self.program
            .scopes
            .get_mut(id)
            .ok_or_else(|| IrError::structural("current scope is not allocated"))
    }

    pub(crate) fn scope_declares(&self, name: StringId) -> bool {
        self.program
            .scopes
            .get(self.current_scope)
            .map(|scope| scope.has_variable(name))
            .unwrap_or(false)
    }

    /// The effective type of the operand stack's tail entry.
    pub(crate) fn tail_entry_type(&self) -> Option<ValueType> {
        self.stack
            .last()
            .map(|entry| entry.effective_type(self.current_scope, &self.program))
    }
}

impl Default for SemanticBuilder {
    fn default() -> Self {
        Self::new()
    }
}
