//! The operation sum type: the unit of IR.
//!
//! Each variant carries only the data it needs. Type queries, parameter
//! counts, and traversal payloads are matches over the tag; evaluation
//! lives in `exec`.

use crate::ir::block::Block;
use crate::ir::function::FunctionKind;
use crate::ir::ids::{CompositeId, FunctionId, ScopeId, StringId};
use crate::ir::program::TypeContext;
use crate::ir::types::ValueType;

/// The arithmetic family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticKind {
    Sum,
    Subtract,
    Multiply,
    Divide,
}

/// The comparison family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonKind {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

/// A stack push of another operation's result.
///
/// The two flags are derived at construction and discriminate
/// element-by-element pushes from handle pushes when the nested operation
/// produces an array.
#[derive(Debug, Clone, PartialEq)]
pub struct PushSource {
    pub op: Box<Operation>,
    pub is_cons_array: bool,
    pub is_cons_from_function: bool,
}

/// The complete operation variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Emitted in place of a failed construct so parsing can continue.
    NoOp,

    // Literal pushes.
    PushInteger(i32),
    PushInteger16(i16),
    PushReal(f32),
    PushBoolean(bool),
    PushString(StringId),
    /// Execute the nested operation and push its result.
    Push(PushSource),

    // Variable operations.
    GetVariableValue(StringId),
    AssignValue(StringId),
    InitializeValue(StringId),
    BindReference(StringId),
    BindFunctionReference(StringId),
    SizeOf(StringId),

    // Composite operations.
    ReadTuple {
        variable: StringId,
        member: StringId,
    },
    AssignTuple {
        variable: StringId,
        member: StringId,
    },
    ReadStructure {
        variable: StringId,
        member: StringId,
    },
    AssignStructure {
        variable: StringId,
        member: StringId,
    },
    /// Read a member of the structure produced by a prior operation in the
    /// same block, `back` low-level positions before this one. The member
    /// type and the member's own composite hint are resolved when the
    /// operation is created.
    ReadStructureIndirect {
        member: StringId,
        back: u32,
        member_type: ValueType,
        member_hint: Option<CompositeId>,
    },
    AssignStructureIndirect {
        member: StringId,
    },
    /// Push the address of a structure member. `variable` is absent for
    /// chained links, which consume the previously pushed address.
    BindStructMemberReference {
        variable: Option<StringId>,
        member: StringId,
    },

    // Arithmetic, comparison, logic, bitwise.
    Arithmetic {
        kind: ArithmeticKind,
        operand_type: ValueType,
        first_is_array: bool,
        second_is_array: bool,
        operand_count: u32,
    },
    Compare {
        kind: ComparisonKind,
        operand_type: ValueType,
    },
    /// Owns its sub-operations; evaluation stops at the first false term.
    LogicalAnd {
        operations: Vec<Operation>,
    },
    /// Owns its sub-operations; evaluation stops at the first true term.
    LogicalOr {
        operations: Vec<Operation>,
    },
    LogicalXor,
    LogicalNot,
    /// Owns its sub-operations; the fold over integers is complete.
    BitwiseAnd {
        operand_type: ValueType,
        operations: Vec<Operation>,
    },
    BitwiseOr {
        operand_type: ValueType,
        operations: Vec<Operation>,
    },
    BitwiseXor {
        operand_type: ValueType,
    },
    BitwiseNot {
        operand_type: ValueType,
    },

    // Flow.
    If {
        true_block: Option<Block>,
        false_block: Option<Block>,
        /// Wrapper block holding the `ElseIf` chain, in order.
        else_if_wrapper: Option<Block>,
    },
    ElseIf {
        block: Block,
    },
    ExitIfChain,
    WhileLoop {
        body: Block,
    },
    WhileLoopConditional,
    DoWhileLoop {
        body: Block,
    },
    ExecuteBlock {
        block: Block,
    },
    Break,
    Return,

    // Invocation.
    Invoke {
        function: FunctionId,
        indirect: bool,
    },
    InvokeIndirect {
        name: StringId,
    },

    // Concurrency.
    ForkTask {
        body: Block,
    },
    ForkThread {
        body: Block,
    },
    CreateThreadPool,
    ForkFuture {
        name: StringId,
        value_type: ValueType,
        use_thread_pool: bool,
    },
    AcceptMessage {
        message: StringId,
        payload_types: Vec<ValueType>,
        handler: Block,
        aux_scope: ScopeId,
    },
    AcceptMessageFromResponseMap {
        map: StringId,
    },
    SendTaskMessage {
        by_name: bool,
        message: StringId,
        payload_types: Vec<ValueType>,
    },
    GetMessageSender,
    GetTaskCaller,
    ParallelFor {
        body: Block,
        counter: StringId,
        use_threads: bool,
        code_handle: u32,
    },

    // Containers.
    ConsArray {
        element_type: ValueType,
        element_count: u32,
    },
    ConsArrayIndirect {
        element_type: ValueType,
        producer: Box<Operation>,
    },
    ReadArray {
        array: StringId,
    },
    WriteArray {
        array: StringId,
    },
    ArrayLength {
        array: StringId,
    },
    MapOperation {
        inner: Box<Operation>,
    },
    ReduceOperation {
        inner: Box<Operation>,
    },
    Concatenate {
        first_is_array: bool,
        second_is_array: bool,
        operand_count: u32,
    },
    Length {
        name: StringId,
    },

    // Casts own their producer so a cast travels as one unit.
    TypeCast {
        source: ValueType,
        target: ValueType,
        operand: Box<Operation>,
    },
    TypeCastToString {
        source: ValueType,
        operand: Box<Operation>,
    },

    // Extension handoff.
    Handoff {
        library: StringId,
        body: Block,
        code_handle: u32,
    },
    HandoffControl {
        library: StringId,
        body: Block,
        counter: StringId,
        scope: ScopeId,
        code_handle: u32,
    },

    // Debugging.
    DebugWriteString,
    DebugReadStaticString,
}

/// Immediate data carried by one operation, for the serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    None,
    Integer(i32),
    Integer16(i16),
    Real(f32),
    Boolean(bool),
    /// A string literal.
    Str(StringId),
    /// An identifier (variable, member, function, or map name).
    Identifier(StringId),
}

/// The traversal payload record every operation can produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub value: PayloadValue,
    pub parameter_count: usize,
}

impl Operation {
    /// Wraps an operation in a stack push, deriving the array flags.
    pub fn push(op: Operation, scope: ScopeId, ctx: &TypeContext<'_>) -> Operation {
        let is_cons_array = matches!(
            op,
            Operation::ConsArray { .. } | Operation::ConsArrayIndirect { .. }
        );
        let is_cons_from_function = match &op {
            Operation::Invoke { .. } | Operation::InvokeIndirect { .. } => {
                op.result_type(scope, ctx) == ValueType::Array
            }
            _ => false,
        };

        Operation::Push(PushSource {
            op: Box::new(op),
            is_cons_array,
            is_cons_from_function,
        })
    }

    /// The nested operation of a push wrapper, if this is one.
    pub fn push_source(&self) -> Option<&Operation> {
        match self {
            Operation::Push(source) => Some(&source.op),
            _ => None,
        }
    }

    /// The element type this operation constructs, when it constructs an
    /// array (directly or under a push wrapper).
    pub fn cons_element_type(&self) -> Option<ValueType> {
        match self {
            Operation::ConsArray { element_type, .. }
            | Operation::ConsArrayIndirect { element_type, .. } => Some(*element_type),
            Operation::Push(source) => source.op.cons_element_type(),
            _ => None,
        }
    }

    /// The primitive type tag this operation leaves behind.
    ///
    /// Unresolvable names produce `Error`, which typechecking rejects.
    pub fn result_type(&self, scope: ScopeId, ctx: &TypeContext<'_>) -> ValueType {
        match self {
            Operation::NoOp => ValueType::Null,
            Operation::PushInteger(_) => ValueType::Integer,
            Operation::PushInteger16(_) => ValueType::Integer16,
            Operation::PushReal(_) => ValueType::Real,
            Operation::PushBoolean(_) => ValueType::Boolean,
            Operation::PushString(_) => ValueType::String,
            Operation::Push(source) => source.op.result_type(scope, ctx),

            Operation::GetVariableValue(name) | Operation::BindReference(name) => ctx
                .scopes
                .variable_type(scope, *name)
                .unwrap_or(ValueType::Error),
            Operation::AssignValue(name) => ctx
                .scopes
                .variable_type(scope, *name)
                .unwrap_or(ValueType::Error),
            Operation::InitializeValue(_) => ValueType::Null,
            Operation::BindFunctionReference(_) => ValueType::Function,
            Operation::SizeOf(_) => ValueType::Integer,

            Operation::ReadTuple { variable, member } => ctx
                .scopes
                .variable_tuple_hint(scope, *variable)
                .and_then(|hint| ctx.registry.tuple(hint))
                .and_then(|ty| ty.member_type(*member))
                .unwrap_or(ValueType::Error),
            Operation::ReadStructure { variable, member } => ctx
                .scopes
                .variable_structure_hint(scope, *variable)
                .and_then(|hint| ctx.registry.structure(hint))
                .and_then(|ty| ty.member_type(*member))
                .unwrap_or(ValueType::Error),
            Operation::ReadStructureIndirect { member_type, .. } => *member_type,
            Operation::AssignTuple { .. } | Operation::AssignStructure { .. } => ValueType::Null,
            // The indirect store surfaces no expression type.
            Operation::AssignStructureIndirect { .. } => ValueType::Null,
            Operation::BindStructMemberReference { .. } => ValueType::Address,

            Operation::Arithmetic { operand_type, .. } => *operand_type,
            Operation::Compare { .. } => ValueType::Boolean,
            Operation::LogicalAnd { .. }
            | Operation::LogicalOr { .. }
            | Operation::LogicalXor
            | Operation::LogicalNot => ValueType::Boolean,
            Operation::BitwiseAnd { operand_type, .. }
            | Operation::BitwiseOr { operand_type, .. }
            | Operation::BitwiseXor { operand_type }
            | Operation::BitwiseNot { operand_type } => *operand_type,

            Operation::If { .. }
            | Operation::ElseIf { .. }
            | Operation::ExitIfChain
            | Operation::WhileLoop { .. }
            | Operation::WhileLoopConditional
            | Operation::DoWhileLoop { .. }
            | Operation::ExecuteBlock { .. }
            | Operation::Break
            | Operation::Return => ValueType::Null,

            Operation::Invoke { function, .. } => match ctx.functions.get(*function) {
                Some(FunctionKind::User(func)) => first_return_type(func.returns, ctx),
                Some(FunctionKind::Native(stub)) => stub.return_type,
                None => ValueType::Error,
            },
            Operation::InvokeIndirect { name } => ctx
                .scopes
                .function_signature(scope, *name)
                .and_then(|signature| signature.returns.first().copied())
                .unwrap_or(ValueType::Null),

            Operation::ForkTask { .. }
            | Operation::ForkThread { .. }
            | Operation::CreateThreadPool
            | Operation::ForkFuture { .. }
            | Operation::AcceptMessage { .. }
            | Operation::AcceptMessageFromResponseMap { .. }
            | Operation::SendTaskMessage { .. }
            | Operation::ParallelFor { .. } => ValueType::Null,
            Operation::GetMessageSender | Operation::GetTaskCaller => ValueType::TaskHandle,

            Operation::ConsArray { .. } | Operation::ConsArrayIndirect { .. } => ValueType::Array,
            Operation::ReadArray { array } => ctx
                .scopes
                .array_element_type(scope, *array)
                .unwrap_or(ValueType::Error),
            Operation::WriteArray { .. } => ValueType::Null,
            Operation::ArrayLength { .. } => ValueType::Integer,
            Operation::MapOperation { .. } => ValueType::Array,
            Operation::ReduceOperation { inner } => inner.result_type(scope, ctx),
            Operation::Concatenate {
                first_is_array,
                second_is_array,
                ..
            } => {
                if *first_is_array || *second_is_array {
                    ValueType::Array
                } else {
                    ValueType::String
                }
            }
            Operation::Length { .. } => ValueType::Integer,

            Operation::TypeCast { target, .. } => *target,
            Operation::TypeCastToString { .. } => ValueType::String,

            Operation::Handoff { .. } | Operation::HandoffControl { .. } => ValueType::Null,
            Operation::DebugWriteString => ValueType::Null,
            Operation::DebugReadStaticString => ValueType::String,
        }
    }

    /// How many already-pushed operands this operation consumes. Used by
    /// the builder's infix-arity reasoning and the block's logical
    /// grouping walks.
    pub fn num_parameters(&self, scope: ScopeId, ctx: &TypeContext<'_>) -> usize {
        match self {
            Operation::Push(source) => source.op.num_parameters(scope, ctx),

            Operation::AssignValue(_) => 1,
            Operation::ReadStructureIndirect { .. } => 1,
            Operation::AssignTuple { .. } | Operation::AssignStructure { .. } => 1,
            Operation::AssignStructureIndirect { .. } => 2,
            Operation::BindStructMemberReference { variable, .. } => {
                if variable.is_none() {
                    1
                } else {
                    0
                }
            }

            Operation::Arithmetic { operand_count, .. } => *operand_count as usize,
            Operation::Compare { .. } => 2,
            Operation::LogicalNot | Operation::BitwiseNot { .. } => 1,
            Operation::LogicalXor | Operation::BitwiseXor { .. } => 2,

            Operation::WhileLoopConditional => 1,
            Operation::If { .. } => 1,
            Operation::ElseIf { .. } => 1,

            Operation::Invoke { function, .. } => ctx
                .functions
                .get(*function)
                .and_then(|kind| ctx.scopes.get(kind.params()))
                .map(|params| params.member_order().len())
                .unwrap_or(0),
            Operation::InvokeIndirect { name } => ctx
                .scopes
                .function_signature(scope, *name)
                .map(|signature| signature.param_count())
                .unwrap_or(0),

            Operation::SendTaskMessage { payload_types, .. } => payload_types.len(),
            Operation::ParallelFor { .. } => 3,

            Operation::ConsArray { element_count, .. } => *element_count as usize,
            Operation::ReadArray { .. } => 1,
            Operation::WriteArray { .. } => 2,
            Operation::MapOperation { .. } | Operation::ReduceOperation { .. } => 1,
            Operation::Concatenate { operand_count, .. } => *operand_count as usize,

            // Casts own their producer, which may itself consume pushed
            // operands.
            Operation::TypeCast { operand, .. } | Operation::TypeCastToString { operand, .. } => {
                operand.num_parameters(scope, ctx)
            }

            Operation::DebugWriteString => 1,

            _ => 0,
        }
    }

    /// The serializer-facing payload record.
    pub fn traversal_payload(&self, scope: ScopeId, ctx: &TypeContext<'_>) -> Payload {
        let parameter_count = self.num_parameters(scope, ctx);
        let value = match self {
            Operation::PushInteger(value) => PayloadValue::Integer(*value),
            Operation::PushInteger16(value) => PayloadValue::Integer16(*value),
            Operation::PushReal(value) => PayloadValue::Real(*value),
            Operation::PushBoolean(value) => PayloadValue::Boolean(*value),
            Operation::PushString(value) => PayloadValue::Str(*value),
            Operation::GetVariableValue(name)
            | Operation::AssignValue(name)
            | Operation::InitializeValue(name)
            | Operation::BindReference(name)
            | Operation::BindFunctionReference(name)
            | Operation::SizeOf(name)
            | Operation::InvokeIndirect { name }
            | Operation::Length { name }
            | Operation::ForkFuture { name, .. } => PayloadValue::Identifier(*name),
            Operation::ReadArray { array }
            | Operation::WriteArray { array }
            | Operation::ArrayLength { array } => PayloadValue::Identifier(*array),
            Operation::AcceptMessageFromResponseMap { map } => PayloadValue::Identifier(*map),
            _ => PayloadValue::None,
        };

        Payload {
            value,
            parameter_count,
        }
    }

    /// The serialization token for this operation.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Operation::NoOp => "NoOp",
            Operation::PushInteger(_) => "PushIntegerLiteral",
            Operation::PushInteger16(_) => "PushInteger16Literal",
            Operation::PushReal(_) => "PushRealLiteral",
            Operation::PushBoolean(_) => "PushBooleanLiteral",
            Operation::PushString(_) => "PushStringLiteral",
            Operation::Push(_) => "PushOperation",
            Operation::GetVariableValue(_) => "GetValue",
            Operation::AssignValue(_) => "AssignValue",
            Operation::InitializeValue(_) => "Init",
            Operation::BindReference(_) => "BindReference",
            Operation::BindFunctionReference(_) => "BindFunctionReference",
            Operation::SizeOf(_) => "SizeOf",
            Operation::ReadTuple { .. } => "ReadTuple",
            Operation::AssignTuple { .. } => "WriteTuple",
            Operation::ReadStructure { .. } => "ReadStructure",
            Operation::AssignStructure { .. } => "WriteStructure",
            Operation::ReadStructureIndirect { .. } => "ReadStructureIndirect",
            Operation::AssignStructureIndirect { .. } => "WriteStructureIndirect",
            Operation::BindStructMemberReference { .. } => "BindStruct",
            Operation::Arithmetic { kind, operand_type, .. } => match (kind, operand_type) {
                (ArithmeticKind::Sum, ValueType::Integer) => "AddIntegers",
                (ArithmeticKind::Sum, ValueType::Integer16) => "AddInteger16s",
                (ArithmeticKind::Sum, _) => "AddReals",
                (ArithmeticKind::Subtract, ValueType::Integer) => "SubtractIntegers",
                (ArithmeticKind::Subtract, ValueType::Integer16) => "SubtractInteger16s",
                (ArithmeticKind::Subtract, _) => "SubtractReals",
                (ArithmeticKind::Multiply, ValueType::Integer) => "MultiplyIntegers",
                (ArithmeticKind::Multiply, ValueType::Integer16) => "MultiplyInteger16s",
                (ArithmeticKind::Multiply, _) => "MultiplyReals",
                (ArithmeticKind::Divide, ValueType::Integer) => "DivideIntegers",
                (ArithmeticKind::Divide, ValueType::Integer16) => "DivideInteger16s",
                (ArithmeticKind::Divide, _) => "DivideReals",
            },
            Operation::Compare { kind, .. } => match kind {
                ComparisonKind::Equal => "IsEqual",
                ComparisonKind::NotEqual => "IsNotEqual",
                ComparisonKind::Less => "IsLesser",
                ComparisonKind::Greater => "IsGreater",
                ComparisonKind::LessOrEqual => "IsLesserEqual",
                ComparisonKind::GreaterOrEqual => "IsGreaterEqual",
            },
            Operation::LogicalAnd { .. } => "LogicalAnd",
            Operation::LogicalOr { .. } => "LogicalOr",
            Operation::LogicalXor => "LogicalXor",
            Operation::LogicalNot => "LogicalNot",
            Operation::BitwiseAnd { .. } => "BitwiseAnd",
            Operation::BitwiseOr { .. } => "BitwiseOr",
            Operation::BitwiseXor { .. } => "BitwiseXor",
            Operation::BitwiseNot { .. } => "BitwiseNot",
            Operation::If { .. } => "If",
            Operation::ElseIf { .. } => "ElseIf",
            Operation::ExitIfChain => "ExitIfChain",
            Operation::WhileLoop { .. } => "While",
            Operation::WhileLoopConditional => "WhileCondition",
            Operation::DoWhileLoop { .. } => "DoWhile",
            Operation::ExecuteBlock { .. } => "BeginBlock",
            Operation::Break => "Break",
            Operation::Return => "Return",
            Operation::Invoke { .. } => "Invoke",
            Operation::InvokeIndirect { .. } => "InvokeIndirect",
            Operation::ForkTask { .. } => "ForkTask",
            Operation::ForkThread { .. } => "ForkThread",
            Operation::CreateThreadPool => "ThreadPool",
            Operation::ForkFuture { .. } => "Future",
            Operation::AcceptMessage { .. } => "AcceptMessage",
            Operation::AcceptMessageFromResponseMap { .. } => "AcceptMessageFromMap",
            Operation::SendTaskMessage { .. } => "SendTaskMessage",
            Operation::GetMessageSender => "GetMessageSender",
            Operation::GetTaskCaller => "GetTaskCaller",
            Operation::ParallelFor { .. } => "ParallelFor",
            Operation::ConsArray { .. } => "ConsArray",
            Operation::ConsArrayIndirect { .. } => "ConsArrayIndirect",
            Operation::ReadArray { .. } => "ReadArray",
            Operation::WriteArray { .. } => "WriteArray",
            Operation::ArrayLength { .. } => "ArrayLength",
            Operation::MapOperation { .. } => "Map",
            Operation::ReduceOperation { .. } => "Reduce",
            Operation::Concatenate { .. } => "Concat",
            Operation::Length { .. } => "Length",
            Operation::TypeCast { .. } => "TypeCast",
            Operation::TypeCastToString { .. } => "TypeCastToString",
            Operation::Handoff { .. } => "Handoff",
            Operation::HandoffControl { .. } => "HandoffControl",
            Operation::DebugWriteString => "DebugWrite",
            Operation::DebugReadStaticString => "DebugRead",
        }
    }
}

/// The composite type an operation's structure-valued result refers to,
/// for resolving chained member reads.
pub fn structure_hint_of(
    op: &Operation,
    scope: ScopeId,
    ctx: &TypeContext<'_>,
) -> Option<CompositeId> {
    match op {
        Operation::Push(source) => structure_hint_of(&source.op, scope, ctx),
        Operation::GetVariableValue(name) => ctx.scopes.variable_structure_hint(scope, *name),
        Operation::ReadStructure { variable, member } => {
            let owner_hint = ctx.scopes.variable_structure_hint(scope, *variable)?;
            ctx.registry.structure(owner_hint)?.member_type_hint(*member)
        }
        Operation::ReadStructureIndirect { member_hint, .. } => *member_hint,
        Operation::BindStructMemberReference {
            variable: Some(variable),
            member,
        } => {
            let owner_hint = ctx.scopes.variable_structure_hint(scope, *variable)?;
            ctx.registry.structure(owner_hint)?.member_type_hint(*member)
        }
        _ => None,
    }
}

fn first_return_type(returns: ScopeId, ctx: &TypeContext<'_>) -> ValueType {
    let Some(returns_scope) = ctx.scopes.get(returns) else {
        return ValueType::Error;
    };
    match returns_scope.member_order().first() {
        Some(name) => returns_scope
            .variable(*name)
            .map(|var| var.ty)
            .unwrap_or(ValueType::Error),
        None => ValueType::Null,
    }
}
