//! IR to linear bytecode.
//!
//! The writer walks the scope tree from the root, emitting each scope
//! where it is owned. Name-keyed tables serialize sorted by resolved
//! name so the byte stream does not depend on string-pool handle order;
//! scope, function, and composite IDs serialize as their stable numeric
//! IDs (arena index + 1, zero meaning "none").

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use crate::codec::error::CodecError;
use crate::codec::opcodes as op;
use crate::ir::block::Block;
use crate::ir::function::FunctionKind;
use crate::ir::ids::{CompositeId, ScopeId, StringId};
use crate::ir::operation::Operation;
use crate::ir::program::Program;
use crate::ir::types::ValueType;

/// Serializes a program to its bytecode form.
pub fn write_program(program: &Program) -> Result<Vec<u8>, CodecError> {
    let mut writer = BytecodeWriter {
        program,
        out: Vec::new(),
    };
    writer.write()?;
    Ok(writer.out)
}

/// Serializes a program and writes the bytes to a file.
pub fn write_program_to_file(program: &Program, path: &Path) -> Result<(), CodecError> {
    let bytes = write_program(program)?;
    let mut file = std::fs::File::create(path).map_err(|error| CodecError::io(&error))?;
    file.write_all(&bytes).map_err(|error| CodecError::io(&error))
}

struct BytecodeWriter<'a> {
    program: &'a Program,
    out: Vec<u8>,
}

impl<'a> BytecodeWriter<'a> {
    fn write(&mut self) -> Result<(), CodecError> {
        self.out.extend_from_slice(op::HEADER_COOKIE);

        let mut flags = 0u32;
        if self.program.uses_console() {
            flags |= op::FLAG_USES_CONSOLE;
        }
        self.put_u32(flags);

        self.put_u32(self.program.extensions.len() as u32);
        for library in &self.program.extensions {
            self.put_cstr(*library);
        }

        self.write_scope(self.program.global_scope)?;

        self.put_op(op::GLOBAL_BLOCK);
        match &self.program.global_init {
            Some(block) => {
                self.put_op(op::BEGIN_BLOCK);
                self.write_block_ops(block)?;
            }
            None => self.put_op(op::NULL),
        }

        self.put_op(op::EXTENSION_DATA);
        self.put_u32(self.program.extension_data.len() as u32);
        for data in &self.program.extension_data {
            self.put_cstr(data.library);
            self.put_u32(data.bytes.len() as u32);
            self.out.extend_from_slice(&data.bytes);
        }

        Ok(())
    }

    // -----------------------------------------------------------------
    // Primitive emitters
    // -----------------------------------------------------------------

    fn put_op(&mut self, opcode: u8) {
        self.out.push(opcode);
    }

    fn put_u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn put_i32(&mut self, value: i32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn put_f32(&mut self, value: f32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn put_flag(&mut self, value: bool) {
        self.out.push(u8::from(value));
    }

    fn put_cstr(&mut self, id: StringId) {
        self.out
            .extend_from_slice(self.program.strings.resolve(id).as_bytes());
        self.out.push(0);
    }

    fn put_len_str(&mut self, id: StringId) {
        let text = self.program.strings.resolve(id);
        self.put_u32(text.len() as u32);
        self.out.extend_from_slice(text.as_bytes());
    }

    fn scope_ref(id: Option<ScopeId>) -> u32 {
        id.map(|id| id.value() + 1).unwrap_or(0)
    }

    fn sorted_by_name<'b, T>(&self, map: &'b BTreeMap<StringId, T>) -> Vec<(StringId, &'b T)> {
        let mut items: Vec<(StringId, &'b T)> = map.iter().map(|(id, item)| (*id, item)).collect();
        items.sort_by(|a, b| {
            self.program
                .strings
                .resolve(a.0)
                .cmp(self.program.strings.resolve(b.0))
        });
        items
    }

    // -----------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------

    fn write_scope(&mut self, id: ScopeId) -> Result<(), CodecError> {
        let scope = self
            .program
            .scopes
            .get(id)
            .ok_or_else(|| CodecError::unserializable("scope reference does not resolve"))?;

        self.put_op(op::SCOPE);
        self.put_u32(id.value() + 1);

        self.put_op(op::PARENT_SCOPE);
        self.put_u32(Self::scope_ref(scope.parent));

        self.put_op(op::VARIABLES);
        self.put_u32(scope.member_order().len() as u32);
        for name in scope.member_order() {
            let variable = scope.variable(*name).ok_or_else(|| {
                CodecError::unserializable("scope member order references an unknown variable")
            })?;
            self.put_flag(variable.is_reference);
            self.put_cstr(*name);
            self.put_u32(variable.ty.as_u32());
        }

        self.put_op(op::GHOSTS);
        self.put_u32(scope.ghosts().len() as u32);
        for set in scope.ghosts() {
            self.put_op(op::GHOST_RECORD);
            self.put_u32(set.len() as u32);
            for (name, owner) in self.sorted_by_name(set) {
                self.put_cstr(name);
                self.put_u32(owner.value() + 1);
            }
        }

        self.put_op(op::FUNCTIONS);
        self.put_u32(scope.functions().len() as u32);
        for (name, function_id) in self.sorted_by_name(scope.functions()) {
            self.put_cstr(name);
            self.put_u32(function_id.value() + 1);
            self.put_u32(0);

            let function = self.program.functions.get(*function_id).ok_or_else(|| {
                CodecError::unserializable("scope references an unallocated function")
            })?;
            match function {
                FunctionKind::Native(stub) => {
                    self.put_op(op::CALL_DLL);
                    self.put_cstr(stub.library);
                    self.put_cstr(stub.entry_point);
                    self.put_u32(stub.return_type.as_u32());
                    self.put_u32(stub.return_hint);
                    self.write_scope(stub.params)?;
                }
                FunctionKind::User(function) => {
                    self.write_scope(function.params)?;
                    self.write_scope(function.returns)?;

                    let body = function.body.as_ref().ok_or_else(|| {
                        CodecError::unserializable("function has no body to serialize")
                    })?;
                    let local = body.scope().ok_or_else(|| {
                        CodecError::unserializable("function body block has no bound scope")
                    })?;
                    self.put_op(op::BEGIN_BLOCK);
                    self.write_scope(local)?;
                    self.write_block_ops(body)?;
                }
            }
        }

        self.put_op(op::FUNCTION_SIGNATURE_LIST);
        self.put_u32(scope.function_signatures().len() as u32);
        for (name, signature) in self.sorted_by_name(scope.function_signatures()) {
            self.put_cstr(name);
            self.put_op(op::FUNCTION_SIGNATURE_BEGIN);
            self.write_signature(signature)?;
        }

        self.put_op(op::TUPLE_TYPES);
        self.put_u32(scope.tuple_types().len() as u32);
        for (name, id) in self.sorted_by_name(scope.tuple_types()) {
            self.put_cstr(name);
            self.put_u32(id.value());
        }

        self.put_op(op::TUPLE_HINTS);
        self.put_u32(scope.tuple_type_hints().len() as u32);
        for (name, id) in self.sorted_by_name(scope.tuple_type_hints()) {
            self.put_cstr(name);
            self.put_u32(id.value());
        }

        self.put_op(op::TUPLE_TYPE_MAP);
        let owned_tuples: Vec<(CompositeId, &crate::ir::composite::CompositeType)> = self
            .program
            .registry
            .tuples()
            .filter(|(tid, _)| self.program.registry.tuple_owner(*tid) == Some(id))
            .collect();
        self.put_u32(owned_tuples.len() as u32);
        for (tid, ty) in owned_tuples {
            self.put_u32(tid.value());
            self.put_op(op::MEMBERS);
            self.put_u32(ty.member_order().len() as u32);
            for member in ty.member_order() {
                let info = ty.member(*member).ok_or_else(|| {
                    CodecError::unserializable("tuple member order references an unknown member")
                })?;
                self.put_cstr(*member);
                self.put_u32(info.ty.as_u32());
                self.put_u32(info.offset);
            }
        }

        self.put_op(op::STRUCTURE_TYPES);
        self.put_u32(scope.structure_types().len() as u32);
        for (name, id) in self.sorted_by_name(scope.structure_types()) {
            self.put_cstr(name);
            self.put_u32(id.value());
        }

        self.put_op(op::STRUCTURE_HINTS);
        self.put_u32(scope.structure_type_hints().len() as u32);
        for (name, id) in self.sorted_by_name(scope.structure_type_hints()) {
            self.put_cstr(name);
            self.put_u32(id.value());
        }

        self.put_op(op::STRUCTURE_TYPE_MAP);
        let owned_structures: Vec<(CompositeId, &crate::ir::composite::CompositeType)> = self
            .program
            .registry
            .structures()
            .filter(|(sid, _)| self.program.registry.structure_owner(*sid) == Some(id))
            .collect();
        self.put_u32(owned_structures.len() as u32);
        for (sid, ty) in owned_structures {
            self.put_u32(sid.value());
            self.put_op(op::MEMBERS);
            self.put_u32(ty.member_order().len() as u32);
            for member in ty.member_order() {
                let info = ty.member(*member).ok_or_else(|| {
                    CodecError::unserializable(
                        "structure member order references an unknown member",
                    )
                })?;
                self.put_cstr(*member);
                self.put_u32(info.ty.as_u32());
                self.put_u32(info.offset);
                match info.ty {
                    ValueType::Tuple | ValueType::Structure => {
                        self.put_u32(info.type_hint.map(|hint| hint.value()).unwrap_or(0));
                    }
                    ValueType::Function => {
                        // The signature name travels inline so higher-order
                        // members survive a round-trip.
                        match info.signature_name {
                            Some(signature) => self.put_cstr(signature),
                            None => self.out.push(0),
                        }
                    }
                    _ => {}
                }
            }
        }

        self.put_op(op::CONSTANTS);
        self.put_u32(scope.constants().len() as u32);
        for name in scope.constants() {
            self.put_cstr(*name);
        }

        self.put_op(op::RESPONSE_MAPS);
        self.put_u32(scope.response_maps().len() as u32);
        for (name, map) in self.sorted_by_name(scope.response_maps()) {
            self.put_cstr(name);
            self.put_u32(map.entries().len() as u32);
            for entry in map.entries() {
                self.put_cstr(entry.message);
                self.put_u32(entry.payload_types.len() as u32);
                for ty in &entry.payload_types {
                    self.put_u32(ty.as_u32());
                }

                let handler_scope = entry.handler.scope().ok_or_else(|| {
                    CodecError::unserializable("response handler block has no bound scope")
                })?;
                self.put_op(op::BEGIN_BLOCK);
                self.write_scope(handler_scope)?;
                self.write_block_ops(&entry.handler)?;
                self.write_scope(entry.aux_scope)?;
            }
        }

        self.put_op(op::FUTURES);
        self.put_u32(scope.futures().len() as u32);
        for (name, producer) in self.sorted_by_name(scope.futures()) {
            self.put_cstr(name);
            let ty = scope
                .variable(name)
                .map(|variable| variable.ty.as_u32())
                .unwrap_or(0);
            self.put_u32(ty);
            self.write_operation(producer)?;
        }

        self.put_op(op::ARRAY_HINTS);
        self.put_u32(scope.array_types().len() as u32);
        for (name, element) in self.sorted_by_name(scope.array_types()) {
            self.put_cstr(name);
            self.put_u32(element.as_u32());
        }

        self.put_op(op::END_SCOPE);
        Ok(())
    }

    fn write_signature(
        &mut self,
        signature: &crate::ir::signature::FunctionSignature,
    ) -> Result<(), CodecError> {
        self.put_u32(signature.params.len() as u32);
        for ty in &signature.params {
            self.put_u32(ty.as_u32());
        }

        self.put_u32(signature.returns.len() as u32);
        for ty in &signature.returns {
            self.put_u32(ty.as_u32());
        }

        self.put_u32(signature.param_hints.len() as u32);
        for hint in &signature.param_hints {
            self.put_u32(*hint);
        }

        self.put_u32(signature.param_flags.len() as u32);
        for flags in &signature.param_flags {
            self.put_u32(*flags);
        }

        self.put_u32(signature.nested.len() as u32);
        for nested in &signature.nested {
            match nested {
                Some(nested) => {
                    self.put_op(op::FUNCTION_SIGNATURE_BEGIN);
                    self.write_signature(nested)?;
                }
                None => self.put_op(op::FUNCTION_SIGNATURE_END),
            }
        }

        self.put_u32(signature.return_hints.len() as u32);
        for hint in &signature.return_hints {
            self.put_u32(*hint);
        }

        self.put_op(op::FUNCTION_SIGNATURE_END);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Blocks and operations
    // -----------------------------------------------------------------

    fn write_block_ops(&mut self, block: &Block) -> Result<(), CodecError> {
        for operation in block.ops() {
            self.write_operation(operation)?;
        }
        self.put_op(op::END_BLOCK);
        Ok(())
    }

    fn write_embedded_block(&mut self, block: &Block) -> Result<(), CodecError> {
        let scope = block.scope().ok_or_else(|| {
            CodecError::unserializable("embedded block has no bound scope")
        })?;
        self.put_op(op::BEGIN_BLOCK);
        self.write_scope(scope)?;
        self.write_block_ops(block)
    }

    fn write_operation(&mut self, operation: &Operation) -> Result<(), CodecError> {
        match operation {
            Operation::NoOp => self.put_op(op::NO_OP),

            Operation::Push(source) => {
                self.put_op(op::PUSH_OPERATION);
                self.write_operation(&source.op)?;
            }
            Operation::PushInteger(value) => {
                self.put_op(op::PUSH_INTEGER_LITERAL);
                self.put_i32(*value);
            }
            Operation::PushInteger16(value) => {
                self.put_op(op::PUSH_INTEGER16_LITERAL);
                self.put_i32(i32::from(*value));
            }
            Operation::PushReal(value) => {
                self.put_op(op::PUSH_REAL_LITERAL);
                self.put_f32(*value);
            }
            Operation::PushBoolean(value) => {
                self.put_op(op::PUSH_BOOLEAN_LITERAL);
                self.put_flag(*value);
            }
            Operation::PushString(value) => {
                self.put_op(op::PUSH_STRING_LITERAL);
                self.put_len_str(*value);
            }

            Operation::GetVariableValue(name) => {
                self.put_op(op::GET_VALUE);
                self.put_cstr(*name);
            }
            Operation::AssignValue(name) => {
                self.put_op(op::ASSIGN_VALUE);
                self.put_cstr(*name);
            }
            Operation::InitializeValue(name) => {
                self.put_op(op::INIT);
                self.put_cstr(*name);
            }
            Operation::BindReference(name) => {
                self.put_op(op::BIND_REFERENCE);
                self.put_cstr(*name);
            }
            Operation::BindFunctionReference(name) => {
                self.put_op(op::BIND_FUNCTION_REFERENCE);
                self.put_cstr(*name);
            }
            Operation::SizeOf(name) => {
                self.put_op(op::SIZE_OF);
                self.put_cstr(*name);
            }

            Operation::ReadTuple { variable, member } => {
                self.put_op(op::READ_TUPLE);
                self.put_cstr(*variable);
                self.put_cstr(*member);
            }
            Operation::AssignTuple { variable, member } => {
                self.put_op(op::WRITE_TUPLE);
                self.put_cstr(*variable);
                self.put_cstr(*member);
            }
            Operation::ReadStructure { variable, member } => {
                self.put_op(op::READ_STRUCTURE);
                self.put_cstr(*variable);
                self.put_cstr(*member);
            }
            Operation::AssignStructure { variable, member } => {
                self.put_op(op::WRITE_STRUCTURE);
                self.put_cstr(*variable);
                self.put_cstr(*member);
            }
            Operation::ReadStructureIndirect { member, .. } => {
                self.put_op(op::READ_STRUCTURE_INDIRECT);
                self.put_cstr(*member);
            }
            Operation::AssignStructureIndirect { member } => {
                self.put_op(op::WRITE_STRUCTURE_INDIRECT);
                self.put_cstr(*member);
            }
            Operation::BindStructMemberReference { variable, member } => {
                self.put_op(op::BIND_STRUCT);
                self.put_flag(variable.is_none());
                if let Some(variable) = variable {
                    self.put_cstr(*variable);
                }
                self.put_cstr(*member);
            }

            Operation::Arithmetic {
                kind,
                operand_type,
                first_is_array,
                second_is_array,
                operand_count,
            } => {
                use crate::ir::operation::ArithmeticKind;
                let opcode = match (kind, operand_type) {
                    (ArithmeticKind::Sum, ValueType::Integer) => op::ADD_INTEGERS,
                    (ArithmeticKind::Sum, ValueType::Integer16) => op::ADD_INTEGER16S,
                    (ArithmeticKind::Sum, ValueType::Real) => op::ADD_REALS,
                    (ArithmeticKind::Subtract, ValueType::Integer) => op::SUBTRACT_INTEGERS,
                    (ArithmeticKind::Subtract, ValueType::Integer16) => op::SUBTRACT_INTEGER16S,
                    (ArithmeticKind::Subtract, ValueType::Real) => op::SUBTRACT_REALS,
                    (ArithmeticKind::Multiply, ValueType::Integer) => op::MULTIPLY_INTEGERS,
                    (ArithmeticKind::Multiply, ValueType::Integer16) => op::MULTIPLY_INTEGER16S,
                    (ArithmeticKind::Multiply, ValueType::Real) => op::MULTIPLY_REALS,
                    (ArithmeticKind::Divide, ValueType::Integer) => op::DIVIDE_INTEGERS,
                    (ArithmeticKind::Divide, ValueType::Integer16) => op::DIVIDE_INTEGER16S,
                    (ArithmeticKind::Divide, ValueType::Real) => op::DIVIDE_REALS,
                    _ => {
                        return Err(CodecError::unserializable(
                            "arithmetic operation carries a non-numeric operand type",
                        ))
                    }
                };
                self.put_op(opcode);
                self.put_flag(*first_is_array);
                self.put_flag(*second_is_array);
                self.put_u32(*operand_count);
            }

            Operation::Compare { kind, operand_type } => {
                use crate::ir::operation::ComparisonKind;
                let opcode = match kind {
                    ComparisonKind::Equal => op::IS_EQUAL,
                    ComparisonKind::NotEqual => op::IS_NOT_EQUAL,
                    ComparisonKind::Less => op::IS_LESSER,
                    ComparisonKind::Greater => op::IS_GREATER,
                    ComparisonKind::LessOrEqual => op::IS_LESSER_EQUAL,
                    ComparisonKind::GreaterOrEqual => op::IS_GREATER_EQUAL,
                };
                self.put_op(opcode);
                self.put_u32(operand_type.as_u32());
            }

            Operation::LogicalAnd { operations } => {
                self.put_op(op::LOGICAL_AND);
                self.put_u32(operations.len() as u32);
                for sub in operations {
                    self.write_operation(sub)?;
                }
            }
            Operation::LogicalOr { operations } => {
                self.put_op(op::LOGICAL_OR);
                self.put_u32(operations.len() as u32);
                for sub in operations {
                    self.write_operation(sub)?;
                }
            }
            Operation::LogicalXor => self.put_op(op::LOGICAL_XOR),
            Operation::LogicalNot => self.put_op(op::LOGICAL_NOT),
            Operation::BitwiseAnd {
                operand_type,
                operations,
            } => {
                self.put_op(op::BITWISE_AND);
                self.put_u32(operand_type.as_u32());
                self.put_u32(operations.len() as u32);
                for sub in operations {
                    self.write_operation(sub)?;
                }
            }
            Operation::BitwiseOr {
                operand_type,
                operations,
            } => {
                self.put_op(op::BITWISE_OR);
                self.put_u32(operand_type.as_u32());
                self.put_u32(operations.len() as u32);
                for sub in operations {
                    self.write_operation(sub)?;
                }
            }
            Operation::BitwiseXor { operand_type } => {
                self.put_op(op::BITWISE_XOR);
                self.put_u32(operand_type.as_u32());
            }
            Operation::BitwiseNot { operand_type } => {
                self.put_op(op::BITWISE_NOT);
                self.put_u32(operand_type.as_u32());
            }

            Operation::If {
                true_block,
                false_block,
                else_if_wrapper,
            } => {
                self.put_op(op::IF);
                match true_block {
                    Some(block) => self.write_embedded_block(block)?,
                    None => self.put_op(op::NULL),
                }
                match else_if_wrapper {
                    Some(block) => {
                        self.put_op(op::ELSE_IF_WRAPPER);
                        self.write_embedded_block(block)?;
                    }
                    None => self.put_op(op::NULL),
                }
                match false_block {
                    Some(block) => self.write_embedded_block(block)?,
                    None => self.put_op(op::NULL),
                }
            }
            Operation::ElseIf { block } => {
                self.put_op(op::ELSE_IF);
                self.write_embedded_block(block)?;
            }
            Operation::ExitIfChain => self.put_op(op::EXIT_IF_CHAIN),
            Operation::WhileLoop { body } => {
                self.put_op(op::WHILE);
                self.write_embedded_block(body)?;
            }
            Operation::WhileLoopConditional => self.put_op(op::WHILE_CONDITION),
            Operation::DoWhileLoop { body } => {
                self.put_op(op::DO_WHILE);
                self.write_embedded_block(body)?;
            }
            Operation::ExecuteBlock { block } => {
                self.write_embedded_block(block)?;
            }
            Operation::Break => self.put_op(op::BREAK),
            Operation::Return => self.put_op(op::RETURN),

            Operation::Invoke { function, indirect } => {
                self.put_op(op::INVOKE);
                self.put_u32(function.value() + 1);
                self.put_flag(*indirect);
            }
            Operation::InvokeIndirect { name } => {
                self.put_op(op::INVOKE_INDIRECT);
                self.put_cstr(*name);
            }

            Operation::ForkTask { body } => {
                self.put_op(op::FORK_TASK);
                self.write_embedded_block(body)?;
            }
            Operation::ForkThread { body } => {
                self.put_op(op::FORK_THREAD);
                self.write_embedded_block(body)?;
            }
            Operation::CreateThreadPool => self.put_op(op::THREAD_POOL),
            Operation::ForkFuture {
                name,
                value_type,
                use_thread_pool,
            } => {
                self.put_op(op::FUTURE);
                self.put_cstr(*name);
                self.put_u32(value_type.as_u32());
                self.put_flag(*use_thread_pool);
            }
            Operation::AcceptMessage {
                message,
                payload_types,
                handler,
                aux_scope,
            } => {
                self.put_op(op::ACCEPT_MESSAGE);
                self.put_cstr(*message);
                self.put_u32(payload_types.len() as u32);
                for ty in payload_types {
                    self.put_u32(ty.as_u32());
                }
                self.write_embedded_block(handler)?;
                self.write_scope(*aux_scope)?;
            }
            Operation::AcceptMessageFromResponseMap { map } => {
                self.put_op(op::ACCEPT_MESSAGE_FROM_MAP);
                self.put_cstr(*map);
            }
            Operation::SendTaskMessage {
                by_name,
                message,
                payload_types,
            } => {
                self.put_op(op::SEND_TASK_MESSAGE);
                self.put_flag(*by_name);
                self.put_cstr(*message);
                self.put_u32(payload_types.len() as u32);
                for ty in payload_types {
                    self.put_u32(ty.as_u32());
                }
            }
            Operation::GetMessageSender => self.put_op(op::GET_MESSAGE_SENDER),
            Operation::GetTaskCaller => self.put_op(op::GET_TASK_CALLER),
            Operation::ParallelFor { body, counter, .. } => {
                self.put_op(op::PARALLEL_FOR);
                self.put_cstr(*counter);
                self.write_embedded_block(body)?;
            }

            Operation::ConsArray {
                element_type,
                element_count,
            } => {
                self.put_op(op::CONS_ARRAY);
                self.put_u32(element_type.as_u32());
                self.put_u32(*element_count);
            }
            Operation::ConsArrayIndirect {
                element_type,
                producer,
            } => {
                self.put_op(op::CONS_ARRAY_INDIRECT);
                self.put_u32(element_type.as_u32());
                self.write_operation(producer)?;
            }
            Operation::ReadArray { array } => {
                self.put_op(op::READ_ARRAY);
                self.put_cstr(*array);
            }
            Operation::WriteArray { array } => {
                self.put_op(op::WRITE_ARRAY);
                self.put_cstr(*array);
            }
            Operation::ArrayLength { array } => {
                self.put_op(op::ARRAY_LENGTH);
                self.put_cstr(*array);
            }
            Operation::MapOperation { inner } => {
                self.put_op(op::MAP);
                self.write_operation(inner)?;
            }
            Operation::ReduceOperation { inner } => {
                self.put_op(op::REDUCE);
                self.write_operation(inner)?;
            }
            Operation::Concatenate {
                first_is_array,
                second_is_array,
                operand_count,
            } => {
                self.put_op(op::CONCAT);
                self.put_flag(*first_is_array);
                self.put_flag(*second_is_array);
                self.put_u32(*operand_count);
            }
            Operation::Length { name } => {
                self.put_op(op::LENGTH);
                self.put_cstr(*name);
            }

            Operation::TypeCast {
                source,
                target,
                operand,
            } => {
                self.put_op(op::TYPE_CAST);
                self.put_u32(source.as_u32());
                self.put_u32(target.as_u32());
                self.write_operation(operand)?;
            }
            Operation::TypeCastToString { source, operand } => {
                self.put_op(op::TYPE_CAST_TO_STRING);
                self.put_u32(source.as_u32());
                self.write_operation(operand)?;
            }

            Operation::Handoff {
                library,
                body,
                code_handle,
            } => {
                self.put_op(op::HANDOFF);
                self.put_cstr(*library);
                self.put_u32(*code_handle);
                self.write_embedded_block(body)?;
            }
            Operation::HandoffControl {
                library,
                body,
                counter,
                code_handle,
                ..
            } => {
                self.put_op(op::HANDOFF_CONTROL);
                self.put_cstr(*library);
                self.put_cstr(*counter);
                self.put_u32(*code_handle);
                self.write_embedded_block(body)?;
            }

            Operation::DebugWriteString => self.put_op(op::DEBUG_WRITE),
            Operation::DebugReadStaticString => self.put_op(op::DEBUG_READ),
        }
        Ok(())
    }
}
