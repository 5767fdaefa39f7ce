//! The two-pass bytecode loader.
//!
//! The prepass walks every scope and function shell, registering IDs and
//! allocating stubs without materializing operations; the second pass
//! re-walks the same buffer and rebuilds the operation trees against the
//! scopes the prepass registered. Because the Program owns every arena,
//! a failed load drops the partial Program wholesale.

use std::path::Path;

use crate::codec::error::CodecError;
use crate::codec::opcodes as op;
use crate::ir::block::Block;
use crate::ir::composite::CompositeType;
use crate::ir::function::{Function, FunctionKind, NativeCall};
use crate::ir::ids::{CompositeId, FunctionId, ScopeId, StringId};
use crate::ir::operation::{structure_hint_of, ArithmeticKind, ComparisonKind, Operation};
use crate::ir::program::Program;
use crate::ir::response::{ResponseMap, ResponseMapEntry};
use crate::ir::signature::FunctionSignature;
use crate::ir::types::ValueType;

/// Upper bound on scope and function IDs a stream may declare.
const MAX_ARENA_ID: u32 = 1 << 20;

/// Loads a program from its bytecode form.
pub fn load_program(buffer: &[u8]) -> Result<Program, CodecError> {
    let mut loader = Loader {
        buffer,
        offset: 0,
        prepass: true,
        program: Program::new(),
    };

    loader.check_cookie()?;
    loader.check_flags()?;
    loader.check_extensions()?;
    loader.load_scope(true)?;

    loader.offset = 0;
    loader.prepass = false;
    loader.check_cookie()?;
    loader.check_flags()?;
    loader.check_extensions()?;
    loader.load_scope(true)?;

    loader.load_global_init_block()?;
    loader.load_extension_data()?;

    Ok(loader.program)
}

/// Reads a bytecode file and loads the program it contains.
pub fn load_program_from_file(path: &Path) -> Result<Program, CodecError> {
    let bytes = std::fs::read(path).map_err(|error| CodecError::io(&error))?;
    load_program(&bytes)
}

struct Loader<'a> {
    buffer: &'a [u8],
    offset: usize,
    prepass: bool,
    program: Program,
}

impl<'a> Loader<'a> {
    // -----------------------------------------------------------------
    // Primitive readers
    // -----------------------------------------------------------------

    fn check_cookie(&mut self) -> Result<(), CodecError> {
        let end = self.offset + op::HEADER_COOKIE.len();
        if self.buffer.len() < end || &self.buffer[self.offset..end] != op::HEADER_COOKIE {
            return Err(CodecError::invalid_cookie(self.offset));
        }
        self.offset = end;
        Ok(())
    }

    fn check_flags(&mut self) -> Result<(), CodecError> {
        let flags = self.read_u32()?;
        if flags & op::FLAG_USES_CONSOLE != 0 {
            self.program.set_uses_console();
        }
        Ok(())
    }

    fn check_extensions(&mut self) -> Result<(), CodecError> {
        let count = self.read_u32()?;
        for _ in 0..count {
            let name = self.read_cstr()?;
            if self.prepass {
                let id = self.program.intern(name);
                self.program.extensions.push(id);
            }
        }
        Ok(())
    }

    fn expect_opcode(&mut self, expected: u8) -> Result<(), CodecError> {
        let offset = self.offset;
        let found = self.read_opcode()?;
        if found != expected {
            return Err(CodecError::unexpected_opcode(expected, found, offset));
        }
        Ok(())
    }

    fn read_opcode(&mut self) -> Result<u8, CodecError> {
        let byte = *self
            .buffer
            .get(self.offset)
            .ok_or_else(|| CodecError::unexpected_end(self.offset))?;
        self.offset += 1;
        Ok(byte)
    }

    fn peek_opcode(&self) -> Result<u8, CodecError> {
        self.buffer
            .get(self.offset)
            .copied()
            .ok_or_else(|| CodecError::unexpected_end(self.offset))
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let end = self.offset + 4;
        let bytes = self
            .buffer
            .get(self.offset..end)
            .ok_or_else(|| CodecError::unexpected_end(self.offset))?;
        self.offset = end;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_u32()? as i32)
    }

    fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn read_flag(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_opcode()? != 0)
    }

    fn read_cstr(&mut self) -> Result<String, CodecError> {
        let start = self.offset;
        let mut end = start;
        loop {
            match self.buffer.get(end) {
                Some(0) => break,
                Some(_) => end += 1,
                None => return Err(CodecError::unexpected_end(start)),
            }
        }
        let text = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
        self.offset = end + 1;
        Ok(text)
    }

    fn read_string_by_length(&mut self, length: usize) -> Result<String, CodecError> {
        let end = self.offset + length;
        let bytes = self
            .buffer
            .get(self.offset..end)
            .ok_or_else(|| CodecError::unexpected_end(self.offset))?;
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.offset = end;
        Ok(text)
    }

    fn read_type_tag(&mut self) -> Result<ValueType, CodecError> {
        let offset = self.offset;
        let value = self.read_u32()?;
        ValueType::from_u32(value).ok_or_else(|| CodecError::unknown_type_tag(value, offset))
    }

    fn intern(&mut self, text: String) -> StringId {
        self.program.intern(text)
    }

    fn scope_for(&mut self, disk_id: u32) -> Result<ScopeId, CodecError> {
        if disk_id == 0 || disk_id > MAX_ARENA_ID {
            return Err(CodecError::invalid_structure(
                format!("scope ID {disk_id} is out of range"),
                self.offset,
            ));
        }
        let id = ScopeId::new(disk_id - 1);
        self.program.scopes.ensure(id);
        Ok(id)
    }

    fn function_for(&self, disk_id: u32) -> Result<FunctionId, CodecError> {
        if disk_id == 0 || disk_id > MAX_ARENA_ID {
            return Err(CodecError::invalid_structure(
                format!("function ID {disk_id} is out of range"),
                self.offset,
            ));
        }
        Ok(FunctionId::new(disk_id - 1))
    }

    // -----------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------

    fn load_scope(&mut self, link_to_global: bool) -> Result<ScopeId, CodecError> {
        self.expect_opcode(op::SCOPE)?;
        let disk_id = self.read_u32()?;
        let id = if link_to_global {
            self.program.global_scope
        } else {
            self.scope_for(disk_id)?
        };

        self.expect_opcode(op::PARENT_SCOPE)?;
        let parent = self.read_u32()?;
        if parent != 0 && !self.prepass {
            let parent = self.scope_for(parent)?;
            if let Some(scope) = self.program.scopes.get_mut(id) {
                scope.parent = Some(parent);
            }
        }

        self.expect_opcode(op::VARIABLES)?;
        let variables = self.read_u32()?;
        for _ in 0..variables {
            let offset = self.offset;
            let is_reference = self.read_flag()?;
            let name = self.read_cstr()?;
            let ty = self.read_type_tag()?;

            if !self.prepass {
                let name = self.intern(name);
                let scope = self.program.scopes.get_mut(id).ok_or_else(|| {
                    CodecError::invalid_structure("scope vanished during load", offset)
                })?;
                let result = if is_reference {
                    scope.add_reference(name, ty)
                } else {
                    scope.add_variable(name, ty)
                };
                result.map_err(|error| CodecError::invalid_structure(error.message, offset))?;
            }
        }

        self.expect_opcode(op::GHOSTS)?;
        let ghosts = self.read_u32()?;
        for _ in 0..ghosts {
            self.expect_opcode(op::GHOST_RECORD)?;
            if !self.prepass {
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.push_ghost_set();
                }
            }
            let records = self.read_u32()?;
            for _ in 0..records {
                let name = self.read_cstr()?;
                let owner = self.read_u32()?;
                if !self.prepass {
                    let name = self.intern(name);
                    let owner = self.scope_for(owner)?;
                    if let Some(scope) = self.program.scopes.get_mut(id) {
                        scope.add_ghost(name, owner);
                    }
                }
            }
        }

        self.expect_opcode(op::FUNCTIONS)?;
        let functions = self.read_u32()?;
        for _ in 0..functions {
            let offset = self.offset;
            let name = self.read_cstr()?;
            let raw_function = self.read_u32()?;
            let function_id = self.function_for(raw_function)?;
            let _pad = self.read_u32()?;

            if self.peek_opcode()? == op::CALL_DLL {
                self.read_opcode()?;
                let library = self.read_cstr()?;
                let entry_point = self.read_cstr()?;
                let return_type = self.read_type_tag()?;
                let return_hint = self.read_u32()?;
                let params = self.load_scope(false)?;

                if self.prepass {
                    let library = self.intern(library);
                    let entry_point = self.intern(entry_point);
                    let name = self.intern(name);
                    self.program.functions.install(
                        function_id,
                        FunctionKind::Native(NativeCall {
                            library,
                            entry_point,
                            params,
                            return_type,
                            return_hint,
                        }),
                    );
                    self.add_scope_function(id, name, function_id, offset)?;
                }
            } else {
                let params = self.load_scope(false)?;
                let returns = self.load_scope(false)?;
                self.expect_opcode(op::BEGIN_BLOCK)?;
                let local = self.load_scope(false)?;
                let block = self.load_code_block(local)?;

                if self.prepass {
                    let name = self.intern(name);
                    self.program.functions.install(
                        function_id,
                        FunctionKind::User(Function {
                            params,
                            returns,
                            body: None,
                        }),
                    );
                    self.add_scope_function(id, name, function_id, offset)?;
                } else {
                    match self.program.functions.get_mut(function_id) {
                        Some(FunctionKind::User(function)) => function.body = Some(block),
                        _ => {
                            return Err(CodecError::invalid_structure(
                                "function body arrived for an unregistered function",
                                offset,
                            ))
                        }
                    }
                }
            }
        }

        self.expect_opcode(op::FUNCTION_SIGNATURE_LIST)?;
        let signatures = self.read_u32()?;
        for _ in 0..signatures {
            let name = self.read_cstr()?;
            self.expect_opcode(op::FUNCTION_SIGNATURE_BEGIN)?;
            let signature = self.load_signature()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.add_function_signature(name, signature);
                }
            }
        }

        self.expect_opcode(op::TUPLE_TYPES)?;
        let tuple_types = self.read_u32()?;
        for _ in 0..tuple_types {
            let name = self.read_cstr()?;
            let type_id = self.read_u32()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.bind_tuple_type(name, CompositeId::new(type_id));
                }
            }
        }

        self.expect_opcode(op::TUPLE_HINTS)?;
        let tuple_hints = self.read_u32()?;
        for _ in 0..tuple_hints {
            let name = self.read_cstr()?;
            let hint = self.read_u32()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.set_tuple_hint(name, CompositeId::new(hint));
                }
            }
        }

        self.expect_opcode(op::TUPLE_TYPE_MAP)?;
        let tuple_data = self.read_u32()?;
        for _ in 0..tuple_data {
            let offset = self.offset;
            let type_id = self.read_u32()?;
            self.expect_opcode(op::MEMBERS)?;
            let members = self.read_u32()?;

            let mut ty = CompositeType::new();
            for _ in 0..members {
                let name = self.read_cstr()?;
                let member_type = self.read_type_tag()?;
                let _offset = self.read_u32()?;
                if !self.prepass {
                    let name = self.intern(name);
                    ty.add_member(name, member_type).map_err(|error| {
                        CodecError::invalid_structure(error.message, offset)
                    })?;
                }
            }

            if !self.prepass {
                ty.compute_offsets(&self.program.registry)
                    .map_err(|error| CodecError::invalid_structure(error.message, offset))?;
                self.program
                    .registry
                    .install_tuple(CompositeId::new(type_id), id, ty)
                    .map_err(|error| CodecError::invalid_structure(error.message, offset))?;
            }
        }

        self.expect_opcode(op::STRUCTURE_TYPES)?;
        let structure_types = self.read_u32()?;
        for _ in 0..structure_types {
            let name = self.read_cstr()?;
            let type_id = self.read_u32()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.bind_structure_type(name, CompositeId::new(type_id));
                }
            }
        }

        self.expect_opcode(op::STRUCTURE_HINTS)?;
        let structure_hints = self.read_u32()?;
        for _ in 0..structure_hints {
            let name = self.read_cstr()?;
            let hint = self.read_u32()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.set_structure_hint(name, CompositeId::new(hint));
                }
            }
        }

        self.expect_opcode(op::STRUCTURE_TYPE_MAP)?;
        let structure_data = self.read_u32()?;
        for _ in 0..structure_data {
            let offset = self.offset;
            let type_id = self.read_u32()?;
            self.expect_opcode(op::MEMBERS)?;
            let members = self.read_u32()?;

            let mut ty = CompositeType::new();
            for _ in 0..members {
                let name = self.read_cstr()?;
                let member_type = self.read_type_tag()?;
                let _offset = self.read_u32()?;

                // Composite members carry their type hint inline; function
                // members carry the signature name.
                match member_type {
                    ValueType::Tuple | ValueType::Structure => {
                        let hint = self.read_u32()?;
                        if !self.prepass {
                            let name = self.intern(name);
                            ty.add_composite_member(name, member_type, CompositeId::new(hint))
                                .map_err(|error| {
                                    CodecError::invalid_structure(error.message, offset)
                                })?;
                        }
                    }
                    ValueType::Function => {
                        let signature = self.read_cstr()?;
                        if !self.prepass {
                            let name = self.intern(name);
                            let signature = self.intern(signature);
                            ty.add_function_member(name, signature).map_err(|error| {
                                CodecError::invalid_structure(error.message, offset)
                            })?;
                        }
                    }
                    _ => {
                        if !self.prepass {
                            let name = self.intern(name);
                            ty.add_member(name, member_type).map_err(|error| {
                                CodecError::invalid_structure(error.message, offset)
                            })?;
                        }
                    }
                }
            }

            if !self.prepass {
                ty.compute_offsets(&self.program.registry)
                    .map_err(|error| CodecError::invalid_structure(error.message, offset))?;
                self.program
                    .registry
                    .install_structure(CompositeId::new(type_id), id, ty)
                    .map_err(|error| CodecError::invalid_structure(error.message, offset))?;
            }
        }

        self.expect_opcode(op::CONSTANTS)?;
        let constants = self.read_u32()?;
        for _ in 0..constants {
            let name = self.read_cstr()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.set_constant(name);
                }
            }
        }

        self.expect_opcode(op::RESPONSE_MAPS)?;
        let response_maps = self.read_u32()?;
        for _ in 0..response_maps {
            let map_name = self.read_cstr()?;
            let entries = self.read_u32()?;
            let mut map = ResponseMap::new();

            for _ in 0..entries {
                let message = self.read_cstr()?;
                let payload_count = self.read_u32()?;
                let mut payload_types = Vec::with_capacity(payload_count as usize);
                for _ in 0..payload_count {
                    payload_types.push(self.read_type_tag()?);
                }

                self.expect_opcode(op::BEGIN_BLOCK)?;
                let handler_scope = self.load_scope(false)?;
                let handler = self.load_code_block(handler_scope)?;
                let aux_scope = self.load_scope(false)?;

                if !self.prepass {
                    let message = self.intern(message);
                    map.add_entry(ResponseMapEntry {
                        message,
                        payload_types,
                        handler,
                        aux_scope,
                    });
                }
            }

            if !self.prepass {
                let map_name = self.intern(map_name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.add_response_map(map_name, map);
                }
            }
        }

        self.expect_opcode(op::FUTURES)?;
        let futures = self.read_u32()?;
        for _ in 0..futures {
            let name = self.read_cstr()?;
            let _ty = self.read_u32()?;

            let mut scratch = Block::with_scope(id);
            let opcode = self.read_opcode()?;
            self.load_operation(opcode, &mut scratch, id)?;

            if !self.prepass {
                let producer = scratch.pop_tail().ok_or_else(|| {
                    CodecError::invalid_structure("future has no producer operation", self.offset)
                })?;
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.add_future(name, producer);
                }
            }
        }

        self.expect_opcode(op::ARRAY_HINTS)?;
        let array_hints = self.read_u32()?;
        for _ in 0..array_hints {
            let name = self.read_cstr()?;
            let element = self.read_type_tag()?;
            if !self.prepass {
                let name = self.intern(name);
                if let Some(scope) = self.program.scopes.get_mut(id) {
                    scope.set_array_type(name, element);
                }
            }
        }

        self.expect_opcode(op::END_SCOPE)?;
        Ok(id)
    }

    fn add_scope_function(
        &mut self,
        scope: ScopeId,
        name: StringId,
        function: FunctionId,
        offset: usize,
    ) -> Result<(), CodecError> {
        self.program
            .scopes
            .get_mut(scope)
            .ok_or_else(|| CodecError::invalid_structure("scope vanished during load", offset))?
            .add_function(name, function)
            .map_err(|error| CodecError::invalid_structure(error.message, offset))
    }

    fn load_signature(&mut self) -> Result<FunctionSignature, CodecError> {
        let param_count = self.read_u32()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(self.read_type_tag()?);
        }

        let return_count = self.read_u32()?;
        let mut returns = Vec::with_capacity(return_count as usize);
        for _ in 0..return_count {
            returns.push(self.read_type_tag()?);
        }

        let hint_count = self.read_u32()?;
        let mut param_hints = Vec::with_capacity(hint_count as usize);
        for _ in 0..hint_count {
            param_hints.push(self.read_u32()?);
        }

        let flag_count = self.read_u32()?;
        let mut param_flags = Vec::with_capacity(flag_count as usize);
        for _ in 0..flag_count {
            param_flags.push(self.read_u32()?);
        }

        let nested_count = self.read_u32()?;
        let mut nested = Vec::with_capacity(nested_count as usize);
        for _ in 0..nested_count {
            let offset = self.offset;
            let marker = self.read_opcode()?;
            if marker == op::FUNCTION_SIGNATURE_END {
                nested.push(None);
            } else if marker == op::FUNCTION_SIGNATURE_BEGIN {
                nested.push(Some(self.load_signature()?));
            } else {
                return Err(CodecError::unexpected_opcode(
                    op::FUNCTION_SIGNATURE_BEGIN,
                    marker,
                    offset,
                ));
            }
        }

        let return_hint_count = self.read_u32()?;
        let mut return_hints = Vec::with_capacity(return_hint_count as usize);
        for _ in 0..return_hint_count {
            return_hints.push(self.read_u32()?);
        }

        self.expect_opcode(op::FUNCTION_SIGNATURE_END)?;

        if self.prepass {
            return Ok(FunctionSignature::new());
        }

        Ok(FunctionSignature {
            params,
            returns,
            param_hints,
            param_flags,
            nested,
            return_hints,
        })
    }

    // -----------------------------------------------------------------
    // Blocks and operations
    // -----------------------------------------------------------------

    fn load_code_block(&mut self, scope: ScopeId) -> Result<Block, CodecError> {
        let mut block = Block::with_scope(scope);
        loop {
            let opcode = self.read_opcode()?;
            if opcode == op::END_BLOCK {
                return Ok(block);
            }
            self.load_operation(opcode, &mut block, scope)?;
        }
    }

    /// Decodes an embedded block: a block marker, its scope, then its
    /// operations.
    fn load_embedded_block(&mut self) -> Result<(ScopeId, Block), CodecError> {
        self.expect_opcode(op::BEGIN_BLOCK)?;
        let scope = self.load_scope(false)?;
        let block = self.load_code_block(scope)?;
        Ok((scope, block))
    }

    fn append(&mut self, block: &mut Block, operation: Operation) {
        if !self.prepass {
            block.append(operation);
        }
    }

    fn load_operation(
        &mut self,
        opcode: u8,
        block: &mut Block,
        scope: ScopeId,
    ) -> Result<(), CodecError> {
        let opcode_offset = self.offset.saturating_sub(1);
        match opcode {
            op::NO_OP => self.append(block, Operation::NoOp),

            op::PUSH_OPERATION => {
                let inner = self.read_opcode()?;
                self.load_operation(inner, block, scope)?;
                if !self.prepass {
                    let nested = block.pop_tail().ok_or_else(|| {
                        CodecError::invalid_structure(
                            "push wrapper has no nested operation",
                            opcode_offset,
                        )
                    })?;
                    let pushed = {
                        let ctx = self.program.type_context();
                        Operation::push(nested, scope, &ctx)
                    };
                    block.append(pushed);
                }
            }

            op::PUSH_INTEGER_LITERAL => {
                let value = self.read_i32()?;
                self.append(block, Operation::PushInteger(value));
            }
            op::PUSH_INTEGER16_LITERAL => {
                let value = self.read_i32()? as i16;
                self.append(block, Operation::PushInteger16(value));
            }
            op::PUSH_REAL_LITERAL => {
                let value = self.read_f32()?;
                self.append(block, Operation::PushReal(value));
            }
            op::PUSH_BOOLEAN_LITERAL => {
                let value = self.read_flag()?;
                self.append(block, Operation::PushBoolean(value));
            }
            op::PUSH_STRING_LITERAL => {
                let length = self.read_u32()?;
                let text = self.read_string_by_length(length as usize)?;
                let id = self.intern(text);
                self.append(block, Operation::PushString(id));
            }

            op::GET_VALUE => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::GetVariableValue(id));
            }
            op::ASSIGN_VALUE => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::AssignValue(id));
            }
            op::INIT => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::InitializeValue(id));
            }
            op::BIND_REFERENCE => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::BindReference(id));
            }
            op::BIND_FUNCTION_REFERENCE => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::BindFunctionReference(id));
            }
            op::SIZE_OF => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::SizeOf(id));
            }

            op::READ_TUPLE | op::WRITE_TUPLE | op::READ_STRUCTURE | op::WRITE_STRUCTURE => {
                let variable = self.read_cstr()?;
                let member = self.read_cstr()?;
                let variable = self.intern(variable);
                let member = self.intern(member);
                let operation = match opcode {
                    op::READ_TUPLE => Operation::ReadTuple { variable, member },
                    op::WRITE_TUPLE => Operation::AssignTuple { variable, member },
                    op::READ_STRUCTURE => Operation::ReadStructure { variable, member },
                    _ => Operation::AssignStructure { variable, member },
                };
                self.append(block, operation);
            }

            op::READ_STRUCTURE_INDIRECT => {
                let member = self.read_cstr()?;
                let member = self.intern(member);
                if !self.prepass {
                    let resolved = {
                        let ctx = self.program.type_context();
                        block
                            .tail()
                            .and_then(|prior| structure_hint_of(prior, scope, &ctx))
                            .and_then(|hint| {
                                self.program
                                    .registry
                                    .structure(hint)
                                    .and_then(|ty| ty.member(member))
                                    .map(|info| (info.ty, info.type_hint))
                            })
                    };
                    let Some((member_type, member_hint)) = resolved else {
                        return Err(CodecError::invalid_structure(
                            "indirect structure read does not follow a structure producer",
                            opcode_offset,
                        ));
                    };
                    block.append(Operation::ReadStructureIndirect {
                        member,
                        back: 1,
                        member_type,
                        member_hint,
                    });
                }
            }
            op::WRITE_STRUCTURE_INDIRECT => {
                let member = self.read_cstr()?;
                let member = self.intern(member);
                self.append(block, Operation::AssignStructureIndirect { member });
            }
            op::BIND_STRUCT => {
                let chained = self.read_flag()?;
                let variable = if chained {
                    None
                } else {
                    let name = self.read_cstr()?;
                    Some(self.intern(name))
                };
                let member = self.read_cstr()?;
                let member = self.intern(member);
                self.append(
                    block,
                    Operation::BindStructMemberReference { variable, member },
                );
            }

            op::ADD_INTEGERS | op::ADD_INTEGER16S | op::ADD_REALS | op::SUBTRACT_INTEGERS
            | op::SUBTRACT_INTEGER16S | op::SUBTRACT_REALS | op::MULTIPLY_INTEGERS
            | op::MULTIPLY_INTEGER16S | op::MULTIPLY_REALS | op::DIVIDE_INTEGERS
            | op::DIVIDE_INTEGER16S | op::DIVIDE_REALS => {
                let first_is_array = self.read_flag()?;
                let second_is_array = self.read_flag()?;
                let operand_count = self.read_u32()?;

                let (kind, operand_type) = match opcode {
                    op::ADD_INTEGERS => (ArithmeticKind::Sum, ValueType::Integer),
                    op::ADD_INTEGER16S => (ArithmeticKind::Sum, ValueType::Integer16),
                    op::ADD_REALS => (ArithmeticKind::Sum, ValueType::Real),
                    op::SUBTRACT_INTEGERS => (ArithmeticKind::Subtract, ValueType::Integer),
                    op::SUBTRACT_INTEGER16S => (ArithmeticKind::Subtract, ValueType::Integer16),
                    op::SUBTRACT_REALS => (ArithmeticKind::Subtract, ValueType::Real),
                    op::MULTIPLY_INTEGERS => (ArithmeticKind::Multiply, ValueType::Integer),
                    op::MULTIPLY_INTEGER16S => (ArithmeticKind::Multiply, ValueType::Integer16),
                    op::MULTIPLY_REALS => (ArithmeticKind::Multiply, ValueType::Real),
                    op::DIVIDE_INTEGERS => (ArithmeticKind::Divide, ValueType::Integer),
                    op::DIVIDE_INTEGER16S => (ArithmeticKind::Divide, ValueType::Integer16),
                    _ => (ArithmeticKind::Divide, ValueType::Real),
                };

                self.append(
                    block,
                    Operation::Arithmetic {
                        kind,
                        operand_type,
                        first_is_array,
                        second_is_array,
                        operand_count,
                    },
                );
            }

            op::IS_EQUAL | op::IS_NOT_EQUAL | op::IS_LESSER | op::IS_GREATER
            | op::IS_LESSER_EQUAL | op::IS_GREATER_EQUAL => {
                let operand_type = self.read_type_tag()?;
                let kind = match opcode {
                    op::IS_EQUAL => ComparisonKind::Equal,
                    op::IS_NOT_EQUAL => ComparisonKind::NotEqual,
                    op::IS_LESSER => ComparisonKind::Less,
                    op::IS_GREATER => ComparisonKind::Greater,
                    op::IS_LESSER_EQUAL => ComparisonKind::LessOrEqual,
                    _ => ComparisonKind::GreaterOrEqual,
                };
                self.append(block, Operation::Compare { kind, operand_type });
            }

            op::LOGICAL_AND | op::LOGICAL_OR => {
                let count = self.read_u32()?;
                let mut operations = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    // Sub-operations decode through a scratch block so the
                    // compound owns them directly; this preserves
                    // short-circuit order.
                    let mut scratch = Block::with_scope(scope);
                    let sub = self.read_opcode()?;
                    self.load_operation(sub, &mut scratch, scope)?;
                    if !self.prepass {
                        let operation = scratch.pop_tail().ok_or_else(|| {
                            CodecError::invalid_structure(
                                "compound operator sub-operation is missing",
                                opcode_offset,
                            )
                        })?;
                        operations.push(operation);
                    }
                }

                let operation = if opcode == op::LOGICAL_AND {
                    Operation::LogicalAnd { operations }
                } else {
                    Operation::LogicalOr { operations }
                };
                self.append(block, operation);
            }
            op::LOGICAL_XOR => self.append(block, Operation::LogicalXor),
            op::LOGICAL_NOT => self.append(block, Operation::LogicalNot),

            op::BITWISE_AND | op::BITWISE_OR => {
                let operand_type = self.read_type_tag()?;
                let count = self.read_u32()?;
                let mut operations = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let mut scratch = Block::with_scope(scope);
                    let sub = self.read_opcode()?;
                    self.load_operation(sub, &mut scratch, scope)?;
                    if !self.prepass {
                        let operation = scratch.pop_tail().ok_or_else(|| {
                            CodecError::invalid_structure(
                                "compound operator sub-operation is missing",
                                opcode_offset,
                            )
                        })?;
                        operations.push(operation);
                    }
                }

                let operation = if opcode == op::BITWISE_AND {
                    Operation::BitwiseAnd {
                        operand_type,
                        operations,
                    }
                } else {
                    Operation::BitwiseOr {
                        operand_type,
                        operations,
                    }
                };
                self.append(block, operation);
            }
            op::BITWISE_XOR => {
                let operand_type = self.read_type_tag()?;
                self.append(block, Operation::BitwiseXor { operand_type });
            }
            op::BITWISE_NOT => {
                let operand_type = self.read_type_tag()?;
                self.append(block, Operation::BitwiseNot { operand_type });
            }

            op::IF => {
                let mut true_block = None;
                let marker_offset = self.offset;
                let marker = self.read_opcode()?;
                if marker == op::BEGIN_BLOCK {
                    let inner_scope = self.load_scope(false)?;
                    true_block = Some(self.load_code_block(inner_scope)?);
                } else if marker != op::NULL {
                    return Err(CodecError::unexpected_opcode(
                        op::BEGIN_BLOCK,
                        marker,
                        marker_offset,
                    ));
                }

                let mut else_if_wrapper = None;
                let marker_offset = self.offset;
                let marker = self.read_opcode()?;
                if marker == op::ELSE_IF_WRAPPER {
                    let (_, wrapper) = self.load_embedded_block()?;
                    else_if_wrapper = Some(wrapper);
                } else if marker != op::NULL {
                    return Err(CodecError::unexpected_opcode(
                        op::ELSE_IF_WRAPPER,
                        marker,
                        marker_offset,
                    ));
                }

                let mut false_block = None;
                let marker_offset = self.offset;
                let marker = self.read_opcode()?;
                if marker == op::BEGIN_BLOCK {
                    let inner_scope = self.load_scope(false)?;
                    false_block = Some(self.load_code_block(inner_scope)?);
                } else if marker != op::NULL {
                    return Err(CodecError::unexpected_opcode(
                        op::BEGIN_BLOCK,
                        marker,
                        marker_offset,
                    ));
                }

                self.append(
                    block,
                    Operation::If {
                        true_block,
                        false_block,
                        else_if_wrapper,
                    },
                );
            }
            op::ELSE_IF => {
                let (_, body) = self.load_embedded_block()?;
                self.append(block, Operation::ElseIf { block: body });
            }
            op::EXIT_IF_CHAIN => self.append(block, Operation::ExitIfChain),

            op::WHILE => {
                let (_, body) = self.load_embedded_block()?;
                self.append(block, Operation::WhileLoop { body });
            }
            op::WHILE_CONDITION => self.append(block, Operation::WhileLoopConditional),
            op::DO_WHILE => {
                let (_, body) = self.load_embedded_block()?;
                self.append(block, Operation::DoWhileLoop { body });
            }
            op::BEGIN_BLOCK => {
                let inner_scope = self.load_scope(false)?;
                let body = self.load_code_block(inner_scope)?;
                self.append(block, Operation::ExecuteBlock { block: body });
            }
            op::BREAK => self.append(block, Operation::Break),
            op::RETURN => self.append(block, Operation::Return),

            op::INVOKE => {
                let raw_function = self.read_u32()?;
                let function = self.function_for(raw_function)?;
                let indirect = self.read_flag()?;
                if !self.prepass && self.program.functions.get(function).is_none() {
                    return Err(CodecError::invalid_structure(
                        "invoke references an unregistered function",
                        opcode_offset,
                    ));
                }
                self.append(block, Operation::Invoke { function, indirect });
            }
            op::INVOKE_INDIRECT => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::InvokeIndirect { name: id });
            }

            op::FORK_TASK | op::FORK_THREAD => {
                let (inner_scope, body) = self.load_embedded_block()?;
                if !self.prepass {
                    // Concurrency bodies reparent to the global scope.
                    let global = self.program.global_scope;
                    if let Some(inner) = self.program.scopes.get_mut(inner_scope) {
                        inner.parent = Some(global);
                    }
                }
                let operation = if opcode == op::FORK_TASK {
                    Operation::ForkTask { body }
                } else {
                    Operation::ForkThread { body }
                };
                self.append(block, operation);
            }
            op::THREAD_POOL => self.append(block, Operation::CreateThreadPool),
            op::FUTURE => {
                let name = self.read_cstr()?;
                let value_type = self.read_type_tag()?;
                let use_thread_pool = self.read_flag()?;
                let id = self.intern(name);
                self.append(
                    block,
                    Operation::ForkFuture {
                        name: id,
                        value_type,
                        use_thread_pool,
                    },
                );
            }
            op::ACCEPT_MESSAGE => {
                let message = self.read_cstr()?;
                let payload_count = self.read_u32()?;
                let mut payload_types = Vec::with_capacity(payload_count as usize);
                for _ in 0..payload_count {
                    payload_types.push(self.read_type_tag()?);
                }

                let (_, handler) = self.load_embedded_block()?;
                let aux_scope = self.load_scope(false)?;

                let message = self.intern(message);
                self.append(
                    block,
                    Operation::AcceptMessage {
                        message,
                        payload_types,
                        handler,
                        aux_scope,
                    },
                );
            }
            op::ACCEPT_MESSAGE_FROM_MAP => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::AcceptMessageFromResponseMap { map: id });
            }
            op::SEND_TASK_MESSAGE => {
                let by_name = self.read_flag()?;
                let message = self.read_cstr()?;
                let payload_count = self.read_u32()?;
                let mut payload_types = Vec::with_capacity(payload_count as usize);
                for _ in 0..payload_count {
                    payload_types.push(self.read_type_tag()?);
                }
                let message = self.intern(message);
                self.append(
                    block,
                    Operation::SendTaskMessage {
                        by_name,
                        message,
                        payload_types,
                    },
                );
            }
            op::GET_MESSAGE_SENDER => self.append(block, Operation::GetMessageSender),
            op::GET_TASK_CALLER => self.append(block, Operation::GetTaskCaller),
            op::PARALLEL_FOR => {
                let counter = self.read_cstr()?;
                let counter = self.intern(counter);
                let (_, body) = self.load_embedded_block()?;
                self.append(
                    block,
                    Operation::ParallelFor {
                        body,
                        counter,
                        use_threads: true,
                        code_handle: 0,
                    },
                );
            }

            op::CONS_ARRAY => {
                let element_type = self.read_type_tag()?;
                let element_count = self.read_u32()?;
                self.append(
                    block,
                    Operation::ConsArray {
                        element_type,
                        element_count,
                    },
                );
            }
            op::CONS_ARRAY_INDIRECT => {
                let element_type = self.read_type_tag()?;
                let inner = self.read_opcode()?;
                self.load_operation(inner, block, scope)?;
                if !self.prepass {
                    let producer = block.pop_tail().ok_or_else(|| {
                        CodecError::invalid_structure(
                            "indirect array constructor has no producer",
                            opcode_offset,
                        )
                    })?;
                    block.append(Operation::ConsArrayIndirect {
                        element_type,
                        producer: Box::new(producer),
                    });
                }
            }
            op::READ_ARRAY => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::ReadArray { array: id });
            }
            op::WRITE_ARRAY => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::WriteArray { array: id });
            }
            op::ARRAY_LENGTH => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::ArrayLength { array: id });
            }
            op::MAP | op::REDUCE => {
                let mut scratch = Block::with_scope(scope);
                let inner = self.read_opcode()?;
                self.load_operation(inner, &mut scratch, scope)?;
                if !self.prepass {
                    let inner = scratch.pop_tail().ok_or_else(|| {
                        CodecError::invalid_structure(
                            "map/reduce has no inner operation",
                            opcode_offset,
                        )
                    })?;
                    let operation = if opcode == op::MAP {
                        Operation::MapOperation {
                            inner: Box::new(inner),
                        }
                    } else {
                        Operation::ReduceOperation {
                            inner: Box::new(inner),
                        }
                    };
                    block.append(operation);
                }
            }
            op::CONCAT => {
                let first_is_array = self.read_flag()?;
                let second_is_array = self.read_flag()?;
                let operand_count = self.read_u32()?;
                self.append(
                    block,
                    Operation::Concatenate {
                        first_is_array,
                        second_is_array,
                        operand_count,
                    },
                );
            }
            op::LENGTH => {
                let name = self.read_cstr()?;
                let id = self.intern(name);
                self.append(block, Operation::Length { name: id });
            }

            op::TYPE_CAST => {
                let source = self.read_type_tag()?;
                let target = self.read_type_tag()?;
                let valid = source != target
                    && matches!(
                        target,
                        ValueType::Integer | ValueType::Integer16 | ValueType::Real
                    )
                    && matches!(
                        source,
                        ValueType::String
                            | ValueType::Real
                            | ValueType::Integer
                            | ValueType::Integer16
                            | ValueType::Boolean
                    );
                if !valid {
                    return Err(CodecError::invalid_structure(
                        "invalid parameters supplied to the typecast operation",
                        opcode_offset,
                    ));
                }

                let inner = self.read_opcode()?;
                self.load_operation(inner, block, scope)?;
                if !self.prepass {
                    let operand = block.pop_tail().ok_or_else(|| {
                        CodecError::invalid_structure("typecast has no operand", opcode_offset)
                    })?;
                    block.append(Operation::TypeCast {
                        source,
                        target,
                        operand: Box::new(operand),
                    });
                }
            }
            op::TYPE_CAST_TO_STRING => {
                let source = self.read_type_tag()?;
                if !matches!(
                    source,
                    ValueType::Integer
                        | ValueType::Integer16
                        | ValueType::Real
                        | ValueType::Boolean
                        | ValueType::Buffer
                ) {
                    return Err(CodecError::invalid_structure(
                        "cannot cast the given variable type to string",
                        opcode_offset,
                    ));
                }

                let inner = self.read_opcode()?;
                self.load_operation(inner, block, scope)?;
                if !self.prepass {
                    let operand = block.pop_tail().ok_or_else(|| {
                        CodecError::invalid_structure("typecast has no operand", opcode_offset)
                    })?;
                    block.append(Operation::TypeCastToString {
                        source,
                        operand: Box::new(operand),
                    });
                }
            }

            op::HANDOFF => {
                let library = self.read_cstr()?;
                let code_handle = self.read_u32()?;
                let library = self.intern(library);
                let (_, body) = self.load_embedded_block()?;
                self.append(
                    block,
                    Operation::Handoff {
                        library,
                        body,
                        code_handle,
                    },
                );
            }
            op::HANDOFF_CONTROL => {
                let library = self.read_cstr()?;
                let counter = self.read_cstr()?;
                let code_handle = self.read_u32()?;
                let library = self.intern(library);
                let counter = self.intern(counter);
                let (inner_scope, body) = self.load_embedded_block()?;
                self.append(
                    block,
                    Operation::HandoffControl {
                        library,
                        body,
                        counter,
                        scope: inner_scope,
                        code_handle,
                    },
                );
            }

            op::DEBUG_WRITE => self.append(block, Operation::DebugWriteString),
            op::DEBUG_READ => self.append(block, Operation::DebugReadStaticString),

            unknown => return Err(CodecError::unknown_opcode(unknown, opcode_offset)),
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Trailing sections
    // -----------------------------------------------------------------

    fn load_global_init_block(&mut self) -> Result<(), CodecError> {
        self.expect_opcode(op::GLOBAL_BLOCK)?;
        let marker_offset = self.offset;
        let marker = self.read_opcode()?;
        if marker == op::BEGIN_BLOCK {
            let global = self.program.global_scope;
            let block = self.load_code_block(global)?;
            if !self.prepass {
                self.program.replace_global_init_block(block);
            }
        } else if marker != op::NULL {
            return Err(CodecError::unexpected_opcode(
                op::BEGIN_BLOCK,
                marker,
                marker_offset,
            ));
        }
        Ok(())
    }

    fn load_extension_data(&mut self) -> Result<(), CodecError> {
        self.expect_opcode(op::EXTENSION_DATA)?;
        let blocks = self.read_u32()?;
        for _ in 0..blocks {
            let library = self.read_cstr()?;
            let size = self.read_u32()?;
            let end = self.offset + size as usize;
            let bytes = self
                .buffer
                .get(self.offset..end)
                .ok_or_else(|| CodecError::unexpected_end(self.offset))?
                .to_vec();
            self.offset = end;

            let library = self.intern(library);
            self.program
                .extension_data
                .push(crate::ir::program::ExtensionBlock { library, bytes });
        }
        Ok(())
    }
}
