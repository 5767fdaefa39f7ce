//! Textual assembly writer.
//!
//! One token record per significant event, tab-indented by block depth.
//! The output is isomorphic to the IR: two programs with the same scope
//! tree, types, and operation streams produce identical text, which is
//! what the round-trip tests compare. Write-only by design.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use crate::codec::error::CodecError;
use crate::ir::block::Block;
use crate::ir::function::FunctionKind;
use crate::ir::ids::{ScopeId, StringId};
use crate::ir::operation::Operation;
use crate::ir::program::Program;
use crate::ir::signature::FunctionSignature;
use crate::ir::types::ValueType;

/// Serializes a program to its textual assembly form.
pub fn write_program_text(program: &Program) -> String {
    let mut writer = AssemblyWriter {
        program,
        out: String::new(),
        depth: 0,
        skip_pad: false,
        traversed_scopes: BTreeSet::new(),
    };
    writer.write();
    writer.out
}

/// Serializes a program and writes the text to a file.
pub fn write_program_text_to_file(program: &Program, path: &Path) -> Result<(), CodecError> {
    let text = write_program_text(program);
    std::fs::write(path, text).map_err(|error| CodecError::io(&error))
}

struct AssemblyWriter<'a> {
    program: &'a Program,
    out: String,
    depth: usize,
    skip_pad: bool,
    traversed_scopes: BTreeSet<ScopeId>,
}

impl<'a> AssemblyWriter<'a> {
    fn write(&mut self) {
        self.write_scope(self.program.global_scope);

        self.line("GlobalBlock");
        match &self.program.global_init {
            Some(block) => self.write_block_body(block),
            None => self.line("Null"),
        }
    }

    fn pad(&mut self) {
        if self.skip_pad {
            self.skip_pad = false;
            return;
        }
        for _ in 0..self.depth {
            self.out.push('\t');
        }
    }

    fn line(&mut self, text: &str) {
        self.pad();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn name(&self, id: StringId) -> &str {
        self.program.strings.resolve(id)
    }

    fn sorted_by_name<'b, T>(&self, map: &'b BTreeMap<StringId, T>) -> Vec<(StringId, &'b T)> {
        let mut items: Vec<(StringId, &'b T)> = map.iter().map(|(id, item)| (*id, item)).collect();
        items.sort_by(|a, b| self.name(a.0).cmp(self.name(b.0)));
        items
    }

    fn scope_ref(id: Option<ScopeId>) -> u32 {
        id.map(|id| id.value() + 1).unwrap_or(0)
    }

    // -----------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------

    fn write_scope(&mut self, id: ScopeId) {
        if !self.traversed_scopes.insert(id) {
            self.line(&format!("CurrentScope {}", id.value() + 1));
            return;
        }
        let Some(scope) = self.program.scopes.get(id) else {
            self.line("Null");
            return;
        };

        self.line(&format!("Scope {}", id.value() + 1));
        self.depth += 1;

        self.line(&format!("ParentScope {}", Self::scope_ref(scope.parent)));

        self.line(&format!("Variables {}", scope.member_order().len()));
        for name in scope.member_order() {
            if let Some(variable) = scope.variable(*name) {
                let text = self.name(*name).to_string();
                self.line(&format!("{text} {}", variable.ty.as_u32()));
            }
        }

        self.line(&format!("Ghosts {}", scope.ghosts().len()));
        for set in scope.ghosts() {
            self.line(&format!("GhostRecord {}", set.len()));
            for (name, owner) in self.sorted_by_name(set) {
                let text = self.name(name).to_string();
                self.line(&format!("{text} {}", owner.value() + 1));
            }
        }

        self.line(&format!("Functions {}", scope.functions().len()));
        for (name, function_id) in self.sorted_by_name(scope.functions()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {}", function_id.value() + 1));
            match self.program.functions.get(*function_id) {
                Some(FunctionKind::User(function)) => {
                    self.write_scope(function.params);
                    self.write_scope(function.returns);
                    match &function.body {
                        Some(body) => self.write_block(body),
                        None => self.line("Null"),
                    }
                }
                Some(FunctionKind::Native(stub)) => {
                    let library = self.name(stub.library).to_string();
                    let entry = self.name(stub.entry_point).to_string();
                    self.line(&format!(
                        "CallDLL {library} {entry} {} {}",
                        stub.return_type.as_u32(),
                        stub.return_hint
                    ));
                    self.write_scope(stub.params);
                }
                None => self.line("Null"),
            }
        }

        self.line(&format!(
            "FunctionSignatureList {}",
            scope.function_signatures().len()
        ));
        for (name, signature) in self.sorted_by_name(scope.function_signatures()) {
            let text = self.name(name).to_string();
            self.line(&text);
            self.write_signature(signature);
        }

        self.line(&format!("TupleTypes {}", scope.tuple_types().len()));
        for (name, id) in self.sorted_by_name(scope.tuple_types()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {}", id.value()));
        }

        self.line(&format!("TupleTypeHints {}", scope.tuple_type_hints().len()));
        for (name, id) in self.sorted_by_name(scope.tuple_type_hints()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {}", id.value()));
        }

        let owned_tuples: Vec<_> = self
            .program
            .registry
            .tuples()
            .filter(|(tid, _)| self.program.registry.tuple_owner(*tid) == Some(id))
            .collect();
        self.line(&format!("TupleTypeMap {}", owned_tuples.len()));
        for (tid, ty) in owned_tuples {
            self.line(&format!("{}", tid.value()));
            self.write_members(ty, false);
        }

        self.line(&format!("StructureTypes {}", scope.structure_types().len()));
        for (name, id) in self.sorted_by_name(scope.structure_types()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {}", id.value()));
        }

        self.line(&format!(
            "StructureTypeHints {}",
            scope.structure_type_hints().len()
        ));
        for (name, id) in self.sorted_by_name(scope.structure_type_hints()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {}", id.value()));
        }

        let owned_structures: Vec<_> = self
            .program
            .registry
            .structures()
            .filter(|(sid, _)| self.program.registry.structure_owner(*sid) == Some(id))
            .collect();
        self.line(&format!("StructureTypeMap {}", owned_structures.len()));
        for (sid, ty) in owned_structures {
            self.line(&format!("{}", sid.value()));
            self.write_members(ty, true);
        }

        self.line(&format!("Constants {}", scope.constants().len()));
        for name in scope.constants() {
            let text = self.name(*name).to_string();
            self.line(&text);
        }

        self.line(&format!("ResponseMaps {}", scope.response_maps().len()));
        for (name, map) in self.sorted_by_name(scope.response_maps()) {
            let text = self.name(name).to_string();
            self.line(&text);
            self.line(&format!("{}", map.entries().len()));
            for entry in map.entries() {
                let message = self.name(entry.message).to_string();
                self.line(&message);
                self.line(&format!("{}", entry.payload_types.len()));
                for ty in &entry.payload_types {
                    self.line(&format!("{}", ty.as_u32()));
                }
                self.write_block(&entry.handler);
                self.write_scope(entry.aux_scope);
            }
        }

        self.line(&format!("Futures {}", scope.futures().len()));
        for (name, producer) in self.sorted_by_name(scope.futures()) {
            let text = self.name(name).to_string();
            self.pad();
            self.out.push_str(&text);
            self.out.push(' ');
            self.skip_pad = true;
            self.write_operation(producer);
        }

        self.line(&format!("ListTypes {}", scope.array_types().len()));
        for (name, element) in self.sorted_by_name(scope.array_types()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {}", element.as_u32()));
        }

        self.line(&format!("ListSizes {}", scope.array_sizes().len()));
        for (name, size) in self.sorted_by_name(scope.array_sizes()) {
            let text = self.name(name).to_string();
            self.line(&format!("{text} {size}"));
        }

        self.depth -= 1;
        self.line("EndScope");
    }

    fn write_members(&mut self, ty: &crate::ir::composite::CompositeType, with_hints: bool) {
        self.line(&format!("Members {}", ty.member_order().len()));
        for member in ty.member_order() {
            let Some(info) = ty.member(*member) else {
                continue;
            };
            let text = self.name(*member).to_string();
            self.line(&format!("{text} {} {}", info.ty.as_u32(), info.offset));
            if with_hints
                && matches!(info.ty, ValueType::Tuple | ValueType::Structure)
            {
                self.line(&format!(
                    "{}",
                    info.type_hint.map(|hint| hint.value()).unwrap_or(0)
                ));
            }
            if with_hints && info.ty == ValueType::Function {
                match info.signature_name {
                    Some(signature) => {
                        let text = self.name(signature).to_string();
                        self.line(&text);
                    }
                    None => self.line("Null"),
                }
            }
        }
    }

    fn write_signature(&mut self, signature: &FunctionSignature) {
        self.line("FunctionSignatureBegin");
        self.depth += 1;

        let params: Vec<String> = signature
            .params
            .iter()
            .map(|ty| ty.as_u32().to_string())
            .collect();
        self.line(&format!("{} {}", signature.params.len(), params.join(" ")));

        let returns: Vec<String> = signature
            .returns
            .iter()
            .map(|ty| ty.as_u32().to_string())
            .collect();
        self.line(&format!("{} {}", signature.returns.len(), returns.join(" ")));

        let hints: Vec<String> = signature
            .param_hints
            .iter()
            .map(|hint| hint.to_string())
            .collect();
        self.line(&format!("{} {}", signature.param_hints.len(), hints.join(" ")));

        let flags: Vec<String> = signature
            .param_flags
            .iter()
            .map(|flags| flags.to_string())
            .collect();
        self.line(&format!("{} {}", signature.param_flags.len(), flags.join(" ")));

        self.line(&format!("{}", signature.nested.len()));
        for nested in &signature.nested {
            match nested {
                Some(nested) => self.write_signature(nested),
                None => self.line("FunctionSignatureEnd"),
            }
        }

        let return_hints: Vec<String> = signature
            .return_hints
            .iter()
            .map(|hint| hint.to_string())
            .collect();
        self.line(&format!(
            "{} {}",
            signature.return_hints.len(),
            return_hints.join(" ")
        ));

        self.depth -= 1;
        self.line("FunctionSignatureEnd");
    }

    // -----------------------------------------------------------------
    // Blocks and operations
    // -----------------------------------------------------------------

    fn write_block(&mut self, block: &Block) {
        self.line("BeginBlock");
        self.depth += 1;
        match block.scope() {
            Some(scope) => self.write_scope(scope),
            None => self.line("Null"),
        }
        for operation in block.ops() {
            self.write_operation(operation);
        }
        self.depth -= 1;
        self.line("EndBlock");
    }

    fn write_block_body(&mut self, block: &Block) {
        self.line("BeginBlock");
        self.depth += 1;
        for operation in block.ops() {
            self.write_operation(operation);
        }
        self.depth -= 1;
        self.line("EndBlock");
    }

    fn write_operation(&mut self, operation: &Operation) {
        let mnemonic = operation.mnemonic();
        match operation {
            Operation::PushInteger(value) => self.line(&format!("{mnemonic} {value}")),
            Operation::PushInteger16(value) => self.line(&format!("{mnemonic} {value}")),
            Operation::PushReal(value) => self.line(&format!("{mnemonic} {value}")),
            Operation::PushBoolean(value) => {
                let token = if *value { "True" } else { "False" };
                self.line(&format!("{mnemonic} {token}"));
            }
            Operation::PushString(value) => {
                let text = self.name(*value).to_string();
                self.line(&format!("{mnemonic} {} {text}", text.len()));
            }

            Operation::Push(source) => {
                self.pad();
                self.out.push_str(mnemonic);
                self.out.push(' ');
                self.skip_pad = true;
                self.write_operation(&source.op);
            }

            Operation::GetVariableValue(name)
            | Operation::AssignValue(name)
            | Operation::InitializeValue(name)
            | Operation::BindReference(name)
            | Operation::BindFunctionReference(name)
            | Operation::SizeOf(name)
            | Operation::InvokeIndirect { name }
            | Operation::Length { name }
            | Operation::AssignStructureIndirect { member: name }
            | Operation::ReadArray { array: name }
            | Operation::WriteArray { array: name }
            | Operation::ArrayLength { array: name }
            | Operation::AcceptMessageFromResponseMap { map: name } => {
                let text = self.name(*name).to_string();
                self.line(&format!("{mnemonic} {text}"));
            }

            Operation::ReadTuple { variable, member }
            | Operation::AssignTuple { variable, member }
            | Operation::ReadStructure { variable, member }
            | Operation::AssignStructure { variable, member } => {
                let variable = self.name(*variable).to_string();
                let member = self.name(*member).to_string();
                self.line(&format!("{mnemonic} {variable} {member}"));
            }
            Operation::ReadStructureIndirect { member, .. } => {
                let member = self.name(*member).to_string();
                self.line(&format!("{mnemonic} {member}"));
            }
            Operation::BindStructMemberReference { variable, member } => {
                let member = self.name(*member).to_string();
                match variable {
                    Some(variable) => {
                        let variable = self.name(*variable).to_string();
                        self.line(&format!("{mnemonic} False {variable} {member}"));
                    }
                    None => self.line(&format!("{mnemonic} True {member}")),
                }
            }

            Operation::Arithmetic {
                first_is_array,
                second_is_array,
                operand_count,
                ..
            }
            | Operation::Concatenate {
                first_is_array,
                second_is_array,
                operand_count,
            } => {
                let first = if *first_is_array { "True" } else { "False" };
                let second = if *second_is_array { "True" } else { "False" };
                self.line(&format!("{mnemonic} {first} {second} {operand_count}"));
            }

            Operation::Compare { operand_type, .. } => {
                self.line(&format!("{mnemonic} {}", operand_type.as_u32()));
            }

            Operation::LogicalAnd { operations } | Operation::LogicalOr { operations } => {
                self.line(&format!("{mnemonic} {}", operations.len()));
                self.depth += 1;
                for sub in operations {
                    self.write_operation(sub);
                }
                self.depth -= 1;
            }
            Operation::BitwiseAnd {
                operand_type,
                operations,
            }
            | Operation::BitwiseOr {
                operand_type,
                operations,
            } => {
                self.line(&format!(
                    "{mnemonic} {} {}",
                    operand_type.as_u32(),
                    operations.len()
                ));
                self.depth += 1;
                for sub in operations {
                    self.write_operation(sub);
                }
                self.depth -= 1;
            }
            Operation::BitwiseXor { operand_type } | Operation::BitwiseNot { operand_type } => {
                self.line(&format!("{mnemonic} {}", operand_type.as_u32()));
            }

            Operation::If {
                true_block,
                false_block,
                else_if_wrapper,
            } => {
                self.line(mnemonic);
                self.depth += 1;
                match true_block {
                    Some(block) => self.write_block(block),
                    None => self.line("Null"),
                }
                match else_if_wrapper {
                    Some(block) => {
                        self.line("ElseIfWrapper");
                        self.write_block(block);
                    }
                    None => self.line("Null"),
                }
                match false_block {
                    Some(block) => self.write_block(block),
                    None => self.line("Null"),
                }
                self.depth -= 1;
            }
            Operation::ElseIf { block } => {
                self.line(mnemonic);
                self.depth += 1;
                self.write_block(block);
                self.depth -= 1;
            }

            Operation::WhileLoop { body }
            | Operation::DoWhileLoop { body }
            | Operation::ForkTask { body }
            | Operation::ForkThread { body } => {
                self.line(mnemonic);
                self.depth += 1;
                self.write_block(body);
                self.depth -= 1;
            }
            Operation::ExecuteBlock { block } => {
                self.write_block(block);
            }

            Operation::Invoke { function, indirect } => {
                let token = if *indirect { "True" } else { "False" };
                self.line(&format!("{mnemonic} {} {token}", function.value() + 1));
            }

            Operation::ForkFuture {
                name,
                value_type,
                use_thread_pool,
            } => {
                let text = self.name(*name).to_string();
                let pool = if *use_thread_pool { "True" } else { "False" };
                self.line(&format!(
                    "{mnemonic} {text} {} {pool}",
                    value_type.as_u32()
                ));
            }

            Operation::AcceptMessage {
                message,
                payload_types,
                handler,
                aux_scope,
            } => {
                let message = self.name(*message).to_string();
                self.line(&format!("{mnemonic} {message} {}", payload_types.len()));
                self.depth += 1;
                for ty in payload_types {
                    self.line(&format!("{}", ty.as_u32()));
                }
                self.write_block(handler);
                self.write_scope(*aux_scope);
                self.depth -= 1;
            }

            Operation::SendTaskMessage {
                by_name,
                message,
                payload_types,
            } => {
                let token = if *by_name { "True" } else { "False" };
                let message = self.name(*message).to_string();
                self.line(&format!(
                    "{mnemonic} {token} {message} {}",
                    payload_types.len()
                ));
                self.depth += 1;
                for ty in payload_types {
                    self.line(&format!("{}", ty.as_u32()));
                }
                self.depth -= 1;
            }

            Operation::ParallelFor { body, counter, .. } => {
                let counter = self.name(*counter).to_string();
                self.line(&format!("{mnemonic} {counter}"));
                self.depth += 1;
                self.write_block(body);
                self.depth -= 1;
            }

            Operation::ConsArray {
                element_type,
                element_count,
            } => {
                self.line(&format!(
                    "{mnemonic} {} {element_count}",
                    element_type.as_u32()
                ));
            }
            Operation::ConsArrayIndirect {
                element_type,
                producer,
            } => {
                self.line(&format!("{mnemonic} {}", element_type.as_u32()));
                self.depth += 1;
                self.write_operation(producer);
                self.depth -= 1;
            }
            Operation::MapOperation { inner } | Operation::ReduceOperation { inner } => {
                self.line(mnemonic);
                self.depth += 1;
                self.write_operation(inner);
                self.depth -= 1;
            }

            Operation::TypeCast {
                source,
                target,
                operand,
            } => {
                self.line(&format!(
                    "{mnemonic} {} {}",
                    source.as_u32(),
                    target.as_u32()
                ));
                self.depth += 1;
                self.write_operation(operand);
                self.depth -= 1;
            }
            Operation::TypeCastToString { source, operand } => {
                self.line(&format!("{mnemonic} {}", source.as_u32()));
                self.depth += 1;
                self.write_operation(operand);
                self.depth -= 1;
            }

            Operation::Handoff {
                library,
                body,
                code_handle,
            } => {
                let library = self.name(*library).to_string();
                self.line(&format!("{mnemonic} {library} {code_handle}"));
                self.depth += 1;
                self.write_block(body);
                self.depth -= 1;
            }
            Operation::HandoffControl {
                library,
                body,
                counter,
                code_handle,
                ..
            } => {
                let library = self.name(*library).to_string();
                let counter = self.name(*counter).to_string();
                self.line(&format!("{mnemonic} {library} {counter} {code_handle}"));
                self.depth += 1;
                self.write_block(body);
                self.depth -= 1;
            }

            _ => self.line(mnemonic),
        }
    }
}
