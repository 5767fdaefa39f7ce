//! Structure and tuple type definition, and nested member access.

use std::collections::VecDeque;

use crate::builder::{SemanticBuilder, StackEntry};
use crate::ir::composite::CompositeType;
use crate::ir::error::IrError;
use crate::ir::ids::CompositeId;
use crate::ir::operation::{structure_hint_of, Operation};
use crate::ir::types::ValueType;

impl SemanticBuilder {
    // -----------------------------------------------------------------
    // Structure type definition
    // -----------------------------------------------------------------

    /// Opens a structure type definition with the given name.
    pub fn register_structure_type(&mut self, name: &str) -> Result<(), IrError> {
        if self.created_structure.is_some() {
            self.report_fatal_error(
                "an incomplete structure type definition has already been started; nested definitions are not permitted",
            );
            return Ok(());
        }
        let id = self.program.intern(name);
        self.created_structure = Some((id, CompositeType::new()));
        Ok(())
    }

    /// Adds a primitive-typed member to the open structure definition.
    pub fn register_structure_member(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        if matches!(ty, ValueType::Tuple | ValueType::Structure) {
            return Err(IrError::structural(
                "composite members resolve through the unknown-type path",
            ));
        }
        let id = self.program.intern(name);
        let max_members = self.options.max_composite_members;
        let Some((_, ty_def)) = self.created_structure.as_mut() else {
            return Err(IrError::structural(
                "structure member outside a structure type definition",
            ));
        };
        if ty_def.member_order().len() >= max_members {
            return Err(IrError::limit_exceeded(
                "composite member limit exceeded",
                format!("max_composite_members={max_members}"),
            ));
        }
        if ty_def.add_member(id, ty).is_err() {
            self.report_fatal_error(format!("structure member {name} is already declared"));
        }
        Ok(())
    }

    /// Notes the type name of an upcoming non-primitive member.
    pub fn register_structure_unknown_type_name(&mut self, type_name: &str) {
        self.upcoming_member_type = Some(type_name.to_string());
    }

    /// Adds a nested tuple, nested structure, or function-typed member,
    /// resolving the noted type name.
    pub fn register_structure_member_unknown(&mut self, name: &str) -> Result<(), IrError> {
        let Some(type_name) = self.upcoming_member_type.take() else {
            return Err(IrError::structural(
                "nested member without a noted type name",
            ));
        };

        let member = self.program.intern(name);
        let type_id = self.program.intern(&type_name);
        let scope = self.current_scope;

        let tuple_hint = self.program.scopes.tuple_type_id(scope, type_id);
        let structure_hint = self.program.scopes.structure_type_id(scope, type_id);
        let is_signature = self
            .program
            .scopes
            .function_signature(scope, type_id)
            .is_some();
        let own_name = self.created_structure.as_ref().map(|(id, _)| *id);

        let Some((_, ty_def)) = self.created_structure.as_mut() else {
            return Err(IrError::structural(
                "structure member outside a structure type definition",
            ));
        };

        if let Some(hint) = tuple_hint {
            let _ = ty_def.add_composite_member(member, ValueType::Tuple, hint);
            return Ok(());
        }
        if let Some(hint) = structure_hint {
            let _ = ty_def.add_composite_member(member, ValueType::Structure, hint);
            return Ok(());
        }
        if is_signature {
            let _ = ty_def.add_function_member(member, type_id);
            return Ok(());
        }

        let _ = ty_def.add_member(member, ValueType::Error);
        if own_name == Some(type_id) {
            self.report_fatal_error("a structure cannot contain an instance of itself");
        } else {
            self.report_fatal_error(format!(
                "unrecognized type {type_name}; cannot add member to structure"
            ));
        }
        Ok(())
    }

    /// Closes the structure type definition: computes offsets and
    /// registers the type with the current scope and the type registry.
    pub fn finish_structure_type(&mut self) -> Result<(), IrError> {
        let Some((name, mut ty_def)) = self.created_structure.take() else {
            return Err(IrError::structural(
                "structure definition closed but none is open",
            ));
        };

        if ty_def.is_empty() {
            self.report_fatal_error("structures must contain at least one member");
            return Ok(());
        }

        ty_def.compute_offsets(&self.program.registry)?;
        let scope = self.current_scope;
        let id = self.program.registry.register_structure(scope, ty_def);
        self.scope_mut()?.bind_structure_type(name, id);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Tuple type definition
    // -----------------------------------------------------------------

    /// Opens a tuple type definition with the given name.
    pub fn register_tuple_type(&mut self, name: &str) -> Result<(), IrError> {
        if self.created_tuple.is_some() {
            self.report_fatal_error(
                "an incomplete tuple type definition has already been started",
            );
            return Ok(());
        }
        let id = self.program.intern(name);
        self.created_tuple = Some((id, CompositeType::new()));
        Ok(())
    }

    /// Adds a primitive-typed member to the open tuple definition.
    pub fn register_tuple_member(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        if matches!(ty, ValueType::Tuple | ValueType::Structure) {
            self.report_fatal_error("nested tuples are not permitted");
            return Ok(());
        }
        let id = self.program.intern(name);
        let Some((_, ty_def)) = self.created_tuple.as_mut() else {
            return Err(IrError::structural(
                "tuple member outside a tuple type definition",
            ));
        };
        if ty_def.add_member(id, ty).is_err() {
            self.report_fatal_error(format!("tuple member {name} is already declared"));
        }
        Ok(())
    }

    /// Closes the tuple type definition and registers it.
    pub fn finish_tuple_type(&mut self) -> Result<(), IrError> {
        let Some((name, mut ty_def)) = self.created_tuple.take() else {
            return Err(IrError::structural(
                "tuple definition closed but none is open",
            ));
        };

        if ty_def.is_empty() {
            self.report_fatal_error("tuples must contain at least one member");
            return Ok(());
        }

        ty_def.compute_offsets(&self.program.registry)?;
        let scope = self.current_scope;
        let id = self.program.registry.register_tuple(scope, ty_def);
        self.scope_mut()?.bind_tuple_type(name, id);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Member level bookkeeping
    // -----------------------------------------------------------------

    /// Tracks one more layer of nested structure access.
    pub fn increment_member_level(&mut self) {
        self.member_level_rvalue += 1;
    }

    /// Backs out of nested structure layers, rotating the tail operation
    /// to realize the member-access stack ordering.
    pub fn reset_member_level(&mut self) -> Result<(), IrError> {
        let level = self.member_level_rvalue;
        let Some(entry) = self.blocks.last_mut() else {
            return Err(IrError::structural("member access outside a block"));
        };
        entry.block.shift_up_tail(level);
        self.last_member_level_rvalue = level;
        self.member_level_rvalue = 0;
        Ok(())
    }

    /// Clears the r-value member depth without touching the block.
    pub fn reset_member_access_rvalue(&mut self) {
        self.last_member_level_rvalue = self.member_level_rvalue;
        self.member_level_rvalue = 0;
    }

    // -----------------------------------------------------------------
    // Member access: r-value
    // -----------------------------------------------------------------

    /// Tracks a nested member being read.
    pub fn register_member_access(&mut self, member: &str) {
        let id = self.program.intern(member);
        self.member_accesses.push_back(id);
        self.member_level_rvalue += 1;
    }

    /// Injects the operations that traverse the recorded member path as
    /// an r-value.
    pub fn reset_member_access(&mut self) -> Result<(), IrError> {
        if self.member_accesses.is_empty() {
            return Ok(());
        }

        let variable = match self.stack.pop() {
            Some(StackEntry::Identifier(id)) => id,
            _ => {
                return Err(IrError::structural(
                    "expected a structure or tuple name here",
                ))
            }
        };

        // Undo the eager push of the variable itself.
        let scope = self.current_scope;
        if self
            .blocks
            .last_mut()
            .and_then(|entry| entry.block.pop_tail())
            .is_none()
        {
            return Err(IrError::structural(
                "member access with no pushed operations",
            ));
        }

        let is_tuple = self.program.scopes.variable_type(scope, variable)
            == Some(ValueType::Tuple);

        let Some(first) = self.member_accesses.pop_front() else {
            return Err(IrError::structural("member access path is empty"));
        };

        let head = if is_tuple {
            Operation::ReadTuple {
                variable,
                member: first,
            }
        } else {
            Operation::ReadStructure {
                variable,
                member: first,
            }
        };
        let pushed = {
            let ctx = self.program.type_context();
            Operation::push(head, scope, &ctx)
        };
        self.add_operation(pushed)?;

        while let Some(member) = self.member_accesses.pop_front() {
            if is_tuple {
                return Err(IrError::not_implemented(
                    "nested tuple support is not implemented",
                ));
            }

            let resolved = {
                let ctx = self.program.type_context();
                self.blocks
                    .last()
                    .and_then(|entry| entry.block.tail())
                    .and_then(|prior| structure_hint_of(prior, scope, &ctx))
                    .and_then(|hint| {
                        self.program.registry.structure(hint).and_then(|ty| {
                            ty.member(member)
                                .map(|info| (info.ty, info.type_hint))
                        })
                    })
            };
            let Some((member_type, member_hint)) = resolved else {
                self.report_fatal_error("unknown member in nested structure access");
                self.member_accesses.clear();
                self.add_operation(Operation::NoOp)?;
                return self.push_entry(StackEntry::Expression {
                    ty: ValueType::Error,
                    cons_element: None,
                });
            };

            let indirect = Operation::ReadStructureIndirect {
                member,
                back: 1,
                member_type,
                member_hint,
            };
            let pushed = {
                let ctx = self.program.type_context();
                Operation::push(indirect, scope, &ctx)
            };
            self.add_operation(pushed)?;
        }

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
        Ok(())
    }

    // -----------------------------------------------------------------
    // Member access: l-value
    // -----------------------------------------------------------------

    /// Tracks a nested member being written.
    pub fn register_member_lvalue_access(&mut self, member: &str) {
        let id = self.program.intern(member);
        self.member_accesses.push_back(id);
        self.member_level_lvalue += 1;
    }

    /// Saves the root variable name of a composite l-value.
    pub fn save_lvalue_name(&mut self, name: &str) {
        let id = self.program.intern(name);
        self.saved_lvalue_name = Some(id);
    }

    /// Pushes the saved composite l-value root onto the operand stack.
    pub fn register_composite_lvalue(&mut self) -> Result<(), IrError> {
        let Some(name) = self.saved_lvalue_name else {
            return Err(IrError::structural("no composite l-value name was saved"));
        };
        self.push_entry(StackEntry::Identifier(name))
    }

    /// Injects the store operations for the recorded l-value member
    /// path. Type checks happen later, in
    /// `finalize_composite_assignment`, once the r-value is known.
    pub fn reset_member_access_lvalue(&mut self) -> Result<(), IrError> {
        let variable = match self.stack.pop() {
            Some(StackEntry::Identifier(id)) => id,
            _ => {
                return Err(IrError::structural(
                    "expected a structure or tuple name here",
                ))
            }
        };

        let scope = self.current_scope;
        let is_tuple = self.program.scopes.variable_type(scope, variable)
            == Some(ValueType::Tuple);

        if is_tuple {
            if self.member_accesses.len() > 1 {
                return Err(IrError::structural("nested tuples are not permitted"));
            }
            let Some(member) = self.member_accesses.pop_front() else {
                return Err(IrError::structural("member access path is empty"));
            };
            self.add_operation(Operation::AssignTuple { variable, member })?;
        } else if self.member_accesses.len() == 1 {
            let Some(member) = self.member_accesses.pop_front() else {
                return Err(IrError::structural("member access path is empty"));
            };
            self.add_operation(Operation::AssignStructure { variable, member })?;
        } else {
            let Some(first) = self.member_accesses.pop_front() else {
                return Err(IrError::structural("member access path is empty"));
            };
            let rooted = {
                let ctx = self.program.type_context();
                Operation::push(
                    Operation::BindStructMemberReference {
                        variable: Some(variable),
                        member: first,
                    },
                    scope,
                    &ctx,
                )
            };
            self.add_operation(rooted)?;

            while self.member_accesses.len() > 1 {
                let Some(member) = self.member_accesses.pop_front() else {
                    break;
                };
                let chained = {
                    let ctx = self.program.type_context();
                    Operation::push(
                        Operation::BindStructMemberReference {
                            variable: None,
                            member,
                        },
                        scope,
                        &ctx,
                    )
                };
                self.add_operation(chained)?;
            }

            let Some(last) = self.member_accesses.pop_front() else {
                return Err(IrError::structural("member access path is empty"));
            };
            self.add_operation(Operation::AssignStructureIndirect { member: last })?;
        }

        self.member_accesses.clear();
        Ok(())
    }

    /// Finishes an assignment to a nested member: rotates the store
    /// sequence to the tail and verifies the r-value against the member.
    pub fn finalize_composite_assignment(&mut self) -> Result<(), IrError> {
        let scope = self.current_scope;

        let (rvalue_type, rvalue_hint) = {
            let ctx = self.program.type_context();
            let Some(tail) = self.blocks.last().and_then(|entry| entry.block.tail()) else {
                return Err(IrError::structural(
                    "composite assignment with no r-value operations",
                ));
            };
            let ty = tail.result_type(scope, &ctx);
            let hint = if ty == ValueType::Structure {
                structure_hint_of(tail, scope, &ctx)
            } else {
                None
            };
            (ty, hint)
        };
        if rvalue_type == ValueType::Structure && rvalue_hint.is_none() {
            return Err(IrError::not_implemented(
                "cannot determine the structure type of this assignment",
            ));
        }

        let rotation = if self.last_member_level_rvalue > 0 {
            self.last_member_level_rvalue
        } else {
            self.member_level_lvalue
        };
        {
            let ctx = self.program.type_context();
            if let Some(entry) = self.blocks.last_mut() {
                entry.block.shift_up_tail_group(rotation, scope, &ctx);
            }
        }

        let check = self.composite_lvalue_check(rvalue_type, rvalue_hint)?;
        if let Some(message) = check {
            self.report_fatal_error(message);
        }

        for _ in 0..self.parameter_count() {
            self.stack.pop();
        }

        self.member_level_lvalue = 0;
        self.last_member_level_rvalue = self.member_level_rvalue;
        self.member_level_rvalue = 0;
        Ok(())
    }

    /// Verifies the tail store against the r-value type; returns a
    /// diagnostic message on mismatch.
    fn composite_lvalue_check(
        &self,
        rvalue_type: ValueType,
        rvalue_hint: Option<CompositeId>,
    ) -> Result<Option<String>, IrError> {
        let scope = self.current_scope;
        let Some(entry) = self.blocks.last() else {
            return Err(IrError::structural("composite assignment outside a block"));
        };
        let Some(tail) = entry.block.tail() else {
            return Err(IrError::structural("failed to locate assignment operation"));
        };

        match tail {
            Operation::AssignTuple { variable, member } => {
                let member_type = self
                    .program
                    .scopes
                    .variable_tuple_hint(scope, *variable)
                    .and_then(|hint| self.program.registry.tuple(hint))
                    .and_then(|ty| ty.member_type(*member));
                if member_type != Some(rvalue_type) {
                    return Ok(Some(
                        "type of expression is different from type of tuple member".to_string(),
                    ));
                }
                Ok(None)
            }

            Operation::AssignStructure { variable, member } => {
                let info = self
                    .program
                    .scopes
                    .variable_structure_hint(scope, *variable)
                    .and_then(|hint| self.program.registry.structure(hint))
                    .and_then(|ty| ty.member(*member))
                    .map(|info| (info.ty, info.type_hint));
                let Some((member_type, member_hint)) = info else {
                    return Ok(Some("unknown structure member in assignment".to_string()));
                };
                if member_type != rvalue_type {
                    return Ok(Some("type mismatch".to_string()));
                }
                if member_type == ValueType::Structure && member_hint != rvalue_hint {
                    return Ok(Some("type mismatch".to_string()));
                }
                Ok(None)
            }

            Operation::AssignStructureIndirect { member } => {
                // Walk the bind chain back to its rooted link to recover
                // the member path.
                let mut members = VecDeque::new();
                members.push_back(*member);

                let ops = entry.block.ops();
                let mut index = ops.len().checked_sub(1).ok_or_else(|| {
                    IrError::structural("failed to locate assignment operation")
                })?;
                let root = loop {
                    index = index.checked_sub(1).ok_or_else(|| {
                        IrError::structural("cannot understand nested member accesses")
                    })?;
                    match ops[index].push_source() {
                        Some(Operation::BindStructMemberReference { variable, member }) => {
                            members.push_front(*member);
                            if let Some(variable) = variable {
                                break *variable;
                            }
                        }
                        _ => {
                            return Err(IrError::structural(
                                "cannot understand nested member accesses",
                            ))
                        }
                    }
                };

                let mut type_hint = self.program.scopes.variable_structure_hint(scope, root);
                let mut lvalue_type = None;
                let mut lvalue_hint = None;
                while let Some(member) = members.pop_front() {
                    let Some(hint) = type_hint else {
                        return Ok(Some("type mismatch".to_string()));
                    };
                    let Some(ty_def) = self.program.registry.structure(hint) else {
                        return Ok(Some("type mismatch".to_string()));
                    };
                    let next_hint = ty_def.member_type_hint(member);
                    if next_hint.is_none() {
                        lvalue_type = ty_def.member_type(member);
                        if lvalue_type == Some(ValueType::Structure) {
                            lvalue_hint = Some(hint);
                        }
                    } else if members.is_empty() {
                        // The final member is itself composite.
                        lvalue_type = ty_def.member_type(member);
                        lvalue_hint = next_hint;
                    }
                    type_hint = next_hint;
                }

                if lvalue_type != Some(rvalue_type) {
                    return Ok(Some("type mismatch".to_string()));
                }
                if lvalue_type == Some(ValueType::Structure) && lvalue_hint != rvalue_hint {
                    return Ok(Some("type mismatch".to_string()));
                }
                Ok(None)
            }

            _ => Err(IrError::structural("failed to locate assignment operation")),
        }
    }
}
