//! Function definition: preparse collection and main-parse body binding.

use crate::builder::{ParamRecord, SemanticBuilder, StackEntry};
use crate::ir::block::Block;
use crate::ir::composite::CompositeType;
use crate::ir::error::IrError;
use crate::ir::function::{Function, FunctionKind};
use crate::ir::operation::Operation;
use crate::ir::scope::Scope;
use crate::ir::types::ValueType;

impl SemanticBuilder {
    /// Opens a function definition during preparse.
    pub fn register_function_name(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.function_name = Some(id);
        self.push_entry(StackEntry::Identifier(id))?;
        self.expected_kinds.push(crate::builder::BlockKind::Function);
        Ok(())
    }

    /// Collects one by-value parameter.
    pub fn register_param(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.params.push(ParamRecord {
            name: id,
            ty,
            by_ref: false,
            hint: None,
            signature: None,
            array_element: None,
        });
        Ok(())
    }

    /// Collects one by-reference parameter.
    pub fn register_param_reference(&mut self, name: &str, ty: ValueType) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.params.push(ParamRecord {
            name: id,
            ty,
            by_ref: true,
            hint: None,
            signature: None,
            array_element: None,
        });
        Ok(())
    }

    /// Collects one tuple-typed parameter.
    pub fn register_tuple_param(
        &mut self,
        name: &str,
        type_name: &str,
        by_ref: bool,
    ) -> Result<(), IrError> {
        let id = self.program.intern(name);
        let type_id = self.program.intern(type_name);
        let Some(hint) = self.program.scopes.tuple_type_id(self.current_scope, type_id) else {
            self.report_fatal_error(format!("unknown tuple type {type_name}"));
            return Ok(());
        };
        self.params.push(ParamRecord {
            name: id,
            ty: ValueType::Tuple,
            by_ref,
            hint: Some(hint),
            signature: None,
            array_element: None,
        });
        Ok(())
    }

    /// Collects one structure-typed parameter.
    pub fn register_structure_param(
        &mut self,
        name: &str,
        type_name: &str,
        by_ref: bool,
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
        self.params.push(ParamRecord {
            name: id,
            ty: ValueType::Structure,
            by_ref,
            hint: Some(hint),
            signature: None,
            array_element: None,
        });
        Ok(())
    }

    /// Collects one function-typed parameter carrying a signature name.
    pub fn register_function_param(
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
        self.params.push(ParamRecord {
            name: id,
            ty: ValueType::Function,
            by_ref: false,
            hint: None,
            signature: Some(signature),
            array_element: None,
        });
        Ok(())
    }

    /// Collects one array-typed parameter.
    pub fn register_array_param(
        &mut self,
        name: &str,
        element: ValueType,
        by_ref: bool,
    ) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.params.push(ParamRecord {
            name: id,
            ty: ValueType::Array,
            by_ref,
            hint: None,
            signature: None,
            array_element: Some(element),
        });
        Ok(())
    }

    /// Opens the return scope of the function under definition.
    pub fn begin_function_returns(&mut self) {
        let id = self.program.scopes.alloc(Scope::new());
        self.function_returns = Some(id);
    }

    /// Declares one return slot with its default value. The
    /// initialization is queued and replayed at body entry, where the
    /// store downgrades to a one-time initialization.
    pub fn register_function_return(
        &mut self,
        name: &str,
        ty: ValueType,
        default: Operation,
    ) -> Result<(), IrError> {
        let Some(function) = self.function_name else {
            return Err(IrError::structural(
                "return declaration outside a function definition",
            ));
        };
        let Some(returns) = self.function_returns else {
            return Err(IrError::structural(
                "return declaration before the return scope opened",
            ));
        };

        let id = self.program.intern(name);
        let default_type = {
            let ctx = self.program.type_context();
            default.result_type(returns, &ctx)
        };
        if default_type != ty {
            self.report_fatal_error("return value default does not match the declared type");
            return Ok(());
        }

        let scope = self.program.scopes.get_mut(returns).ok_or_else(|| {
            IrError::structural("return scope is not allocated")
        })?;
        if scope.add_variable(id, ty).is_err() {
            self.report_fatal_error(format!("return value {name} is already declared"));
            return Ok(());
        }

        let init = self
            .return_init_blocks
            .entry(function)
            .or_insert_with(Block::new);
        init.append(default);
        init.append(Operation::AssignValue(id));
        Ok(())
    }

    /// Creates the function at preparse block exit: builds the parameter
    /// scope, registers the return tuple type, and adds the function to
    /// the enclosing scope.
    pub(crate) fn finish_function_preparse(&mut self) -> Result<(), IrError> {
        let name = match self.stack.pop() {
            Some(StackEntry::Identifier(id)) => id,
            _ => {
                return Err(IrError::structural(
                    "expected to find the function identifier on the parse stack",
                ))
            }
        };

        let declared_count = self.params.len();
        let records: Vec<ParamRecord> = self.params.drain(..).collect();

        let mut params_scope = Scope::new();
        let mut failures = Vec::new();
        // The parameter stacks unwind here, so the scope records
        // parameters in reverse declaration order.
        for record in records.into_iter().rev() {
            match record.ty {
                ValueType::Tuple => {
                    let result = if record.by_ref {
                        params_scope.add_reference(record.name, ValueType::Tuple)
                    } else {
                        params_scope.add_variable(record.name, ValueType::Tuple)
                    };
                    if result.is_ok() {
                        if let Some(hint) = record.hint {
                            params_scope.set_tuple_hint(record.name, hint);
                        }
                    }
                }
                ValueType::Structure => {
                    let result = if record.by_ref {
                        params_scope.add_reference(record.name, ValueType::Structure)
                    } else {
                        params_scope.add_variable(record.name, ValueType::Structure)
                    };
                    if result.is_ok() {
                        if let Some(hint) = record.hint {
                            params_scope.set_structure_hint(record.name, hint);
                        }
                    }
                }
                ValueType::Function => {
                    if record.by_ref {
                        failures.push("cannot pass functions by reference".to_string());
                        continue;
                    }
                    if params_scope
                        .add_variable(record.name, ValueType::Function)
                        .is_ok()
                    {
                        params_scope
                            .add_function_signature(record.name, record.signature.unwrap_or_default());
                    }
                }
                ValueType::Array => {
                    let result = if record.by_ref {
                        params_scope.add_reference(record.name, ValueType::Array)
                    } else {
                        params_scope.add_variable(record.name, ValueType::Array)
                    };
                    if result.is_ok() {
                        if let Some(element) = record.array_element {
                            params_scope.set_array_type(record.name, element);
                        }
                    }
                }
                other => {
                    let _ = if record.by_ref {
                        params_scope.add_reference(record.name, other)
                    } else {
                        params_scope.add_variable(record.name, other)
                    };
                }
            }
        }
        for message in failures {
            self.report_fatal_error(message);
        }

        let params = self.program.scopes.alloc(params_scope);
        let returns = match self.function_returns.take() {
            Some(id) => id,
            None => self.program.scopes.alloc(Scope::new()),
        };
        if let Some(scope) = self.program.scopes.get_mut(returns) {
            scope.parent = None;
        }

        self.register_scope_as_tuple_type(returns, name)?;

        let function = self.program.functions.alloc(FunctionKind::User(Function {
            params,
            returns,
            body: None,
        }));
        let duplicate = self
            .program
            .scopes
            .get_mut(self.current_scope)
            .ok_or_else(|| IrError::structural("current scope is not allocated"))?
            .add_function(name, function)
            .is_err();
        if duplicate {
            let text = self.program.strings.resolve(name).to_string();
            self.report_fatal_error(format!("function {text} is already declared"));
        }

        if self.function_is_infix {
            self.function_is_infix = false;
            let text = self.program.strings.resolve(name).to_string();
            self.register_infix_function(&text);
            if declared_count != 2 {
                self.report_fatal_error("infix functions must take exactly 2 parameters");
            }
        }

        self.function_name = None;
        Ok(())
    }

    /// Registers a scope's variables as a tuple type under the given
    /// name, bound on the scope itself.
    fn register_scope_as_tuple_type(
        &mut self,
        scope_id: crate::ir::ids::ScopeId,
        name: crate::ir::ids::StringId,
    ) -> Result<(), IrError> {
        let mut ty = CompositeType::new();
        {
            let Some(scope) = self.program.scopes.get(scope_id) else {
                return Err(IrError::structural("scope is not allocated"));
            };
            for member in scope.member_order() {
                let Some(var) = scope.variable(*member) else {
                    continue;
                };
                match var.ty {
                    ValueType::Tuple => {
                        if let Some(hint) = scope.tuple_type_hints().get(member).copied() {
                            ty.add_composite_member(*member, ValueType::Tuple, hint)?;
                        }
                    }
                    ValueType::Structure => {
                        if let Some(hint) = scope.structure_type_hints().get(member).copied() {
                            ty.add_composite_member(*member, ValueType::Structure, hint)?;
                        }
                    }
                    other => ty.add_member(*member, other)?,
                }
            }
        }
        ty.compute_offsets(&self.program.registry)?;

        let id = self.program.registry.register_tuple(scope_id, ty);
        if let Some(scope) = self.program.scopes.get_mut(scope_id) {
            scope.bind_tuple_type(name, id);
        }
        Ok(())
    }

    /// Opens a function body during the main parse; the function was
    /// created during preparse.
    pub fn register_function_body(&mut self, name: &str) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.push_entry(StackEntry::Identifier(id))?;
        self.expected_kinds
            .push(crate::builder::BlockKind::FunctionBody);
        Ok(())
    }

    /// Registers a named function signature in the current scope.
    pub fn register_function_signature(
        &mut self,
        name: &str,
        signature: crate::ir::signature::FunctionSignature,
    ) -> Result<(), IrError> {
        let id = self.program.intern(name);
        self.scope_mut()?.add_function_signature(id, signature);
        Ok(())
    }
}
