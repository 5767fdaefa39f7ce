//! Scope descriptors and the scope arena.
//!
//! Every scope lives in the arena and is addressed by [`ScopeId`]; parent
//! links are IDs, so the scope tree can be rebuilt from a linear stream
//! without fixup passes and partial teardown cannot leak.

use std::collections::BTreeMap;

use crate::ir::error::IrError;
use crate::ir::ids::{CompositeId, FunctionId, ScopeId, StringId};
use crate::ir::operation::Operation;
use crate::ir::response::ResponseMap;
use crate::ir::signature::FunctionSignature;
use crate::ir::types::ValueType;

/// One declared variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub ty: ValueType,
    pub is_reference: bool,
}

/// A ghost set: names temporarily aliased from other scopes.
pub type GhostSet = BTreeMap<StringId, ScopeId>;

/// A named container of variables, functions, types, constants, response
/// maps, and futures, linked to its parent by ID.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    variables: BTreeMap<StringId, Variable>,
    member_order: Vec<StringId>,
    ghosts: Vec<GhostSet>,
    functions: BTreeMap<StringId, FunctionId>,
    function_signatures: BTreeMap<StringId, FunctionSignature>,
    tuple_types: BTreeMap<StringId, CompositeId>,
    tuple_type_hints: BTreeMap<StringId, CompositeId>,
    structure_types: BTreeMap<StringId, CompositeId>,
    structure_type_hints: BTreeMap<StringId, CompositeId>,
    constants: Vec<StringId>,
    response_maps: BTreeMap<StringId, ResponseMap>,
    futures: BTreeMap<StringId, Operation>,
    array_types: BTreeMap<StringId, ValueType>,
    array_sizes: BTreeMap<StringId, usize>,
}

impl Scope {
    /// Creates an empty scope with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty scope under the given parent.
    pub fn with_parent(parent: ScopeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Declares one value variable. Names must be unique within a scope.
    pub fn add_variable(&mut self, name: StringId, ty: ValueType) -> Result<(), IrError> {
        self.insert_variable(
            name,
            Variable {
                ty,
                is_reference: false,
            },
        )
    }

    /// Declares one reference variable.
    pub fn add_reference(&mut self, name: StringId, ty: ValueType) -> Result<(), IrError> {
        self.insert_variable(
            name,
            Variable {
                ty,
                is_reference: true,
            },
        )
    }

    fn insert_variable(&mut self, name: StringId, var: Variable) -> Result<(), IrError> {
        if self.variables.contains_key(&name) {
            return Err(IrError::invariant_violation(
                "variable name is not unique within its scope",
                format!("name id {}", name.value()),
            ));
        }
        self.variables.insert(name, var);
        self.member_order.push(name);
        Ok(())
    }

    /// Looks up one locally declared variable.
    pub fn variable(&self, name: StringId) -> Option<Variable> {
        self.variables.get(&name).copied()
    }

    /// Returns `true` when the name is declared locally.
    pub fn has_variable(&self, name: StringId) -> bool {
        self.variables.contains_key(&name)
    }

    /// Locally declared names in declaration order.
    pub fn member_order(&self) -> &[StringId] {
        &self.member_order
    }

    /// Opens a fresh ghost set.
    pub fn push_ghost_set(&mut self) {
        self.ghosts.push(GhostSet::new());
    }

    /// Discards the most recent ghost set.
    pub fn pop_ghost_set(&mut self) {
        self.ghosts.pop();
    }

    /// Records one ghost alias in the most recent set.
    pub fn add_ghost(&mut self, name: StringId, owner: ScopeId) {
        if self.ghosts.is_empty() {
            self.ghosts.push(GhostSet::new());
        }
        if let Some(set) = self.ghosts.last_mut() {
            set.insert(name, owner);
        }
    }

    /// The ghost sets, oldest first.
    pub fn ghosts(&self) -> &[GhostSet] {
        &self.ghosts
    }

    /// Registers one declared function.
    pub fn add_function(&mut self, name: StringId, id: FunctionId) -> Result<(), IrError> {
        if self.functions.contains_key(&name) {
            return Err(IrError::invariant_violation(
                "function name is not unique within its scope",
                format!("name id {}", name.value()),
            ));
        }
        self.functions.insert(name, id);
        Ok(())
    }

    /// Looks up one locally declared function.
    pub fn function(&self, name: StringId) -> Option<FunctionId> {
        self.functions.get(&name).copied()
    }

    /// Locally declared functions.
    pub fn functions(&self) -> &BTreeMap<StringId, FunctionId> {
        &self.functions
    }

    /// Registers one named function signature.
    pub fn add_function_signature(&mut self, name: StringId, signature: FunctionSignature) {
        self.function_signatures.insert(name, signature);
    }

    /// Looks up one locally registered signature.
    pub fn function_signature(&self, name: StringId) -> Option<&FunctionSignature> {
        self.function_signatures.get(&name)
    }

    /// Locally registered signatures.
    pub fn function_signatures(&self) -> &BTreeMap<StringId, FunctionSignature> {
        &self.function_signatures
    }

    /// Binds a tuple type name to its registry ID.
    pub fn bind_tuple_type(&mut self, name: StringId, id: CompositeId) {
        self.tuple_types.insert(name, id);
    }

    /// Binds a structure type name to its registry ID.
    pub fn bind_structure_type(&mut self, name: StringId, id: CompositeId) {
        self.structure_types.insert(name, id);
    }

    /// Records the tuple type of a tuple-typed variable.
    pub fn set_tuple_hint(&mut self, variable: StringId, id: CompositeId) {
        self.tuple_type_hints.insert(variable, id);
    }

    /// Records the structure type of a structure-typed variable.
    pub fn set_structure_hint(&mut self, variable: StringId, id: CompositeId) {
        self.structure_type_hints.insert(variable, id);
    }

    /// Tuple type name bindings.
    pub fn tuple_types(&self) -> &BTreeMap<StringId, CompositeId> {
        &self.tuple_types
    }

    /// Structure type name bindings.
    pub fn structure_types(&self) -> &BTreeMap<StringId, CompositeId> {
        &self.structure_types
    }

    /// Tuple hints keyed by variable name.
    pub fn tuple_type_hints(&self) -> &BTreeMap<StringId, CompositeId> {
        &self.tuple_type_hints
    }

    /// Structure hints keyed by variable name.
    pub fn structure_type_hints(&self) -> &BTreeMap<StringId, CompositeId> {
        &self.structure_type_hints
    }

    /// Marks a name as constant after initialization.
    pub fn set_constant(&mut self, name: StringId) {
        if !self.constants.contains(&name) {
            self.constants.push(name);
        }
    }

    /// Constant names in declaration order.
    pub fn constants(&self) -> &[StringId] {
        &self.constants
    }

    /// Returns `true` when the name is locally constant.
    pub fn has_constant(&self, name: StringId) -> bool {
        self.constants.contains(&name)
    }

    /// Registers one response map.
    pub fn add_response_map(&mut self, name: StringId, map: ResponseMap) {
        self.response_maps.insert(name, map);
    }

    /// Looks up one locally registered response map.
    pub fn response_map(&self, name: StringId) -> Option<&ResponseMap> {
        self.response_maps.get(&name)
    }

    /// Locally registered response maps.
    pub fn response_maps(&self) -> &BTreeMap<StringId, ResponseMap> {
        &self.response_maps
    }

    /// Registers one future's producer operation.
    pub fn add_future(&mut self, name: StringId, producer: Operation) {
        self.futures.insert(name, producer);
    }

    /// Looks up one future's producer.
    pub fn future(&self, name: StringId) -> Option<&Operation> {
        self.futures.get(&name)
    }

    /// Locally registered futures.
    pub fn futures(&self) -> &BTreeMap<StringId, Operation> {
        &self.futures
    }

    /// Records the element type of an array variable.
    pub fn set_array_type(&mut self, name: StringId, element: ValueType) {
        self.array_types.insert(name, element);
    }

    /// Records the length of an array variable.
    pub fn set_array_size(&mut self, name: StringId, size: usize) {
        self.array_sizes.insert(name, size);
    }

    /// Array element types keyed by variable name.
    pub fn array_types(&self) -> &BTreeMap<StringId, ValueType> {
        &self.array_types
    }

    /// Array lengths keyed by variable name.
    pub fn array_sizes(&self) -> &BTreeMap<StringId, usize> {
        &self.array_sizes
    }
}

/// Owning arena for all scopes of a Program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a scope into the arena and returns its ID.
    pub fn alloc(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    /// Grows the arena with empty scopes until `id` is addressable.
    pub fn ensure(&mut self, id: ScopeId) {
        while self.scopes.len() <= id.value() as usize {
            self.scopes.push(Scope::new());
        }
    }

    /// Immutable access to one scope.
    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.value() as usize)
    }

    /// Mutable access to one scope.
    pub fn get_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(id.value() as usize)
    }

    /// Number of scopes allocated.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns `true` when no scopes exist.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Walks a name to its owning scope: local variables first, then
    /// ghost aliases (newest set first), then the parent chain.
    pub fn scope_owning_variable(&self, from: ScopeId, name: StringId) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id)?;
            if scope.has_variable(name) {
                return Some(id);
            }
            for set in scope.ghosts().iter().rev() {
                if let Some(owner) = set.get(&name).copied() {
                    if self.get(owner)?.has_variable(name) {
                        return Some(owner);
                    }
                }
            }
            current = scope.parent;
        }
        None
    }

    /// Resolves a variable's type through the scope chain.
    pub fn variable_type(&self, from: ScopeId, name: StringId) -> Option<ValueType> {
        let owner = self.scope_owning_variable(from, name)?;
        self.get(owner)?.variable(name).map(|var| var.ty)
    }

    /// Resolves a variable's reference flag through the scope chain.
    pub fn variable_is_reference(&self, from: ScopeId, name: StringId) -> Option<bool> {
        let owner = self.scope_owning_variable(from, name)?;
        self.get(owner)?.variable(name).map(|var| var.is_reference)
    }

    /// Resolves a function by name through the scope chain.
    pub fn function_id(&self, from: ScopeId, name: StringId) -> Option<FunctionId> {
        self.walk(from, |scope| scope.function(name))
    }

    /// Resolves a function signature by name through the scope chain.
    pub fn function_signature(&self, from: ScopeId, name: StringId) -> Option<&FunctionSignature> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id)?;
            if let Some(signature) = scope.function_signature(name) {
                return Some(signature);
            }
            current = scope.parent;
        }
        None
    }

    /// Resolves a tuple type name to its registry ID.
    pub fn tuple_type_id(&self, from: ScopeId, name: StringId) -> Option<CompositeId> {
        self.walk(from, |scope| scope.tuple_types().get(&name).copied())
    }

    /// Resolves a structure type name to its registry ID.
    pub fn structure_type_id(&self, from: ScopeId, name: StringId) -> Option<CompositeId> {
        self.walk(from, |scope| scope.structure_types().get(&name).copied())
    }

    /// Resolves the tuple type of a tuple-typed variable.
    pub fn variable_tuple_hint(&self, from: ScopeId, name: StringId) -> Option<CompositeId> {
        let owner = self.scope_owning_variable(from, name)?;
        self.walk(owner, |scope| scope.tuple_type_hints().get(&name).copied())
    }

    /// Resolves the structure type of a structure-typed variable.
    pub fn variable_structure_hint(&self, from: ScopeId, name: StringId) -> Option<CompositeId> {
        let owner = self.scope_owning_variable(from, name)?;
        self.walk(owner, |scope| {
            scope.structure_type_hints().get(&name).copied()
        })
    }

    /// Resolves the element type of an array variable.
    pub fn array_element_type(&self, from: ScopeId, name: StringId) -> Option<ValueType> {
        self.walk(from, |scope| scope.array_types().get(&name).copied())
    }

    /// Returns `true` when the name resolves to a constant.
    pub fn is_constant(&self, from: ScopeId, name: StringId) -> bool {
        match self.scope_owning_variable(from, name) {
            Some(owner) => self
                .get(owner)
                .map(|scope| scope.has_constant(name))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Aliases every variable of `source` into the top ghost set of
    /// `target` without transferring ownership.
    pub fn ghost_into_scope(&mut self, target: ScopeId, source: ScopeId) -> Result<(), IrError> {
        let names: Vec<StringId> = self
            .get(source)
            .ok_or_else(|| {
                IrError::invariant_violation("unknown ghost source scope", format!("{source:?}"))
            })?
            .member_order()
            .to_vec();

        let scope = self.get_mut(target).ok_or_else(|| {
            IrError::invariant_violation("unknown ghost target scope", format!("{target:?}"))
        })?;
        for name in names {
            scope.add_ghost(name, source);
        }
        Ok(())
    }

    /// Asserts that no scope is its own ancestor.
    pub fn check_acyclic(&self) -> Result<(), IrError> {
        for start in 0..self.scopes.len() {
            let mut current = self.scopes[start].parent;
            let mut hops = 0usize;
            while let Some(id) = current {
                if id.value() as usize == start || hops > self.scopes.len() {
                    return Err(IrError::invariant_violation(
                        "scope is its own ancestor",
                        format!("scope {start}"),
                    ));
                }
                current = self.get(id).and_then(|scope| scope.parent);
                hops += 1;
            }
        }
        Ok(())
    }

    fn walk<T>(&self, from: ScopeId, mut probe: impl FnMut(&Scope) -> Option<T>) -> Option<T> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id)?;
            if let Some(found) = probe(scope) {
                return Some(found);
            }
            current = scope.parent;
        }
        None
    }
}
