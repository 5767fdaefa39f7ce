//! The type registry: dense composite type IDs and their owners.
//!
//! The registry lives on the Program; IDs are never recycled within one
//! Program lifetime, and ID zero is reserved so it can act as the "no
//! hint" sentinel on the wire.

use std::collections::BTreeMap;

use crate::ir::composite::CompositeType;
use crate::ir::error::IrError;
use crate::ir::ids::{CompositeId, ScopeId};
use crate::ir::types::ValueType;

/// Maps composite type IDs to descriptors and owning scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRegistry {
    tuples: BTreeMap<CompositeId, CompositeType>,
    structures: BTreeMap<CompositeId, CompositeType>,
    tuple_owners: BTreeMap<CompositeId, ScopeId>,
    structure_owners: BTreeMap<CompositeId, ScopeId>,
    next_tuple: u32,
    next_structure: u32,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            tuples: BTreeMap::new(),
            structures: BTreeMap::new(),
            tuple_owners: BTreeMap::new(),
            structure_owners: BTreeMap::new(),
            next_tuple: 1,
            next_structure: 1,
        }
    }
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one tuple type, assigning the next dense ID.
    pub fn register_tuple(&mut self, owner: ScopeId, ty: CompositeType) -> CompositeId {
        let id = CompositeId::new(self.next_tuple);
        self.next_tuple += 1;
        self.tuples.insert(id, ty);
        self.tuple_owners.insert(id, owner);
        id
    }

    /// Registers one structure type, assigning the next dense ID.
    pub fn register_structure(&mut self, owner: ScopeId, ty: CompositeType) -> CompositeId {
        let id = CompositeId::new(self.next_structure);
        self.next_structure += 1;
        self.structures.insert(id, ty);
        self.structure_owners.insert(id, owner);
        id
    }

    /// Installs one tuple type at a known ID (loader path).
    pub fn install_tuple(
        &mut self,
        id: CompositeId,
        owner: ScopeId,
        ty: CompositeType,
    ) -> Result<(), IrError> {
        if id.value() == 0 || self.tuples.contains_key(&id) {
            return Err(IrError::invariant_violation(
                "tuple type ID is reserved or already installed",
                format!("id {}", id.value()),
            ));
        }
        self.tuples.insert(id, ty);
        self.tuple_owners.insert(id, owner);
        self.next_tuple = self.next_tuple.max(id.value() + 1);
        Ok(())
    }

    /// Installs one structure type at a known ID (loader path).
    pub fn install_structure(
        &mut self,
        id: CompositeId,
        owner: ScopeId,
        ty: CompositeType,
    ) -> Result<(), IrError> {
        if id.value() == 0 || self.structures.contains_key(&id) {
            return Err(IrError::invariant_violation(
                "structure type ID is reserved or already installed",
                format!("id {}", id.value()),
            ));
        }
        self.structures.insert(id, ty);
        self.structure_owners.insert(id, owner);
        self.next_structure = self.next_structure.max(id.value() + 1);
        Ok(())
    }

    /// Looks up a tuple descriptor.
    pub fn tuple(&self, id: CompositeId) -> Option<&CompositeType> {
        self.tuples.get(&id)
    }

    /// Looks up a structure descriptor.
    pub fn structure(&self, id: CompositeId) -> Option<&CompositeType> {
        self.structures.get(&id)
    }

    /// Looks up a descriptor by family tag.
    pub fn composite(&self, ty: ValueType, id: CompositeId) -> Option<&CompositeType> {
        match ty {
            ValueType::Tuple => self.tuple(id),
            ValueType::Structure => self.structure(id),
            _ => None,
        }
    }

    /// The scope that owns a tuple type.
    pub fn tuple_owner(&self, id: CompositeId) -> Option<ScopeId> {
        self.tuple_owners.get(&id).copied()
    }

    /// The scope that owns a structure type.
    pub fn structure_owner(&self, id: CompositeId) -> Option<ScopeId> {
        self.structure_owners.get(&id).copied()
    }

    /// Tuple entries in ID order.
    pub fn tuples(&self) -> impl Iterator<Item = (CompositeId, &CompositeType)> {
        self.tuples.iter().map(|(id, ty)| (*id, ty))
    }

    /// Structure entries in ID order.
    pub fn structures(&self) -> impl Iterator<Item = (CompositeId, &CompositeType)> {
        self.structures.iter().map(|(id, ty)| (*id, ty))
    }

    /// Number of registered tuple types.
    pub fn tuple_count(&self) -> usize {
        self.tuples.len()
    }

    /// Number of registered structure types.
    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }
}
