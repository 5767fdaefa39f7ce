//! Composite type descriptors: tuples and structures.

use std::collections::BTreeMap;

use crate::ir::error::IrError;
use crate::ir::ids::{CompositeId, StringId};
use crate::ir::registry::TypeRegistry;
use crate::ir::types::ValueType;

/// Discriminates the two composite families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Tuple,
    Structure,
}

/// Per-member metadata inside a composite descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Member value type.
    pub ty: ValueType,
    /// Byte offset; valid once `compute_offsets` has run.
    pub offset: u32,
    /// Composite type hint for Tuple/Structure members.
    pub type_hint: Option<CompositeId>,
    /// Signature name hint for Function members.
    pub signature_name: Option<StringId>,
}

/// An ordered composite type descriptor.
///
/// Member order defines serialization order and push order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositeType {
    member_order: Vec<StringId>,
    members: BTreeMap<StringId, MemberInfo>,
    offsets_computed: bool,
}

impl CompositeType {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one primitive-typed member.
    pub fn add_member(&mut self, name: StringId, ty: ValueType) -> Result<(), IrError> {
        self.insert_member(
            name,
            MemberInfo {
                ty,
                offset: 0,
                type_hint: None,
                signature_name: None,
            },
        )
    }

    /// Adds one Tuple- or Structure-typed member with its type hint.
    pub fn add_composite_member(
        &mut self,
        name: StringId,
        ty: ValueType,
        hint: CompositeId,
    ) -> Result<(), IrError> {
        if !matches!(ty, ValueType::Tuple | ValueType::Structure) {
            return Err(IrError::invariant_violation(
                "composite member hint on a non-composite member",
                format!("member type tag {}", ty.as_u32()),
            ));
        }

        self.insert_member(
            name,
            MemberInfo {
                ty,
                offset: 0,
                type_hint: Some(hint),
                signature_name: None,
            },
        )
    }

    /// Adds one Function-typed member carrying a signature name hint.
    pub fn add_function_member(
        &mut self,
        name: StringId,
        signature_name: StringId,
    ) -> Result<(), IrError> {
        self.insert_member(
            name,
            MemberInfo {
                ty: ValueType::Function,
                offset: 0,
                type_hint: None,
                signature_name: Some(signature_name),
            },
        )
    }

    fn insert_member(&mut self, name: StringId, info: MemberInfo) -> Result<(), IrError> {
        if self.members.contains_key(&name) {
            return Err(IrError::invariant_violation(
                "composite member name is not unique",
                format!("member id {}", name.value()),
            ));
        }

        self.member_order.push(name);
        self.members.insert(name, info);
        Ok(())
    }

    /// Member identifiers in declaration order.
    pub fn member_order(&self) -> &[StringId] {
        &self.member_order
    }

    /// Looks up one member's metadata.
    pub fn member(&self, name: StringId) -> Option<&MemberInfo> {
        self.members.get(&name)
    }

    /// Looks up one member's value type.
    pub fn member_type(&self, name: StringId) -> Option<ValueType> {
        self.members.get(&name).map(|info| info.ty)
    }

    /// Looks up one member's composite type hint.
    pub fn member_type_hint(&self, name: StringId) -> Option<CompositeId> {
        self.members.get(&name).and_then(|info| info.type_hint)
    }

    /// Returns `true` when no members have been added.
    pub fn is_empty(&self) -> bool {
        self.member_order.is_empty()
    }

    /// Returns `true` once `compute_offsets` has run.
    pub fn offsets_computed(&self) -> bool {
        self.offsets_computed
    }

    /// Assigns each member its byte offset: the sum of the sizes of the
    /// preceding members. Composite members size through the registry.
    /// Idempotent after the first successful run.
    pub fn compute_offsets(&mut self, registry: &TypeRegistry) -> Result<(), IrError> {
        if self.offsets_computed {
            return Ok(());
        }

        let mut offset = 0u32;
        for name in &self.member_order {
            let info = self.members.get_mut(name).ok_or_else(|| {
                IrError::invariant_violation(
                    "member order references unknown member",
                    format!("member id {}", name.value()),
                )
            })?;
            info.offset = offset;
            let size = member_size(info.ty, info.type_hint, registry)?;
            offset = offset.checked_add(size).ok_or_else(|| {
                IrError::limit_exceeded("composite storage size overflow", format!("at {offset}"))
            })?;
        }

        self.offsets_computed = true;
        Ok(())
    }

    /// Total storage size of this composite.
    pub fn size(&self, registry: &TypeRegistry) -> Result<u32, IrError> {
        let mut total = 0u32;
        for name in &self.member_order {
            let info = &self.members[name];
            total += member_size(info.ty, info.type_hint, registry)?;
        }
        Ok(total)
    }
}

/// Storage size of one member, recursing into the registry for composites.
pub fn member_size(
    ty: ValueType,
    hint: Option<CompositeId>,
    registry: &TypeRegistry,
) -> Result<u32, IrError> {
    match ty {
        ValueType::Tuple | ValueType::Structure => {
            let hint = hint.ok_or_else(|| {
                IrError::invariant_violation(
                    "composite member has no type hint",
                    format!("type tag {}", ty.as_u32()),
                )
            })?;
            let nested = registry.composite(ty, hint).ok_or_else(|| {
                IrError::invariant_violation(
                    "composite hint does not resolve in the type registry",
                    format!("hint {}", hint.value()),
                )
            })?;
            nested.size(registry)
        }
        other => other.storage_size().ok_or_else(|| {
            IrError::invariant_violation(
                "member type has no storage size",
                format!("type tag {}", other.as_u32()),
            )
        }),
    }
}
