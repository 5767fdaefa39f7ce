//! Runtime values.

use std::collections::BTreeMap;

use crate::ir::ids::{CompositeId, FunctionId, StringId};
use crate::ir::types::ValueType;

/// One evaluated value.
#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    Null,
    Integer(i32),
    Integer16(i16),
    Real(f32),
    Boolean(bool),
    Str(String),
    Array(Vec<RValue>),
    Tuple {
        type_id: CompositeId,
        members: BTreeMap<StringId, RValue>,
    },
    Structure {
        type_id: CompositeId,
        members: BTreeMap<StringId, RValue>,
    },
    Function(FunctionId),
    /// A byte-pointer stand-in: the variable a store targets plus the
    /// member path to follow into its storage.
    Address {
        variable: StringId,
        path: Vec<StringId>,
    },
    TaskHandle(u32),
    Buffer(Vec<u8>),
}

impl RValue {
    /// The type tag of this value.
    pub fn type_of(&self) -> ValueType {
        match self {
            RValue::Null => ValueType::Null,
            RValue::Integer(_) => ValueType::Integer,
            RValue::Integer16(_) => ValueType::Integer16,
            RValue::Real(_) => ValueType::Real,
            RValue::Boolean(_) => ValueType::Boolean,
            RValue::Str(_) => ValueType::String,
            RValue::Array(_) => ValueType::Array,
            RValue::Tuple { .. } => ValueType::Tuple,
            RValue::Structure { .. } => ValueType::Structure,
            RValue::Function(_) => ValueType::Function,
            RValue::Address { .. } => ValueType::Address,
            RValue::TaskHandle(_) => ValueType::TaskHandle,
            RValue::Buffer(_) => ValueType::Buffer,
        }
    }
}
