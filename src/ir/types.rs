//! Primitive type tags and their wire numbering.

/// The closed set of value type tags.
///
/// The discriminants are the numbers used by the bytecode format and the
/// textual serialization; they must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Null = 0,
    /// 32-bit signed integer.
    Integer = 1,
    /// 16-bit signed integer.
    Integer16 = 2,
    /// 32-bit IEEE float.
    Real = 3,
    Boolean = 4,
    /// Interned string.
    String = 5,
    Tuple = 6,
    Structure = 7,
    /// Callable reference.
    Function = 8,
    /// Byte pointer into a composite's storage.
    Address = 9,
    /// Array handle.
    Array = 10,
    TaskHandle = 11,
    /// Buffer handle.
    Buffer = 12,
    Error = 13,
}

impl ValueType {
    /// Converts a wire number back to a tag.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => ValueType::Null,
            1 => ValueType::Integer,
            2 => ValueType::Integer16,
            3 => ValueType::Real,
            4 => ValueType::Boolean,
            5 => ValueType::String,
            6 => ValueType::Tuple,
            7 => ValueType::Structure,
            8 => ValueType::Function,
            9 => ValueType::Address,
            10 => ValueType::Array,
            11 => ValueType::TaskHandle,
            12 => ValueType::Buffer,
            13 => ValueType::Error,
            _ => return None,
        })
    }

    /// Returns the wire number of this tag.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns `true` for the arithmetic-capable tags.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::Integer16 | ValueType::Real
        )
    }

    /// Storage size in bytes for non-composite tags.
    ///
    /// Composite sizes depend on their registered descriptors and are
    /// computed through the type registry.
    pub fn storage_size(self) -> Option<u32> {
        Some(match self {
            ValueType::Integer => 4,
            ValueType::Integer16 => 2,
            ValueType::Real => 4,
            ValueType::Boolean => 1,
            ValueType::String => 4,
            ValueType::Function => 4,
            ValueType::Address => 4,
            ValueType::Array => 4,
            ValueType::TaskHandle => 4,
            ValueType::Buffer => 4,
            ValueType::Null | ValueType::Tuple | ValueType::Structure | ValueType::Error => {
                return None
            }
        })
    }
}
