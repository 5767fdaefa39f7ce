//! Bytecode codec error contracts.

use std::fmt;

/// Stable codec error categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecErrorKind {
    /// The stream does not start with the signature cookie.
    InvalidCookie,
    /// A specific marker was required but a different byte was found.
    UnexpectedOpcode { expected: u8, found: u8 },
    /// An opcode that matches nothing in the table.
    UnknownOpcode { opcode: u8 },
    /// The stream ended mid-record.
    UnexpectedEnd,
    /// A numeric field does not decode to a known type tag.
    UnknownTypeTag { value: u32 },
    /// The decoded structure violates an IR invariant.
    InvalidStructure,
    /// The program cannot be serialized as requested.
    Unserializable,
    /// Reading or writing the underlying stream failed.
    Io,
}

/// Codec error payload; `offset` names the byte the failure was
/// detected at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    pub kind: CodecErrorKind,
    pub message: String,
    pub offset: usize,
}

impl CodecError {
    /// Creates a codec error at the given offset.
    pub fn new(kind: CodecErrorKind, message: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            offset,
        }
    }

    /// Creates an `InvalidCookie` error.
    pub fn invalid_cookie(offset: usize) -> Self {
        Self::new(
            CodecErrorKind::InvalidCookie,
            "binary code does not carry a valid signature cookie; the stream may be corrupted or written by an incompatible version",
            offset,
        )
    }

    /// Creates an `UnexpectedOpcode` error.
    pub fn unexpected_opcode(expected: u8, found: u8, offset: usize) -> Self {
        Self::new(
            CodecErrorKind::UnexpectedOpcode { expected, found },
            format!(
                "expected opcode 0x{expected:02X} but found 0x{found:02X}; ensure the binary is not corrupted"
            ),
            offset,
        )
    }

    /// Creates an `UnknownOpcode` error naming the offset and the byte.
    pub fn unknown_opcode(opcode: u8, offset: usize) -> Self {
        Self::new(
            CodecErrorKind::UnknownOpcode { opcode },
            format!("opcode value 0x{opcode:02X} at offset 0x{offset:08X} matches no known opcode"),
            offset,
        )
    }

    /// Creates an `UnexpectedEnd` error.
    pub fn unexpected_end(offset: usize) -> Self {
        Self::new(
            CodecErrorKind::UnexpectedEnd,
            "the stream ended in the middle of a record",
            offset,
        )
    }

    /// Creates an `UnknownTypeTag` error.
    pub fn unknown_type_tag(value: u32, offset: usize) -> Self {
        Self::new(
            CodecErrorKind::UnknownTypeTag { value },
            format!("numeric field {value} is not a known type tag"),
            offset,
        )
    }

    /// Creates an `InvalidStructure` error.
    pub fn invalid_structure(message: impl Into<String>, offset: usize) -> Self {
        Self::new(CodecErrorKind::InvalidStructure, message, offset)
    }

    /// Creates an `Unserializable` error.
    pub fn unserializable(message: impl Into<String>) -> Self {
        Self::new(CodecErrorKind::Unserializable, message, 0)
    }

    /// Creates an `Io` error.
    pub fn io(error: &std::io::Error) -> Self {
        Self::new(CodecErrorKind::Io, error.to_string(), 0)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (offset 0x{:08X})", self.message, self.offset)
    }
}

impl std::error::Error for CodecError {}
