//! IR and builder error contracts.

use std::fmt;

/// Stable IR error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrErrorKind {
    /// An ill-formed construct that the grammar should have prevented.
    Structural,
    /// Operand types disagree with an operation's contract.
    TypeMismatch,
    /// An operation received the wrong number of operands.
    Arity,
    /// A construct is syntactically malformed at the semantic level.
    Syntax,
    /// A required IR invariant was violated.
    InvariantViolation,
    /// A configured resource limit was exceeded.
    LimitExceeded,
    /// An unsupported variant was reached.
    NotImplemented,
}

/// IR error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrError {
    /// Error category.
    pub kind: IrErrorKind,
    /// Human-readable error summary.
    pub message: String,
    /// Optional additional detail.
    pub detail: Option<String>,
}

impl IrError {
    /// Creates an IR error.
    pub fn new(kind: IrErrorKind, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail,
        }
    }

    /// Creates a `Structural` error.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(IrErrorKind::Structural, message, None)
    }

    /// Creates a `TypeMismatch` error.
    pub fn type_mismatch(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::TypeMismatch, message, Some(detail.into()))
    }

    /// Creates an `Arity` error.
    pub fn arity(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::Arity, message, Some(detail.into()))
    }

    /// Creates a `Syntax` error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(IrErrorKind::Syntax, message, None)
    }

    /// Creates an `InvariantViolation` error.
    pub fn invariant_violation(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(
            IrErrorKind::InvariantViolation,
            message,
            Some(detail.into()),
        )
    }

    /// Creates a `LimitExceeded` error.
    pub fn limit_exceeded(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::LimitExceeded, message, Some(detail.into()))
    }

    /// Creates a `NotImplemented` error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(IrErrorKind::NotImplemented, message, None)
    }
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{:?}: {} ({detail})", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for IrError {}
