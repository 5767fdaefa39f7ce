//! Evaluator error contracts.

use std::fmt;

/// Stable execution error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// A value on the stack does not match the operation's contract.
    TypeMismatch,
    /// A name does not resolve to a bound value.
    UnknownVariable,
    /// The value stack ran dry.
    StackUnderflow,
    /// Integer division by zero.
    DivideByZero,
    /// The operation is defined at IR level only; an external executor
    /// must schedule it.
    Unsupported,
    /// The evaluator's own invariants broke.
    Internal,
}

/// Execution error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
}

impl ExecError {
    /// Creates an execution error.
    pub fn new(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a `TypeMismatch` error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::TypeMismatch, message)
    }

    /// Creates an `UnknownVariable` error.
    pub fn unknown_variable(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::UnknownVariable, message)
    }

    /// Creates a `StackUnderflow` error.
    pub fn stack_underflow() -> Self {
        Self::new(ExecErrorKind::StackUnderflow, "value stack underflow")
    }

    /// Creates a `DivideByZero` error.
    pub fn divide_by_zero() -> Self {
        Self::new(ExecErrorKind::DivideByZero, "integer division by zero")
    }

    /// Creates an `Unsupported` error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Unsupported, message)
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Internal, message)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ExecError {}
