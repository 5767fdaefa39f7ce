//! Function signatures.

use crate::ir::types::ValueType;

/// Parameter flag bit: the parameter is passed by reference.
pub const PARAM_FLAG_REFERENCE: u32 = 1;

/// A function's typed calling contract.
///
/// `nested` is parallel to `params` and is populated only for parameters
/// of Function type, which is what makes higher-order signatures
/// expressible. Hints are raw composite IDs with zero meaning "none",
/// matching the wire encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionSignature {
    pub params: Vec<ValueType>,
    pub returns: Vec<ValueType>,
    pub param_hints: Vec<u32>,
    pub param_flags: Vec<u32>,
    pub nested: Vec<Option<FunctionSignature>>,
    pub return_hints: Vec<u32>,
}

impl FunctionSignature {
    /// Creates an empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one parameter with its hint and optional nested signature.
    pub fn add_param(&mut self, ty: ValueType, hint: u32, nested: Option<FunctionSignature>) {
        self.params.push(ty);
        self.param_hints.push(hint);
        self.param_flags.push(0);
        self.nested.push(nested);
    }

    /// Marks the most recently added parameter as by-reference.
    pub fn set_last_param_reference(&mut self) {
        if let Some(flags) = self.param_flags.last_mut() {
            *flags |= PARAM_FLAG_REFERENCE;
        }
    }

    /// Appends one return slot with its hint.
    pub fn add_return(&mut self, ty: ValueType, hint: u32) {
        self.returns.push(ty);
        self.return_hints.push(hint);
    }

    /// Number of parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}
