//! Functions: user-defined bodies and native-call stubs.

use crate::ir::block::Block;
use crate::ir::ids::{FunctionId, ScopeId, StringId};
use crate::ir::types::ValueType;

/// A user-defined function: parameter scope, return scope, body block.
///
/// The parameter and return scopes have their parent links cleared so
/// serializing one function never recursively emits its enclosing scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: ScopeId,
    pub returns: ScopeId,
    pub body: Option<Block>,
}

/// A native-call stub: the marshalling layer resolves it at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCall {
    pub library: StringId,
    pub entry_point: StringId,
    pub params: ScopeId,
    pub return_type: ValueType,
    pub return_hint: u32,
}

/// Either flavor of callable.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionKind {
    User(Function),
    Native(NativeCall),
}

impl FunctionKind {
    /// The parameter scope of either flavor.
    pub fn params(&self) -> ScopeId {
        match self {
            FunctionKind::User(function) => function.params,
            FunctionKind::Native(stub) => stub.params,
        }
    }
}

/// Owning arena for all functions of a Program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionArena {
    items: Vec<Option<FunctionKind>>,
}

impl FunctionArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a function into the arena and returns its ID.
    pub fn alloc(&mut self, function: FunctionKind) -> FunctionId {
        let id = FunctionId::new(self.items.len() as u32);
        self.items.push(Some(function));
        id
    }

    /// Installs a function at a known ID (loader path), growing as needed.
    pub fn install(&mut self, id: FunctionId, function: FunctionKind) {
        while self.items.len() <= id.value() as usize {
            self.items.push(None);
        }
        self.items[id.value() as usize] = Some(function);
    }

    /// Immutable access to one function.
    pub fn get(&self, id: FunctionId) -> Option<&FunctionKind> {
        self.items.get(id.value() as usize).and_then(Option::as_ref)
    }

    /// Mutable access to one function.
    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut FunctionKind> {
        self.items.get_mut(id.value() as usize).and_then(Option::as_mut)
    }

    /// Number of function slots.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when no functions exist.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
