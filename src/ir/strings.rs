//! Interned identifier pool.
//!
//! Every variable, function, member, and type name in a program lives in
//! this pool; identifier equality is a handle comparison.

use std::collections::HashMap;

use crate::ir::ids::StringId;

/// Program-owned interned string pool with dense handles.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    items: Vec<String>,
    index: HashMap<String, StringId>,
}

impl StringPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns one string and returns its stable handle. Interning the
    /// same text twice yields the same handle.
    pub fn intern(&mut self, value: impl Into<String>) -> StringId {
        let value = value.into();
        if let Some(id) = self.index.get(value.as_str()).copied() {
            return id;
        }

        let id = StringId::new(self.items.len() as u32);
        self.items.push(value.clone());
        self.index.insert(value, id);
        id
    }

    /// Looks up an already-interned string without inserting.
    pub fn lookup(&self, value: &str) -> Option<StringId> {
        self.index.get(value).copied()
    }

    /// Resolves a handle back to its text.
    pub fn get(&self, id: StringId) -> Option<&str> {
        self.items.get(id.value() as usize).map(String::as_str)
    }

    /// Resolves a handle, substituting an empty string for stale handles.
    pub fn resolve(&self, id: StringId) -> &str {
        self.get(id).unwrap_or("")
    }

    /// Number of pooled strings.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartialEq for StringPool {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}
