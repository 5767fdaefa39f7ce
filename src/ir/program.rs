//! The Program root: arenas, pools, registry, and global state.

use crate::ir::block::Block;
use crate::ir::function::FunctionArena;
use crate::ir::ids::{ScopeId, StringId};
use crate::ir::registry::TypeRegistry;
use crate::ir::scope::{Scope, ScopeArena};
use crate::ir::strings::StringPool;

/// Spawn-site names recorded for tasks and threads, in spawn order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebugTable {
    pub task_names: Vec<StringId>,
}

impl DebugTable {
    /// Records the name associated with one task or thread spawn site.
    pub fn track_task_name(&mut self, name: StringId) {
        self.task_names.push(name);
    }
}

/// An opaque per-library data payload carried through serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionBlock {
    pub library: StringId,
    pub bytes: Vec<u8>,
}

/// The root of one elaborated program.
#[derive(Debug, Clone)]
pub struct Program {
    pub strings: StringPool,
    pub scopes: ScopeArena,
    pub functions: FunctionArena,
    pub registry: TypeRegistry,
    pub global_scope: ScopeId,
    pub global_init: Option<Block>,
    pub extensions: Vec<StringId>,
    pub extension_data: Vec<ExtensionBlock>,
    pub debug: DebugTable,
    uses_console: bool,
    fatal: bool,
}

impl Program {
    /// Creates an empty program with its global scope allocated.
    pub fn new() -> Self {
        let mut scopes = ScopeArena::new();
        let global_scope = scopes.alloc(Scope::new());

        Self {
            strings: StringPool::new(),
            scopes,
            functions: FunctionArena::new(),
            registry: TypeRegistry::new(),
            global_scope,
            global_init: None,
            extensions: Vec::new(),
            extension_data: Vec::new(),
            debug: DebugTable::default(),
            uses_console: false,
            fatal: false,
        }
    }

    /// Interns one identifier into the program's string pool.
    pub fn intern(&mut self, value: impl Into<String>) -> StringId {
        self.strings.intern(value)
    }

    /// Creates the global initialization block, bound to the global scope.
    pub fn create_global_init_block(&mut self) -> &mut Block {
        let scope = self.global_scope;
        self.global_init
            .get_or_insert_with(|| Block::with_scope(scope))
    }

    /// Replaces the global initialization block (loader path).
    pub fn replace_global_init_block(&mut self, mut block: Block) {
        block.bind_to_scope(self.global_scope);
        self.global_init = Some(block);
    }

    /// Marks the program as using the console.
    pub fn set_uses_console(&mut self) {
        self.uses_console = true;
    }

    /// Returns `true` when the program uses the console.
    pub fn uses_console(&self) -> bool {
        self.uses_console
    }

    /// Latches the fatal-error flag.
    pub fn set_fatal(&mut self) {
        self.fatal = true;
    }

    /// Returns `true` once any fatal builder error was reported.
    pub fn has_fatal_error(&self) -> bool {
        self.fatal
    }

    /// A borrow bundle for type queries over this program.
    pub fn type_context(&self) -> TypeContext<'_> {
        TypeContext {
            scopes: &self.scopes,
            functions: &self.functions,
            registry: &self.registry,
            strings: &self.strings,
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed views needed to answer type and arity queries.
#[derive(Clone, Copy)]
pub struct TypeContext<'a> {
    pub scopes: &'a ScopeArena,
    pub functions: &'a FunctionArena,
    pub registry: &'a TypeRegistry,
    pub strings: &'a StringPool,
}
