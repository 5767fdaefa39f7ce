//! Execution context: value stack, activation frames, and debug I/O.

use std::collections::{BTreeMap, VecDeque};

use crate::exec::error::ExecError;
use crate::exec::value::RValue;
use crate::ir::ids::{ScopeId, StringId};

/// One activated scope's variable storage.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub scope: Option<ScopeId>,
    pub vars: BTreeMap<StringId, RValue>,
    /// Stack depth when the frame activated; values below it belong to
    /// enclosing frames.
    pub base: usize,
}

/// Mutable state an evaluation runs against.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// The implicit value stack operations consume and produce on.
    pub stack: Vec<RValue>,
    /// Activation frames, innermost last.
    pub frames: Vec<Frame>,
    /// Sink for debug write operations.
    pub output: String,
    /// Source for debug read operations.
    pub input: VecDeque<String>,
}

impl ExecutionContext {
    /// Creates an empty context with one root frame.
    pub fn new(global_scope: ScopeId) -> Self {
        Self {
            stack: Vec::new(),
            frames: vec![Frame {
                scope: Some(global_scope),
                vars: BTreeMap::new(),
                base: 0,
            }],
            output: String::new(),
            input: VecDeque::new(),
        }
    }

    /// Pushes a frame for an activated scope.
    pub fn push_frame(&mut self, scope: Option<ScopeId>) {
        let base = self.stack.len();
        self.frames.push(Frame {
            scope,
            vars: BTreeMap::new(),
            base,
        });
    }

    /// Number of stack values pushed within the innermost frame.
    pub fn frame_depth(&self) -> usize {
        let base = self.frames.last().map(|frame| frame.base).unwrap_or(0);
        self.stack.len().saturating_sub(base)
    }

    /// Pops the innermost frame.
    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// The scope of the innermost frame carrying one.
    pub fn current_scope(&self) -> Option<ScopeId> {
        self.frames.iter().rev().find_map(|frame| frame.scope)
    }

    /// Resolves a bound value, innermost frame first.
    pub fn lookup(&self, name: StringId) -> Option<&RValue> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.vars.get(&name))
    }

    /// Mutable access to a bound value, innermost frame first.
    pub fn lookup_mut(&mut self, name: StringId) -> Option<&mut RValue> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.vars.get_mut(&name))
    }

    /// Stores a value: replaces the innermost binding of the name, or
    /// creates one in the innermost frame.
    pub fn store(&mut self, name: StringId, value: RValue) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.vars.get_mut(&name) {
                *slot = value;
                return;
            }
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name, value);
        }
    }

    /// Defines a value in the innermost frame.
    pub fn define(&mut self, name: StringId, value: RValue) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name, value);
        }
    }

    /// Pops the top of the value stack.
    pub fn pop(&mut self) -> Result<RValue, ExecError> {
        self.stack.pop().ok_or_else(ExecError::stack_underflow)
    }

    /// Pops a boolean, failing on any other type.
    pub fn pop_boolean(&mut self) -> Result<bool, ExecError> {
        match self.pop()? {
            RValue::Boolean(value) => Ok(value),
            other => Err(ExecError::type_mismatch(format!(
                "expected a boolean on the stack, found {:?}",
                other.type_of()
            ))),
        }
    }

    /// Pops an integer, failing on any other type.
    pub fn pop_integer(&mut self) -> Result<i32, ExecError> {
        match self.pop()? {
            RValue::Integer(value) => Ok(value),
            other => Err(ExecError::type_mismatch(format!(
                "expected an integer on the stack, found {:?}",
                other.type_of()
            ))),
        }
    }

    /// Pops a string, failing on any other type.
    pub fn pop_string(&mut self) -> Result<String, ExecError> {
        match self.pop()? {
            RValue::Str(value) => Ok(value),
            other => Err(ExecError::type_mismatch(format!(
                "expected a string on the stack, found {:?}",
                other.type_of()
            ))),
        }
    }
}
