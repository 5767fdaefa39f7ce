//! Blocks: ordered operation sequences bound to a scope.
//!
//! Besides plain append/pop, blocks support the narrow tail surgeries the
//! semantic builder relies on: grouping the last n logical operands (an
//! operand's push together with its precomputation), rotating the tail
//! group upward, and swapping the two tail groups.

use crate::ir::ids::ScopeId;
use crate::ir::operation::Operation;
use crate::ir::program::TypeContext;

/// An owned operation sequence with an optional bound scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    scope: Option<ScopeId>,
    ops: Vec<Operation>,
}

impl Block {
    /// Creates an empty, unbound block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty block bound to a scope.
    pub fn with_scope(scope: ScopeId) -> Self {
        Self {
            scope: Some(scope),
            ops: Vec::new(),
        }
    }

    /// Binds this block to a scope.
    pub fn bind_to_scope(&mut self, scope: ScopeId) {
        self.scope = Some(scope);
    }

    /// The bound scope, if any.
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// Appends one operation; ownership transfers to the block.
    pub fn append(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// Removes and returns the tail operation.
    pub fn pop_tail(&mut self) -> Option<Operation> {
        self.ops.pop()
    }

    /// The tail operation.
    pub fn tail(&self) -> Option<&Operation> {
        self.ops.last()
    }

    /// Mutable access to the tail operation.
    pub fn tail_mut(&mut self) -> Option<&mut Operation> {
        self.ops.last_mut()
    }

    /// All operations in execution order.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// One operation by index.
    pub fn op_at(&self, index: usize) -> Option<&Operation> {
        self.ops.get(index)
    }

    /// Mutable access to one operation by index.
    pub fn op_at_mut(&mut self, index: usize) -> Option<&mut Operation> {
        self.ops.get_mut(index)
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` when the block holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the block, yielding its operations.
    pub fn into_ops(self) -> Vec<Operation> {
        self.ops
    }

    /// Removes one operation by index.
    pub fn erase(&mut self, index: usize) -> Option<Operation> {
        if index < self.ops.len() {
            Some(self.ops.remove(index))
        } else {
            None
        }
    }

    /// How many low-level operations make up the last `n` logical
    /// operands. A consumer groups its operands with itself through its
    /// parameter count.
    pub fn count_tail_ops(&self, n: usize, scope: ScopeId, ctx: &TypeContext<'_>) -> usize {
        count_tail_ops_in(&self.ops, n, scope, ctx)
    }

    /// Peeks the operation whose logical position from the tail is
    /// `offset`: zero is the tail itself, each step skips one logical
    /// group.
    pub fn operation_from_end(
        &self,
        offset: usize,
        scope: ScopeId,
        ctx: &TypeContext<'_>,
    ) -> Option<&Operation> {
        let mut end = self.ops.len();
        for _ in 0..offset {
            let group = count_tail_ops_in(&self.ops[..end], 1, scope, ctx);
            if group == 0 || group > end {
                return None;
            }
            end -= group;
        }
        if end == 0 {
            None
        } else {
            Some(&self.ops[end - 1])
        }
    }

    /// Index of the operation `operation_from_end(offset)` resolves to.
    pub fn index_from_end(
        &self,
        offset: usize,
        scope: ScopeId,
        ctx: &TypeContext<'_>,
    ) -> Option<usize> {
        let mut end = self.ops.len();
        for _ in 0..offset {
            let group = count_tail_ops_in(&self.ops[..end], 1, scope, ctx);
            if group == 0 || group > end {
                return None;
            }
            end -= group;
        }
        end.checked_sub(1)
    }

    /// Rotates the tail operation upward by `k` positions.
    pub fn shift_up_tail(&mut self, k: usize) {
        if self.ops.is_empty() || k == 0 {
            return;
        }
        let tail = self.ops.len() - 1;
        let at = tail.saturating_sub(k);
        let op = self.ops.remove(tail);
        self.ops.insert(at, op);
    }

    /// Rotates the tail logical group upward by `k` positions.
    pub fn shift_up_tail_group(&mut self, k: usize, scope: ScopeId, ctx: &TypeContext<'_>) {
        if k == 0 {
            return;
        }
        let group = self.count_tail_ops(1, scope, ctx);
        if group == 0 || group > self.ops.len() {
            return;
        }
        let start = self.ops.len() - group;
        let tail: Vec<Operation> = self.ops.split_off(start);
        let at = self.ops.len().saturating_sub(k);
        for (i, op) in tail.into_iter().enumerate() {
            self.ops.insert(at + i, op);
        }
    }

    /// Swaps the two tail logical groups.
    pub fn reverse_tail_groups(&mut self, scope: ScopeId, ctx: &TypeContext<'_>) {
        let last = self.count_tail_ops(1, scope, ctx);
        let both = self.count_tail_ops(2, scope, ctx);
        let second = both.saturating_sub(last);
        if last == 0 || second == 0 || both > self.ops.len() {
            return;
        }

        let start = self.ops.len() - both;
        let mut tail: Vec<Operation> = self.ops.split_off(start);
        let mut swapped: Vec<Operation> = tail.split_off(second);
        swapped.append(&mut tail);
        self.ops.append(&mut swapped);
    }
}

fn count_tail_ops_in(ops: &[Operation], n: usize, scope: ScopeId, ctx: &TypeContext<'_>) -> usize {
    let mut idx = ops.len();
    let mut need = n;
    while need > 0 && idx > 0 {
        idx -= 1;
        need -= 1;
        need += ops[idx].num_parameters(scope, ctx);
    }
    ops.len() - idx
}
