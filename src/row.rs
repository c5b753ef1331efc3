//! Attribute IDs, row descriptors and the runtime row-binding stack.
//!
//! The source engine this crate's pipeline is modeled on resolves column
//! references through a process-local stack of mutable maps. Hidden globals
//! like that make statements non-reentrant and hard to test in isolation, so
//! here the binding stack is an explicit value owned by the scheduler's
//! `RuntimeContext` and threaded by reference into every scalar evaluator.

use crate::value::{Row, SqlValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// Stable identifier assigned at plan-build time to a single produced
/// column. Two attribute ids are never reused for different producers
/// within one compiled plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(pub u32);

static NEXT_ATTRIBUTE_ID: AtomicU32 = AtomicU32::new(1);

impl AttributeId {
    /// Allocate a fresh attribute id, unique for the lifetime of the process.
    /// Plan-build is single-threaded per statement but ids must stay globally
    /// unique so that cached/re-optimized subtrees never collide.
    pub fn fresh() -> Self {
        AttributeId(NEXT_ATTRIBUTE_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Maps attribute-id -> column index within a row, for one relation's
/// output. A column reference resolves at runtime by looking up the row
/// currently bound for its producing relation via this descriptor.
#[derive(Debug, Clone, Default)]
pub struct RowDescriptor {
    slots: HashMap<AttributeId, usize>,
}

impl RowDescriptor {
    pub fn new(attributes: &[AttributeId]) -> Self {
        let slots = attributes
            .iter()
            .enumerate()
            .map(|(idx, attr)| (*attr, idx))
            .collect();
        RowDescriptor { slots }
    }

    pub fn slot_of(&self, attr: AttributeId) -> Option<usize> {
        self.slots.get(&attr).copied()
    }
}

/// A relation's currently-bound row plus the descriptor used to index into
/// it, pushed onto the `BindingStack` while that relation's rows are in
/// scope (e.g. the outer and inner sides of a nested-loop join, or a
/// recursive CTE's working table).
struct Binding {
    descriptor: RowDescriptor,
    row: Row,
}

/// Per-scope row-binding stack threaded through scalar evaluation. Callers
/// push a binding when entering a relation's row scope and pop it on exit;
/// column-reference evaluators walk the stack from the top looking for the
/// descriptor that owns their attribute id.
#[derive(Default)]
pub struct BindingStack {
    bindings: Vec<Binding>,
}

impl BindingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: RowDescriptor, row: Row) {
        self.bindings.push(Binding { descriptor, row });
    }

    pub fn pop(&mut self) {
        self.bindings.pop();
    }

    /// Replace the topmost binding's row in place, used by streaming
    /// operators that advance through many rows under one pushed scope
    /// instead of pushing per row.
    pub fn set_top_row(&mut self, row: Row) {
        if let Some(top) = self.bindings.last_mut() {
            top.row = row;
        }
    }

    /// Resolve a column reference by attribute id, searching from the
    /// innermost (most-recently-pushed) scope outward.
    pub fn resolve(&self, attr: AttributeId) -> Option<&SqlValue> {
        for binding in self.bindings.iter().rev() {
            if let Some(slot) = binding.descriptor.slot_of(attr) {
                return binding.row.get(slot);
            }
        }
        None
    }

    pub fn depth(&self) -> usize {
        self.bindings.len()
    }

    /// Truncate back to a previously observed depth, used to unwind after a
    /// scoped evaluation that may have pushed bindings on error paths.
    pub fn truncate(&mut self, depth: usize) {
        self.bindings.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_innermost_binding_first() {
        let attr = AttributeId::fresh();
        let mut stack = BindingStack::new();
        stack.push(RowDescriptor::new(&[attr]), vec![SqlValue::Integer(1)]);
        stack.push(RowDescriptor::new(&[attr]), vec![SqlValue::Integer(2)]);
        assert_eq!(stack.resolve(attr), Some(&SqlValue::Integer(2)));
        stack.pop();
        assert_eq!(stack.resolve(attr), Some(&SqlValue::Integer(1)));
    }
}
