//! MVCC layers: one committed base layer plus a chain of transaction
//! layers. Every tree is an `im::OrdMap`/`im::OrdSet`, so cloning a layer's
//! field to snapshot it for a savepoint is O(1) structural sharing — the
//! persistent-B-tree note in the design doc.

use super::key::EncodedKey;
use crate::value::Row;
use im::{OrdMap, OrdSet};
use std::sync::Arc;

/// A primary-tree entry in a transaction layer: either a live row or a
/// tombstone recording only the deleted key (the key is redundant with the
/// map key it's stored under, kept for clarity at call sites).
#[derive(Debug, Clone)]
pub enum PrimaryEntry {
    Row(Row),
    Tombstone,
}

/// Per-layer, per-index delta: primary keys added or removed under one
/// encoded index key by writes recorded in this layer.
#[derive(Debug, Clone, Default)]
pub struct IndexDelta {
    pub added: OrdSet<EncodedKey>,
    pub removed: OrdSet<EncodedKey>,
}

pub type SecondaryTree = OrdMap<EncodedKey, IndexDelta>;

/// The committed ground truth: one primary tree plus one tree per declared
/// secondary index, where a secondary value is the *set* of primary keys
/// matching that index key.
#[derive(Debug, Clone, Default)]
pub struct BaseLayer {
    pub primary: OrdMap<EncodedKey, Row>,
    pub secondary: im::HashMap<String, OrdMap<EncodedKey, OrdSet<EncodedKey>>>,
    /// Bumped on every DDL so cursors know to re-resolve cached schema refs.
    pub schema_version: u64,
}

impl BaseLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A per-connection, non-committed overlay over `parent`. `isCommitted`
/// flips to `true` the instant `commit` makes this layer part of the
/// chain's read path; it stays linked (never folded in place) until a
/// background collapse walks it into the base.
#[derive(Debug, Clone)]
pub struct TransactionLayer {
    pub parent: Layer,
    pub primary: OrdMap<EncodedKey, PrimaryEntry>,
    pub secondary: im::HashMap<String, SecondaryTree>,
    pub is_committed: bool,
}

impl TransactionLayer {
    pub fn new(parent: Layer) -> Self {
        TransactionLayer {
            parent,
            primary: OrdMap::new(),
            secondary: im::HashMap::new(),
            is_committed: false,
        }
    }

    /// An immutable snapshot of this layer's trees, O(1) thanks to
    /// structural sharing; reinstating it on rollback-to is just assignment.
    pub fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: TransactionSnapshot) {
        self.primary = snapshot.primary;
        self.secondary = snapshot.secondary;
    }
}

#[derive(Debug, Clone)]
pub struct TransactionSnapshot {
    pub primary: OrdMap<EncodedKey, PrimaryEntry>,
    pub secondary: im::HashMap<String, SecondaryTree>,
}

/// A link in the layer chain: either the base or a (possibly uncommitted)
/// transaction layer over another link.
#[derive(Debug, Clone)]
pub enum Layer {
    Base(Arc<BaseLayer>),
    Transaction(Arc<TransactionLayer>),
}

impl Layer {
    pub fn new_base() -> Self {
        Layer::Base(Arc::new(BaseLayer::new()))
    }

    pub fn parent(&self) -> Option<&Layer> {
        match self {
            Layer::Base(_) => None,
            Layer::Transaction(t) => Some(&t.parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_restore_round_trips() {
        let base = Layer::new_base();
        let mut tx = TransactionLayer::new(base);
        tx.primary.insert(vec![1], PrimaryEntry::Row(vec![]));
        let snap = tx.snapshot();
        tx.primary.insert(vec![2], PrimaryEntry::Row(vec![]));
        assert_eq!(tx.primary.len(), 2);
        tx.restore(snap);
        assert_eq!(tx.primary.len(), 1);
    }
}
