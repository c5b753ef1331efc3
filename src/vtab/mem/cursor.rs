//! Layer-chain scan cursors.
//!
//! Given a starting (youngest) layer and a scan plan, walk every layer in
//! the chain from newest to oldest. For each candidate primary key a
//! younger layer mentions, mark it resolved (yielded or deliberately
//! suppressed) and never look at an older layer's entry for that key again.
//! A tombstone in a younger layer suppresses an older row; a newer row
//! overrides an older one. Order is kept by a min-heap (or max-heap for
//! descending scans) over each layer's positioned range iterator.

use super::key::EncodedKey;
use super::layer::{BaseLayer, Layer, PrimaryEntry};
use crate::value::Row;
use im::OrdMap;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

/// One layer's view, flattened to a uniform `(key, Option<Row>)` shape:
/// `Some(row)` for a live entry, `None` for a tombstone.
enum LayerView {
    Base(Arc<BaseLayer>),
    Tx(OrdMap<EncodedKey, PrimaryEntry>),
}

fn in_bounds(key: &EncodedKey, lower: &Bound<EncodedKey>, upper: &Bound<EncodedKey>) -> bool {
    let above_lower = match lower {
        Bound::Unbounded => true,
        Bound::Included(b) => key >= b,
        Bound::Excluded(b) => key > b,
    };
    let below_upper = match upper {
        Bound::Unbounded => true,
        Bound::Included(b) => key <= b,
        Bound::Excluded(b) => key < b,
    };
    above_lower && below_upper
}

impl LayerView {
    /// `im::OrdMap`'s iterator already yields entries in ascending key
    /// order; filtering that stream by the scan's bounds avoids relying on
    /// a `BTreeMap`-style `range` API the persistent map may not expose.
    fn range_ascending(&self, lower: Bound<EncodedKey>, upper: Bound<EncodedKey>) -> Vec<(EncodedKey, Option<Row>)> {
        match self {
            LayerView::Base(base) => base
                .primary
                .iter()
                .filter(|(k, _)| in_bounds(k, &lower, &upper))
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect(),
            LayerView::Tx(tree) => tree
                .iter()
                .filter(|(k, _)| in_bounds(k, &lower, &upper))
                .map(|(k, v)| {
                    let row = match v {
                        PrimaryEntry::Row(r) => Some(r.clone()),
                        PrimaryEntry::Tombstone => None,
                    };
                    (k.clone(), row)
                })
                .collect(),
        }
    }
}

/// Flatten the chain from `start` down to (and including) the base into
/// youngest-first order.
fn chain_views(start: &Layer) -> Vec<LayerView> {
    let mut views = Vec::new();
    let mut cursor = Some(start.clone());
    while let Some(layer) = cursor {
        match &layer {
            Layer::Base(base) => {
                views.push(LayerView::Base(base.clone()));
                cursor = None;
            }
            Layer::Transaction(tx) => {
                views.push(LayerView::Tx(tx.primary.clone()));
                cursor = Some(tx.parent.clone());
            }
        }
    }
    views
}

#[derive(Eq, PartialEq)]
struct HeapItem {
    key: EncodedKey,
    layer_rank: usize, // 0 = youngest; used as a tiebreaker, younger wins
    pos: usize,
    ascending: bool,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert comparisons to get the smallest
        // key (or, for descending scans, the largest) out first, and within
        // equal keys prefer the younger layer (smaller layer_rank) first.
        let key_cmp = if self.ascending {
            other.key.cmp(&self.key)
        } else {
            self.key.cmp(&other.key)
        };
        key_cmp.then_with(|| other.layer_rank.cmp(&self.layer_rank))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A fully-materialized, already-ordered primary scan result. Ordering and
/// suppression are resolved eagerly here (the table is in memory, so there
/// is no I/O-bound reason to stream lazily); callers adapt this into the
/// `BoxStream` the `VirtualTable::query` contract expects.
pub fn scan_primary(
    start: &Layer,
    lower: Bound<EncodedKey>,
    upper: Bound<EncodedKey>,
    ascending: bool,
) -> Vec<(EncodedKey, Row)> {
    let views = chain_views(start);
    let per_layer: Vec<Vec<(EncodedKey, Option<Row>)>> = views
        .iter()
        .map(|v| {
            let mut entries = v.range_ascending(lower.clone(), upper.clone());
            if !ascending {
                entries.reverse();
            }
            entries
        })
        .collect();

    let mut heap = BinaryHeap::new();
    for (layer_rank, entries) in per_layer.iter().enumerate() {
        if let Some((k, _)) = entries.first() {
            heap.push(HeapItem {
                key: k.clone(),
                layer_rank,
                pos: 0,
                ascending,
            });
        }
    }

    let mut resolved: HashSet<EncodedKey> = HashSet::new();
    let mut out = Vec::new();

    while let Some(item) = heap.pop() {
        let entries = &per_layer[item.layer_rank];
        let (key, value) = &entries[item.pos];
        debug_assert_eq!(key, &item.key);

        if resolved.insert(key.clone()) {
            if let Some(row) = value {
                out.push((key.clone(), row.clone()));
            }
            // A tombstone (`value == None`) suppresses without yielding.
        }

        let next_pos = item.pos + 1;
        if let Some((k, _)) = per_layer[item.layer_rank].get(next_pos) {
            heap.push(HeapItem {
                key: k.clone(),
                layer_rank: item.layer_rank,
                pos: next_pos,
                ascending,
            });
        }
    }

    out
}

/// Resolve a single primary key's current, effective value by walking the
/// chain youngest to oldest and stopping at the first mention.
pub fn resolve_primary(start: &Layer, key: &EncodedKey) -> Option<Row> {
    let mut cursor = Some(start.clone());
    while let Some(layer) = cursor {
        match &layer {
            Layer::Base(base) => return base.primary.get(key).cloned(),
            Layer::Transaction(tx) => {
                if let Some(entry) = tx.primary.get(key) {
                    return match entry {
                        PrimaryEntry::Row(r) => Some(r.clone()),
                        PrimaryEntry::Tombstone => None,
                    };
                }
                cursor = Some(tx.parent.clone());
            }
        }
    }
    None
}

/// Resolve the set of primary keys a secondary index key currently maps to,
/// by the same youngest-to-oldest walk applied to the index's deltas.
pub fn resolve_secondary(start: &Layer, index_name: &str, index_key: &EncodedKey) -> Vec<EncodedKey> {
    let mut resolved: HashSet<EncodedKey> = HashSet::new();
    let mut live: Vec<EncodedKey> = Vec::new();
    let mut cursor = Some(start.clone());
    while let Some(layer) = cursor {
        match &layer {
            Layer::Base(base) => {
                if let Some(tree) = base.secondary.get(index_name) {
                    if let Some(set) = tree.get(index_key) {
                        for pk in set {
                            if resolved.insert(pk.clone()) {
                                live.push(pk.clone());
                            }
                        }
                    }
                }
                break;
            }
            Layer::Transaction(tx) => {
                if let Some(tree) = tx.secondary.get(index_name) {
                    if let Some(delta) = tree.get(index_key) {
                        for pk in &delta.removed {
                            resolved.insert(pk.clone());
                        }
                        for pk in &delta.added {
                            if resolved.insert(pk.clone()) {
                                live.push(pk.clone());
                            }
                        }
                    }
                }
                cursor = Some(tx.parent.clone());
            }
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::layer::TransactionLayer;
    use crate::value::SqlValue;

    fn row(n: i64) -> Row {
        vec![SqlValue::Integer(n)]
    }

    fn key(n: i64) -> EncodedKey {
        crate::vtab::mem::key::encode_key(
            &[SqlValue::Integer(n)],
            &[(0, crate::schema::SortDirection::Asc, crate::value::Collation::Binary)],
        )
    }

    #[test]
    fn base_plus_override_and_tombstone() {
        let mut base = BaseLayer::new();
        base.primary.insert(key(1), row(1));
        base.primary.insert(key(2), row(2));
        base.primary.insert(key(3), row(3));
        let base_layer = Layer::Base(Arc::new(base));

        let mut tx = TransactionLayer::new(base_layer);
        tx.primary.insert(key(2), PrimaryEntry::Row(vec![SqlValue::Integer(22)]));
        tx.primary.insert(key(3), PrimaryEntry::Tombstone);
        let tx_layer = Layer::Transaction(Arc::new(tx));

        let out = scan_primary(&tx_layer, Bound::Unbounded, Bound::Unbounded, true);
        let values: Vec<i64> = out
            .iter()
            .map(|(_, r)| match &r[0] {
                SqlValue::Integer(i) => *i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![1, 22]);
    }
}
