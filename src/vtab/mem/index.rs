//! Secondary index maintenance: key extraction and delta application against
//! the layer currently being written to.

use super::key::{encode_index_key, EncodedKey};
use super::layer::IndexDelta;
use crate::schema::IndexSchema;
use crate::value::Row;
use im::OrdMap;

/// Compute every declared secondary index's key for a row.
pub fn index_keys_for_row(indexes: &[IndexSchema], row: &Row) -> Vec<(String, EncodedKey)> {
    indexes
        .iter()
        .map(|idx| (idx.name.clone(), encode_index_key(row, &idx.columns)))
        .collect()
}

/// Apply the delta of replacing `old` (if any) with `new` (if any) for one
/// index, against the transaction layer's own delta tree — *not* the base —
/// per the "deltas against the effective parent view at write time" rule.
pub fn apply_row_change(
    tree: &mut OrdMap<EncodedKey, IndexDelta>,
    index: &IndexSchema,
    pk: &EncodedKey,
    old_row: Option<&Row>,
    new_row: Option<&Row>,
) {
    if let Some(old) = old_row {
        let old_key = encode_index_key(old, &index.columns);
        let mut entry = tree.get(&old_key).cloned().unwrap_or_default();
        entry.added.remove(pk);
        entry.removed.insert(pk.clone());
        tree.insert(old_key, entry);
    }
    if let Some(new) = new_row {
        let new_key = encode_index_key(new, &index.columns);
        let mut entry = tree.get(&new_key).cloned().unwrap_or_default();
        entry.removed.remove(pk);
        entry.added.insert(pk.clone());
        tree.insert(new_key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexColumn, SortDirection};
    use crate::value::SqlValue;

    fn idx() -> IndexSchema {
        IndexSchema {
            name: "idx_v".into(),
            columns: vec![IndexColumn {
                column_index: 1,
                direction: SortDirection::Asc,
                collation: "BINARY".into(),
            }],
            unique: false,
        }
    }

    #[test]
    fn insert_then_update_collapses_within_one_layer() {
        let mut tree = OrdMap::new();
        let pk = vec![1];
        let row_a = vec![SqlValue::Integer(1), SqlValue::Text("a".into())];
        let row_b = vec![SqlValue::Integer(1), SqlValue::Text("b".into())];
        apply_row_change(&mut tree, &idx(), &pk, None, Some(&row_a));
        apply_row_change(&mut tree, &idx(), &pk, Some(&row_a), Some(&row_b));

        let key_a = encode_index_key(&row_a, &idx().columns);
        let key_b = encode_index_key(&row_b, &idx().columns);
        assert!(tree.get(&key_a).unwrap().added.is_empty());
        assert!(tree.get(&key_b).unwrap().added.contains(&pk));
    }
}
