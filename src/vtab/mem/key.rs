//! Order-preserving ("memcomparable") key encoding.
//!
//! `im::OrdMap` orders purely by `Ord` on its key type; encoding every row
//! into a `Vec<u8>` that already sorts the way the declared key columns
//! should (per-column direction, collation on text, numeric ordering for
//! integers/reals) lets every layer's tree use plain byte-lexicographic
//! `Ord` instead of threading a comparator through the persistent
//! collection. This is the same trick key-value storage engines use to keep
//! a comparator-free ordered tree.

use crate::schema::{IndexColumn, SortDirection};
use crate::value::{Collation, SqlValue};

pub type EncodedKey = Vec<u8>;

const TAG_NULL: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_BLOB: u8 = 3;

/// Encode one value into its order-preserving byte form (ascending).
fn encode_component(value: &SqlValue, collation: &Collation) -> Vec<u8> {
    match value {
        SqlValue::Null => vec![TAG_NULL],
        SqlValue::Integer(i) => encode_number(TAG_NUMBER, *i as f64),
        SqlValue::Boolean(b) => encode_number(TAG_NUMBER, if *b { 1.0 } else { 0.0 }),
        SqlValue::Real(r) => encode_number(TAG_NUMBER, *r),
        SqlValue::Text(s) => {
            let normalized = normalize_for_collation(s, collation);
            let mut out = vec![TAG_TEXT];
            out.extend_from_slice(normalized.as_bytes());
            out
        }
        SqlValue::Blob(b) => {
            let mut out = vec![TAG_BLOB];
            out.extend_from_slice(b);
            out
        }
    }
}

fn normalize_for_collation(s: &str, collation: &Collation) -> String {
    match collation {
        Collation::NoCase => s.to_ascii_uppercase(),
        Collation::RTrim => s.trim_end().to_string(),
        _ => s.to_string(),
    }
}

/// IEEE-754 bit-twiddle that makes f64 bit patterns order the same as the
/// floats they represent when compared as big-endian unsigned bytes.
fn encode_number(tag: u8, f: f64) -> Vec<u8> {
    let bits = f.to_bits();
    let flipped = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    let mut out = vec![tag];
    out.extend_from_slice(&flipped.to_be_bytes());
    out
}

fn invert(mut bytes: Vec<u8>) -> Vec<u8> {
    for b in &mut bytes {
        *b = !*b;
    }
    bytes
}

/// Escape `0x00` bytes as `0x00 0xFF` and terminate with `0x00 0x00`, the
/// standard trick that lets a sequence of escaped components be
/// byte-compared as if they were compared tuple-wise component by
/// component, regardless of the individual components' lengths.
fn escape_and_terminate(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 2);
    for &b in raw {
        out.push(b);
        if b == 0 {
            out.push(0xFF);
        }
    }
    out.push(0);
    out.push(0);
    out
}

/// Encode a full composite key (e.g. a primary key or secondary index key)
/// from a row given the column positions, directions and collations that
/// make it up. Components are escaped/terminated independently so the
/// concatenation preserves tuple (lexicographic, component-by-component)
/// ordering under a plain byte-wise `Ord`.
pub fn encode_key(row: &[SqlValue], columns: &[(usize, SortDirection, Collation)]) -> EncodedKey {
    let mut out = Vec::new();
    for (col_idx, direction, collation) in columns {
        let value = row.get(*col_idx).unwrap_or(&SqlValue::Null);
        let raw = encode_component(value, collation);
        let escaped = escape_and_terminate(&raw);
        let component = match direction {
            SortDirection::Asc => escaped,
            SortDirection::Desc => invert(escaped),
        };
        out.extend_from_slice(&component);
    }
    out
}

/// Encode an index key from `IndexColumn`s (resolves each column's declared
/// collation by name against `BINARY`/`NOCASE`/`RTRIM` — custom collations
/// are resolved by the caller beforehand and passed via `encode_key`).
pub fn encode_index_key(row: &[SqlValue], columns: &[IndexColumn]) -> EncodedKey {
    let cols: Vec<(usize, SortDirection, Collation)> = columns
        .iter()
        .map(|c| {
            let collation = match c.collation.to_ascii_uppercase().as_str() {
                "NOCASE" => Collation::NoCase,
                "RTRIM" => Collation::RTrim,
                _ => Collation::Binary,
            };
            (c.column_index, c.direction, collation)
        })
        .collect();
    encode_key(row, &cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(values: Vec<SqlValue>) -> EncodedKey {
        let cols: Vec<_> = (0..values.len())
            .map(|i| (i, SortDirection::Asc, Collation::Binary))
            .collect();
        encode_key(&values, &cols)
    }

    #[test]
    fn integers_order_numerically_including_negatives() {
        let a = key_of(vec![SqlValue::Integer(-5)]);
        let b = key_of(vec![SqlValue::Integer(3)]);
        assert!(a < b);
    }

    #[test]
    fn descending_direction_inverts_order() {
        let cols = vec![(0, SortDirection::Desc, Collation::Binary)];
        let a = encode_key(&[SqlValue::Integer(1)], &cols);
        let b = encode_key(&[SqlValue::Integer(2)], &cols);
        assert!(a > b);
    }

    #[test]
    fn nocase_text_collation_normalizes_before_encoding() {
        let cols = vec![(0, SortDirection::Asc, Collation::NoCase)];
        let a = encode_key(&[SqlValue::Text("abc".into())], &cols);
        let b = encode_key(&[SqlValue::Text("ABC".into())], &cols);
        assert_eq!(a, b);
    }
}
