//! # Value Type System
//!
//! `SqlValue` is the tagged variant every row cell carries: null, a 64-bit
//! integer, a double, text, a blob, or a boolean stored as a 0/1 integer.
//! This module also owns three-valued comparison, collation resolution and
//! the numeric coercion rules used by comparisons and arithmetic.
//!
//! ## Usage
//!
//! ```rust
//! use quereus::value::{SqlValue, Collation};
//!
//! let a = SqlValue::Integer(1);
//! let b = SqlValue::Text("1".into());
//! assert_eq!(a.compare(&b, Collation::Binary), std::cmp::Ordering::Equal);
//! ```

pub mod collation;

pub use collation::{Collation, CollationFn};

use std::cmp::Ordering;
use std::fmt;

/// A single SQL scalar value.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// SQLite-style truthiness: NULL is neither true nor false (None).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Null => None,
            SqlValue::Boolean(b) => Some(*b),
            SqlValue::Integer(i) => Some(*i != 0),
            SqlValue::Real(r) => Some(*r != 0.0),
            SqlValue::Text(s) => Some(!s.is_empty() && s != "0"),
            SqlValue::Blob(b) => Some(!b.is_empty()),
        }
    }

    /// Numeric coercion used by arithmetic and comparisons. Returns `None`
    /// when the value cannot be read as a number at all (non-numeric text).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Real(r) => Some(*r),
            SqlValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            SqlValue::Text(s) => s.trim().parse::<f64>().ok(),
            SqlValue::Blob(_) => None,
        }
    }

    /// Integer coercion for bigint-dominant arithmetic; `None` on overflow or
    /// non-integral text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Boolean(b) => Some(if *b { 1 } else { 0 }),
            SqlValue::Real(r) if r.fract() == 0.0 && r.is_finite() => Some(*r as i64),
            SqlValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `CAST` with SQLite-style affinity; unrepresentable conversions yield NULL.
    pub fn cast_to(&self, target: TypeAffinity) -> SqlValue {
        if self.is_null() {
            return SqlValue::Null;
        }
        match target {
            TypeAffinity::Integer => self
                .as_i64()
                .map(SqlValue::Integer)
                .unwrap_or(SqlValue::Null),
            TypeAffinity::Real => self.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
            TypeAffinity::Text => SqlValue::Text(self.display_text()),
            TypeAffinity::Blob => match self {
                SqlValue::Blob(b) => SqlValue::Blob(b.clone()),
                other => SqlValue::Blob(other.display_text().into_bytes()),
            },
            TypeAffinity::Boolean => self
                .as_bool()
                .map(SqlValue::Boolean)
                .unwrap_or(SqlValue::Null),
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(r) => r.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Integer(_) | SqlValue::Real(_) | SqlValue::Boolean(_) => 1,
            SqlValue::Text(_) => 2,
            SqlValue::Blob(_) => 3,
        }
    }

    /// True three-valued ordering: NULL only ever compares equal to NULL via
    /// `IS`, never ordered against anything through this function — callers
    /// implementing `IS`/`IS NOT` handle NULL explicitly before calling here.
    pub fn compare(&self, other: &SqlValue, collation: Collation) -> Ordering {
        let numeric_self = matches!(
            self,
            SqlValue::Integer(_) | SqlValue::Real(_) | SqlValue::Boolean(_)
        );
        let numeric_other = matches!(
            other,
            SqlValue::Integer(_) | SqlValue::Real(_) | SqlValue::Boolean(_)
        );
        if numeric_self && numeric_other {
            return self
                .as_f64()
                .partial_cmp(&other.as_f64())
                .unwrap_or(Ordering::Equal);
        }
        // Cross-type coercion for comparison: numeric text vs. a number.
        if let (Some(a), Some(b)) = (coerce_numeric_for_compare(self, other)) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        match (self.type_rank(), other.type_rank()) {
            (r1, r2) if r1 != r2 => r1.cmp(&r2),
            _ => match (self, other) {
                (SqlValue::Text(a), SqlValue::Text(b)) => collation.compare(a, b),
                (SqlValue::Blob(a), SqlValue::Blob(b)) => a.cmp(b),
                _ => Ordering::Equal,
            },
        }
    }

    /// `IS` semantics: NULL is IS-equal only to NULL; otherwise identical to
    /// `compare(..) == Equal`.
    pub fn is_same_as(&self, other: &SqlValue, collation: Collation) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => self.compare(other, collation) == Ordering::Equal,
        }
    }
}

/// One side is numeric and the other is text that parses numerically: both
/// get coerced for the comparison. Falls back to `None` (no numeric
/// coercion applies) when neither side qualifies.
fn coerce_numeric_for_compare(a: &SqlValue, b: &SqlValue) -> (Option<f64>, Option<f64>) {
    let a_num = matches!(a, SqlValue::Integer(_) | SqlValue::Real(_) | SqlValue::Boolean(_));
    let b_num = matches!(b, SqlValue::Integer(_) | SqlValue::Real(_) | SqlValue::Boolean(_));
    if a_num && matches!(b, SqlValue::Text(_)) {
        if let Some(bv) = b.as_f64() {
            return (a.as_f64(), Some(bv));
        }
    }
    if b_num && matches!(a, SqlValue::Text(_)) {
        if let Some(av) = a.as_f64() {
            return (Some(av), b.as_f64());
        }
    }
    (None, None)
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_as(other, Collation::Binary)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::Blob(b) => write!(f, "x'{}'", hex(b)),
            SqlValue::Boolean(b) => write!(f, "{}", if *b { 1 } else { 0 }),
        }
    }
}

fn hex(b: &[u8]) -> String {
    b.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// `CAST` target affinity, distinct from the richer `ScalarType` in
/// `crate::types` which also tracks nullability and collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeAffinity {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

/// A finite ordered sequence of `SqlValue`. Rows carry no column names;
/// those live on the producing relation's schema.
pub type Row = Vec<SqlValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_type_compare() {
        let a = SqlValue::Integer(5);
        let b = SqlValue::Text("5".to_string());
        assert_eq!(a.compare(&b, Collation::Binary), Ordering::Equal);
    }

    #[test]
    fn null_is_unordered_but_is_identifies_null() {
        let n = SqlValue::Null;
        let five = SqlValue::Integer(5);
        assert!(n.is_same_as(&SqlValue::Null, Collation::Binary));
        assert!(!n.is_same_as(&five, Collation::Binary));
    }

    #[test]
    fn cast_unrepresentable_is_null() {
        let v = SqlValue::Text("abc".to_string());
        assert!(matches!(v.cast_to(TypeAffinity::Integer), SqlValue::Null));
    }

    #[test]
    fn blob_compare_is_byte_lexicographic() {
        let a = SqlValue::Blob(vec![1, 2, 3]);
        let b = SqlValue::Blob(vec![1, 2, 4]);
        assert_eq!(a.compare(&b, Collation::Binary), Ordering::Less);
    }
}
