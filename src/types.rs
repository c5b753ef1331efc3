//! Scalar and relation type descriptors.
//!
//! These are the compile-time types plan nodes carry: a `ScalarType` for
//! every scalar-capable node, a `RelationType` (ordered column descriptors)
//! for every relational node.

use crate::value::TypeAffinity;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    /// Result type not statically known (e.g. a parameter or dynamic function).
    Any,
}

impl ScalarKind {
    pub fn affinity(self) -> Option<TypeAffinity> {
        match self {
            ScalarKind::Integer => Some(TypeAffinity::Integer),
            ScalarKind::Real => Some(TypeAffinity::Real),
            ScalarKind::Text => Some(TypeAffinity::Text),
            ScalarKind::Blob => Some(TypeAffinity::Blob),
            ScalarKind::Boolean => Some(TypeAffinity::Boolean),
            ScalarKind::Null | ScalarKind::Any => None,
        }
    }
}

/// Logical kind + nullability + collation + optional physical hint.
#[derive(Debug, Clone)]
pub struct ScalarType {
    pub kind: ScalarKind,
    pub nullable: bool,
    pub collation: String,
    /// Optional storage hint (e.g. a vtab's preferred physical width); opaque
    /// to the core executor.
    pub physical_hint: Option<String>,
}

impl ScalarType {
    pub fn new(kind: ScalarKind) -> Self {
        ScalarType {
            kind,
            nullable: true,
            collation: "BINARY".to_string(),
            physical_hint: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = collation.into();
        self
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.kind, if self.nullable { "?" } else { "" })
    }
}

/// One column of a relation's output shape.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub scalar_type: ScalarType,
}

/// Whether a relation is known to produce distinct rows (a set) or may repeat
/// them (a bag). Consulted by DISTINCT/UNION elision during optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Set,
    Bag,
}

/// Ordered sequence of column descriptors plus optional key sets and the
/// set/bag flag, describing the output of a relational plan node.
#[derive(Debug, Clone)]
pub struct RelationType {
    pub columns: Vec<ColumnInfo>,
    /// Column-index groups known to uniquely identify a row, if any.
    pub keys: Vec<Vec<usize>>,
    pub cardinality: Cardinality,
}

impl RelationType {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        RelationType {
            columns,
            keys: Vec::new(),
            cardinality: Cardinality::Bag,
        }
    }

    pub fn with_keys(mut self, keys: Vec<Vec<usize>>) -> Self {
        self.keys = keys;
        self
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
