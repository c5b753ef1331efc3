//! Table schema definitions and the schema catalog.
//!
//! A `TableSchema` is the compile-time description of one table: its
//! qualified name, columns, primary key, secondary indexes, check
//! constraints and the vtab module backing it. The `Catalog` resolves
//! schema-qualified names to `TableSchema`s for the planner.

pub mod catalog;

pub use catalog::Catalog;

use crate::types::ScalarType;
use crate::value::SqlValue;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub scalar_type: ScalarType,
    pub not_null: bool,
    pub default: Option<SqlValue>,
    /// Generated-column expression source, if any; evaluated by the emitter
    /// at insert/update time rather than stored directly in this struct.
    pub generated_expr: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        ColumnDef {
            name: name.into(),
            scalar_type,
            not_null: false,
            default: None,
            generated_expr: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct IndexColumn {
    pub column_index: usize,
    pub direction: SortDirection,
    pub collation: String,
}

#[derive(Debug, Clone)]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct CheckConstraint {
    pub name: String,
    pub expr_source: String,
}

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        QualifiedName {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn main(name: impl Into<String>) -> Self {
        QualifiedName::new("main", name)
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Compile-time description of a table, shared (`Arc`) between the catalog,
/// compiled plans and the vtab instance so schema changes don't require
/// rewriting already-captured references in other compiled statements —
/// those simply keep the old `Arc` until they recompile.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: QualifiedName,
    pub columns: Vec<ColumnDef>,
    /// Column indices making up the primary key, with per-column direction.
    pub primary_key: Vec<(usize, SortDirection)>,
    pub indexes: Vec<IndexSchema>,
    pub checks: Vec<CheckConstraint>,
    pub vtab_module: String,
    pub vtab_config: String,
    pub estimated_rows: u64,
}

impl TableSchema {
    pub fn new(name: QualifiedName, columns: Vec<ColumnDef>, vtab_module: impl Into<String>) -> Self {
        TableSchema {
            name,
            columns,
            primary_key: Vec::new(),
            indexes: Vec::new(),
            checks: Vec::new(),
            vtab_module: vtab_module.into(),
            vtab_config: String::new(),
            estimated_rows: 0,
        }
    }

    pub fn with_primary_key(mut self, pk: Vec<(usize, SortDirection)>) -> Self {
        self.primary_key = pk;
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_indices(&self) -> Vec<usize> {
        self.primary_key.iter().map(|(i, _)| *i).collect()
    }
}

pub type SharedTableSchema = Arc<TableSchema>;
