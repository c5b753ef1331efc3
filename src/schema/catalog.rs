//! Schema catalog: resolves schema-qualified table names to `TableSchema`s.
//!
//! Compiled statements capture the `Arc<TableSchema>` they resolved at
//! compile time (the emission context, see `crate::emit`), so later DDL
//! against the catalog never invalidates an already-compiled plan; it only
//! affects statements compiled afterward.

use super::{QualifiedName, SharedTableSchema, TableSchema};
use crate::error::{QuereusError, QuereusResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<QualifiedName, SharedTableSchema>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, schema: TableSchema) -> SharedTableSchema {
        let shared = Arc::new(schema);
        self.tables
            .write()
            .insert(shared.name.clone(), shared.clone());
        shared
    }

    pub fn resolve(&self, name: &QualifiedName) -> QuereusResult<SharedTableSchema> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuereusError::planning(format!("no such table: {name}")))
    }

    pub fn drop_table(&self, name: &QualifiedName) -> QuereusResult<()> {
        self.tables
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| QuereusError::planning(format!("no such table: {name}")))
    }

    /// Replace a table's schema in place (DDL: add/drop/rename column, add
    /// index). The caller builds the new `TableSchema` from the old one.
    pub fn replace(&self, schema: TableSchema) -> SharedTableSchema {
        self.register(schema)
    }

    pub fn table_names(&self) -> Vec<QualifiedName> {
        self.tables.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, SortDirection};
    use crate::types::{ScalarKind, ScalarType};

    #[test]
    fn register_and_resolve_round_trips() {
        let catalog = Catalog::new();
        let name = QualifiedName::main("t");
        let schema = TableSchema::new(
            name.clone(),
            vec![ColumnDef::new("id", ScalarType::new(ScalarKind::Integer))],
            "memory",
        )
        .with_primary_key(vec![(0, SortDirection::Asc)]);
        catalog.register(schema);
        assert!(catalog.resolve(&name).is_ok());
    }

    #[test]
    fn resolve_missing_table_is_planning_error() {
        let catalog = Catalog::new();
        let err = catalog.resolve(&QualifiedName::main("missing")).unwrap_err();
        assert_eq!(err.code(), "PLANNING");
    }
}
