//! Virtual-table module contract: the boundary between the executor and any
//! storage backend. `VtabModule` is the factory
//! (`create`/`connect`/`destroy`/`best_access_plan`), `VirtualTable` is the
//! per-connection instance (`query`/`update`/transaction control/DDL).
//!
//! This module only defines the trait boundary. `crate::vtab::mem` is the
//! in-memory MVCC implementation that is this crate's actual deliverable;
//! `crate::vtab::isolation` is the overlay/tombstone wrapper that can sit in
//! front of any implementation of this contract.

pub mod isolation;
pub mod mem;

use crate::error::{ConflictPolicy, QuereusResult};
use crate::row::AttributeId;
use crate::schema::{IndexSchema, SharedTableSchema, TableSchema};
use crate::value::{Row, SqlValue};
use futures_core::stream::BoxStream;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    Is,
    Like,
    Glob,
    Regexp,
    Match,
    IsNull,
    IsNotNull,
}

/// One candidate filter a module may choose to enforce itself.
#[derive(Debug, Clone)]
pub struct FilterConstraint {
    pub column_index: usize,
    pub op: FilterOp,
    pub usable: bool,
}

/// A best-access-plan request: the surviving filter constraints and the
/// planner's a priori row estimate for the table.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub filters: Vec<FilterConstraint>,
    pub estimated_rows: u64,
}

/// What a module commits to when it answers a `best_access_plan` request. A
/// false positive on `handled` is a correctness bug: the executor will not
/// re-check filters the module claims to have enforced.
#[derive(Debug, Clone)]
pub struct BestAccessPlan {
    /// Bitmask over `AccessRequest::filters`, set where the module will
    /// enforce that filter itself.
    pub handled_mask: Vec<bool>,
    pub estimated_rows: u64,
    pub estimated_cost: f64,
    pub chosen_index: Option<String>,
    pub supports_set_or_seek: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SupportsSetOrSeek,
    SupportsIsolation,
    SupportsSavepoints,
    WantsStatements,
    NativeEvents,
}

#[derive(Debug, Clone)]
pub struct FilterInfo {
    pub index_name: Option<String>,
    pub equality_key: Option<Row>,
    pub lower_bound: Option<SqlValue>,
    pub upper_bound: Option<SqlValue>,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlOperation {
    Insert,
    Update,
    Delete,
}

/// The argument to a virtual table's `update` operation, as funneled by the
/// DML executor.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub operation: DmlOperation,
    pub new_values: Option<Row>,
    pub old_key_values: Option<Row>,
    pub on_conflict: ConflictPolicy,
    pub statement_sql: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub rows_affected: u64,
    /// Primary key of the row that ended up live after the operation, when
    /// applicable (insert/update).
    pub new_key: Option<Row>,
}

/// A schema-change request applied to the base layer under a DDL lock.
#[derive(Debug, Clone)]
pub enum AlterSchema {
    AddColumn { name: String, scalar_type: crate::types::ScalarType },
    DropColumn { name: String },
    RenameColumn { from: String, to: String },
}

/// Per-connection instance of a virtual table.
#[async_trait::async_trait]
pub trait VirtualTable: Send + Sync + fmt::Debug {
    fn schema(&self) -> SharedTableSchema;

    async fn query(&self, filter: FilterInfo) -> QuereusResult<BoxStream<'static, QuereusResult<Row>>>;

    async fn update(&self, request: UpdateRequest) -> QuereusResult<UpdateResult>;

    async fn begin(&self) -> QuereusResult<()>;
    async fn commit(&self) -> QuereusResult<()>;
    async fn rollback(&self) -> QuereusResult<()>;

    async fn savepoint(&self, id: u64) -> QuereusResult<()>;
    async fn release(&self, id: u64) -> QuereusResult<()>;
    async fn rollback_to(&self, id: u64) -> QuereusResult<()>;

    async fn rename(&self, new_name: &str) -> QuereusResult<()>;
    async fn create_index(&self, index: IndexSchema) -> QuereusResult<()>;
    async fn drop_index(&self, name: &str) -> QuereusResult<()>;
    async fn alter_schema(&self, change: AlterSchema) -> QuereusResult<()>;

    async fn disconnect(&self) -> QuereusResult<()>;

    fn capabilities(&self) -> Vec<Capability>;
}

/// Module-level factory; one instance per registered module name (e.g.
/// `"memory"`).
#[async_trait::async_trait]
pub trait VtabModule: Send + Sync {
    async fn create(&self, schema: TableSchema) -> QuereusResult<std::sync::Arc<dyn VirtualTable>>;

    async fn connect(
        &self,
        schema: TableSchema,
    ) -> QuereusResult<std::sync::Arc<dyn VirtualTable>>;

    async fn destroy(&self, name: &crate::schema::QualifiedName) -> QuereusResult<()>;

    fn best_access_plan(
        &self,
        schema: &TableSchema,
        request: &AccessRequest,
    ) -> BestAccessPlan;

    fn capabilities(&self) -> Vec<Capability>;
}

/// Helper used by emitters to translate a resolved `ScanPlan` into the
/// `FilterInfo` a `VirtualTable::query` expects, once scalar bounds are
/// evaluated against the ambient row context.
pub fn attribute_placeholder() -> AttributeId {
    AttributeId::fresh()
}
