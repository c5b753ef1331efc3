//! A single client's view of a `Database`: its own resolved virtual-table
//! handles, transaction state, and (optionally) a change-event subscriber.
//!
//! ```text
//! Connection
//! ├── database: Arc<Database>
//! ├── tables: HashMap<QualifiedName, Arc<dyn VirtualTable>>   (lazily resolved)
//! ├── in_transaction: bool
//! └── events: Option<Arc<dyn ChangeSink>>
//! ```
//!
//! Tables are resolved on first reference and cached for the lifetime of the
//! connection; a table connected mid-transaction is immediately put into that
//! transaction so later statements in the same transaction see it correctly.
//! `begin`/`commit`/`rollback` mirror the underlying tables' own idempotence
//! (commit with nothing pending is a no-op) rather than gating on connection
//! state, per the statement-lifecycle idempotence invariant.

use crate::database::Database;
use crate::error::QuereusResult;
use crate::events::ChangeSink;
use crate::plan::logical::LogicalRelNode;
use crate::schema::QualifiedName;
use crate::statement::Statement;
use crate::vtab::VirtualTable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Connection {
    database: Arc<Database>,
    tables: RwLock<HashMap<QualifiedName, Arc<dyn VirtualTable>>>,
    in_transaction: AtomicBool,
    events: RwLock<Option<Arc<dyn ChangeSink>>>,
}

impl Connection {
    pub fn new(database: Arc<Database>) -> Self {
        Connection {
            database,
            tables: RwLock::new(HashMap::new()),
            in_transaction: AtomicBool::new(false),
            events: RwLock::new(None),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn set_change_sink(&self, sink: Arc<dyn ChangeSink>) {
        *self.events.write() = Some(sink);
    }

    pub fn change_sink(&self) -> Option<Arc<dyn ChangeSink>> {
        self.events.read().clone()
    }

    /// Returns this connection's handle for `name`, connecting through the
    /// backing module on first reference.
    pub async fn resolve_table(&self, name: &QualifiedName) -> QuereusResult<Arc<dyn VirtualTable>> {
        if let Some(table) = self.tables.read().get(name).cloned() {
            return Ok(table);
        }
        let schema = self.database.catalog().resolve(name)?;
        let module = self.database.module(&schema.vtab_module)?;
        let table = module.connect((*schema).clone()).await?;
        if self.in_transaction.load(Ordering::Acquire) {
            table.begin().await?;
        }
        self.tables.write().insert(name.clone(), table.clone());
        Ok(table)
    }

    /// All tables resolved so far, for handing to the executor.
    pub fn resolved_tables(&self) -> HashMap<QualifiedName, Arc<dyn VirtualTable>> {
        self.tables.read().clone()
    }

    fn snapshot_tables(&self) -> Vec<Arc<dyn VirtualTable>> {
        self.tables.read().values().cloned().collect()
    }

    pub async fn begin(&self) -> QuereusResult<()> {
        for table in self.snapshot_tables() {
            table.begin().await?;
        }
        self.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn commit(&self) -> QuereusResult<()> {
        for table in self.snapshot_tables() {
            table.commit().await?;
        }
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    pub async fn rollback(&self) -> QuereusResult<()> {
        for table in self.snapshot_tables() {
            table.rollback().await?;
        }
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub fn prepare(self: &Arc<Self>, batch: Vec<LogicalRelNode>) -> QuereusResult<Statement> {
        Statement::prepare(Arc::clone(self), batch)
    }
}
