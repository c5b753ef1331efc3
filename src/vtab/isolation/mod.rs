//! Connection-isolation overlay.
//!
//! Wraps any `VirtualTable` with a per-connection overlay of pending
//! inserts/updates and tombstoned deletes, merged against the wrapped
//! table's own committed view at scan time. This lets a storage backend
//! that has no native transaction concept (or whose native transactions
//! are coarser than this engine wants) still present snapshot-style
//! per-connection isolation, per the merge-iterator contract in the design.

mod merge;

pub use merge::merge_streams;

use crate::error::{ConflictPolicy, QuereusError, QuereusResult};
use crate::schema::{IndexSchema, SharedTableSchema};
use crate::value::{Row, SqlValue};
use crate::vtab::{
    AlterSchema, Capability, DmlOperation, FilterInfo, UpdateRequest, UpdateResult, VirtualTable,
};
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One connection's pending overlay: rows it has written or deleted that
/// are not yet visible to any other connection.
#[derive(Default, Clone)]
struct Overlay {
    written: Vec<Row>,
    tombstoned_keys: Vec<Row>,
}

/// Wraps a `VirtualTable` with per-connection overlay state keyed by an
/// opaque connection id, so several connections can hold independent
/// uncommitted changes against one underlying instance concurrently.
pub struct IsolatedTable {
    inner: Arc<dyn VirtualTable>,
    pk_columns: Vec<usize>,
    overlays: Arc<DashMap<u64, Overlay>>,
    conn_id: u64,
    next_conn: Arc<AtomicU64>,
}

impl fmt::Debug for IsolatedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedTable").field("conn_id", &self.conn_id).finish()
    }
}

impl IsolatedTable {
    pub fn wrap(inner: Arc<dyn VirtualTable>, pk_columns: Vec<usize>) -> Self {
        IsolatedTable {
            inner,
            pk_columns,
            overlays: Arc::new(DashMap::new()),
            conn_id: 0,
            next_conn: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn for_connection(&self) -> Self {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        IsolatedTable {
            inner: self.inner.clone(),
            pk_columns: self.pk_columns.clone(),
            overlays: self.overlays.clone(),
            conn_id,
            next_conn: self.next_conn.clone(),
        }
    }

    fn pk_of(&self, row: &[SqlValue]) -> Row {
        self.pk_columns.iter().map(|i| row[*i].clone()).collect()
    }

    fn matches_key(&self, row: &[SqlValue], key: &[SqlValue]) -> bool {
        self.pk_columns.iter().zip(key).all(|(i, k)| &row[*i] == k)
    }
}

#[async_trait::async_trait]
impl VirtualTable for IsolatedTable {
    fn schema(&self) -> SharedTableSchema {
        self.inner.schema()
    }

    async fn query(&self, filter: FilterInfo) -> QuereusResult<BoxStream<'static, QuereusResult<Row>>> {
        let underlying = self.inner.query(filter).await?;
        let overlay = self
            .overlays
            .get(&self.conn_id)
            .map(|o| o.clone())
            .unwrap_or_default();

        if overlay.written.is_empty() && overlay.tombstoned_keys.is_empty() {
            return Ok(underlying);
        }

        let pk_columns = self.pk_columns.clone();
        let tombstones = overlay.tombstoned_keys.clone();
        let filtered = underlying.filter_map(move |item| {
            let tombstones = tombstones.clone();
            let pk_columns = pk_columns.clone();
            async move {
                match item {
                    Ok(row) => {
                        let suppressed = tombstones.iter().any(|key| {
                            pk_columns.iter().zip(key).all(|(i, k)| &row[*i] == k)
                        });
                        if suppressed {
                            None
                        } else {
                            Some(Ok(row))
                        }
                    }
                    Err(e) => Some(Err(e)),
                }
            }
        });

        let mut written = overlay.written;
        let pk_columns = self.pk_columns.clone();
        written.sort_by(|a, b| {
            pk_columns
                .iter()
                .map(|i| a[*i].compare(&b[*i], crate::value::Collation::Binary))
                .find(|o| *o != std::cmp::Ordering::Equal)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let overlay_rows: Vec<QuereusResult<Row>> = written.into_iter().map(Ok).collect();
        let merged = merge_streams(
            Box::pin(filtered),
            Box::pin(stream::iter(overlay_rows)),
            self.pk_columns.clone(),
        );
        Ok(Box::pin(merged))
    }

    async fn update(&self, request: UpdateRequest) -> QuereusResult<UpdateResult> {
        match request.operation {
            DmlOperation::Insert => {
                let row = request
                    .new_values
                    .ok_or_else(|| QuereusError::internal("insert without new values"))?;
                let pk = self.pk_of(&row);
                let mut overlay = self.overlays.entry(self.conn_id).or_default();
                if overlay.written.iter().any(|r| self.matches_key(r, &pk)) {
                    return match request.on_conflict {
                        ConflictPolicy::Ignore => Ok(UpdateResult {
                            rows_affected: 0,
                            new_key: None,
                        }),
                        other => Err(QuereusError::constraint(
                            "UNIQUE constraint failed: primary key",
                            other,
                        )),
                    };
                }
                overlay.written.push(row);
                Ok(UpdateResult {
                    rows_affected: 1,
                    new_key: Some(pk),
                })
            }
            DmlOperation::Update => {
                let old_key = request
                    .old_key_values
                    .ok_or_else(|| QuereusError::internal("update without old key"))?;
                let new_row = request
                    .new_values
                    .ok_or_else(|| QuereusError::internal("update without new values"))?;
                let mut overlay = self.overlays.entry(self.conn_id).or_default();
                overlay.written.retain(|r| !self.matches_key(r, &old_key));
                overlay.tombstoned_keys.push(old_key);
                let new_pk = self.pk_of(&new_row);
                overlay.written.push(new_row);
                Ok(UpdateResult {
                    rows_affected: 1,
                    new_key: Some(new_pk),
                })
            }
            DmlOperation::Delete => {
                let old_key = request
                    .old_key_values
                    .ok_or_else(|| QuereusError::internal("delete without old key"))?;
                let mut overlay = self.overlays.entry(self.conn_id).or_default();
                overlay.written.retain(|r| !self.matches_key(r, &old_key));
                overlay.tombstoned_keys.push(old_key);
                Ok(UpdateResult {
                    rows_affected: 1,
                    new_key: None,
                })
            }
        }
    }

    async fn begin(&self) -> QuereusResult<()> {
        self.overlays.entry(self.conn_id).or_default();
        Ok(())
    }

    async fn commit(&self) -> QuereusResult<()> {
        let overlay = self.overlays.remove(&self.conn_id).map(|(_, o)| o).unwrap_or_default();
        for key in &overlay.tombstoned_keys {
            let _ = self
                .inner
                .update(UpdateRequest {
                    operation: DmlOperation::Delete,
                    new_values: None,
                    old_key_values: Some(key.clone()),
                    on_conflict: ConflictPolicy::Ignore,
                    statement_sql: None,
                })
                .await;
        }
        for row in overlay.written {
            self.inner
                .update(UpdateRequest {
                    operation: DmlOperation::Insert,
                    new_values: Some(row),
                    old_key_values: None,
                    on_conflict: ConflictPolicy::Replace,
                    statement_sql: None,
                })
                .await?;
        }
        self.inner.commit().await
    }

    async fn rollback(&self) -> QuereusResult<()> {
        self.overlays.remove(&self.conn_id);
        self.inner.rollback().await
    }

    async fn savepoint(&self, id: u64) -> QuereusResult<()> {
        self.inner.savepoint(id).await
    }

    async fn release(&self, id: u64) -> QuereusResult<()> {
        self.inner.release(id).await
    }

    async fn rollback_to(&self, id: u64) -> QuereusResult<()> {
        self.inner.rollback_to(id).await
    }

    async fn rename(&self, new_name: &str) -> QuereusResult<()> {
        self.inner.rename(new_name).await
    }

    async fn create_index(&self, index: IndexSchema) -> QuereusResult<()> {
        self.inner.create_index(index).await
    }

    async fn drop_index(&self, name: &str) -> QuereusResult<()> {
        self.inner.drop_index(name).await
    }

    async fn alter_schema(&self, change: AlterSchema) -> QuereusResult<()> {
        self.inner.alter_schema(change).await
    }

    async fn disconnect(&self) -> QuereusResult<()> {
        self.overlays.remove(&self.conn_id);
        self.inner.disconnect().await
    }

    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = self.inner.capabilities();
        if !caps.contains(&Capability::SupportsIsolation) {
            caps.push(Capability::SupportsIsolation);
        }
        caps
    }
}
