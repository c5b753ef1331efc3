//! In-memory MVCC virtual table. A stack of
//! immutable layers — a base layer plus per-transaction overlays — built on
//! order-preserving persistent B-trees (`im::OrdMap`), giving snapshot
//! isolation, savepoints and background-safe layer collapse.

pub mod cursor;
pub mod index;
pub mod key;
pub mod layer;

use crate::error::{ConflictPolicy, QuereusError, QuereusResult};
use crate::schema::{IndexSchema, QualifiedName, SharedTableSchema, SortDirection, TableSchema};
use crate::value::{Collation, Row, SqlValue};
use crate::vtab::{
    AccessRequest, AlterSchema, BestAccessPlan, Capability, DmlOperation, FilterInfo, FilterOp,
    UpdateRequest, UpdateResult, VirtualTable, VtabModule,
};
use futures_core::stream::BoxStream;
use futures_util::stream;
use im::OrdMap;
use key::EncodedKey;
use layer::{Layer, PrimaryEntry, TransactionLayer, TransactionSnapshot};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// How many committed transaction layers may accumulate on top of the base
/// before the manager folds the oldest one in.
pub const DEFAULT_COLLAPSE_THRESHOLD: usize = 16;

fn pk_columns(schema: &TableSchema) -> Vec<(usize, SortDirection, Collation)> {
    schema
        .primary_key
        .iter()
        .map(|(idx, dir)| {
            let collation = match schema.columns[*idx].scalar_type.collation.to_ascii_uppercase().as_str() {
                "NOCASE" => Collation::NoCase,
                "RTRIM" => Collation::RTrim,
                _ => Collation::Binary,
            };
            (*idx, *dir, collation)
        })
        .collect()
}

fn encode_pk(schema: &TableSchema, row: &[SqlValue]) -> EncodedKey {
    key::encode_key(row, &pk_columns(schema))
}

/// Per-connection transaction state, per the table's transaction state machine.
#[derive(Default)]
struct ConnectionState {
    pending: Option<TransactionLayer>,
    savepoints: Vec<(u64, TransactionSnapshot)>,
    /// The layer this connection currently reads through when there is no
    /// pending transaction; fixed for the duration of any open cursor.
    read_layer: Option<Layer>,
}

/// Owns the layer chain for one table and the per-connection transaction
/// state reading/writing it. Mutated under `write_lock` only for commit,
/// rollback, DDL and collapse; ordinary reads on a connection's frozen read
/// layer take no lock.
pub struct MvccManager {
    schema: RwLock<SharedTableSchema>,
    committed: RwLock<Layer>,
    connections: RwLock<HashMap<u64, ConnectionState>>,
    write_lock: Mutex<()>,
    collapse_threshold: usize,
    next_savepoint_id: AtomicU64,
}

impl MvccManager {
    pub fn new(schema: SharedTableSchema) -> Self {
        MvccManager {
            schema: RwLock::new(schema),
            committed: RwLock::new(Layer::new_base()),
            connections: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            collapse_threshold: DEFAULT_COLLAPSE_THRESHOLD,
            next_savepoint_id: AtomicU64::new(1),
        }
    }

    fn schema(&self) -> SharedTableSchema {
        self.schema.read().clone()
    }

    /// The layer a fresh cursor on this connection should read through:
    /// the pending layer if one is open, else the connection's frozen read
    /// layer, defaulting to the manager's current committed layer.
    fn read_layer_for(&self, conn: u64) -> Layer {
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        if let Some(pending) = &state.pending {
            return Layer::Transaction(Arc::new(pending.clone()));
        }
        if state.read_layer.is_none() {
            state.read_layer = Some(self.committed.read().clone());
        }
        state.read_layer.clone().unwrap()
    }

    /// Lazily begin a pending transaction layer over the connection's
    /// current read layer, per the no-tx -> tx-open transition.
    fn ensure_pending(&self, conn: u64) {
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        if state.pending.is_none() {
            let parent = state
                .read_layer
                .clone()
                .unwrap_or_else(|| self.committed.read().clone());
            state.pending = Some(TransactionLayer::new(parent));
        }
    }

    #[instrument(skip(self))]
    pub fn begin(&self, conn: u64) {
        self.ensure_pending(conn);
    }

    #[instrument(skip(self))]
    pub fn commit(&self, conn: u64) -> QuereusResult<()> {
        let guard = self.write_lock.lock();
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        let Some(mut pending) = state.pending.take() else {
            return Ok(()); // idempotent: commit with nothing pending is a no-op
        };
        pending.is_committed = true;
        let committed_layer = Layer::Transaction(Arc::new(pending));
        *self.committed.write() = committed_layer.clone();
        state.read_layer = Some(committed_layer);
        state.savepoints.clear();
        drop(conns);
        self.maybe_collapse(&guard);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn rollback(&self, conn: u64) {
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        state.pending = None;
        state.savepoints.clear();
    }

    pub fn savepoint(&self, conn: u64) -> QuereusResult<u64> {
        self.ensure_pending(conn);
        let id = self.next_savepoint_id.fetch_add(1, AtomicOrdering::Relaxed);
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        let snap = state.pending.as_ref().unwrap().snapshot();
        state.savepoints.push((id, snap));
        Ok(id)
    }

    pub fn release(&self, conn: u64, id: u64) -> QuereusResult<()> {
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        state.savepoints.retain(|(sid, _)| *sid != id);
        Ok(())
    }

    pub fn rollback_to(&self, conn: u64, id: u64) -> QuereusResult<()> {
        let mut conns = self.connections.write();
        let state = conns.entry(conn).or_default();
        let pos = state
            .savepoints
            .iter()
            .position(|(sid, _)| *sid == id)
            .ok_or_else(|| QuereusError::misuse("no such savepoint"))?;
        let (_, snap) = state.savepoints[pos].clone();
        state.savepoints.truncate(pos + 1);
        if let Some(pending) = state.pending.as_mut() {
            pending.restore(snap);
        }
        Ok(())
    }

    /// Fold the oldest committed transaction layer into the base whenever
    /// the chain exceeds the threshold. Takes `_guard` as proof the caller
    /// already holds `write_lock` (it is not reentrant); fails atomically
    /// (the base is only ever replaced by a fresh `Arc` built from a
    /// private working copy, never mutated in place).
    fn maybe_collapse(&self, _guard: &MutexGuard<'_, ()>) {
        loop {
            let current = self.committed.read().clone();
            let chain_len = count_layers(&current);
            if chain_len <= self.collapse_threshold {
                return;
            }
            let Some(new_committed) = collapse_oldest(&current) else {
                return;
            };
            *self.committed.write() = new_committed;
            debug!(chain_len, "collapsed oldest committed layer into base");
        }
    }

    pub fn disconnect(&self, conn: u64) {
        self.connections.write().remove(&conn);
    }
}

fn count_layers(layer: &Layer) -> usize {
    let mut n = 0;
    let mut cur = Some(layer.clone());
    while let Some(l) = cur {
        match &l {
            Layer::Base(_) => break,
            Layer::Transaction(t) => {
                n += 1;
                cur = Some(t.parent.clone());
            }
        }
    }
    n
}

/// Walk to the oldest transaction layer (the one directly over the base)
/// and fold its primary/secondary modifications into a new base, splicing
/// the remaining chain back on top. Returns `None` if there is nothing to
/// collapse (the chain is just the base, or a single layer over it).
fn collapse_oldest(top: &Layer) -> Option<Layer> {
    // Collect the chain from `top` down to (but excluding) the base.
    let mut chain = Vec::new();
    let mut cur = top.clone();
    let base = loop {
        match cur {
            Layer::Base(b) => break b,
            Layer::Transaction(t) => {
                chain.push(t.clone());
                cur = t.parent.clone();
            }
        }
    };
    let oldest = chain.pop()?; // the layer directly above the base

    let mut new_base = (*base).clone();
    for (pk, entry) in oldest.primary.iter() {
        match entry {
            PrimaryEntry::Row(row) => {
                new_base.primary.insert(pk.clone(), row.clone());
            }
            PrimaryEntry::Tombstone => {
                new_base.primary.remove(pk);
            }
        }
    }
    for (index_name, delta_tree) in oldest.secondary.iter() {
        let base_tree = new_base
            .secondary
            .entry(index_name.clone())
            .or_insert_with(OrdMap::new);
        for (index_key, delta) in delta_tree.iter() {
            let mut set = base_tree.get(index_key).cloned().unwrap_or_default();
            for pk in &delta.removed {
                set.remove(pk);
            }
            for pk in &delta.added {
                set.insert(pk.clone());
            }
            if set.is_empty() {
                base_tree.remove(index_key);
            } else {
                base_tree.insert(index_key.clone(), set);
            }
        }
    }
    let new_base_layer = Layer::Base(Arc::new(new_base));

    // Re-link the remaining chain (youngest first in `chain`) back on top of
    // the new base, oldest-of-the-rest first.
    let mut rebuilt = new_base_layer;
    for tx in chain.into_iter().rev() {
        let mut relinked = (*tx).clone();
        relinked.parent = rebuilt;
        rebuilt = Layer::Transaction(Arc::new(relinked));
    }
    Some(rebuilt)
}

/// The in-memory table instance, implementing the `VirtualTable` contract
/// over an `MvccManager`.
#[derive(Clone)]
pub struct MemTable {
    manager: Arc<MvccManager>,
    conn_id: u64,
}

impl std::fmt::Debug for MemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTable").field("conn_id", &self.conn_id).finish()
    }
}

impl MemTable {
    pub fn new(schema: TableSchema, conn_id: u64) -> Self {
        MemTable {
            manager: Arc::new(MvccManager::new(Arc::new(schema))),
            conn_id,
        }
    }

    /// Open another connection's handle onto the same underlying table.
    pub fn for_connection(&self, conn_id: u64) -> Self {
        MemTable {
            manager: self.manager.clone(),
            conn_id,
        }
    }

    fn apply_insert(
        &self,
        schema: &TableSchema,
        layer_before: &Layer,
        pending: &mut TransactionLayer,
        new_row: Row,
        on_conflict: ConflictPolicy,
    ) -> QuereusResult<UpdateResult> {
        let pk_values: Vec<SqlValue> = schema
            .primary_key_indices()
            .iter()
            .map(|i| new_row[*i].clone())
            .collect();
        let pk = encode_pk(schema, &pk_values);
        let existing = cursor::resolve_primary(layer_before, &pk);

        if existing.is_some() {
            match on_conflict {
                ConflictPolicy::Abort | ConflictPolicy::Rollback => {
                    return Err(QuereusError::constraint(
                        "UNIQUE constraint failed: primary key",
                        on_conflict,
                    ));
                }
                ConflictPolicy::Fail => {
                    return Err(QuereusError::constraint(
                        "UNIQUE constraint failed: primary key",
                        ConflictPolicy::Fail,
                    ));
                }
                ConflictPolicy::Ignore => {
                    return Ok(UpdateResult {
                        rows_affected: 0,
                        new_key: None,
                    });
                }
                ConflictPolicy::Replace => {
                    // Tombstone-then-insert within the same layer collapses
                    // to a single write, same as any other insert below.
                }
            }
        }

        self.write_row_indexes(schema, pending, &pk, existing.as_ref(), Some(&new_row));
        pending.primary.insert(pk.clone(), PrimaryEntry::Row(new_row));
        Ok(UpdateResult {
            rows_affected: 1,
            new_key: Some(pk_values),
        })
    }

    fn write_row_indexes(
        &self,
        schema: &TableSchema,
        pending: &mut TransactionLayer,
        pk: &EncodedKey,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) {
        for idx in &schema.indexes {
            let tree = pending
                .secondary
                .entry(idx.name.clone())
                .or_insert_with(OrdMap::new);
            index::apply_row_change(tree, idx, pk, old_row, new_row);
        }
    }
}

#[async_trait::async_trait]
impl VirtualTable for MemTable {
    fn schema(&self) -> SharedTableSchema {
        self.manager.schema()
    }

    #[instrument(skip(self, filter))]
    async fn query(&self, filter: FilterInfo) -> QuereusResult<BoxStream<'static, QuereusResult<Row>>> {
        let schema = self.manager.schema();
        let layer = self.manager.read_layer_for(self.conn_id);

        let rows: Vec<Row> = if let Some(index_name) = &filter.index_name {
            let idx = schema
                .indexes
                .iter()
                .find(|i| &i.name == index_name)
                .ok_or_else(|| QuereusError::planning(format!("no such index: {index_name}")))?;
            let eq = filter
                .equality_key
                .clone()
                .ok_or_else(|| QuereusError::unsupported("secondary scan requires an equality key"))?;
            let enc_key = key::encode_index_key(&eq, &idx.columns);
            let pks = cursor::resolve_secondary(&layer, index_name, &enc_key);
            pks.iter()
                .filter_map(|pk| cursor::resolve_primary(&layer, pk))
                .collect()
        } else {
            let lower = filter
                .lower_bound
                .as_ref()
                .map(|v| Bound::Included(encode_pk(&schema, std::slice::from_ref(v))))
                .unwrap_or(Bound::Unbounded);
            let upper = filter
                .upper_bound
                .as_ref()
                .map(|v| Bound::Included(encode_pk(&schema, std::slice::from_ref(v))))
                .unwrap_or(Bound::Unbounded);
            cursor::scan_primary(&layer, lower, upper, !filter.descending)
                .into_iter()
                .map(|(_, row)| row)
                .collect()
        };

        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }

    #[instrument(skip(self, request))]
    async fn update(&self, request: UpdateRequest) -> QuereusResult<UpdateResult> {
        self.manager.ensure_pending(self.conn_id);
        let schema = self.manager.schema();

        let mut conns = self.manager.connections.write();
        let state = conns.get_mut(&self.conn_id).expect("ensure_pending just populated this");
        let pending = state.pending.as_mut().expect("ensure_pending just populated this");
        let layer_before = pending.parent.clone();

        let result = match request.operation {
            DmlOperation::Insert => {
                let new_row = request
                    .new_values
                    .ok_or_else(|| QuereusError::internal("insert without new values"))?;
                self.apply_insert(&schema, &layer_before, pending, new_row, request.on_conflict)?
            }
            DmlOperation::Update => {
                let old_key = request
                    .old_key_values
                    .ok_or_else(|| QuereusError::internal("update without old key"))?;
                let new_row = request
                    .new_values
                    .ok_or_else(|| QuereusError::internal("update without new values"))?;
                let old_pk = encode_pk(&schema, &old_key);
                let old_row = cursor::resolve_primary(&Layer::Transaction(Arc::new(pending.clone())), &old_pk);
                let new_pk_values: Vec<SqlValue> = schema
                    .primary_key_indices()
                    .iter()
                    .map(|i| new_row[*i].clone())
                    .collect();
                let new_pk = encode_pk(&schema, &new_pk_values);

                self.write_row_indexes(&schema, pending, &old_pk, old_row.as_ref(), None);
                if new_pk != old_pk {
                    pending.primary.insert(old_pk.clone(), PrimaryEntry::Tombstone);
                    self.write_row_indexes(&schema, pending, &new_pk, None, Some(&new_row));
                } else {
                    self.write_row_indexes(&schema, pending, &new_pk, None, Some(&new_row));
                }
                pending.primary.insert(new_pk.clone(), PrimaryEntry::Row(new_row));
                UpdateResult {
                    rows_affected: 1,
                    new_key: Some(new_pk_values),
                }
            }
            DmlOperation::Delete => {
                let old_key = request
                    .old_key_values
                    .ok_or_else(|| QuereusError::internal("delete without old key"))?;
                let pk = encode_pk(&schema, &old_key);
                let old_row = cursor::resolve_primary(&Layer::Transaction(Arc::new(pending.clone())), &pk);
                self.write_row_indexes(&schema, pending, &pk, old_row.as_ref(), None);
                pending.primary.insert(pk, PrimaryEntry::Tombstone);
                UpdateResult {
                    rows_affected: 1,
                    new_key: None,
                }
            }
        };
        Ok(result)
    }

    async fn begin(&self) -> QuereusResult<()> {
        self.manager.begin(self.conn_id);
        Ok(())
    }

    async fn commit(&self) -> QuereusResult<()> {
        self.manager.commit(self.conn_id)
    }

    async fn rollback(&self) -> QuereusResult<()> {
        self.manager.rollback(self.conn_id);
        Ok(())
    }

    async fn savepoint(&self, id: u64) -> QuereusResult<()> {
        let actual = self.manager.savepoint(self.conn_id)?;
        debug_assert_eq!(actual, id, "caller-provided ids are advisory only here");
        Ok(())
    }

    async fn release(&self, id: u64) -> QuereusResult<()> {
        self.manager.release(self.conn_id, id)
    }

    async fn rollback_to(&self, id: u64) -> QuereusResult<()> {
        self.manager.rollback_to(self.conn_id, id)
    }

    async fn rename(&self, new_name: &str) -> QuereusResult<()> {
        let mut schema = self.manager.schema.write();
        let mut updated = (**schema).clone();
        updated.name = QualifiedName::new(updated.name.schema.clone(), new_name.to_string());
        *schema = Arc::new(updated);
        Ok(())
    }

    async fn create_index(&self, index: IndexSchema) -> QuereusResult<()> {
        let _guard = self.manager.write_lock.lock();
        let mut schema_lock = self.manager.schema.write();
        let mut updated = (**schema_lock).clone();
        updated.indexes.push(index.clone());
        *schema_lock = Arc::new(updated);
        drop(schema_lock);

        // Rebuild the new index from the current base (secondary indexes
        // only need to exist going forward from here for the in-memory
        // engine's collapse path; already-committed rows are indexed
        // lazily, mirroring the base rebuild spec.md describes for DDL).
        let mut committed = self.manager.committed.write();
        if let Layer::Base(base) = &*committed {
            let mut new_base = (**base).clone();
            let mut tree = OrdMap::new();
            for (pk, row) in new_base.primary.iter() {
                let enc = key::encode_index_key(row, &index.columns);
                let mut set: im::OrdSet<EncodedKey> = tree.get(&enc).cloned().unwrap_or_default();
                set.insert(pk.clone());
                tree.insert(enc, set);
            }
            new_base.secondary.insert(index.name.clone(), tree);
            *committed = Layer::Base(Arc::new(new_base));
        }
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> QuereusResult<()> {
        let _guard = self.manager.write_lock.lock();
        let mut schema_lock = self.manager.schema.write();
        let mut updated = (**schema_lock).clone();
        updated.indexes.retain(|i| i.name != name);
        *schema_lock = Arc::new(updated);
        Ok(())
    }

    async fn alter_schema(&self, change: AlterSchema) -> QuereusResult<()> {
        let _guard = self.manager.write_lock.lock();
        let mut schema_lock = self.manager.schema.write();
        let mut updated = (**schema_lock).clone();
        match change {
            AlterSchema::AddColumn { name, scalar_type } => {
                updated.columns.push(crate::schema::ColumnDef::new(name, scalar_type));
            }
            AlterSchema::DropColumn { name } => {
                let idx = updated
                    .column_index(&name)
                    .ok_or_else(|| QuereusError::planning(format!("no such column: {name}")))?;
                updated.columns.remove(idx);
            }
            AlterSchema::RenameColumn { from, to } => {
                let idx = updated
                    .column_index(&from)
                    .ok_or_else(|| QuereusError::planning(format!("no such column: {from}")))?;
                updated.columns[idx].name = to;
            }
        }
        *schema_lock = Arc::new(updated);
        Ok(())
    }

    async fn disconnect(&self) -> QuereusResult<()> {
        self.manager.disconnect(self.conn_id);
        Ok(())
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::SupportsSetOrSeek,
            Capability::SupportsIsolation,
            Capability::SupportsSavepoints,
        ]
    }
}

/// The `"memory"` vtab module: creates/connects `MemTable`s.
pub struct MemoryModule {
    tables: RwLock<HashMap<QualifiedName, Arc<MvccManager>>>,
    next_conn: AtomicU64,
}

impl Default for MemoryModule {
    fn default() -> Self {
        MemoryModule {
            tables: RwLock::new(HashMap::new()),
            next_conn: AtomicU64::new(1),
        }
    }
}

impl MemoryModule {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_conn_id(&self) -> u64 {
        self.next_conn.fetch_add(1, AtomicOrdering::Relaxed)
    }
}

#[async_trait::async_trait]
impl VtabModule for MemoryModule {
    async fn create(&self, schema: TableSchema) -> QuereusResult<Arc<dyn VirtualTable>> {
        let name = schema.name.clone();
        let manager = Arc::new(MvccManager::new(Arc::new(schema)));
        self.tables.write().insert(name, manager.clone());
        let conn_id = self.fresh_conn_id();
        Ok(Arc::new(MemTable { manager, conn_id }))
    }

    async fn connect(&self, schema: TableSchema) -> QuereusResult<Arc<dyn VirtualTable>> {
        let name = schema.name.clone();
        let manager = self
            .tables
            .write()
            .entry(name)
            .or_insert_with(|| Arc::new(MvccManager::new(Arc::new(schema))))
            .clone();
        let conn_id = self.fresh_conn_id();
        Ok(Arc::new(MemTable { manager, conn_id }))
    }

    async fn destroy(&self, name: &QualifiedName) -> QuereusResult<()> {
        self.tables.write().remove(name);
        Ok(())
    }

    fn best_access_plan(&self, schema: &TableSchema, request: &AccessRequest) -> BestAccessPlan {
        // Prefer an equality constraint on a declared index or the primary
        // key; otherwise fall back to a full sequential scan.
        let mut handled_mask = vec![false; request.filters.len()];
        let mut chosen_index = None;
        let mut best_cost = request.estimated_rows.max(1) as f64;

        for (i, constraint) in request.filters.iter().enumerate() {
            if constraint.op != FilterOp::Eq || !constraint.usable {
                continue;
            }
            if schema.primary_key_indices().contains(&constraint.column_index) {
                handled_mask[i] = true;
                best_cost = 1.0;
                break;
            }
            if let Some(idx) = schema
                .indexes
                .iter()
                .find(|idx| idx.columns.first().map(|c| c.column_index) == Some(constraint.column_index))
            {
                handled_mask[i] = true;
                chosen_index = Some(idx.name.clone());
                best_cost = (request.estimated_rows as f64 / 10.0).max(1.0);
            }
        }

        BestAccessPlan {
            handled_mask,
            estimated_rows: if chosen_index.is_some() || best_cost == 1.0 {
                best_cost as u64
            } else {
                request.estimated_rows
            },
            estimated_cost: best_cost,
            chosen_index,
            supports_set_or_seek: true,
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::SupportsSetOrSeek,
            Capability::SupportsIsolation,
            Capability::SupportsSavepoints,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;
    use crate::types::{ScalarKind, ScalarType};
    use futures_util::StreamExt;

    fn int_schema(name: &str) -> TableSchema {
        TableSchema::new(
            QualifiedName::main(name),
            vec![
                ColumnDef::new("id", ScalarType::new(ScalarKind::Integer)),
                ColumnDef::new("v", ScalarType::new(ScalarKind::Text)),
            ],
            "memory",
        )
        .with_primary_key(vec![(0, SortDirection::Asc)])
    }

    async fn collect(table: &MemTable, filter: FilterInfo) -> Vec<Row> {
        let stream = table.query(filter).await.unwrap();
        stream.map(|r| r.unwrap()).collect().await
    }

    fn full_scan() -> FilterInfo {
        FilterInfo {
            index_name: None,
            equality_key: None,
            lower_bound: None,
            upper_bound: None,
            descending: false,
        }
    }

    #[tokio::test]
    async fn scenario_1_snapshot_isolation_across_connections() {
        let module = MemoryModule::new();
        let a = module.create_mem_table(int_schema("t")).await.unwrap();
        for (id, v) in [(1, "a"), (2, "b"), (3, "c")] {
            a.update(UpdateRequest {
                operation: DmlOperation::Insert,
                new_values: Some(vec![SqlValue::Integer(id), SqlValue::Text(v.into())]),
                old_key_values: None,
                on_conflict: ConflictPolicy::Abort,
                statement_sql: None,
            })
            .await
            .unwrap();
        }
        a.commit().await.unwrap();

        let cursor_a_rows = collect(&a, full_scan()).await;
        assert_eq!(cursor_a_rows.len(), 3);

        let b = a.for_connection(99);
        b.update(UpdateRequest {
            operation: DmlOperation::Insert,
            new_values: Some(vec![SqlValue::Integer(4), SqlValue::Text("d".into())]),
            old_key_values: None,
            on_conflict: ConflictPolicy::Abort,
            statement_sql: None,
        })
        .await
        .unwrap();
        b.commit().await.unwrap();

        // `a`'s frozen read layer predates B's commit.
        let still_three = collect(&a, full_scan()).await;
        assert_eq!(still_three.len(), 3);

        let fresh = a.for_connection(2);
        let sees_four = collect(&fresh, full_scan()).await;
        assert_eq!(sees_four.len(), 4);
    }

    #[tokio::test]
    async fn scenario_2_savepoint_rollback() {
        let module = MemoryModule::new();
        let a = module.create_mem_table(int_schema("t")).await.unwrap();
        for (id, v) in [(1, "a"), (2, "b"), (3, "c")] {
            a.update(UpdateRequest {
                operation: DmlOperation::Insert,
                new_values: Some(vec![SqlValue::Integer(id), SqlValue::Text(v.into())]),
                old_key_values: None,
                on_conflict: ConflictPolicy::Abort,
                statement_sql: None,
            })
            .await
            .unwrap();
        }
        a.commit().await.unwrap();

        a.begin().await.unwrap();
        a.update(UpdateRequest {
            operation: DmlOperation::Update,
            new_values: Some(vec![SqlValue::Integer(2), SqlValue::Text("B".into())]),
            old_key_values: Some(vec![SqlValue::Integer(2), SqlValue::Text("b".into())]),
            on_conflict: ConflictPolicy::Abort,
            statement_sql: None,
        })
        .await
        .unwrap();
        a.savepoint(1).await.unwrap();
        a.update(UpdateRequest {
            operation: DmlOperation::Delete,
            new_values: None,
            old_key_values: Some(vec![SqlValue::Integer(3), SqlValue::Text("c".into())]),
            on_conflict: ConflictPolicy::Abort,
            statement_sql: None,
        })
        .await
        .unwrap();
        a.rollback_to(1).await.unwrap();

        let rows = collect(&a, full_scan()).await;
        let texts: Vec<String> = rows
            .iter()
            .map(|r| match &r[1] {
                SqlValue::Text(s) => s.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["a", "B", "c"]);
    }
}

#[cfg(test)]
impl MemoryModule {
    /// Test-only constructor that hands back the concrete `MemTable` instead
    /// of the `Arc<dyn VirtualTable>` the module API returns, since the
    /// scenarios below need `for_connection` directly.
    async fn create_mem_table(&self, schema: TableSchema) -> QuereusResult<MemTable> {
        let name = schema.name.clone();
        let manager = Arc::new(MvccManager::new(Arc::new(schema)));
        self.tables.write().insert(name, manager.clone());
        let conn_id = self.fresh_conn_id();
        Ok(MemTable { manager, conn_id })
    }
}
