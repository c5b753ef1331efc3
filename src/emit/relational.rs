//! Relational emitter: compiles a `PhysicalRelNode` down to a materialized
//! row set, consuming `VirtualTable` instances through the ambient
//! `ExecContext`.
//!
//! The in-memory backend this crate ships materializes its own scans eagerly
//! (see `vtab::mem::cursor`), so there is no I/O-bound reason for this
//! executor to stream lazily across operator boundaries either; each node
//! below resolves to a `Vec<Row>` before its parent runs. Scalar evaluation
//! still happens one row at a time through the same `BindingStack` a
//! streaming design would use, so hoisting to a lazy `Stream` later is a
//! local change, not a rewrite.

use super::scalar::{self, EvalContext};
use crate::error::{ConflictPolicy, QuereusError, QuereusResult};
use crate::events::{ChangeEvent, ChangeKind, ChangeSink};
use crate::plan::logical::{AggregateFn, DmlKind, SetOpKind, SortDir, SortNulls};
use crate::plan::physical::{CacheState, JoinAlgorithm, JoinKind, PhysicalRelNode};
use crate::plan::scalar::ScalarNode;
use crate::plan::RelationalNode;
use crate::row::{BindingStack, RowDescriptor};
use crate::schema::QualifiedName;
use crate::value::collation::CollationRegistry;
use crate::value::{Collation, Row, SqlValue};
use crate::vtab::{Capability, DmlOperation, FilterInfo, UpdateRequest, VirtualTable};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the executor needs that isn't carried by the plan tree itself:
/// the live table instances a statement was bound against, its parameters,
/// the ambient row-binding stack, and the working tables recursive CTEs
/// populate round by round.
pub struct ExecContext {
    pub bindings: BindingStack,
    pub parameters: Vec<SqlValue>,
    pub collations: CollationRegistry,
    pub tables: HashMap<QualifiedName, Arc<dyn VirtualTable>>,
    working_tables: HashMap<String, Vec<Row>>,
    events: Option<Arc<dyn ChangeSink>>,
}

impl ExecContext {
    pub fn new(tables: HashMap<QualifiedName, Arc<dyn VirtualTable>>, parameters: Vec<SqlValue>) -> Self {
        ExecContext {
            bindings: BindingStack::new(),
            parameters,
            collations: CollationRegistry::new(),
            tables,
            working_tables: HashMap::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.events = Some(sink);
        self
    }
}

fn eval(ctx: &ExecContext, node: &ScalarNode) -> QuereusResult<SqlValue> {
    let ectx = EvalContext {
        bindings: &ctx.bindings,
        parameters: &ctx.parameters,
        collations: &ctx.collations,
    };
    scalar::eval(node, &ectx)
}

/// Evaluate `node` with `row` (described by `descriptor`) bound as the
/// current scope, then pop the binding before returning.
fn eval_with_row(ctx: &mut ExecContext, descriptor: &RowDescriptor, row: &Row, node: &ScalarNode) -> QuereusResult<SqlValue> {
    ctx.bindings.push(descriptor.clone(), row.clone());
    let result = eval(ctx, node);
    ctx.bindings.pop();
    result
}

pub async fn execute(node: &PhysicalRelNode, ctx: &mut ExecContext) -> QuereusResult<Vec<Row>> {
    execute_boxed(node, ctx).await
}

fn execute_boxed<'a>(node: &'a PhysicalRelNode, ctx: &'a mut ExecContext) -> BoxFuture<'a, QuereusResult<Vec<Row>>> {
    Box::pin(async move {
        match node {
            PhysicalRelNode::TableAccess { table, scan, attributes, .. } => {
                exec_table_access(table, scan, attributes, ctx).await
            }
            PhysicalRelNode::Values { rows, .. } => Ok(rows.clone()),
            PhysicalRelNode::Filter { input, predicate } => {
                let rows = execute_boxed(input, ctx).await?;
                let descriptor = RowDescriptor::new(input.attributes());
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    if eval_with_row(ctx, &descriptor, &row, predicate)?.as_bool() == Some(true) {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            PhysicalRelNode::Project { input, exprs, .. } => {
                let rows = execute_boxed(input, ctx).await?;
                let descriptor = RowDescriptor::new(input.attributes());
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    ctx.bindings.push(descriptor.clone(), row);
                    let mut projected = Vec::with_capacity(exprs.len());
                    let mut err = None;
                    for e in exprs {
                        match eval(ctx, e) {
                            Ok(v) => projected.push(v),
                            Err(e) => {
                                err = Some(e);
                                break;
                            }
                        }
                    }
                    ctx.bindings.pop();
                    if let Some(e) = err {
                        return Err(e);
                    }
                    out.push(projected);
                }
                Ok(out)
            }
            PhysicalRelNode::Sort { input, keys } => {
                let mut rows = execute_boxed(input, ctx).await?;
                let descriptor = RowDescriptor::new(input.attributes());
                let mut keyed: Vec<(Vec<SqlValue>, Row)> = Vec::with_capacity(rows.len());
                for row in rows.drain(..) {
                    let mut key_values = Vec::with_capacity(keys.len());
                    for key in keys {
                        key_values.push(eval_with_row(ctx, &descriptor, &row, &key.expr)?);
                    }
                    keyed.push((key_values, row));
                }
                keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(a, b, keys, &ctx.collations));
                Ok(keyed.into_iter().map(|(_, row)| row).collect())
            }
            PhysicalRelNode::Distinct { input } => {
                let mut rows = execute_boxed(input, ctx).await?;
                rows.sort_by(|a, b| compare_rows(a, b));
                rows.dedup_by(|a, b| rows_equal(a, b));
                Ok(rows)
            }
            PhysicalRelNode::Limit { input, limit, offset } => {
                let rows = execute_boxed(input, ctx).await?;
                let start = (*offset as usize).min(rows.len());
                let end = match limit {
                    Some(n) => (start + *n as usize).min(rows.len()),
                    None => rows.len(),
                };
                Ok(rows[start..end].to_vec())
            }
            PhysicalRelNode::Aggregate {
                input,
                strategy: _,
                group_by,
                aggregates,
                ..
            } => exec_aggregate(input, group_by, aggregates, ctx).await,
            PhysicalRelNode::Join {
                left,
                right,
                kind,
                algorithm,
                equi_left,
                equi_right,
                residual,
                ..
            } => exec_join(left, right, *kind, *algorithm, equi_left, equi_right, residual, ctx).await,
            PhysicalRelNode::SetOp { kind, left, right } => {
                let left_rows = execute_boxed(left, ctx).await?;
                let right_rows = execute_boxed(right, ctx).await?;
                Ok(exec_set_op(*kind, left_rows, right_rows))
            }
            PhysicalRelNode::Cache { state } => exec_cache(state, ctx).await,
            PhysicalRelNode::RecursiveCte {
                name,
                base_case,
                recursive_case,
                union_all,
                max_iterations,
                ..
            } => exec_recursive_cte(name, base_case, recursive_case, *union_all, *max_iterations, ctx).await,
            PhysicalRelNode::WorkingTable { name, .. } => Ok(ctx.working_tables.get(name).cloned().unwrap_or_default()),
            PhysicalRelNode::Dml {
                kind,
                table,
                source,
                returning,
                on_conflict,
                ..
            } => exec_dml(*kind, table, source, returning, *on_conflict, ctx).await,
        }
    })
}

async fn exec_table_access(
    table: &crate::schema::SharedTableSchema,
    scan: &crate::plan::physical::ScanPlan,
    attributes: &[crate::row::AttributeId],
    ctx: &mut ExecContext,
) -> QuereusResult<Vec<Row>> {
    let equality_key = if scan.equality_key.is_empty() {
        None
    } else {
        let mut key = Vec::with_capacity(scan.equality_key.len());
        for e in &scan.equality_key {
            key.push(eval(ctx, e)?);
        }
        Some(key)
    };
    let lower_bound = scan.lower_bound.as_ref().map(|e| eval(ctx, e)).transpose()?;
    let upper_bound = scan.upper_bound.as_ref().map(|e| eval(ctx, e)).transpose()?;

    let filter = FilterInfo {
        index_name: scan.index_name.clone(),
        equality_key,
        lower_bound,
        upper_bound,
        descending: scan.descending,
    };

    let vtab = ctx
        .tables
        .get(&table.name)
        .ok_or_else(|| QuereusError::internal(format!("no bound virtual table instance for {}", table.name)))?
        .clone();

    let mut stream = vtab.query(filter).await?;
    let mut rows = Vec::new();
    {
        use futures_util::StreamExt;
        while let Some(item) = stream.next().await {
            rows.push(item?);
        }
    }

    if let Some(residual) = &scan.residual {
        let descriptor = RowDescriptor::new(attributes);
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if eval_with_row(ctx, &descriptor, &row, residual)?.as_bool() == Some(true) {
                kept.push(row);
            }
        }
        rows = kept;
    }
    Ok(rows)
}

fn compare_rows(a: &[SqlValue], b: &[SqlValue]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.compare(y, Collation::Binary))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn rows_equal(a: &[SqlValue], b: &[SqlValue]) -> bool {
    a.len() == b.len() && compare_rows(a, b) == Ordering::Equal
}

fn compare_sort_keys(
    a: &[SqlValue],
    b: &[SqlValue],
    keys: &[crate::plan::logical::SortKey],
    collations: &CollationRegistry,
) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let (av, bv) = (&a[i], &b[i]);
        let ord = match (av.is_null(), bv.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => {
                return match key.nulls {
                    SortNulls::First => Ordering::Less,
                    SortNulls::Last => Ordering::Greater,
                }
            }
            (false, true) => {
                return match key.nulls {
                    SortNulls::First => Ordering::Greater,
                    SortNulls::Last => Ordering::Less,
                }
            }
            (false, false) => {
                let collation = Collation::resolve(&key.collation, collations);
                av.compare(bv, collation)
            }
        };
        let ord = if key.direction == SortDir::Desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Equality-grouping key. Deliberately not order-preserving (unlike the
/// memcomparable key module): grouping only ever needs equality, never a
/// range scan, so a plain tag+bytes encoding is enough.
fn group_key(values: &[SqlValue]) -> Vec<u8> {
    let mut buf = Vec::new();
    for v in values {
        match v {
            SqlValue::Null => buf.push(0),
            SqlValue::Integer(i) => {
                buf.push(1);
                buf.extend_from_slice(&i.to_be_bytes());
            }
            SqlValue::Real(r) => {
                buf.push(2);
                buf.extend_from_slice(&r.to_be_bytes());
            }
            SqlValue::Boolean(b) => {
                buf.push(3);
                buf.push(*b as u8);
            }
            SqlValue::Text(s) => {
                buf.push(4);
                buf.extend_from_slice(s.as_bytes());
            }
            SqlValue::Blob(b) => {
                buf.push(5);
                buf.extend_from_slice(b);
            }
        }
        buf.push(0xFF);
    }
    buf
}

#[derive(Default)]
struct AggAcc {
    count_star: i64,
    count_non_null: i64,
    sum: f64,
    min: Option<SqlValue>,
    max: Option<SqlValue>,
}

impl AggAcc {
    fn observe(&mut self, arg: Option<&SqlValue>) {
        self.count_star += 1;
        let Some(v) = arg else { return };
        if v.is_null() {
            return;
        }
        self.count_non_null += 1;
        if let Some(f) = v.as_f64() {
            self.sum += f;
        }
        if self.min.as_ref().map(|m| v.compare(m, Collation::Binary) == Ordering::Less).unwrap_or(true) {
            self.min = Some(v.clone());
        }
        if self.max.as_ref().map(|m| v.compare(m, Collation::Binary) == Ordering::Greater).unwrap_or(true) {
            self.max = Some(v.clone());
        }
    }

    fn finish(&self, func: AggregateFn) -> SqlValue {
        match func {
            AggregateFn::CountStar => SqlValue::Integer(self.count_star),
            AggregateFn::Count => SqlValue::Integer(self.count_non_null),
            AggregateFn::Sum => {
                if self.count_non_null == 0 {
                    SqlValue::Null
                } else {
                    SqlValue::Real(self.sum)
                }
            }
            AggregateFn::Avg => {
                if self.count_non_null == 0 {
                    SqlValue::Null
                } else {
                    SqlValue::Real(self.sum / self.count_non_null as f64)
                }
            }
            AggregateFn::Min => self.min.clone().unwrap_or(SqlValue::Null),
            AggregateFn::Max => self.max.clone().unwrap_or(SqlValue::Null),
        }
    }
}

async fn exec_aggregate(
    input: &PhysicalRelNode,
    group_by: &[ScalarNode],
    aggregates: &[crate::plan::logical::AggregateCall],
    ctx: &mut ExecContext,
) -> QuereusResult<Vec<Row>> {
    let rows = execute_boxed(input, ctx).await?;
    let descriptor = RowDescriptor::new(input.attributes());

    let mut order: Vec<Vec<u8>> = Vec::new();
    let mut groups: HashMap<Vec<u8>, (Vec<SqlValue>, Vec<AggAcc>)> = HashMap::new();

    for row in &rows {
        let mut key_values = Vec::with_capacity(group_by.len());
        for g in group_by {
            key_values.push(eval_with_row(ctx, &descriptor, row, g)?);
        }
        let key = group_key(&key_values);
        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            (key_values.clone(), aggregates.iter().map(|_| AggAcc::default()).collect())
        });
        for (i, call) in aggregates.iter().enumerate() {
            let arg = match &call.arg {
                Some(expr) => Some(eval_with_row(ctx, &descriptor, row, expr)?),
                None => None,
            };
            entry.1[i].observe(arg.as_ref());
        }
    }

    if rows.is_empty() && group_by.is_empty() {
        // A group-less aggregate over zero rows still produces one row of
        // "empty" aggregate values (COUNT(*) = 0, SUM = NULL, ...).
        let accs: Vec<AggAcc> = aggregates.iter().map(|_| AggAcc::default()).collect();
        let out: Vec<SqlValue> = aggregates.iter().zip(&accs).map(|(c, a)| a.finish(c.func)).collect();
        return Ok(vec![out]);
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let (key_values, accs) = groups.remove(&key).expect("key from order always present");
        let mut row = key_values;
        for (call, acc) in aggregates.iter().zip(&accs) {
            row.push(acc.finish(call.func));
        }
        out.push(row);
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
async fn exec_join(
    left: &PhysicalRelNode,
    right: &PhysicalRelNode,
    kind: JoinKind,
    algorithm: JoinAlgorithm,
    equi_left: &[ScalarNode],
    equi_right: &[ScalarNode],
    residual: &Option<ScalarNode>,
    ctx: &mut ExecContext,
) -> QuereusResult<Vec<Row>> {
    let left_rows = execute_boxed(left, ctx).await?;
    let right_rows = execute_boxed(right, ctx).await?;
    let left_descriptor = RowDescriptor::new(left.attributes());
    let right_descriptor = RowDescriptor::new(right.attributes());
    let right_width = right.attributes().len();

    let hash_index: Option<HashMap<Vec<u8>, Vec<usize>>> = if algorithm == JoinAlgorithm::Hash {
        let mut index: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
        for (idx, row) in right_rows.iter().enumerate() {
            let mut key_values = Vec::with_capacity(equi_right.len());
            for e in equi_right {
                key_values.push(eval_with_row(ctx, &right_descriptor, row, e)?);
            }
            index.entry(group_key(&key_values)).or_default().push(idx);
        }
        Some(index)
    } else {
        None
    };

    let mut out = Vec::new();
    for left_row in &left_rows {
        let candidates: Vec<usize> = match &hash_index {
            Some(index) => {
                let mut key_values = Vec::with_capacity(equi_left.len());
                for e in equi_left {
                    key_values.push(eval_with_row(ctx, &left_descriptor, left_row, e)?);
                }
                index.get(&group_key(&key_values)).cloned().unwrap_or_default()
            }
            None => (0..right_rows.len()).collect(),
        };

        let mut matched_any = false;
        for idx in candidates {
            let right_row = &right_rows[idx];
            ctx.bindings.push(left_descriptor.clone(), left_row.clone());
            ctx.bindings.push(right_descriptor.clone(), right_row.clone());
            let matches = match residual {
                Some(pred) => eval(ctx, pred).map(|v| v.as_bool() == Some(true)),
                None => Ok(true),
            };
            ctx.bindings.pop();
            ctx.bindings.pop();
            if matches? {
                matched_any = true;
                match kind {
                    JoinKind::Semi => break,
                    JoinKind::Anti => {}
                    _ => {
                        let mut combined = left_row.clone();
                        combined.extend(right_row.clone());
                        out.push(combined);
                    }
                }
            }
        }

        match kind {
            JoinKind::Semi if matched_any => out.push(left_row.clone()),
            JoinKind::Anti if !matched_any => out.push(left_row.clone()),
            JoinKind::Left if !matched_any => {
                let mut combined = left_row.clone();
                combined.extend(std::iter::repeat(SqlValue::Null).take(right_width));
                out.push(combined);
            }
            _ => {}
        }
    }
    Ok(out)
}

/// First traversal to reach a given `CacheState` runs `source` and, if the
/// row count is at or under `threshold`, buffers it for every later
/// traversal to replay. A result over threshold is never buffered, so it
/// re-drives `source` on each traversal rather than growing without bound.
async fn exec_cache(state: &CacheState, ctx: &mut ExecContext) -> QuereusResult<Vec<Row>> {
    if let Some(rows) = state.buffered.lock().as_ref() {
        return Ok(rows.clone());
    }
    let rows = execute_boxed(&state.source, ctx).await?;
    if rows.len() <= state.threshold {
        *state.buffered.lock() = Some(rows.clone());
    }
    Ok(rows)
}

fn exec_set_op(kind: SetOpKind, mut left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
    match kind {
        SetOpKind::UnionAll => {
            left.extend(right);
            left
        }
        SetOpKind::UnionDistinct => {
            left.extend(right);
            left.sort_by(|a, b| compare_rows(a, b));
            left.dedup_by(|a, b| rows_equal(a, b));
            left
        }
        SetOpKind::Intersect => {
            let mut out: Vec<Row> = left.into_iter().filter(|r| right.iter().any(|o| rows_equal(r, o))).collect();
            out.sort_by(|a, b| compare_rows(a, b));
            out.dedup_by(|a, b| rows_equal(a, b));
            out
        }
        SetOpKind::Except => {
            let mut out: Vec<Row> = left.into_iter().filter(|r| !right.iter().any(|o| rows_equal(r, o))).collect();
            out.sort_by(|a, b| compare_rows(a, b));
            out.dedup_by(|a, b| rows_equal(a, b));
            out
        }
    }
}

async fn exec_recursive_cte(
    name: &str,
    base_case: &PhysicalRelNode,
    recursive_case: &PhysicalRelNode,
    union_all: bool,
    max_iterations: u32,
    ctx: &mut ExecContext,
) -> QuereusResult<Vec<Row>> {
    let base_rows = execute_boxed(base_case, ctx).await?;
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    if !union_all {
        for row in &base_rows {
            seen.insert(group_key(row));
        }
    }
    let mut all_rows = base_rows.clone();
    let mut delta = base_rows;
    let mut iterations = 0u32;

    while !delta.is_empty() && iterations < max_iterations {
        ctx.working_tables.insert(name.to_string(), delta);
        let next = execute_boxed(recursive_case, ctx).await?;
        ctx.working_tables.remove(name);

        let fresh: Vec<Row> = if union_all {
            next
        } else {
            next.into_iter().filter(|r| seen.insert(group_key(r))).collect()
        };
        if fresh.is_empty() {
            break;
        }
        all_rows.extend(fresh.clone());
        delta = fresh;
        iterations += 1;
    }
    if iterations >= max_iterations {
        return Err(QuereusError::internal(format!(
            "recursive CTE {name} exceeded {max_iterations} iterations without converging"
        )));
    }
    Ok(all_rows)
}

async fn exec_dml(
    kind: DmlKind,
    table: &crate::schema::SharedTableSchema,
    source: &PhysicalRelNode,
    returning: &Option<Vec<ScalarNode>>,
    on_conflict: ConflictPolicy,
    ctx: &mut ExecContext,
) -> QuereusResult<Vec<Row>> {
    let source_rows = execute_boxed(source, ctx).await?;
    let pk_indices = table.primary_key_indices();
    let vtab = ctx
        .tables
        .get(&table.name)
        .ok_or_else(|| QuereusError::internal(format!("no bound virtual table instance for {}", table.name)))?
        .clone();

    let mut returned = Vec::new();
    let source_descriptor = RowDescriptor::new(source.attributes());
    let wants_synthetic_events =
        ctx.events.is_some() && !vtab.capabilities().contains(&Capability::NativeEvents);

    for row in source_rows {
        let (operation, new_values, old_key_values) = match kind {
            DmlKind::Insert => (DmlOperation::Insert, Some(row.clone()), None),
            DmlKind::Delete => {
                let key: Row = pk_indices.iter().map(|i| row[*i].clone()).collect();
                (DmlOperation::Delete, None, Some(key))
            }
            // Assumes the SET clause never touches primary-key columns, so
            // the post-image row's own key still identifies the pre-image
            // row. A PK-changing UPDATE needs a richer plan shape to carry
            // both key images and isn't supported yet.
            DmlKind::Update => {
                let key: Row = pk_indices.iter().map(|i| row[*i].clone()).collect();
                (DmlOperation::Update, Some(row.clone()), Some(key))
            }
        };

        vtab.update(UpdateRequest {
            operation,
            new_values: new_values.clone(),
            old_key_values: old_key_values.clone(),
            on_conflict,
            statement_sql: None,
        })
        .await?;

        if wants_synthetic_events {
            let primary_key: Row = pk_indices.iter().map(|i| row[*i].clone()).collect();
            let (kind, old_row, new_row) = match operation {
                DmlOperation::Insert => (ChangeKind::Insert, None, new_values),
                DmlOperation::Update => (ChangeKind::Update, None, new_values),
                DmlOperation::Delete => (ChangeKind::Delete, old_key_values, None),
            };
            ctx.events.as_ref().unwrap().emit(ChangeEvent {
                kind,
                table: table.name.clone(),
                primary_key,
                old_row,
                new_row,
                changed_columns: None,
                remote: false,
            });
        }

        if let Some(exprs) = returning {
            let mut out_row = Vec::with_capacity(exprs.len());
            for e in exprs {
                out_row.push(eval_with_row(ctx, &source_descriptor, &row, e)?);
            }
            returned.push(out_row);
        }
    }
    Ok(returned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cardinality, ColumnInfo, RelationType, ScalarKind, ScalarType};

    fn int_col(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            scalar_type: ScalarType::new(ScalarKind::Integer),
        }
    }

    #[tokio::test]
    async fn project_evaluates_exprs_per_row() {
        let attr = crate::row::AttributeId::fresh();
        let values = PhysicalRelNode::Values {
            rows: vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]],
            attributes: vec![attr],
            relation_type: RelationType {
                columns: vec![int_col("a")],
                keys: vec![],
                cardinality: Cardinality::Bag,
            },
        };
        let out_attr = crate::row::AttributeId::fresh();
        let project = PhysicalRelNode::Project {
            input: Box::new(values),
            exprs: vec![ScalarNode::Binary {
                op: crate::plan::scalar::BinaryOp::Add,
                left: Box::new(ScalarNode::ColumnRef { attribute: attr, scalar_type: ScalarType::new(ScalarKind::Integer) }),
                right: Box::new(ScalarNode::literal(SqlValue::Integer(10), ScalarType::new(ScalarKind::Integer))),
                scalar_type: ScalarType::new(ScalarKind::Integer),
            }],
            attributes: vec![out_attr],
            relation_type: RelationType {
                columns: vec![int_col("a")],
                keys: vec![],
                cardinality: Cardinality::Bag,
            },
        };
        let mut ctx = ExecContext::new(HashMap::new(), vec![]);
        let rows = execute(&project, &mut ctx).await.unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Integer(11)], vec![SqlValue::Integer(12)]]);
    }

    #[tokio::test]
    async fn limit_applies_offset_then_bound() {
        let attr = crate::row::AttributeId::fresh();
        let values = PhysicalRelNode::Values {
            rows: (0..5).map(|i| vec![SqlValue::Integer(i)]).collect(),
            attributes: vec![attr],
            relation_type: RelationType {
                columns: vec![int_col("a")],
                keys: vec![],
                cardinality: Cardinality::Bag,
            },
        };
        let limit = PhysicalRelNode::Limit {
            input: Box::new(values),
            limit: Some(2),
            offset: 1,
        };
        let mut ctx = ExecContext::new(HashMap::new(), vec![]);
        let rows = execute(&limit, &mut ctx).await.unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]]);
    }

    #[tokio::test]
    async fn distinct_dedupes_rows() {
        let attr = crate::row::AttributeId::fresh();
        let values = PhysicalRelNode::Values {
            rows: vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]],
            attributes: vec![attr],
            relation_type: RelationType {
                columns: vec![int_col("a")],
                keys: vec![],
                cardinality: Cardinality::Bag,
            },
        };
        let distinct = PhysicalRelNode::Distinct { input: Box::new(values) };
        let mut ctx = ExecContext::new(HashMap::new(), vec![]);
        let rows = execute(&distinct, &mut ctx).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
