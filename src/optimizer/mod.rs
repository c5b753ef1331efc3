//! Logical-to-physical plan rewrite: filter pushdown, access-path
//! selection against a vtab module's `best_access_plan`, cache-node
//! insertion around re-iterated relations, and nested-loop/hash join and
//! stream/hash aggregate strategy choice.

mod access;
mod pushdown;

use crate::error::QuereusResult;
use crate::plan::logical::{AggregateCall, DmlKind, JoinKind as LogicalJoinKind, SetOpKind, SortKey};
use crate::plan::physical::{AggregateStrategy, CacheState, JoinAlgorithm, JoinKind as PhysicalJoinKind, PhysicalRelNode};
use crate::plan::scalar::{BinaryOp, ScalarNode};
use crate::plan::{LogicalRelNode, RelationalNode};
use crate::row::AttributeId;
use crate::vtab::VtabModule;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Rows below this threshold are eagerly materialized by a `Cache` node
/// rather than re-opened from scratch on every re-iteration; above it the
/// cache abandons buffering and falls back to re-driving the source, per
/// the pipelined-cache-with-abandon-on-threshold design.
pub const DEFAULT_CACHE_THRESHOLD: usize = 4096;

/// Upper bound on recursive-CTE fixpoint iterations, guarding against a
/// non-terminating recursive case.
pub const DEFAULT_MAX_RECURSION: u32 = 10_000;

/// Rewrites logical plans into physical ones, consulting each table's vtab
/// module for access-path selection.
pub struct Optimizer {
    modules: HashMap<String, Arc<dyn VtabModule>>,
    /// Keyed by the shared logical subtree's `Arc` pointer identity, so every
    /// `CteRef` pointing at the same subtree resolves to the same
    /// `CacheState` rather than each getting its own independent buffer.
    cache_nodes: RefCell<HashMap<usize, Arc<CacheState>>>,
}

impl Optimizer {
    pub fn new(modules: HashMap<String, Arc<dyn VtabModule>>) -> Self {
        Optimizer {
            modules,
            cache_nodes: RefCell::new(HashMap::new()),
        }
    }

    pub fn optimize(&self, plan: LogicalRelNode) -> QuereusResult<PhysicalRelNode> {
        let pushed = pushdown::push_down_filters(plan);
        self.to_physical(pushed)
    }

    fn to_physical(&self, node: LogicalRelNode) -> QuereusResult<PhysicalRelNode> {
        match node {
            LogicalRelNode::TableScan {
                table,
                attributes,
                relation_type,
            } => access::physical_scan(&self.modules, table, attributes, relation_type, None),

            LogicalRelNode::Filter { input, predicate } => {
                if let LogicalRelNode::TableScan {
                    table,
                    attributes,
                    relation_type,
                } = *input
                {
                    access::physical_scan(&self.modules, table, attributes, relation_type, Some(predicate))
                } else {
                    Ok(PhysicalRelNode::Filter {
                        input: Box::new(self.to_physical(*input)?),
                        predicate,
                    })
                }
            }

            LogicalRelNode::Values {
                rows,
                attributes,
                relation_type,
            } => Ok(PhysicalRelNode::Values {
                rows,
                attributes,
                relation_type,
            }),

            LogicalRelNode::Project {
                input,
                exprs,
                attributes,
                relation_type,
            } => Ok(PhysicalRelNode::Project {
                input: Box::new(self.to_physical(*input)?),
                exprs,
                attributes,
                relation_type,
            }),

            LogicalRelNode::Sort { input, keys } => Ok(PhysicalRelNode::Sort {
                input: Box::new(self.to_physical(*input)?),
                keys,
            }),

            LogicalRelNode::Distinct { input } => Ok(PhysicalRelNode::Distinct {
                input: Box::new(self.to_physical(*input)?),
            }),

            LogicalRelNode::Limit { input, limit, offset } => Ok(PhysicalRelNode::Limit {
                input: Box::new(self.to_physical(*input)?),
                limit,
                offset,
            }),

            LogicalRelNode::Aggregate {
                input,
                group_by,
                aggregates,
                attributes,
                relation_type,
            } => {
                let strategy = aggregate_strategy(&group_by, &aggregates);
                Ok(PhysicalRelNode::Aggregate {
                    input: Box::new(self.to_physical(*input)?),
                    strategy,
                    group_by,
                    aggregates,
                    attributes,
                    relation_type,
                })
            }

            LogicalRelNode::Join {
                left,
                right,
                kind,
                condition,
                attributes,
                relation_type,
            } => {
                let left_attrs: Vec<AttributeId> = left.attributes().to_vec();
                let right_attrs: Vec<AttributeId> = right.attributes().to_vec();
                let physical_left = self.to_physical(*left)?;
                let physical_right = self.to_physical(*right)?;

                let (equi_left, equi_right, residual) =
                    split_equi_join(condition, &left_attrs, &right_attrs);
                let algorithm = if equi_left.is_empty() {
                    JoinAlgorithm::NestedLoop
                } else {
                    JoinAlgorithm::Hash
                };

                Ok(PhysicalRelNode::Join {
                    left: Box::new(physical_left),
                    right: Box::new(physical_right),
                    kind: convert_join_kind(kind),
                    algorithm,
                    equi_left,
                    equi_right,
                    residual,
                    attributes,
                    relation_type,
                })
            }

            LogicalRelNode::SetOp { kind, left, right } => Ok(PhysicalRelNode::SetOp {
                kind,
                left: Box::new(self.to_physical(*left)?),
                right: Box::new(self.to_physical(*right)?),
            }),

            LogicalRelNode::CteRef { input, .. } => {
                // More than one live reference to the same subtree means the
                // inlined plan would re-run it once per reference; wrap it in
                // a cache so every reference shares one materialization. All
                // references sharing this `Arc` pointer get the same
                // `CacheState`, keyed below by its address.
                if Arc::strong_count(&input) > 1 {
                    let key = Arc::as_ptr(&input) as usize;
                    if let Some(state) = self.cache_nodes.borrow().get(&key) {
                        return Ok(PhysicalRelNode::Cache { state: state.clone() });
                    }
                    let physical = self.to_physical((*input).clone())?;
                    let state = Arc::new(CacheState {
                        source: physical,
                        threshold: DEFAULT_CACHE_THRESHOLD,
                        buffered: Mutex::new(None),
                    });
                    self.cache_nodes.borrow_mut().insert(key, state.clone());
                    Ok(PhysicalRelNode::Cache { state })
                } else {
                    self.to_physical((*input).clone())
                }
            }

            LogicalRelNode::RecursiveCte {
                name,
                base_case,
                recursive_case,
                union_all,
                attributes,
                relation_type,
            } => Ok(PhysicalRelNode::RecursiveCte {
                name,
                base_case: Box::new(self.to_physical(*base_case)?),
                recursive_case: Box::new(self.to_physical(*recursive_case)?),
                union_all,
                max_iterations: DEFAULT_MAX_RECURSION,
                attributes,
                relation_type,
            }),

            LogicalRelNode::WorkingTable {
                name,
                attributes,
                relation_type,
            } => Ok(PhysicalRelNode::WorkingTable {
                name,
                attributes,
                relation_type,
            }),

            LogicalRelNode::Dml {
                kind,
                table,
                source,
                returning,
                on_conflict,
                attributes,
                relation_type,
            } => Ok(PhysicalRelNode::Dml {
                kind: convert_dml_kind(kind),
                table,
                source: Box::new(self.to_physical(*source)?),
                returning,
                on_conflict,
                attributes,
                relation_type,
            }),
        }
    }
}

fn convert_join_kind(kind: LogicalJoinKind) -> PhysicalJoinKind {
    match kind {
        LogicalJoinKind::Inner => PhysicalJoinKind::Inner,
        LogicalJoinKind::Left => PhysicalJoinKind::Left,
        LogicalJoinKind::Cross => PhysicalJoinKind::Cross,
        LogicalJoinKind::Semi => PhysicalJoinKind::Semi,
        LogicalJoinKind::Anti => PhysicalJoinKind::Anti,
    }
}

fn convert_dml_kind(kind: DmlKind) -> DmlKind {
    kind
}

/// A scalar (group-less) aggregate, or a stream aggregate whose input is
/// already grouped, needs no hash table; everything else hashes by group key.
/// This crate has no sort-order tracking on logical plans yet, so the stream
/// strategy is only chosen for the scalar-aggregate case.
fn aggregate_strategy(group_by: &[ScalarNode], _aggregates: &[AggregateCall]) -> AggregateStrategy {
    if group_by.is_empty() {
        AggregateStrategy::Stream
    } else {
        AggregateStrategy::Hash
    }
}

fn collect_column_refs(node: &ScalarNode, out: &mut Vec<AttributeId>) {
    if let ScalarNode::ColumnRef { attribute, .. } = node {
        out.push(*attribute);
    }
    for child in node.children() {
        collect_column_refs(child, out);
    }
}

fn references_only(node: &ScalarNode, attrs: &[AttributeId]) -> bool {
    let mut refs = Vec::new();
    collect_column_refs(node, &mut refs);
    refs.iter().all(|a| attrs.contains(a))
}

/// Split a join condition into equality conjuncts whose two sides each
/// reference exactly one side of the join (the classic equi-join shape),
/// and everything else as a residual predicate evaluated per candidate pair.
fn split_equi_join(
    condition: Option<ScalarNode>,
    left_attrs: &[AttributeId],
    right_attrs: &[AttributeId],
) -> (Vec<ScalarNode>, Vec<ScalarNode>, Option<ScalarNode>) {
    let Some(condition) = condition else {
        return (Vec::new(), Vec::new(), None);
    };
    let conjuncts = pushdown::conjuncts(condition);
    let mut equi_left = Vec::new();
    let mut equi_right = Vec::new();
    let mut residual = Vec::new();

    for conjunct in conjuncts {
        if let ScalarNode::Binary {
            op: BinaryOp::Eq,
            left,
            right,
            ..
        } = &conjunct
        {
            let left_is_left = references_only(left, left_attrs);
            let left_is_right = references_only(left, right_attrs);
            let right_is_left = references_only(right, left_attrs);
            let right_is_right = references_only(right, right_attrs);

            if left_is_left && right_is_right {
                equi_left.push((**left).clone());
                equi_right.push((**right).clone());
                continue;
            }
            if left_is_right && right_is_left {
                equi_left.push((**right).clone());
                equi_right.push((**left).clone());
                continue;
            }
        }
        residual.push(conjunct);
    }

    (equi_left, equi_right, pushdown::and_all(residual))
}
