//! Physical relational plan nodes: the tree the emitter compiles directly.
//!
//! Produced from `LogicalRelNode` by the optimizer (`crate::optimizer`),
//! which chooses concrete access paths, join algorithms and aggregate
//! strategies, and inserts cache nodes around re-iterated subtrees.

use super::logical::{AggregateCall, DmlKind, SetOpKind, SortKey};
use super::scalar::ScalarNode;
use super::RelationalNode;
use crate::error::ConflictPolicy;
use crate::row::AttributeId;
use crate::schema::SharedTableSchema;
use crate::types::RelationType;
use crate::value::Row;
use crate::vtab::BestAccessPlan;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
    Semi,
    Anti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAlgorithm {
    NestedLoop,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStrategy {
    Stream,
    Hash,
}

/// The scan plan a cursor is handed: an access path chosen by consulting the
/// virtual table module's `best_access_plan`.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub index_name: Option<String>,
    pub equality_key: Vec<ScalarNode>,
    pub lower_bound: Option<ScalarNode>,
    pub upper_bound: Option<ScalarNode>,
    pub descending: bool,
    /// Residual predicate the vtab did not claim to enforce itself.
    pub residual: Option<ScalarNode>,
    pub access_plan: BestAccessPlan,
}

#[derive(Debug, Clone)]
pub enum PhysicalRelNode {
    TableAccess {
        table: SharedTableSchema,
        scan: ScanPlan,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Values {
        rows: Vec<Row>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Filter {
        input: Box<PhysicalRelNode>,
        predicate: ScalarNode,
    },
    Project {
        input: Box<PhysicalRelNode>,
        exprs: Vec<ScalarNode>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Sort {
        input: Box<PhysicalRelNode>,
        keys: Vec<SortKey>,
    },
    Distinct {
        input: Box<PhysicalRelNode>,
    },
    Limit {
        input: Box<PhysicalRelNode>,
        limit: Option<u64>,
        offset: u64,
    },
    Aggregate {
        input: Box<PhysicalRelNode>,
        strategy: AggregateStrategy,
        group_by: Vec<ScalarNode>,
        aggregates: Vec<AggregateCall>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Join {
        left: Box<PhysicalRelNode>,
        right: Box<PhysicalRelNode>,
        kind: JoinKind,
        algorithm: JoinAlgorithm,
        equi_left: Vec<ScalarNode>,
        equi_right: Vec<ScalarNode>,
        residual: Option<ScalarNode>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    SetOp {
        kind: SetOpKind,
        left: Box<PhysicalRelNode>,
        right: Box<PhysicalRelNode>,
    },
    /// Wraps a subtree referenced more than once by the same statement (e.g.
    /// a non-recursive CTE used twice). Every reference shares the same
    /// `CacheState`, so the first traversal to reach it materializes and
    /// buffers the rows and later traversals replay the buffer instead of
    /// re-running the source.
    Cache { state: Arc<CacheState> },
    RecursiveCte {
        name: String,
        base_case: Box<PhysicalRelNode>,
        recursive_case: Box<PhysicalRelNode>,
        union_all: bool,
        max_iterations: u32,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    WorkingTable {
        name: String,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Dml {
        kind: DmlKind,
        table: SharedTableSchema,
        source: Box<PhysicalRelNode>,
        returning: Option<Vec<ScalarNode>>,
        on_conflict: ConflictPolicy,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
}

/// Shared state behind a `Cache` node. Rows are buffered only while the
/// buffered count stays at or under `threshold`; a result that exceeds it is
/// never stored, so every traversal beyond that point re-drives `source`
/// instead of letting the buffer grow without bound.
#[derive(Debug)]
pub struct CacheState {
    pub source: PhysicalRelNode,
    pub threshold: usize,
    pub buffered: Mutex<Option<Vec<Row>>>,
}

impl RelationalNode for PhysicalRelNode {
    fn relation_type(&self) -> &RelationType {
        match self {
            PhysicalRelNode::TableAccess { relation_type, .. }
            | PhysicalRelNode::Values { relation_type, .. }
            | PhysicalRelNode::Project { relation_type, .. }
            | PhysicalRelNode::Aggregate { relation_type, .. }
            | PhysicalRelNode::Join { relation_type, .. }
            | PhysicalRelNode::RecursiveCte { relation_type, .. }
            | PhysicalRelNode::WorkingTable { relation_type, .. }
            | PhysicalRelNode::Dml { relation_type, .. } => relation_type,
            PhysicalRelNode::Filter { input, .. }
            | PhysicalRelNode::Sort { input, .. }
            | PhysicalRelNode::Distinct { input }
            | PhysicalRelNode::Limit { input, .. } => input.relation_type(),
            PhysicalRelNode::Cache { state } => state.source.relation_type(),
            PhysicalRelNode::SetOp { left, .. } => left.relation_type(),
        }
    }

    fn attributes(&self) -> &[AttributeId] {
        match self {
            PhysicalRelNode::TableAccess { attributes, .. }
            | PhysicalRelNode::Values { attributes, .. }
            | PhysicalRelNode::Project { attributes, .. }
            | PhysicalRelNode::Aggregate { attributes, .. }
            | PhysicalRelNode::Join { attributes, .. }
            | PhysicalRelNode::RecursiveCte { attributes, .. }
            | PhysicalRelNode::WorkingTable { attributes, .. }
            | PhysicalRelNode::Dml { attributes, .. } => attributes,
            PhysicalRelNode::Filter { input, .. }
            | PhysicalRelNode::Sort { input, .. }
            | PhysicalRelNode::Distinct { input }
            | PhysicalRelNode::Limit { input, .. } => input.attributes(),
            PhysicalRelNode::Cache { state } => state.source.attributes(),
            PhysicalRelNode::SetOp { left, .. } => left.attributes(),
        }
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        match self {
            PhysicalRelNode::TableAccess { .. }
            | PhysicalRelNode::Values { .. }
            | PhysicalRelNode::WorkingTable { .. } => vec![],
            PhysicalRelNode::Filter { input, .. }
            | PhysicalRelNode::Project { input, .. }
            | PhysicalRelNode::Sort { input, .. }
            | PhysicalRelNode::Distinct { input }
            | PhysicalRelNode::Limit { input, .. }
            | PhysicalRelNode::Aggregate { input, .. }
            | PhysicalRelNode::Dml { source: input, .. } => vec![input.as_ref()],
            PhysicalRelNode::Cache { state } => vec![&state.source],
            PhysicalRelNode::Join { left, right, .. } | PhysicalRelNode::SetOp { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            PhysicalRelNode::RecursiveCte {
                base_case,
                recursive_case,
                ..
            } => vec![base_case.as_ref(), recursive_case.as_ref()],
        }
    }
}

pub type SharedPhysicalNode = Arc<PhysicalRelNode>;
