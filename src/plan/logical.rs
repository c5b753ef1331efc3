//! Logical relational plan nodes: the algebra the optimizer rewrites before
//! choosing physical access paths and join/aggregate strategies.

use super::scalar::ScalarNode;
use super::RelationalNode;
use crate::error::ConflictPolicy;
use crate::row::AttributeId;
use crate::schema::SharedTableSchema;
use crate::types::RelationType;
use crate::value::Row;
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
pub enum SetOpKind {
    UnionAll,
    UnionDistinct,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortNulls {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub expr: ScalarNode,
    pub direction: SortDir,
    pub nulls: SortNulls,
    pub collation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub func: AggregateFn,
    pub arg: Option<ScalarNode>,
    pub output_attribute: AttributeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

/// A logical plan node. Optimizer rewrites produce new trees of this type
/// (or the physical counterpart once access paths are chosen); node
/// identity is purely structural — equality/caching is keyed on attribute
/// ids, not on node pointers.
#[derive(Debug, Clone)]
pub enum LogicalRelNode {
    /// A base-table scan with no access-path decision made yet.
    TableScan {
        table: SharedTableSchema,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Values {
        rows: Vec<Row>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Filter {
        input: Box<LogicalRelNode>,
        predicate: ScalarNode,
    },
    Project {
        input: Box<LogicalRelNode>,
        exprs: Vec<ScalarNode>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Sort {
        input: Box<LogicalRelNode>,
        keys: Vec<SortKey>,
    },
    Distinct {
        input: Box<LogicalRelNode>,
    },
    Limit {
        input: Box<LogicalRelNode>,
        limit: Option<u64>,
        offset: u64,
    },
    Aggregate {
        input: Box<LogicalRelNode>,
        group_by: Vec<ScalarNode>,
        aggregates: Vec<AggregateCall>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Join {
        left: Box<LogicalRelNode>,
        right: Box<LogicalRelNode>,
        kind: JoinKind,
        condition: Option<ScalarNode>,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    SetOp {
        kind: SetOpKind,
        left: Box<LogicalRelNode>,
        right: Box<LogicalRelNode>,
    },
    /// Non-recursive CTE reference: just an alias over an already-planned
    /// subtree, inlined by the optimizer unless referenced more than once
    /// (in which case a cache node wraps it during physical planning).
    CteRef {
        name: String,
        input: Arc<LogicalRelNode>,
    },
    RecursiveCte {
        name: String,
        base_case: Box<LogicalRelNode>,
        recursive_case: Box<LogicalRelNode>,
        union_all: bool,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    /// A reference to the working-table delta inside a recursive case; only
    /// valid as a descendant of `RecursiveCte::recursive_case`.
    WorkingTable {
        name: String,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
    Dml {
        kind: DmlKind,
        table: SharedTableSchema,
        source: Box<LogicalRelNode>,
        returning: Option<Vec<ScalarNode>>,
        on_conflict: ConflictPolicy,
        attributes: Vec<AttributeId>,
        relation_type: RelationType,
    },
}

impl RelationalNode for LogicalRelNode {
    fn relation_type(&self) -> &RelationType {
        match self {
            LogicalRelNode::TableScan { relation_type, .. }
            | LogicalRelNode::Values { relation_type, .. }
            | LogicalRelNode::Project { relation_type, .. }
            | LogicalRelNode::Aggregate { relation_type, .. }
            | LogicalRelNode::Join { relation_type, .. }
            | LogicalRelNode::RecursiveCte { relation_type, .. }
            | LogicalRelNode::WorkingTable { relation_type, .. }
            | LogicalRelNode::Dml { relation_type, .. } => relation_type,
            LogicalRelNode::Filter { input, .. }
            | LogicalRelNode::Sort { input, .. }
            | LogicalRelNode::Distinct { input }
            | LogicalRelNode::Limit { input, .. } => input.relation_type(),
            LogicalRelNode::SetOp { left, .. } => left.relation_type(),
            LogicalRelNode::CteRef { input, .. } => input.relation_type(),
        }
    }

    fn attributes(&self) -> &[AttributeId] {
        match self {
            LogicalRelNode::TableScan { attributes, .. }
            | LogicalRelNode::Values { attributes, .. }
            | LogicalRelNode::Project { attributes, .. }
            | LogicalRelNode::Aggregate { attributes, .. }
            | LogicalRelNode::Join { attributes, .. }
            | LogicalRelNode::RecursiveCte { attributes, .. }
            | LogicalRelNode::WorkingTable { attributes, .. }
            | LogicalRelNode::Dml { attributes, .. } => attributes,
            LogicalRelNode::Filter { input, .. }
            | LogicalRelNode::Sort { input, .. }
            | LogicalRelNode::Distinct { input }
            | LogicalRelNode::Limit { input, .. } => input.attributes(),
            LogicalRelNode::SetOp { left, .. } => left.attributes(),
            LogicalRelNode::CteRef { input, .. } => input.attributes(),
        }
    }

    fn children(&self) -> Vec<&dyn RelationalNode> {
        match self {
            LogicalRelNode::TableScan { .. }
            | LogicalRelNode::Values { .. }
            | LogicalRelNode::WorkingTable { .. } => vec![],
            LogicalRelNode::Filter { input, .. }
            | LogicalRelNode::Project { input, .. }
            | LogicalRelNode::Sort { input, .. }
            | LogicalRelNode::Distinct { input }
            | LogicalRelNode::Limit { input, .. }
            | LogicalRelNode::Aggregate { input, .. }
            | LogicalRelNode::Dml { source: input, .. } => vec![input.as_ref()],
            LogicalRelNode::Join { left, right, .. } | LogicalRelNode::SetOp { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            LogicalRelNode::CteRef { input, .. } => vec![input.as_ref()],
            LogicalRelNode::RecursiveCte {
                base_case,
                recursive_case,
                ..
            } => vec![base_case.as_ref(), recursive_case.as_ref()],
        }
    }
}
