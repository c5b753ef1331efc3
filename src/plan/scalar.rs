//! Scalar plan nodes: the expression side of the plan tree.

use crate::row::AttributeId;
use crate::types::ScalarType;
use crate::value::SqlValue;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    And,
    Or,
    Xor,
    Like,
    Glob,
    Regexp,
    Match,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

/// One `WHEN .. THEN ..` arm of a `CASE` expression.
#[derive(Debug, Clone)]
pub struct CaseArm {
    pub when: ScalarNode,
    pub then: ScalarNode,
}

/// A scalar-capable plan node. Immutable; the optimizer rewrites by
/// constructing new nodes rather than mutating existing ones.
#[derive(Debug, Clone)]
pub enum ScalarNode {
    Literal {
        value: SqlValue,
        scalar_type: ScalarType,
    },
    /// Reference to a column produced by some relational node, resolved at
    /// runtime through the ambient `BindingStack`.
    ColumnRef {
        attribute: AttributeId,
        scalar_type: ScalarType,
    },
    /// A bound parameter, resolved from the statement's parameter map at
    /// `run` time rather than at plan-build time.
    Parameter {
        index: usize,
        scalar_type: ScalarType,
    },
    Binary {
        op: BinaryOp,
        left: Box<ScalarNode>,
        right: Box<ScalarNode>,
        scalar_type: ScalarType,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ScalarNode>,
        scalar_type: ScalarType,
    },
    Between {
        operand: Box<ScalarNode>,
        low: Box<ScalarNode>,
        high: Box<ScalarNode>,
    },
    Case {
        arms: Vec<CaseArm>,
        else_branch: Option<Box<ScalarNode>>,
        scalar_type: ScalarType,
    },
    Cast {
        operand: Box<ScalarNode>,
        target: ScalarType,
    },
    Collate {
        operand: Box<ScalarNode>,
        collation: String,
    },
    FunctionCall {
        name: String,
        args: Vec<ScalarNode>,
        scalar_type: ScalarType,
    },
    /// A relational sub-plan referenced from scalar context (e.g. a scalar
    /// subquery, or the right side of an `IN (SELECT ..)`). Kept separate
    /// from the scalar children so the optimizer's generic child-rewrite
    /// doesn't need to special-case it; see `ScalarNode::sub_relations`.
    SubqueryScalar {
        relation: Arc<dyn super::RelationalNode + Send + Sync>,
        scalar_type: ScalarType,
    },
}

impl ScalarNode {
    pub fn literal(value: SqlValue, scalar_type: ScalarType) -> Self {
        ScalarNode::Literal { value, scalar_type }
    }

    pub fn scalar_type(&self) -> &ScalarType {
        match self {
            ScalarNode::Literal { scalar_type, .. }
            | ScalarNode::ColumnRef { scalar_type, .. }
            | ScalarNode::Parameter { scalar_type, .. }
            | ScalarNode::Binary { scalar_type, .. }
            | ScalarNode::Unary { scalar_type, .. }
            | ScalarNode::Case { scalar_type, .. }
            | ScalarNode::FunctionCall { scalar_type, .. }
            | ScalarNode::SubqueryScalar { scalar_type, .. } => scalar_type,
            ScalarNode::Cast { target, .. } => target,
            ScalarNode::Between { low, .. } => low.scalar_type(),
            ScalarNode::Collate { operand, .. } => operand.scalar_type(),
        }
    }

    pub fn children(&self) -> Vec<&ScalarNode> {
        match self {
            ScalarNode::Literal { .. }
            | ScalarNode::ColumnRef { .. }
            | ScalarNode::Parameter { .. }
            | ScalarNode::SubqueryScalar { .. } => vec![],
            ScalarNode::Binary { left, right, .. } => vec![left, right],
            ScalarNode::Unary { operand, .. }
            | ScalarNode::Cast { operand, .. }
            | ScalarNode::Collate { operand, .. } => vec![operand],
            ScalarNode::Between { operand, low, high } => vec![operand, low, high],
            ScalarNode::Case { arms, else_branch, .. } => {
                let mut out = Vec::new();
                for arm in arms {
                    out.push(&arm.when);
                    out.push(&arm.then);
                }
                if let Some(e) = else_branch {
                    out.push(e);
                }
                out
            }
            ScalarNode::FunctionCall { args, .. } => args.iter().collect(),
        }
    }

    /// Relational subtrees embedded in scalar context, exposed separately
    /// from `children` per the plan-node contract.
    pub fn sub_relations(&self) -> Vec<&(dyn super::RelationalNode + Send + Sync)> {
        match self {
            ScalarNode::SubqueryScalar { relation, .. } => vec![relation.as_ref()],
            _ => vec![],
        }
    }
}
