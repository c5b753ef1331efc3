//! Plan node model.
//!
//! Every node is immutable once built. Nodes split into two disjoint
//! capability sets: `ScalarNode`s evaluate to a `SqlValue` against the
//! ambient row context, `RelationalNode`s produce rows. Each relational node
//! carries its output `RelationType` and the attribute ids it produces;
//! each scalar node carries its `ScalarType`. Both expose children and
//! sub-relations separately (`ScalarNode::sub_relations`) so the optimizer
//! can rewrite subtrees freely without caring which kind of child it holds.

pub mod logical;
pub mod physical;
pub mod scalar;

pub use logical::LogicalRelNode;
pub use physical::PhysicalRelNode;
pub use scalar::ScalarNode;

use crate::row::AttributeId;
use crate::types::RelationType;

/// Shared behaviour of any node that produces rows, logical or physical.
pub trait RelationalNode: std::fmt::Debug {
    fn relation_type(&self) -> &RelationType;
    fn attributes(&self) -> &[AttributeId];
    fn children(&self) -> Vec<&dyn RelationalNode>;
}
