//! Filter pushdown over the logical plan tree, run before physical
//! conversion so access-path selection sees predicates already pushed as
//! close to their base relation as attribute-id scoping allows.

use crate::plan::logical::LogicalRelNode;
use crate::plan::scalar::{BinaryOp, ScalarNode};
use crate::plan::RelationalNode;
use crate::row::AttributeId;

/// Split a conjunctive predicate into its top-level `AND` conjuncts.
pub fn conjuncts(node: ScalarNode) -> Vec<ScalarNode> {
    match node {
        ScalarNode::Binary {
            op: BinaryOp::And,
            left,
            right,
            ..
        } => {
            let mut out = conjuncts(*left);
            out.extend(conjuncts(*right));
            out
        }
        other => vec![other],
    }
}

/// Recombine conjuncts into a single predicate, `None` for an empty list.
pub fn and_all(mut conjuncts: Vec<ScalarNode>) -> Option<ScalarNode> {
    let first = conjuncts.pop()?;
    conjuncts.into_iter().rev().fold(Some(first), |acc, next| {
        acc.map(|existing| ScalarNode::Binary {
            op: BinaryOp::And,
            left: Box::new(next),
            right: Box::new(existing),
            scalar_type: existing_bool_type(),
        })
    })
}

fn existing_bool_type() -> crate::types::ScalarType {
    crate::types::ScalarType::new(crate::types::ScalarKind::Boolean)
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

fn wrap_filter(input: LogicalRelNode, predicate: Option<ScalarNode>) -> LogicalRelNode {
    match predicate {
        Some(predicate) => LogicalRelNode::Filter {
            input: Box::new(input),
            predicate,
        },
        None => input,
    }
}

pub fn push_down_filters(node: LogicalRelNode) -> LogicalRelNode {
    match node {
        LogicalRelNode::Filter { input, predicate } => {
            let input = push_down_filters(*input);
            match input {
                LogicalRelNode::Project {
                    input: inner,
                    exprs,
                    attributes,
                    relation_type,
                } => {
                    if references_only(&predicate, inner.attributes()) {
                        LogicalRelNode::Project {
                            input: Box::new(LogicalRelNode::Filter {
                                input: inner,
                                predicate,
                            }),
                            exprs,
                            attributes,
                            relation_type,
                        }
                    } else {
                        LogicalRelNode::Filter {
                            input: Box::new(LogicalRelNode::Project {
                                input: inner,
                                exprs,
                                attributes,
                                relation_type,
                            }),
                            predicate,
                        }
                    }
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
                    let mut remaining = Vec::new();
                    let mut left_preds = Vec::new();
                    let mut right_preds = Vec::new();

                    for conjunct in conjuncts(predicate) {
                        if references_only(&conjunct, &left_attrs) {
                            left_preds.push(conjunct);
                        } else if references_only(&conjunct, &right_attrs) {
                            right_preds.push(conjunct);
                        } else {
                            remaining.push(conjunct);
                        }
                    }

                    let new_left = wrap_filter(*left, and_all(left_preds));
                    let new_right = wrap_filter(*right, and_all(right_preds));
                    let join = LogicalRelNode::Join {
                        left: Box::new(new_left),
                        right: Box::new(new_right),
                        kind,
                        condition,
                        attributes,
                        relation_type,
                    };
                    wrap_filter(join, and_all(remaining))
                }
                LogicalRelNode::Filter {
                    input: inner,
                    predicate: inner_predicate,
                } => LogicalRelNode::Filter {
                    input: inner,
                    predicate: and_all(vec![inner_predicate, predicate]).expect("two conjuncts"),
                },
                other => LogicalRelNode::Filter {
                    input: Box::new(other),
                    predicate,
                },
            }
        }
        LogicalRelNode::Project {
            input,
            exprs,
            attributes,
            relation_type,
        } => LogicalRelNode::Project {
            input: Box::new(push_down_filters(*input)),
            exprs,
            attributes,
            relation_type,
        },
        LogicalRelNode::Sort { input, keys } => LogicalRelNode::Sort {
            input: Box::new(push_down_filters(*input)),
            keys,
        },
        LogicalRelNode::Distinct { input } => LogicalRelNode::Distinct {
            input: Box::new(push_down_filters(*input)),
        },
        LogicalRelNode::Limit { input, limit, offset } => LogicalRelNode::Limit {
            input: Box::new(push_down_filters(*input)),
            limit,
            offset,
        },
        LogicalRelNode::Aggregate {
            input,
            group_by,
            aggregates,
            attributes,
            relation_type,
        } => LogicalRelNode::Aggregate {
            input: Box::new(push_down_filters(*input)),
            group_by,
            aggregates,
            attributes,
            relation_type,
        },
        LogicalRelNode::Join {
            left,
            right,
            kind,
            condition,
            attributes,
            relation_type,
        } => LogicalRelNode::Join {
            left: Box::new(push_down_filters(*left)),
            right: Box::new(push_down_filters(*right)),
            kind,
            condition,
            attributes,
            relation_type,
        },
        LogicalRelNode::SetOp { kind, left, right } => LogicalRelNode::SetOp {
            kind,
            left: Box::new(push_down_filters(*left)),
            right: Box::new(push_down_filters(*right)),
        },
        LogicalRelNode::CteRef { name, input } => {
            // `input` is shared (`Arc`) across every reference to this CTE;
            // pushing into it here would duplicate work across references
            // inconsistently, so it is left for the optimizer's cache-node
            // pass once reference count is known.
            LogicalRelNode::CteRef { name, input }
        }
        LogicalRelNode::RecursiveCte {
            name,
            base_case,
            recursive_case,
            union_all,
            attributes,
            relation_type,
        } => LogicalRelNode::RecursiveCte {
            name,
            base_case: Box::new(push_down_filters(*base_case)),
            recursive_case: Box::new(push_down_filters(*recursive_case)),
            union_all,
            attributes,
            relation_type,
        },
        LogicalRelNode::Dml {
            kind,
            table,
            source,
            returning,
            on_conflict,
            attributes,
            relation_type,
        } => LogicalRelNode::Dml {
            kind,
            table,
            source: Box::new(push_down_filters(*source)),
            returning,
            on_conflict,
            attributes,
            relation_type,
        },
        leaf @ (LogicalRelNode::TableScan { .. }
        | LogicalRelNode::Values { .. }
        | LogicalRelNode::WorkingTable { .. }) => leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, QualifiedName, TableSchema};
    use crate::types::{Cardinality, ColumnInfo, RelationType, ScalarKind, ScalarType};
    use crate::value::SqlValue;
    use std::sync::Arc;

    fn int_col(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            scalar_type: ScalarType::new(ScalarKind::Integer),
        }
    }

    #[test]
    fn pushes_single_side_predicate_through_project() {
        let attr = AttributeId::fresh();
        let table = Arc::new(TableSchema::new(
            QualifiedName::main("t"),
            vec![ColumnDef::new("a", ScalarType::new(ScalarKind::Integer))],
            "memory",
        ));
        let scan = LogicalRelNode::TableScan {
            table,
            attributes: vec![attr],
            relation_type: RelationType {
                columns: vec![int_col("a")],
                keys: vec![],
                cardinality: Cardinality::Bag,
            },
        };
        let project = LogicalRelNode::Project {
            input: Box::new(scan),
            exprs: vec![ScalarNode::ColumnRef {
                attribute: attr,
                scalar_type: ScalarType::new(ScalarKind::Integer),
            }],
            attributes: vec![attr],
            relation_type: RelationType {
                columns: vec![int_col("a")],
                keys: vec![],
                cardinality: Cardinality::Bag,
            },
        };
        let predicate = ScalarNode::Binary {
            op: BinaryOp::Gt,
            left: Box::new(ScalarNode::ColumnRef {
                attribute: attr,
                scalar_type: ScalarType::new(ScalarKind::Integer),
            }),
            right: Box::new(ScalarNode::literal(
                SqlValue::Integer(0),
                ScalarType::new(ScalarKind::Integer),
            )),
            scalar_type: ScalarType::new(ScalarKind::Boolean),
        };
        let filter = LogicalRelNode::Filter {
            input: Box::new(project),
            predicate,
        };

        let result = push_down_filters(filter);
        match result {
            LogicalRelNode::Project { input, .. } => {
                assert!(matches!(*input, LogicalRelNode::Filter { .. }));
            }
            other => panic!("expected Project at the top, got {other:?}"),
        }
    }
}
