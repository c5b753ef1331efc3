//! Access-path selection: turn a (possibly filtered) table scan into a
//! `PhysicalRelNode::TableAccess`, consulting the table's vtab module for
//! which constraints it can enforce itself.

use super::pushdown::{and_all, conjuncts};
use crate::error::QuereusResult;
use crate::plan::physical::{PhysicalRelNode, ScanPlan};
use crate::plan::scalar::{BinaryOp, ScalarNode};
use crate::row::AttributeId;
use crate::schema::SharedTableSchema;
use crate::types::RelationType;
use crate::vtab::{AccessRequest, BestAccessPlan, FilterConstraint, FilterOp, VtabModule};
use std::collections::HashMap;
use std::sync::Arc;

/// One `column OP literal`-shaped conjunct recognized against a scan's own
/// attributes, with enough of the original expression kept to reconstruct
/// equality/bound scalars once the module commits to using it.
struct Candidate {
    attribute: AttributeId,
    op: FilterOp,
    literal: ScalarNode,
    source: ScalarNode,
}

fn binary_op_to_filter_op(op: BinaryOp) -> Option<FilterOp> {
    match op {
        BinaryOp::Eq => Some(FilterOp::Eq),
        BinaryOp::Ne => Some(FilterOp::Ne),
        BinaryOp::Lt => Some(FilterOp::Lt),
        BinaryOp::Le => Some(FilterOp::Le),
        BinaryOp::Gt => Some(FilterOp::Gt),
        BinaryOp::Ge => Some(FilterOp::Ge),
        BinaryOp::Is => Some(FilterOp::Is),
        BinaryOp::Like => Some(FilterOp::Like),
        BinaryOp::Glob => Some(FilterOp::Glob),
        BinaryOp::Regexp => Some(FilterOp::Regexp),
        BinaryOp::Match => Some(FilterOp::Match),
        _ => None,
    }
}

fn as_candidate(node: &ScalarNode, scan_attributes: &[AttributeId]) -> Option<Candidate> {
    let ScalarNode::Binary { op, left, right, .. } = node else {
        return None;
    };
    let filter_op = binary_op_to_filter_op(*op)?;

    let column_on_left = matches!(left.as_ref(), ScalarNode::ColumnRef { attribute, .. } if scan_attributes.contains(attribute));
    let column_on_right = matches!(right.as_ref(), ScalarNode::ColumnRef { attribute, .. } if scan_attributes.contains(attribute));

    if column_on_left && is_constant(right) {
        let ScalarNode::ColumnRef { attribute, .. } = left.as_ref() else {
            unreachable!()
        };
        return Some(Candidate {
            attribute: *attribute,
            op: filter_op,
            literal: (**right).clone(),
            source: node.clone(),
        });
    }
    if column_on_right && is_constant(left) {
        let ScalarNode::ColumnRef { attribute, .. } = right.as_ref() else {
            unreachable!()
        };
        return Some(Candidate {
            attribute: *attribute,
            op: flip(filter_op),
            literal: (**left).clone(),
            source: node.clone(),
        });
    }
    None
}

fn is_constant(node: &ScalarNode) -> bool {
    matches!(node, ScalarNode::Literal { .. } | ScalarNode::Parameter { .. })
}

fn flip(op: FilterOp) -> FilterOp {
    match op {
        FilterOp::Lt => FilterOp::Gt,
        FilterOp::Le => FilterOp::Ge,
        FilterOp::Gt => FilterOp::Lt,
        FilterOp::Ge => FilterOp::Le,
        other => other,
    }
}

/// Resolve a base-table scan (optionally filtered) into a physical
/// `TableAccess`, asking the table's registered module which of the
/// candidate constraints it will enforce itself.
pub fn physical_scan(
    modules: &HashMap<String, Arc<dyn VtabModule>>,
    table: SharedTableSchema,
    attributes: Vec<AttributeId>,
    relation_type: RelationType,
    predicate: Option<ScalarNode>,
) -> QuereusResult<PhysicalRelNode> {
    let conjuncts_list = predicate.map(conjuncts).unwrap_or_default();
    let candidates: Vec<Option<Candidate>> = conjuncts_list
        .iter()
        .map(|c| as_candidate(c, &attributes))
        .collect();

    let module = modules.get(&table.vtab_module);

    let filters: Vec<FilterConstraint> = candidates
        .iter()
        .map(|cand| {
            let column_index = cand
                .as_ref()
                .and_then(|c| attributes.iter().position(|a| *a == c.attribute))
                .unwrap_or(usize::MAX);
            FilterConstraint {
                column_index,
                op: cand.as_ref().map(|c| c.op).unwrap_or(FilterOp::Eq),
                usable: cand.is_some(),
            }
        })
        .collect();

    let request = AccessRequest {
        filters,
        estimated_rows: table.estimated_rows.max(1),
    };

    let access_plan = match module {
        Some(m) => m.best_access_plan(&table, &request),
        None => BestAccessPlan {
            handled_mask: vec![false; conjuncts_list.len()],
            estimated_rows: table.estimated_rows,
            estimated_cost: table.estimated_rows.max(1) as f64,
            chosen_index: None,
            supports_set_or_seek: false,
        },
    };

    let mut equality_key = Vec::new();
    let mut lower_bound = None;
    let mut upper_bound = None;
    let mut residual_conjuncts = Vec::new();

    for (i, conjunct) in conjuncts_list.into_iter().enumerate() {
        let handled = access_plan.handled_mask.get(i).copied().unwrap_or(false);
        if !handled {
            residual_conjuncts.push(conjunct);
            continue;
        }
        let Some(candidate) = &candidates[i] else {
            residual_conjuncts.push(conjunct);
            continue;
        };
        match candidate.op {
            FilterOp::Eq => equality_key.push(candidate.literal.clone()),
            FilterOp::Gt | FilterOp::Ge => lower_bound = Some(candidate.literal.clone()),
            FilterOp::Lt | FilterOp::Le => upper_bound = Some(candidate.literal.clone()),
            _ => residual_conjuncts.push(candidate.source.clone()),
        }
    }

    let scan = ScanPlan {
        index_name: access_plan.chosen_index.clone(),
        equality_key,
        lower_bound,
        upper_bound,
        descending: false,
        residual: and_all(residual_conjuncts),
        access_plan,
    };

    Ok(PhysicalRelNode::TableAccess {
        table,
        scan,
        attributes,
        relation_type,
    })
}
