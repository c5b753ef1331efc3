//! End-to-end scenarios run through the public `Database`/`Connection`/
//! `Statement` surface, or directly through `Optimizer`/`emit::execute` for
//! plans that touch no base table.

use quereus::config::Config;
use quereus::emit::{self, ExecContext};
use quereus::optimizer::Optimizer;
use quereus::plan::logical::{
    AggregateCall, AggregateFn, DmlKind, JoinKind, LogicalRelNode, SetOpKind,
};
use quereus::plan::scalar::{BinaryOp, ScalarNode};
use quereus::row::AttributeId;
use quereus::schema::{ColumnDef, QualifiedName, SortDirection, TableSchema};
use quereus::types::{Cardinality, ColumnInfo, RelationType, ScalarKind, ScalarType};
use quereus::value::{Row, SqlValue};
use quereus::vtab::mem::MemoryModule;
use quereus::Database;
use std::collections::HashMap;
use std::sync::Arc;

fn int_col(name: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        scalar_type: ScalarType::new(ScalarKind::Integer).not_null(),
    }
}

fn text_col(name: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        scalar_type: ScalarType::new(ScalarKind::Text),
    }
}

fn col_ref(attribute: AttributeId, kind: ScalarKind) -> ScalarNode {
    ScalarNode::ColumnRef {
        attribute,
        scalar_type: ScalarType::new(kind),
    }
}

fn literal_int(v: i64) -> ScalarNode {
    ScalarNode::literal(SqlValue::Integer(v), ScalarType::new(ScalarKind::Integer).not_null())
}

async fn run(node: LogicalRelNode) -> Vec<Row> {
    let optimizer = Optimizer::new(HashMap::new());
    let physical = optimizer.optimize(node).unwrap();
    let mut ctx = ExecContext::new(HashMap::new(), Vec::new());
    emit::execute(&physical, &mut ctx).await.unwrap()
}

fn memory_schema() -> (Arc<TableSchema>, AttributeId, AttributeId, RelationType) {
    let id_attr = AttributeId::fresh();
    let v_attr = AttributeId::fresh();
    let relation_type = RelationType {
        columns: vec![int_col("id"), text_col("v")],
        keys: vec![vec![0]],
        cardinality: Cardinality::Bag,
    };
    let schema = TableSchema::new(
        QualifiedName::main("t"),
        vec![
            ColumnDef::new("id", ScalarType::new(ScalarKind::Integer)).not_null(),
            ColumnDef::new("v", ScalarType::new(ScalarKind::Text)),
        ],
        "memory",
    )
    .with_primary_key(vec![(0, SortDirection::Asc)]);
    (Arc::new(schema), id_attr, v_attr, relation_type)
}

fn insert_plan(
    schema: &Arc<TableSchema>,
    attrs: &[AttributeId],
    relation_type: &RelationType,
    row: Row,
) -> LogicalRelNode {
    LogicalRelNode::Dml {
        kind: DmlKind::Insert,
        table: schema.clone(),
        source: Box::new(LogicalRelNode::Values {
            rows: vec![row],
            attributes: attrs.to_vec(),
            relation_type: relation_type.clone(),
        }),
        returning: None,
        on_conflict: quereus::error::ConflictPolicy::Abort,
        attributes: attrs.to_vec(),
        relation_type: relation_type.clone(),
    }
}

fn scan_plan(schema: &Arc<TableSchema>, attrs: &[AttributeId], relation_type: &RelationType) -> LogicalRelNode {
    LogicalRelNode::TableScan {
        table: schema.clone(),
        attributes: attrs.to_vec(),
        relation_type: relation_type.clone(),
    }
}

fn texts(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|r| match &r[1] {
            SqlValue::Text(s) => s.clone(),
            _ => unreachable!(),
        })
        .collect()
}

// Scenario 1: a connection's cursor doesn't see a second connection's
// commit until it reopens; a fresh connection sees it immediately.
#[tokio::test]
async fn snapshot_isolation_across_connections() {
    let (schema, id_attr, v_attr, relation_type) = memory_schema();
    let attrs = [id_attr, v_attr];
    let database = Database::new(Config::default());
    database.register_module("memory", Arc::new(MemoryModule::new()));
    database.catalog().register((*schema).clone());

    let setup = Arc::new(database.connect());
    for (id, v) in [(1, "a"), (2, "b"), (3, "c")] {
        let mut stmt = setup
            .prepare(vec![insert_plan(
                &schema,
                &attrs,
                &relation_type,
                vec![SqlValue::Integer(id), SqlValue::Text(v.into())],
            )])
            .unwrap();
        stmt.run().await.unwrap();
    }
    setup.commit().await.unwrap();

    let conn_a = Arc::new(database.connect());
    let mut select_a = conn_a.prepare(vec![scan_plan(&schema, &attrs, &relation_type)]).unwrap();
    let before = select_a.iterate_rows().await.unwrap();
    assert_eq!(before.len(), 3);

    let conn_b = Arc::new(database.connect());
    let mut insert_b = conn_b
        .prepare(vec![insert_plan(
            &schema,
            &attrs,
            &relation_type,
            vec![SqlValue::Integer(4), SqlValue::Text("d".into())],
        )])
        .unwrap();
    insert_b.run().await.unwrap();
    conn_b.commit().await.unwrap();

    let still_three = select_a.iterate_rows().await.unwrap();
    assert_eq!(still_three.len(), 3);

    let conn_c = Arc::new(database.connect());
    let mut select_c = conn_c.prepare(vec![scan_plan(&schema, &attrs, &relation_type)]).unwrap();
    let after = select_c.iterate_rows().await.unwrap();
    assert_eq!(after.len(), 4);
}

// Scenario 2: update, savepoint, delete, rollback to the savepoint leaves
// the update in place and undoes the delete.
#[tokio::test]
async fn savepoint_rollback() {
    let (schema, id_attr, v_attr, relation_type) = memory_schema();
    let attrs = [id_attr, v_attr];
    let database = Database::new(Config::default());
    database.register_module("memory", Arc::new(MemoryModule::new()));
    database.catalog().register((*schema).clone());

    let setup = Arc::new(database.connect());
    for (id, v) in [(1, "a"), (2, "b"), (3, "c")] {
        let mut stmt = setup
            .prepare(vec![insert_plan(
                &schema,
                &attrs,
                &relation_type,
                vec![SqlValue::Integer(id), SqlValue::Text(v.into())],
            )])
            .unwrap();
        stmt.run().await.unwrap();
    }
    setup.commit().await.unwrap();

    let conn_a = Arc::new(database.connect());
    let table = conn_a.resolve_table(&schema.name).await.unwrap();
    conn_a.begin().await.unwrap();
    table
        .update(quereus::vtab::UpdateRequest {
            operation: quereus::vtab::DmlOperation::Update,
            new_values: Some(vec![SqlValue::Integer(2), SqlValue::Text("B".into())]),
            old_key_values: Some(vec![SqlValue::Integer(2)]),
            on_conflict: quereus::error::ConflictPolicy::Abort,
            statement_sql: None,
        })
        .await
        .unwrap();
    table.savepoint(1).await.unwrap();
    table
        .update(quereus::vtab::UpdateRequest {
            operation: quereus::vtab::DmlOperation::Delete,
            new_values: None,
            old_key_values: Some(vec![SqlValue::Integer(3)]),
            on_conflict: quereus::error::ConflictPolicy::Abort,
            statement_sql: None,
        })
        .await
        .unwrap();
    table.rollback_to(1).await.unwrap();

    let mut select_a = conn_a.prepare(vec![scan_plan(&schema, &attrs, &relation_type)]).unwrap();
    let rows = select_a.iterate_rows().await.unwrap();
    assert_eq!(texts(&rows), vec!["a", "B", "c"]);
}

// Scenario 4: VALUES(1) UNION ALL SELECT n+1 FROM cte WHERE n<5 converges
// to exactly 1..5.
#[tokio::test]
async fn recursive_cte_counts_up() {
    let n_attr = AttributeId::fresh();
    let relation_type = RelationType {
        columns: vec![int_col("n")],
        keys: vec![],
        cardinality: Cardinality::Bag,
    };

    let base_case = LogicalRelNode::Values {
        rows: vec![vec![SqlValue::Integer(1)]],
        attributes: vec![n_attr],
        relation_type: relation_type.clone(),
    };

    let working = LogicalRelNode::WorkingTable {
        name: "cte".to_string(),
        attributes: vec![n_attr],
        relation_type: relation_type.clone(),
    };
    let filtered = LogicalRelNode::Filter {
        input: Box::new(working),
        predicate: ScalarNode::Binary {
            op: BinaryOp::Lt,
            left: Box::new(col_ref(n_attr, ScalarKind::Integer)),
            right: Box::new(literal_int(5)),
            scalar_type: ScalarType::new(ScalarKind::Boolean).not_null(),
        },
    };
    let recursive_case = LogicalRelNode::Project {
        input: Box::new(filtered),
        exprs: vec![ScalarNode::Binary {
            op: BinaryOp::Add,
            left: Box::new(col_ref(n_attr, ScalarKind::Integer)),
            right: Box::new(literal_int(1)),
            scalar_type: ScalarType::new(ScalarKind::Integer).not_null(),
        }],
        attributes: vec![n_attr],
        relation_type: relation_type.clone(),
    };

    let cte = LogicalRelNode::RecursiveCte {
        name: "cte".to_string(),
        base_case: Box::new(base_case),
        recursive_case: Box::new(recursive_case),
        union_all: true,
        attributes: vec![n_attr],
        relation_type,
    };

    let rows = run(cte).await;
    let values: Vec<i64> = rows
        .iter()
        .map(|r| match &r[0] {
            SqlValue::Integer(n) => *n,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

// Scenario 5: grouped sums preserve first-occurrence group order even
// though the optimizer always picks the hash strategy for a non-empty
// GROUP BY.
#[tokio::test]
async fn stream_aggregate_preserves_group_order() {
    let k_attr = AttributeId::fresh();
    let v_attr = AttributeId::fresh();
    let input_type = RelationType {
        columns: vec![text_col("k"), int_col("v")],
        keys: vec![],
        cardinality: Cardinality::Bag,
    };

    let source = LogicalRelNode::Values {
        rows: vec![
            vec![SqlValue::Text("a".into()), SqlValue::Integer(1)],
            vec![SqlValue::Text("a".into()), SqlValue::Integer(2)],
            vec![SqlValue::Text("b".into()), SqlValue::Integer(3)],
        ],
        attributes: vec![k_attr, v_attr],
        relation_type: input_type,
    };

    let sum_attr = AttributeId::fresh();
    let output_type = RelationType {
        columns: vec![text_col("k"), int_col("sum_v")],
        keys: vec![],
        cardinality: Cardinality::Bag,
    };
    let aggregate = LogicalRelNode::Aggregate {
        input: Box::new(source),
        group_by: vec![col_ref(k_attr, ScalarKind::Text)],
        aggregates: vec![AggregateCall {
            func: AggregateFn::Sum,
            arg: Some(col_ref(v_attr, ScalarKind::Integer)),
            output_attribute: sum_attr,
        }],
        attributes: vec![k_attr, sum_attr],
        relation_type: output_type,
    };

    let rows = run(aggregate).await;
    let pairs: Vec<(String, i64)> = rows
        .iter()
        .map(|r| {
            let k = match &r[0] {
                SqlValue::Text(s) => s.clone(),
                _ => unreachable!(),
            };
            let sum = match &r[1] {
                SqlValue::Integer(n) => *n,
                _ => unreachable!(),
            };
            (k, sum)
        })
        .collect();
    assert_eq!(pairs, vec![("a".to_string(), 3), ("b".to_string(), 3)]);
}

// Scenario 6: a nested-loop LEFT JOIN pads the unmatched left row with NULLs.
#[tokio::test]
async fn left_join_pads_unmatched_rows() {
    let l_id = AttributeId::fresh();
    let l_v = AttributeId::fresh();
    let r_id = AttributeId::fresh();
    let r_v = AttributeId::fresh();

    let left_type = RelationType {
        columns: vec![int_col("id"), text_col("v")],
        keys: vec![vec![0]],
        cardinality: Cardinality::Bag,
    };
    let right_type = RelationType {
        columns: vec![int_col("id"), text_col("p")],
        keys: vec![vec![0]],
        cardinality: Cardinality::Bag,
    };

    let left = LogicalRelNode::Values {
        rows: vec![
            vec![SqlValue::Integer(1), SqlValue::Text("x".into())],
            vec![SqlValue::Integer(2), SqlValue::Text("y".into())],
        ],
        attributes: vec![l_id, l_v],
        relation_type: left_type.clone(),
    };
    let right = LogicalRelNode::Values {
        rows: vec![vec![SqlValue::Integer(1), SqlValue::Text("p".into())]],
        attributes: vec![r_id, r_v],
        relation_type: right_type.clone(),
    };

    let mut joined_columns = left_type.columns.clone();
    joined_columns.extend(right_type.columns.clone());
    let joined_type = RelationType {
        columns: joined_columns,
        keys: vec![],
        cardinality: Cardinality::Bag,
    };

    let join = LogicalRelNode::Join {
        left: Box::new(left),
        right: Box::new(right),
        kind: JoinKind::Left,
        condition: Some(ScalarNode::Binary {
            op: BinaryOp::Eq,
            left: Box::new(col_ref(l_id, ScalarKind::Integer)),
            right: Box::new(col_ref(r_id, ScalarKind::Integer)),
            scalar_type: ScalarType::new(ScalarKind::Boolean).not_null(),
        }),
        attributes: vec![l_id, l_v, r_id, r_v],
        relation_type: joined_type,
    };

    let rows = run(join).await;
    assert_eq!(
        rows,
        vec![
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("x".into()),
                SqlValue::Integer(1),
                SqlValue::Text("p".into()),
            ],
            vec![
                SqlValue::Integer(2),
                SqlValue::Text("y".into()),
                SqlValue::Null,
                SqlValue::Null,
            ],
        ]
    );
}

// Set-op sanity check alongside the scenario tests above: UNION ALL keeps
// duplicates, UNION DISTINCT doesn't.
#[tokio::test]
async fn set_op_union_all_vs_distinct() {
    let attr = AttributeId::fresh();
    let relation_type = RelationType {
        columns: vec![int_col("n")],
        keys: vec![],
        cardinality: Cardinality::Bag,
    };
    let left = LogicalRelNode::Values {
        rows: vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]],
        attributes: vec![attr],
        relation_type: relation_type.clone(),
    };
    let right = LogicalRelNode::Values {
        rows: vec![vec![SqlValue::Integer(2)], vec![SqlValue::Integer(3)]],
        attributes: vec![attr],
        relation_type: relation_type.clone(),
    };

    let union_all = LogicalRelNode::SetOp {
        kind: SetOpKind::UnionAll,
        left: Box::new(left.clone()),
        right: Box::new(right.clone()),
    };
    let rows = run(union_all).await;
    assert_eq!(rows.len(), 4);

    let union_distinct = LogicalRelNode::SetOp {
        kind: SetOpKind::UnionDistinct,
        left: Box::new(left),
        right: Box::new(right),
    };
    let rows = run(union_distinct).await;
    assert_eq!(rows.len(), 3);
}
