//! Demo CLI: builds an in-memory `t(id integer primary key, v text)` table
//! and drives it through `Database`/`Connection`/`Statement`, since this
//! crate has no SQL text frontend — statements are prepared from plan trees
//! built directly against the `plan::logical` API.

use clap::{Parser, Subcommand};
use quereus::config::Config;
use quereus::plan::logical::{DmlKind, LogicalRelNode};
use quereus::row::AttributeId;
use quereus::schema::{ColumnDef, QualifiedName, SortDirection, TableSchema};
use quereus::types::{Cardinality, ColumnInfo, RelationType, ScalarKind, ScalarType};
use quereus::value::{Row, SqlValue};
use quereus::vtab::mem::MemoryModule;
use quereus::Database;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quereus", about = "Embeddable SQL engine demo shell")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run end-to-end scenario 1: snapshot isolation across connections.
    Demo,
    /// Interactive shell: insert/scan/begin/commit/rollback against `t`.
    Repl,
}

struct Demo {
    attributes: Vec<AttributeId>,
    relation_type: RelationType,
    schema: Arc<TableSchema>,
}

fn build_table() -> Demo {
    let id_attr = AttributeId::fresh();
    let v_attr = AttributeId::fresh();
    let relation_type = RelationType {
        columns: vec![
            ColumnInfo {
                name: "id".to_string(),
                scalar_type: ScalarType::new(ScalarKind::Integer).not_null(),
            },
            ColumnInfo {
                name: "v".to_string(),
                scalar_type: ScalarType::new(ScalarKind::Text),
            },
        ],
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

    Demo {
        attributes: vec![id_attr, v_attr],
        relation_type,
        schema: Arc::new(schema),
    }
}

fn insert_plan(demo: &Demo, row: Row) -> LogicalRelNode {
    LogicalRelNode::Dml {
        kind: DmlKind::Insert,
        table: demo.schema.clone(),
        source: Box::new(LogicalRelNode::Values {
            rows: vec![row],
            attributes: demo.attributes.clone(),
            relation_type: demo.relation_type.clone(),
        }),
        returning: None,
        on_conflict: quereus::error::ConflictPolicy::Abort,
        attributes: demo.attributes.clone(),
        relation_type: demo.relation_type.clone(),
    }
}

fn scan_plan(demo: &Demo) -> LogicalRelNode {
    LogicalRelNode::TableScan {
        table: demo.schema.clone(),
        attributes: demo.attributes.clone(),
        relation_type: demo.relation_type.clone(),
    }
}

fn print_rows(rows: &[Row]) {
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.display_text()).collect();
        println!("({})", cells.join(", "));
    }
}

#[tokio::main]
async fn main() {
    let config = Config::load().unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.logging.level.clone()))
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Demo) {
        Command::Demo => run_demo(config).await,
        Command::Repl => run_repl(config).await,
    }
}

async fn run_demo(config: Config) {
    let database = Database::new(config);
    database.register_module("memory", Arc::new(MemoryModule::new()));
    let demo = build_table();
    database.catalog().register((*demo.schema).clone());

    let setup = Arc::new(database.connect());
    for (id, v) in [(1, "a"), (2, "b"), (3, "c")] {
        let mut stmt = setup
            .prepare(vec![insert_plan(&demo, vec![SqlValue::Integer(id), SqlValue::Text(v.into())])])
            .unwrap();
        stmt.run().await.unwrap();
    }
    setup.commit().await.unwrap();

    let conn_a = Arc::new(database.connect());
    println!("connection A before B's insert:");
    let mut select_a = conn_a.prepare(vec![scan_plan(&demo)]).unwrap();
    print_rows(&select_a.iterate_rows().await.unwrap());

    let conn_b = Arc::new(database.connect());
    let mut insert_b = conn_b
        .prepare(vec![insert_plan(&demo, vec![SqlValue::Integer(4), SqlValue::Text("d".into())])])
        .unwrap();
    insert_b.run().await.unwrap();
    conn_b.commit().await.unwrap();

    println!("connection A after B's insert (pre-existing handle, same snapshot):");
    print_rows(&select_a.iterate_rows().await.unwrap());

    println!("a fresh connection sees the new row:");
    let conn_c = Arc::new(database.connect());
    let mut select_c = conn_c.prepare(vec![scan_plan(&demo)]).unwrap();
    print_rows(&select_c.iterate_rows().await.unwrap());
}

async fn run_repl(config: Config) {
    let database = Database::new(config);
    database.register_module("memory", Arc::new(MemoryModule::new()));
    let demo = build_table();
    database.catalog().register((*demo.schema).clone());
    let conn = Arc::new(database.connect());

    println!("quereus repl — commands: insert <id> <text> | scan | begin | commit | rollback | quit");
    let mut editor = DefaultEditor::new().expect("terminal supports line editing");
    loop {
        match editor.readline("quereus> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                let parts: Vec<&str> = line.trim().split_whitespace().collect();
                match parts.as_slice() {
                    ["insert", id, text] => match id.parse::<i64>() {
                        Ok(id) => {
                            let plan = insert_plan(&demo, vec![SqlValue::Integer(id), SqlValue::Text((*text).to_string())]);
                            match conn.prepare(vec![plan]) {
                                Ok(mut stmt) => {
                                    if let Err(e) = stmt.run().await {
                                        println!("error: {e}");
                                    }
                                }
                                Err(e) => println!("error: {e}"),
                            }
                        }
                        Err(_) => println!("id must be an integer"),
                    },
                    ["scan"] => match conn.prepare(vec![scan_plan(&demo)]) {
                        Ok(mut stmt) => match stmt.iterate_rows().await {
                            Ok(rows) => print_rows(&rows),
                            Err(e) => println!("error: {e}"),
                        },
                        Err(e) => println!("error: {e}"),
                    },
                    ["begin"] => {
                        if let Err(e) = conn.begin().await {
                            println!("error: {e}");
                        }
                    }
                    ["commit"] => {
                        if let Err(e) = conn.commit().await {
                            println!("error: {e}");
                        }
                    }
                    ["rollback"] => {
                        if let Err(e) = conn.rollback().await {
                            println!("error: {e}");
                        }
                    }
                    ["quit"] | ["exit"] => break,
                    [] => {}
                    _ => println!("unrecognized command"),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                println!("error: {e}");
                break;
            }
        }
    }
}
