//! Prepared statement lifecycle: a statement owns a batch of plan
//! roots, a cursor into that batch, and — once it starts iterating — a
//! compiled physical plan plus its materialized row sequence.
//!
//! ```text
//! prepare(batch) -> Statement (NotBusy, cursor = 0)
//! bind / bind_all          -- only while NotBusy
//! iterate_rows / run / get -- compiles current statement if needed, goes Busy
//! reset                    -- drops the compiled plan, back to NotBusy
//! finalize                 -- releases everything, rejects further calls
//! ```
//!
//! This executor fully materializes a statement's rows before yielding the
//! first one (see `crate::emit::relational`), so "busy" here means "has an
//! open result set to drain", not "mid network round-trip" — but the state
//! machine and its invariants are the same ones a streaming engine needs.

use crate::connection::Connection;
use crate::error::{QuereusError, QuereusResult};
use crate::optimizer::Optimizer;
use crate::plan::logical::LogicalRelNode;
use crate::plan::physical::PhysicalRelNode;
use crate::plan::RelationalNode;
use crate::schema::QualifiedName;
use crate::value::{Row, SqlValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Walks a logical plan collecting every base table it scans or mutates, so
/// the statement can resolve per-connection handles for all of them before
/// compiling and executing.
fn collect_table_names(node: &LogicalRelNode, out: &mut Vec<QualifiedName>) {
    match node {
        LogicalRelNode::TableScan { table, .. } => out.push(table.name.clone()),
        LogicalRelNode::Dml { table, source, .. } => {
            out.push(table.name.clone());
            collect_table_names(source, out);
        }
        LogicalRelNode::Values { .. } | LogicalRelNode::WorkingTable { .. } => {}
        LogicalRelNode::Filter { input, .. }
        | LogicalRelNode::Project { input, .. }
        | LogicalRelNode::Sort { input, .. }
        | LogicalRelNode::Distinct { input }
        | LogicalRelNode::Limit { input, .. }
        | LogicalRelNode::Aggregate { input, .. } => collect_table_names(input, out),
        LogicalRelNode::Join { left, right, .. } | LogicalRelNode::SetOp { left, right, .. } => {
            collect_table_names(left, out);
            collect_table_names(right, out);
        }
        LogicalRelNode::CteRef { input, .. } => collect_table_names(input, out),
        LogicalRelNode::RecursiveCte {
            base_case,
            recursive_case,
            ..
        } => {
            collect_table_names(base_case, out);
            collect_table_names(recursive_case, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    NotBusy,
    Busy,
    Finalized,
}

/// A result row paired with the column names of the statement that produced
/// it, as returned by `Statement::get`.
#[derive(Debug, Clone)]
pub struct NamedRow {
    pub columns: Vec<String>,
    pub values: Row,
}

struct CompiledStatement {
    physical: PhysicalRelNode,
    column_names: Vec<String>,
}

pub struct Statement {
    connection: Arc<Connection>,
    batch: Vec<LogicalRelNode>,
    cursor: usize,
    parameters: Vec<SqlValue>,
    param_names: HashMap<String, usize>,
    state: State,
    compiled: Option<CompiledStatement>,
}

impl Statement {
    pub fn prepare(connection: Arc<Connection>, batch: Vec<LogicalRelNode>) -> QuereusResult<Self> {
        if batch.is_empty() {
            return Err(QuereusError::misuse("cannot prepare an empty statement batch"));
        }
        Ok(Statement {
            connection,
            batch,
            cursor: 0,
            parameters: Vec::new(),
            param_names: HashMap::new(),
            state: State::NotBusy,
            compiled: None,
        })
    }

    /// Declares a name for a positional parameter, enabling `bind_by_name`.
    pub fn with_param_names(mut self, names: HashMap<String, usize>) -> Self {
        self.param_names = names;
        self
    }

    fn ensure_not_finalized(&self) -> QuereusResult<()> {
        if self.state == State::Finalized {
            return Err(QuereusError::misuse("statement has been finalized"));
        }
        Ok(())
    }

    fn ensure_not_busy(&self) -> QuereusResult<()> {
        self.ensure_not_finalized()?;
        if self.state == State::Busy {
            return Err(QuereusError::misuse("statement is busy iterating a result set"));
        }
        Ok(())
    }

    /// Advances to the next statement in the batch, resetting parameters and
    /// any compiled plan. Returns `false` once the batch is exhausted.
    pub fn next_statement(&mut self) -> QuereusResult<bool> {
        self.ensure_not_busy()?;
        if self.cursor + 1 >= self.batch.len() {
            return Ok(false);
        }
        self.cursor += 1;
        self.compiled = None;
        Ok(true)
    }

    pub fn bind(&mut self, index: usize, value: SqlValue) -> QuereusResult<()> {
        self.ensure_not_busy()?;
        if index >= self.parameters.len() {
            self.parameters.resize(index + 1, SqlValue::Null);
        }
        self.parameters[index] = value;
        Ok(())
    }

    pub fn bind_by_name(&mut self, name: &str, value: SqlValue) -> QuereusResult<()> {
        let index = *self
            .param_names
            .get(name)
            .ok_or_else(|| QuereusError::misuse(format!("no parameter named '{name}'")))?;
        self.bind(index, value)
    }

    pub fn bind_all(&mut self, values: Vec<SqlValue>) -> QuereusResult<()> {
        self.ensure_not_busy()?;
        self.parameters = values;
        Ok(())
    }

    async fn compile_current(&mut self) -> QuereusResult<()> {
        if self.compiled.is_some() {
            return Ok(());
        }
        let logical = self.batch[self.cursor].clone();
        let mut table_names = Vec::new();
        collect_table_names(&logical, &mut table_names);
        for name in &table_names {
            self.connection.resolve_table(name).await?;
        }
        let column_names = logical
            .relation_type()
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let optimizer: Optimizer = self.connection.database().optimizer();
        let physical = optimizer.optimize(logical)?;
        self.compiled = Some(CompiledStatement { physical, column_names });
        Ok(())
    }

    /// Compiles (if needed), emits, schedules and returns every row of the
    /// current statement.
    pub async fn iterate_rows(&mut self) -> QuereusResult<Vec<Row>> {
        self.ensure_not_busy()?;
        self.compile_current().await?;
        self.state = State::Busy;

        let tables = self.connection.resolved_tables();
        let mut ctx = crate::emit::ExecContext::new(tables, self.parameters.clone());
        if let Some(sink) = self.connection.change_sink() {
            ctx = ctx.with_events(sink);
        }

        let physical = self.compiled.as_ref().expect("compiled above").physical.clone();
        let result = crate::emit::execute(&physical, &mut ctx).await;
        self.state = State::NotBusy;
        result
    }

    /// Iterates to exhaustion, discarding rows; for DML/DDL statements run
    /// purely for effect.
    pub async fn run(&mut self) -> QuereusResult<u64> {
        let rows = self.iterate_rows().await?;
        Ok(rows.len() as u64)
    }

    /// Runs the statement and returns its first row as a name-keyed record,
    /// or `None` if it produced no rows.
    pub async fn get(&mut self) -> QuereusResult<Option<NamedRow>> {
        self.compile_current().await?;
        let column_names = self.compiled.as_ref().expect("compiled above").column_names.clone();
        let rows = self.iterate_rows().await?;
        Ok(rows.into_iter().next().map(|values| NamedRow {
            columns: column_names,
            values,
        }))
    }

    /// Clears busy state and the compiled plan without discarding parameters.
    pub fn reset(&mut self) -> QuereusResult<()> {
        self.ensure_not_finalized()?;
        self.state = State::NotBusy;
        self.compiled = None;
        Ok(())
    }

    pub fn finalize(&mut self) -> QuereusResult<()> {
        if self.state == State::Finalized {
            return Ok(()); // idempotent, per the statement lifecycle's no-op-on-repeat invariant
        }
        self.compiled = None;
        self.state = State::Finalized;
        Ok(())
    }

    /// JSON-free debug view of the current statement's physical plan.
    pub async fn get_debug_plan(&mut self) -> QuereusResult<String> {
        self.compile_current().await?;
        Ok(format!("{:#?}", self.compiled.as_ref().expect("compiled above").physical))
    }

    /// Flat instruction-style listing; this executor has no separate
    /// instruction program, so the physical plan's preorder walk stands in.
    pub async fn get_debug_program(&mut self) -> QuereusResult<Vec<String>> {
        self.compile_current().await?;
        let physical = &self.compiled.as_ref().expect("compiled above").physical;
        let mut out = Vec::new();
        walk(physical as &dyn RelationalNode, 0, &mut out);
        Ok(out)
    }
}

fn walk(node: &dyn RelationalNode, depth: usize, out: &mut Vec<String>) {
    out.push(format!("{}{:?}", "  ".repeat(depth), node));
    for child in node.children() {
        walk(child, depth + 1, out);
    }
}
