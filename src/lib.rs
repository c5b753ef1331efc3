//! An embeddable SQL engine: a plan-driven query execution pipeline over a
//! virtual-table contract, shipped with an MVCC-layered in-memory table as
//! its reference implementation.
//!
//! ```text
//! Database -- registers vtab modules, owns the schema Catalog
//!   └── Connection -- per-client transaction state, resolved table handles
//!         └── Statement -- prepare / bind / iterate_rows / run / get
//! ```
//!
//! A statement is prepared from a batch of already-built `LogicalRelNode`
//! plan roots (see `plan::logical`); this crate does not include a SQL text
//! frontend. The `optimizer` rewrites logical plans to `physical`, and
//! `emit` drives the physical plan against the tables a connection has
//! resolved, evaluating `plan::scalar` expressions along the way.

pub mod config;
pub mod connection;
pub mod database;
pub mod emit;
pub mod error;
pub mod events;
pub mod optimizer;
pub mod plan;
pub mod row;
pub mod schema;
pub mod statement;
pub mod temporal;
pub mod types;
pub mod value;
pub mod vtab;

pub use connection::Connection;
pub use database::Database;
pub use error::{QuereusError, QuereusResult};
pub use statement::Statement;
