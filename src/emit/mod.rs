//! Compiles a physical plan into row output: scalar evaluation against the
//! ambient `BindingStack` plus the relational operators that drive
//! `VirtualTable` instances.

pub mod functions;
pub mod relational;
pub mod scalar;

pub use relational::{execute, ExecContext};
