//! Engine-wide shared state: the catalog of table schemas and the registry
//! of virtual-table modules connections are resolved against.
//!
//! ```text
//! Database
//! ├── Catalog (table schemas, shared across connections)
//! └── modules: HashMap<String, Arc<dyn VtabModule>>
//! ```
//!
//! A `Connection` borrows a `Database` and mints its own per-connection
//! `VirtualTable` handles by calling each module's `connect()`, and asks for
//! a freshly built `Optimizer` whenever it compiles a statement, so a module
//! registered after a connection was opened is still visible to it.

use crate::config::Config;
use crate::connection::Connection;
use crate::error::{QuereusError, QuereusResult};
use crate::optimizer::Optimizer;
use crate::schema::catalog::Catalog;
use crate::vtab::VtabModule;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Database {
    catalog: Catalog,
    modules: RwLock<HashMap<String, Arc<dyn VtabModule>>>,
    config: Config,
}

impl Database {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Database {
            catalog: Catalog::new(),
            modules: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn register_module(&self, name: impl Into<String>, module: Arc<dyn VtabModule>) {
        self.modules.write().insert(name.into(), module);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn module(&self, name: &str) -> QuereusResult<Arc<dyn VtabModule>> {
        self.modules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuereusError::misuse(format!("no module registered under '{name}'")))
    }

    /// A fresh optimizer over the module registry as it stands right now.
    pub fn optimizer(&self) -> Optimizer {
        Optimizer::new(self.modules.read().clone())
    }

    pub fn connect(self: &Arc<Self>) -> Connection {
        Connection::new(Arc::clone(self))
    }
}
