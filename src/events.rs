//! Change-event contract: virtual tables without native event support
//! get a synthetic event recorded on their behalf by the DML executor.

use crate::schema::QualifiedName;
use crate::value::Row;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row-level change. `old_row` is only populated for `Delete`,
/// `new_row` only for `Insert`/`Update` — true pre-image capture for `Update`
/// would require an extra read the executor doesn't otherwise need.
/// `changed_columns` is always `None`; column-level diffing isn't attempted.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: QualifiedName,
    pub primary_key: Row,
    pub old_row: Option<Row>,
    pub new_row: Option<Row>,
    pub changed_columns: Option<Vec<usize>>,
    pub remote: bool,
}

pub trait ChangeSink: Send + Sync {
    fn emit(&self, event: ChangeEvent);
}

/// In-process collector used by tests and the demo CLI. Production consumers
/// implement `ChangeSink` directly against whatever transport they use.
#[derive(Default)]
pub struct ChangeLog {
    events: Mutex<Vec<ChangeEvent>>,
}

impl ChangeLog {
    pub fn new() -> Arc<Self> {
        Arc::new(ChangeLog::default())
    }

    pub fn drain(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events.lock())
    }
}

impl ChangeSink for ChangeLog {
    fn emit(&self, event: ChangeEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_and_clears() {
        let log = ChangeLog::new();
        log.emit(ChangeEvent {
            kind: ChangeKind::Insert,
            table: QualifiedName::main("t"),
            primary_key: vec![],
            old_row: None,
            new_row: Some(vec![]),
            changed_columns: None,
            remote: false,
        });
        assert_eq!(log.drain().len(), 1);
        assert_eq!(log.drain().len(), 0);
    }
}
