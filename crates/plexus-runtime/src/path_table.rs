//! Per-extension path tables.
//!
//! When an extension sends a command with a result handler, the handler
//! parks in the extension's path table keyed by the command id. The
//! matching result resolves the entry and runs the handler on the
//! extension's home thread. Entries are never lost silently: either a
//! result (real or synthesized) arrives, or close-down cancels the
//! entry with a `Closed` result.

use crate::affinity::ThreadAffinity;
use plexus_extension::ResultHandler;
use plexus_types::CmdId;
use std::collections::HashMap;
use tracing::warn;

/// One outstanding command.
pub struct InPath {
    /// Name of the command that was sent (for synthesized results).
    pub cmd_name: String,
    /// Handler to run when the result arrives.
    pub handler: ResultHandler,
}

/// Registry of outstanding commands for one extension.
///
/// Owned by the extension, mutated only on its home thread. The
/// affinity tag is latched when the extension is added to its thread's
/// store.
pub struct PathTable {
    affinity: ThreadAffinity,
    entries: HashMap<CmdId, InPath>,
}

impl PathTable {
    /// Creates an empty table with an unset affinity tag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::new(),
            entries: HashMap::new(),
        }
    }

    /// Latches the table to the calling thread.
    pub fn latch_to_current_thread(&self) {
        self.affinity.latch_to_current();
    }

    /// Parks a handler for an outstanding command.
    pub fn register(&mut self, cmd_id: CmdId, cmd_name: impl Into<String>, handler: ResultHandler) {
        self.affinity.assert_on_owner("path table register");
        let previous = self.entries.insert(
            cmd_id,
            InPath {
                cmd_name: cmd_name.into(),
                handler,
            },
        );
        if previous.is_some() {
            warn!(%cmd_id, "path table entry replaced; duplicate command id");
        }
    }

    /// Resolves an entry by command id, removing it.
    pub fn resolve(&mut self, cmd_id: CmdId) -> Option<InPath> {
        self.affinity.assert_on_owner("path table resolve");
        self.entries.remove(&cmd_id)
    }

    /// Drains every entry for cancellation at close-down. The caller
    /// invokes each handler with a synthesized `Closed` result.
    pub fn cancel_all(&mut self) -> Vec<(CmdId, InPath)> {
        self.affinity.assert_on_owner("path table cancel");
        self.entries.drain().collect()
    }

    /// Number of outstanding commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> ResultHandler {
        Box::new(|_env, _result| {})
    }

    #[test]
    fn register_and_resolve() {
        let mut table = PathTable::new();
        table.latch_to_current_thread();
        let id = CmdId::new();
        table.register(id, "process", noop_handler());
        assert_eq!(table.len(), 1);

        let entry = table.resolve(id).unwrap();
        assert_eq!(entry.cmd_name, "process");
        assert!(table.is_empty());
        assert!(table.resolve(id).is_none());
    }

    #[test]
    fn cancel_all_drains_everything() {
        let mut table = PathTable::new();
        table.latch_to_current_thread();
        for _ in 0..3 {
            table.register(CmdId::new(), "x", noop_handler());
        }
        let cancelled = table.cancel_all();
        assert_eq!(cancelled.len(), 3);
        assert!(table.is_empty());
    }
}
