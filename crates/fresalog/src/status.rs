//! Health snapshot derived from the live components.

use crate::engine::Engine;
use fresalog_core::Status;

impl Engine {
    /// Current health: store reachability, catalog size, pending depth.
    ///
    /// Pure read — the store probe is a read attempt, never a write, and
    /// nothing is cached beyond the catalog snapshot itself.
    pub fn status(&self) -> Status {
        Status {
            store_reachable: self.store.is_reachable(),
            catalog_entries: self.catalog.len(),
            pending: self.queue.count(),
            last_modified: self.store.last_modified(),
        }
    }
}
