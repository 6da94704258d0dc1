//! Authoritative store adapter.
//!
//! The shared spreadsheet is the organization's single source of truth for
//! the tool catalog and the consumption history. This crate is the only
//! place that touches it, and the only place where low-level "file in use"
//! conditions become the typed [`StoreError::Busy`] outcome — upstream
//! logic never inspects platform error text.

use chrono::{DateTime, Utc};
use fresalog_core::{CatalogEntry, ConsumptionRecord};
use std::path::PathBuf;
use thiserror::Error;

mod csv_store;
pub mod lock;
mod memory;

pub use csv_store::CsvStore;
pub use memory::MemoryStore;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is held open by another writer. Transient: the write is
    /// expected to succeed once the other party lets go.
    #[error("store is busy: {0}")]
    Busy(PathBuf),

    /// The store is missing, corrupt, or failed in a way that is not a
    /// lock. Not known to be transient, so nothing gets queued behind it.
    #[error("store unreadable: {0}")]
    Unreadable(String),
}

impl StoreError {
    pub fn unreadable(msg: impl std::fmt::Display) -> Self {
        Self::Unreadable(msg.to_string())
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Access to the authoritative store.
///
/// Implementations must serialize their own internal mutations; callers
/// additionally hold a process-wide write gate so at most one write attempt
/// is in flight against the store at any time.
pub trait StoreAdapter: Send + Sync {
    /// Read every catalog-bearing row, in file order. Rows are not merged
    /// here; the catalog index folds duplicates.
    fn read_catalog(&self) -> Result<Vec<CatalogEntry>>;

    /// Append one consumption row.
    fn append_consumption_row(&self, record: &ConsumptionRecord) -> Result<()>;

    /// Append a catalog row for a newly-seen tool.
    fn append_or_mark_new_catalog_entry(&self, entry: &CatalogEntry) -> Result<()>;

    /// Append a registration: the consumption row plus, for a new tool, its
    /// catalog row. Implementations override this to make the pair a single
    /// unit against the store, so a reconciled entry either merges
    /// completely or stays queued.
    fn append_registration(&self, record: &ConsumptionRecord) -> Result<()> {
        self.append_consumption_row(record)?;
        if record.is_new {
            self.append_or_mark_new_catalog_entry(&record.catalog_entry())?;
        }
        Ok(())
    }

    /// Best-effort probe: could we take the write lock right now?
    fn is_writable(&self) -> bool;

    /// Best-effort probe: does a read currently succeed? Never writes.
    fn is_reachable(&self) -> bool;

    /// Store file modification time, when the backend has one.
    fn last_modified(&self) -> Option<DateTime<Utc>>;
}
