//! In-memory store adapter for tests and dev runs.

use crate::{Result, StoreAdapter, StoreError};
use chrono::{DateTime, Utc};
use fresalog_core::{CatalogEntry, ConsumptionRecord};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// An authoritative store that lives in memory.
///
/// The `busy` and `unreadable` switches simulate the two store failure
/// modes, which is how the scenario tests drive fallback and reconciliation
/// without a second process fighting over a real file.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    busy: AtomicBool,
    unreadable: AtomicBool,
}

#[derive(Default)]
struct Inner {
    catalog_rows: Vec<CatalogEntry>,
    consumption: Vec<ConsumptionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(entries: Vec<CatalogEntry>) -> Self {
        let store = Self::new();
        store
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .catalog_rows = entries;
        store
    }

    /// Simulate the store being held open by another writer.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Simulate a corrupt or missing store.
    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    /// Snapshot of the consumption rows written so far, in append order.
    pub fn consumption(&self) -> Vec<ConsumptionRecord> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .consumption
            .clone()
    }

    /// Snapshot of the raw catalog rows, in append order.
    pub fn catalog_rows(&self) -> Vec<CatalogEntry> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .catalog_rows
            .clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(StoreError::unreadable("memory store marked unreadable"));
        }
        if self.busy.load(Ordering::SeqCst) {
            return Err(StoreError::Busy(PathBuf::from(":memory:")));
        }
        Ok(())
    }
}

impl StoreAdapter for MemoryStore {
    fn read_catalog(&self) -> Result<Vec<CatalogEntry>> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(StoreError::unreadable("memory store marked unreadable"));
        }
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows = inner.catalog_rows.clone();
        rows.extend(inner.consumption.iter().map(|r| r.catalog_entry()));
        Ok(rows)
    }

    fn append_consumption_row(&self, record: &ConsumptionRecord) -> Result<()> {
        self.check_writable()?;
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .consumption
            .push(record.clone());
        Ok(())
    }

    fn append_or_mark_new_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        self.check_writable()?;
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .catalog_rows
            .push(entry.clone());
        Ok(())
    }

    fn append_registration(&self, record: &ConsumptionRecord) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consumption.push(record.clone());
        if record.is_new {
            inner.catalog_rows.push(record.catalog_entry());
        }
        Ok(())
    }

    fn is_writable(&self) -> bool {
        !self.busy.load(Ordering::SeqCst) && !self.unreadable.load(Ordering::SeqCst)
    }

    fn is_reachable(&self) -> bool {
        !self.unreadable.load(Ordering::SeqCst)
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(barcode: &str) -> ConsumptionRecord {
        ConsumptionRecord {
            timestamp: Utc::now(),
            barcode: barcode.to_string(),
            referencia: None,
            marca: Some("AYMA".into()),
            tipo: None,
            precio: None,
            cantidad: 1,
            operario: "Ana".into(),
            proyecto: None,
            is_new: false,
        }
    }

    #[test]
    fn busy_store_rejects_writes_with_busy() {
        let store = MemoryStore::new();
        store.set_busy(true);
        let err = store.append_consumption_row(&record("ABC")).unwrap_err();
        assert!(err.is_busy());
        assert!(!store.is_writable());
        assert!(store.is_reachable());
    }

    #[test]
    fn unreadable_store_fails_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_unreadable(true);
        assert!(matches!(
            store.read_catalog(),
            Err(StoreError::Unreadable(_))
        ));
        assert!(matches!(
            store.append_consumption_row(&record("ABC")),
            Err(StoreError::Unreadable(_))
        ));
        assert!(!store.is_reachable());
    }

    #[test]
    fn consumption_rows_show_up_in_catalog_reads() {
        let store = MemoryStore::new();
        store.append_consumption_row(&record("ABC")).unwrap();
        let catalog = store.read_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].marca.as_deref(), Some("AYMA"));
    }
}
