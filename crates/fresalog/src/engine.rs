//! Registration engine: lookup, direct-write attempt, queue fallback.

use crate::catalog::CatalogIndex;
use chrono::Utc;
use fresalog_core::{
    normalize_barcode, CatalogEntry, ConsumptionRecord, NewEntry, RegisterRequest,
    RegistrationOutcome, REFERENCIA_NUEVA, TIPO_PENDIENTE,
};
use fresalog_queue::{PendingQueue, QueueError};
use fresalog_store::{StoreAdapter, StoreError};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by [`Engine::register`].
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Caller error (bad quantity, missing operator). Nothing was recorded.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The barcode has no catalog entry and the request carried no marca,
    /// so a new entry cannot be created.
    #[error("barcode {barcode} is not in the catalog; supply a marca to register it as new")]
    UnknownBarcode { barcode: String },

    /// The store failed in a way that is not a transient lock. Nothing was
    /// queued: queueing presumes the record will eventually merge.
    #[error(transparent)]
    Store(StoreError),

    /// The local pending queue itself failed; the event is recorded
    /// nowhere and the caller must retry.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors surfaced by [`Engine::add_entry`].
#[derive(Debug, Error)]
pub enum AddEntryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("barcode {0} already exists in the catalog")]
    Duplicate(String),

    /// Busy and unreadable both surface here: catalog maintenance has no
    /// queue fallback.
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The consumption registration and reconciliation engine.
///
/// Owns the catalog index, the pending queue, the store handle, and the
/// write gate that keeps at most one write attempt in flight against the
/// store at any time. Shared between threads behind an `Arc`.
pub struct Engine {
    pub(crate) store: Arc<dyn StoreAdapter>,
    pub(crate) catalog: CatalogIndex,
    pub(crate) queue: PendingQueue,
    pub(crate) write_gate: Mutex<()>,
}

impl Engine {
    /// Build the engine over a store and an opened pending queue.
    ///
    /// Attempts an initial catalog load. A failed load leaves the index
    /// empty rather than blocking startup; `status()` shows the store as
    /// unreachable and the next successful rebuild fills the index.
    pub fn new(store: Arc<dyn StoreAdapter>, queue: PendingQueue) -> Self {
        let catalog = CatalogIndex::new();
        if let Err(e) = catalog.rebuild(store.as_ref()) {
            warn!("initial catalog load failed: {}", e);
        }
        Self {
            store,
            catalog,
            queue,
            write_gate: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Look up a barcode in the current catalog snapshot.
    pub fn lookup(&self, barcode: &str) -> Option<CatalogEntry> {
        self.catalog.lookup(barcode)
    }

    /// Rebuild the catalog index from a fresh store read.
    pub fn refresh_catalog(&self) -> Result<usize, StoreError> {
        self.catalog.rebuild(self.store.as_ref())
    }

    /// Register one consumption event.
    ///
    /// A successful return means the event is durably recorded: directly in
    /// the store (`pending: false`) or in the pending queue awaiting
    /// reconciliation (`pending: true`). Callers may retry safely on error.
    pub fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<RegistrationOutcome, RegisterError> {
        if request.cantidad < 1 {
            return Err(RegisterError::InvalidInput(
                "cantidad must be at least 1".into(),
            ));
        }
        let operario = request.operario.trim();
        if operario.is_empty() {
            return Err(RegisterError::InvalidInput(
                "operario must not be empty".into(),
            ));
        }
        let barcode = normalize_barcode(&request.barcode);
        if barcode.is_empty() {
            return Err(RegisterError::InvalidInput(
                "barcode must not be empty".into(),
            ));
        }

        let record = match self.catalog.lookup(&barcode) {
            Some(entry) => ConsumptionRecord {
                timestamp: Utc::now(),
                barcode,
                referencia: entry.referencia,
                marca: entry.marca,
                tipo: entry.tipo,
                precio: entry.precio,
                cantidad: request.cantidad,
                operario: operario.to_string(),
                proyecto: clean(request.proyecto),
                is_new: false,
            },
            None => {
                let Some(marca) = clean(request.marca) else {
                    return Err(RegisterError::UnknownBarcode { barcode });
                };
                ConsumptionRecord {
                    timestamp: Utc::now(),
                    barcode,
                    referencia: Some(REFERENCIA_NUEVA.to_string()),
                    marca: Some(marca),
                    tipo: Some(clean(request.tipo).unwrap_or_else(|| TIPO_PENDIENTE.to_string())),
                    precio: None,
                    cantidad: request.cantidad,
                    operario: operario.to_string(),
                    proyecto: clean(request.proyecto),
                    is_new: true,
                }
            }
        };

        let attempt = {
            let _gate = self
                .write_gate
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.store.append_registration(&record)
        };

        match attempt {
            Ok(()) => {
                info!(
                    barcode = %record.barcode,
                    cantidad = record.cantidad,
                    operario = %record.operario,
                    new = record.is_new,
                    "consumption recorded"
                );
                if record.is_new {
                    if let Err(e) = self.refresh_catalog() {
                        warn!("catalog rebuild after new entry failed: {}", e);
                    }
                }
                Ok(RegistrationOutcome {
                    pending: false,
                    record,
                })
            }
            Err(e) if e.is_busy() => {
                warn!(barcode = %record.barcode, "store busy, buffering consumption");
                let seq = self.queue.enqueue(&record)?;
                info!(seq, barcode = %record.barcode, "consumption buffered for sync");
                Ok(RegistrationOutcome {
                    pending: true,
                    record,
                })
            }
            Err(e) => Err(RegisterError::Store(e)),
        }
    }

    /// Add a catalog entry directly, outside any consumption event.
    pub fn add_entry(&self, new: NewEntry) -> Result<CatalogEntry, AddEntryError> {
        let barcode = normalize_barcode(&new.barcode);
        if barcode.is_empty() {
            return Err(AddEntryError::InvalidInput(
                "barcode must not be empty".into(),
            ));
        }
        if self.catalog.lookup(&barcode).is_some() {
            return Err(AddEntryError::Duplicate(barcode));
        }

        let entry = CatalogEntry {
            barcode,
            referencia: clean(new.referencia),
            marca: clean(new.marca),
            tipo: clean(new.tipo),
            precio: new.precio,
        };

        {
            let _gate = self
                .write_gate
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.store.append_or_mark_new_catalog_entry(&entry)?;
        }

        info!(barcode = %entry.barcode, "catalog entry added");
        if let Err(e) = self.refresh_catalog() {
            warn!("catalog rebuild after add failed: {}", e);
        }
        Ok(entry)
    }
}
