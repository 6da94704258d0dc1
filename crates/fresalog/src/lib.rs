//! Consumption registration and reconciliation engine.
//!
//! Operators scan a barcode and register consumption of a tool against a
//! shared spreadsheet that other processes may have open. The engine looks
//! the barcode up in the catalog index, attempts a direct store write, and
//! on a busy store falls back to a durable pending queue that is later
//! reconciled back into the store in order, without loss or duplication.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fresalog::Engine;
//! use fresalog_queue::PendingQueue;
//! use fresalog_store::CsvStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(CsvStore::open("control_fresas.csv", timeout)?);
//! let queue = PendingQueue::open("pending_consumos.ndjson")?;
//! let engine = Engine::new(store, queue);
//!
//! let outcome = engine.register(request)?;
//! let report = engine.sync()?;
//! ```

pub mod catalog;
pub mod cli;
mod engine;
mod export;
mod reconcile;
mod status;

pub use catalog::CatalogIndex;
pub use engine::{AddEntryError, Engine, RegisterError};
pub use export::ExportError;
