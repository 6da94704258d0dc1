//! Shared vocabulary for the Fresalog registration engine.
//!
//! This crate owns the canonical data model used across the workspace:
//! catalog entries, consumption records, request/response types, barcode
//! normalization, and runtime settings. All other crates depend on these
//! definitions instead of declaring their own.

pub mod config;
pub mod normalize;
pub mod types;

pub use config::Settings;
pub use normalize::{normalize_barcode, parse_precio};
pub use types::{
    CatalogEntry, ConsumptionRecord, NewEntry, RegisterRequest, RegistrationOutcome, Status,
    SyncReport, REFERENCIA_NUEVA, TIPO_PENDIENTE,
};
