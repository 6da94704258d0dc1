//! Canonical data model shared across all crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Referencia marker for tools consumed before they were cataloged.
pub const REFERENCIA_NUEVA: &str = "NUEVA";

/// Tipo placeholder when the operator did not supply one for a new tool.
pub const TIPO_PENDIENTE: &str = "PENDIENTE";

/// One reference row of the authoritative catalog, keyed by barcode.
///
/// The barcode is stored normalized (see [`crate::normalize_barcode`]); all
/// other fields are optional because the shared spreadsheet rarely has every
/// column filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub barcode: String,
    pub referencia: Option<String>,
    pub marca: Option<String>,
    pub tipo: Option<String>,
    pub precio: Option<f64>,
}

impl CatalogEntry {
    pub fn new(barcode: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            referencia: None,
            marca: None,
            tipo: None,
            precio: None,
        }
    }

    /// Merge another row for the same barcode. Later non-empty values win,
    /// matching how repeated rows in the store are interpreted.
    pub fn merge_from(&mut self, other: &CatalogEntry) {
        if other.referencia.is_some() {
            self.referencia.clone_from(&other.referencia);
        }
        if other.marca.is_some() {
            self.marca.clone_from(&other.marca);
        }
        if other.tipo.is_some() {
            self.tipo.clone_from(&other.tipo);
        }
        if other.precio.is_some() {
            self.precio = other.precio;
        }
    }
}

/// One operator-reported usage event.
///
/// Constructed exactly once by the registration engine and immutable after
/// that. A record lives either in the authoritative store or in the pending
/// queue, never in both and never in neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    /// Event-creation instant, assigned once at registration time.
    pub timestamp: DateTime<Utc>,
    pub barcode: String,
    pub referencia: Option<String>,
    pub marca: Option<String>,
    pub tipo: Option<String>,
    pub precio: Option<f64>,
    pub cantidad: u32,
    pub operario: String,
    pub proyecto: Option<String>,
    /// True when the barcode had no catalog entry at registration time, so
    /// the store must also receive a new catalog row.
    pub is_new: bool,
}

impl ConsumptionRecord {
    /// The catalog row implied by a new-tool consumption.
    pub fn catalog_entry(&self) -> CatalogEntry {
        CatalogEntry {
            barcode: self.barcode.clone(),
            referencia: self.referencia.clone(),
            marca: self.marca.clone(),
            tipo: self.tipo.clone(),
            precio: self.precio,
        }
    }
}

/// Registration request from the presentation layer.
///
/// `marca`/`tipo` are only consulted when the barcode is unknown to the
/// catalog: a new tool needs at least a brand before it can be registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub barcode: String,
    pub cantidad: u32,
    pub operario: String,
    pub proyecto: Option<String>,
    pub marca: Option<String>,
    pub tipo: Option<String>,
}

/// Request to add a catalog entry directly, outside any consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub barcode: String,
    pub referencia: Option<String>,
    pub marca: Option<String>,
    pub tipo: Option<String>,
    pub precio: Option<f64>,
}

/// Result of a successful registration.
///
/// `pending: true` means the store was busy and the event now sits in the
/// pending queue. From the operator's perspective both cases are a confirmed
/// registration: the event is durably recorded either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub pending: bool,
    pub record: ConsumptionRecord,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub merged: usize,
    pub failed: usize,
    pub remaining: usize,
}

/// Health snapshot derived from the live components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub store_reachable: bool,
    pub catalog_entries: usize,
    pub pending: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_later_non_empty_values() {
        let mut base = CatalogEntry {
            barcode: "ABC".into(),
            referencia: Some("R-1".into()),
            marca: None,
            tipo: Some("FRESA PLANA".into()),
            precio: None,
        };
        let later = CatalogEntry {
            barcode: "ABC".into(),
            referencia: None,
            marca: Some("MITSUBISHI".into()),
            tipo: None,
            precio: Some(12.5),
        };
        base.merge_from(&later);

        assert_eq!(base.referencia.as_deref(), Some("R-1"));
        assert_eq!(base.marca.as_deref(), Some("MITSUBISHI"));
        assert_eq!(base.tipo.as_deref(), Some("FRESA PLANA"));
        assert_eq!(base.precio, Some(12.5));
    }

    #[test]
    fn catalog_entry_from_new_record() {
        let record = ConsumptionRecord {
            timestamp: Utc::now(),
            barcode: "XYZ999".into(),
            referencia: Some(REFERENCIA_NUEVA.into()),
            marca: Some("HORN".into()),
            tipo: Some(TIPO_PENDIENTE.into()),
            precio: None,
            cantidad: 1,
            operario: "Juan".into(),
            proyecto: None,
            is_new: true,
        };
        let entry = record.catalog_entry();
        assert_eq!(entry.barcode, "XYZ999");
        assert_eq!(entry.referencia.as_deref(), Some(REFERENCIA_NUEVA));
        assert_eq!(entry.marca.as_deref(), Some("HORN"));
    }
}
