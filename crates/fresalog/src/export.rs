//! CSV export of pending consumption events for ERP import.

use crate::engine::Engine;
use chrono::NaiveDate;
use std::io::Write;
use thiserror::Error;

/// Header matching the ERP import schema.
const EXPORT_HEADER: [&str; 8] = [
    "fecha",
    "barcode",
    "referencia",
    "marca",
    "tipo",
    "precio",
    "cantidad",
    "operario",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("export flush failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Engine {
    /// Write the pending consumption events as CSV, oldest first,
    /// optionally bounded by an inclusive date range. Returns the number
    /// of data rows written.
    pub fn export_pending(
        &self,
        desde: Option<NaiveDate>,
        hasta: Option<NaiveDate>,
        out: impl Write,
    ) -> Result<usize, ExportError> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(EXPORT_HEADER)?;

        let mut rows = 0;
        for entry in self.queue.peek_ordered() {
            let date = entry.record.timestamp.date_naive();
            if desde.is_some_and(|d| date < d) || hasta.is_some_and(|d| date > d) {
                continue;
            }

            let record = &entry.record;
            writer.write_record(&[
                record.timestamp.to_rfc3339(),
                record.barcode.clone(),
                record.referencia.clone().unwrap_or_default(),
                record.marca.clone().unwrap_or_default(),
                record.tipo.clone().unwrap_or_default(),
                record.precio.map(|p| p.to_string()).unwrap_or_default(),
                record.cantidad.to_string(),
                record.operario.clone(),
            ])?;
            rows += 1;
        }

        writer.flush()?;
        Ok(rows)
    }
}
