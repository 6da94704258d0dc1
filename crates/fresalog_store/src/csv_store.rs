//! CSV-file-backed authoritative store.
//!
//! The store file is one flat sheet: reference rows (catalog only) and
//! consumption rows (date + operator + quantity) share the same columns.
//! Column positions are detected from the header row, so a sheet exported
//! with the organization's own header names keeps working.

use crate::lock;
use crate::{Result, StoreAdapter, StoreError};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use fresalog_core::{normalize_barcode, parse_precio, CatalogEntry, ConsumptionRecord};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Header written when creating a fresh store file.
const DEFAULT_HEADER: [&str; 9] = [
    "FECHA",
    "OPERARIO",
    "CANTIDAD",
    "CODIGO ESCANEADO",
    "REFERENCIA",
    "MARCA",
    "TIPO",
    "PRECIO",
    "PROYECTO",
];

/// Timestamp format used in consumption rows.
const FECHA_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Authoritative store backed by a single CSV file with an advisory `.lock`
/// sibling. Every write acquires the lock under a deadline; expiry becomes
/// [`StoreError::Busy`].
pub struct CsvStore {
    path: PathBuf,
    lock_timeout: Duration,
}

/// Column positions detected from the header row.
struct ColumnMap {
    fecha: Option<usize>,
    operario: Option<usize>,
    cantidad: Option<usize>,
    codigo: usize,
    referencia: Option<usize>,
    marca: Option<usize>,
    tipo: Option<usize>,
    precio: Option<usize>,
    proyecto: Option<usize>,
    width: usize,
}

fn detect_columns(headers: &StringRecord) -> Result<ColumnMap> {
    let mut fecha = None;
    let mut operario = None;
    let mut cantidad = None;
    let mut codigo = None;
    let mut referencia = None;
    let mut marca = None;
    let mut tipo = None;
    let mut precio = None;
    let mut proyecto = None;

    for (i, cell) in headers.iter().enumerate() {
        let h = cell.trim().to_uppercase();
        if h.contains("FECHA") {
            fecha.get_or_insert(i);
        } else if h == "OP" || h.contains("OPERARIO") {
            operario.get_or_insert(i);
        } else if h.contains("UDS") || h.contains("CANTIDAD") || h.contains("UNIDADES") {
            cantidad.get_or_insert(i);
        } else if h.contains("CODIGO") || h.contains("ESCANEADO") {
            codigo.get_or_insert(i);
        } else if h.contains("REF") {
            referencia.get_or_insert(i);
        } else if h.contains("MARCA") || h.contains("PROVEEDOR") {
            marca.get_or_insert(i);
        } else if h.contains("TIPO") {
            tipo.get_or_insert(i);
        } else if h.contains("PRECIO") {
            precio.get_or_insert(i);
        } else if h.contains("FICHA") || h.contains("PROYECTO") {
            proyecto.get_or_insert(i);
        }
    }

    let codigo = codigo
        .ok_or_else(|| StoreError::unreadable("store header has no barcode column"))?;

    Ok(ColumnMap {
        fecha,
        operario,
        cantidad,
        codigo,
        referencia,
        marca,
        tipo,
        precio,
        proyecto,
        width: headers.len(),
    })
}

/// Map an append-open failure to the typed taxonomy. A sharing violation
/// from a spreadsheet application holding the file surfaces as
/// PermissionDenied on the platforms that enforce it, which is a transient
/// busy condition, not corruption.
fn map_open_error(path: &Path, e: io::Error) -> StoreError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => StoreError::Busy(path.to_path_buf()),
        _ => StoreError::unreadable(format!("{}: {}", path.display(), e)),
    }
}

impl CsvStore {
    /// Open a store at `path`, creating it with the default header when it
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        let store = Self {
            path: path.into(),
            lock_timeout,
        };
        if !store.path.exists() {
            store.create_with_header()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_with_header(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::unreadable(format!("{}: {}", parent.display(), e)))?;
        }

        let guard = lock::lock_within(&self.path, self.lock_timeout)
            .map_err(StoreError::unreadable)?;
        if guard.is_none() {
            return Err(StoreError::Busy(self.path.clone()));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| map_open_error(&self.path, e))?;
        // Another process may have won the create race while we waited.
        if file
            .metadata()
            .map_err(StoreError::unreadable)?
            .len()
            > 0
        {
            return Ok(());
        }

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(DEFAULT_HEADER)
            .map_err(StoreError::unreadable)?;
        writer.flush().map_err(StoreError::unreadable)?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::unreadable(e.error()))?;
        file.sync_data().map_err(StoreError::unreadable)?;

        info!(path = %self.path.display(), "created store file");
        Ok(())
    }

    fn column_map(&self) -> Result<ColumnMap> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(StoreError::unreadable)?;
        let headers = reader.headers().map_err(StoreError::unreadable)?.clone();
        detect_columns(&headers)
    }

    fn consumption_row(&self, map: &ColumnMap, record: &ConsumptionRecord) -> Vec<String> {
        let mut row = vec![String::new(); map.width];
        let mut set = |idx: Option<usize>, value: String| {
            if let Some(i) = idx {
                row[i] = value;
            }
        };
        set(map.fecha, record.timestamp.format(FECHA_FORMAT).to_string());
        set(map.operario, record.operario.clone());
        set(map.cantidad, record.cantidad.to_string());
        set(Some(map.codigo), record.barcode.clone());
        set(map.referencia, record.referencia.clone().unwrap_or_default());
        set(map.marca, record.marca.clone().unwrap_or_default());
        set(map.tipo, record.tipo.clone().unwrap_or_default());
        set(
            map.precio,
            record.precio.map(|p| p.to_string()).unwrap_or_default(),
        );
        set(map.proyecto, record.proyecto.clone().unwrap_or_default());
        row
    }

    fn catalog_row(&self, map: &ColumnMap, entry: &CatalogEntry) -> Vec<String> {
        let mut row = vec![String::new(); map.width];
        let mut set = |idx: Option<usize>, value: String| {
            if let Some(i) = idx {
                row[i] = value;
            }
        };
        set(Some(map.codigo), entry.barcode.clone());
        set(map.referencia, entry.referencia.clone().unwrap_or_default());
        set(map.marca, entry.marca.clone().unwrap_or_default());
        set(map.tipo, entry.tipo.clone().unwrap_or_default());
        set(
            map.precio,
            entry.precio.map(|p| p.to_string()).unwrap_or_default(),
        );
        row
    }

    /// Append rows under one lock acquisition and one durability barrier.
    fn locked_append(&self, rows: &[Vec<String>]) -> Result<()> {
        let guard = lock::lock_within(&self.path, self.lock_timeout)
            .map_err(StoreError::unreadable)?;
        if guard.is_none() {
            return Err(StoreError::Busy(self.path.clone()));
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| map_open_error(&self.path, e))?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        for row in rows {
            writer.write_record(row).map_err(StoreError::unreadable)?;
        }
        writer.flush().map_err(StoreError::unreadable)?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::unreadable(e.error()))?;
        file.sync_data().map_err(StoreError::unreadable)?;
        Ok(())
    }
}

impl StoreAdapter for CsvStore {
    fn read_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(StoreError::unreadable)?;
        let headers = reader.headers().map_err(StoreError::unreadable)?.clone();
        let map = detect_columns(&headers)?;

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(StoreError::unreadable)?;
            let cell = |idx: Option<usize>| -> Option<String> {
                idx.and_then(|i| record.get(i))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };

            let barcode = normalize_barcode(record.get(map.codigo).unwrap_or(""));
            if barcode.is_empty() {
                continue;
            }

            entries.push(CatalogEntry {
                barcode,
                referencia: cell(map.referencia),
                marca: cell(map.marca),
                tipo: cell(map.tipo),
                precio: cell(map.precio).and_then(|s| parse_precio(&s)),
            });
        }

        debug!(rows = entries.len(), path = %self.path.display(), "read catalog");
        Ok(entries)
    }

    fn append_consumption_row(&self, record: &ConsumptionRecord) -> Result<()> {
        let map = self.column_map()?;
        self.locked_append(&[self.consumption_row(&map, record)])
    }

    fn append_or_mark_new_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let map = self.column_map()?;
        self.locked_append(&[self.catalog_row(&map, entry)])
    }

    fn append_registration(&self, record: &ConsumptionRecord) -> Result<()> {
        let map = self.column_map()?;
        let mut rows = vec![self.consumption_row(&map, record)];
        if record.is_new {
            rows.push(self.catalog_row(&map, &record.catalog_entry()));
        }
        self.locked_append(&rows)
    }

    fn is_writable(&self) -> bool {
        self.path.exists() && !lock::is_locked(&self.path)
    }

    fn is_reachable(&self) -> bool {
        std::fs::File::open(&self.path).is_ok()
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_record(barcode: &str, is_new: bool) -> ConsumptionRecord {
        ConsumptionRecord {
            timestamp: Utc::now(),
            barcode: barcode.to_string(),
            referencia: Some("R-77".into()),
            marca: Some("WNT".into()),
            tipo: Some("FRESA PLANA".into()),
            precio: Some(8.5),
            cantidad: 2,
            operario: "Juan".into(),
            proyecto: Some("F-1042".into()),
            is_new,
        }
    }

    #[test]
    fn open_creates_header_and_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::open(dir.path().join("control.csv"), Duration::from_millis(200))
            .unwrap();

        assert!(store.path().exists());
        assert!(store.read_catalog().unwrap().is_empty());
        assert!(store.is_reachable());
        assert!(store.is_writable());
    }

    #[test]
    fn catalog_entry_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::open(dir.path().join("control.csv"), Duration::from_millis(200))
            .unwrap();

        let entry = CatalogEntry {
            barcode: "ABC123".into(),
            referencia: Some("R-1".into()),
            marca: Some("MITSUBISHI".into()),
            tipo: Some("FRESA ESFERICA".into()),
            precio: Some(12.5),
        };
        store.append_or_mark_new_catalog_entry(&entry).unwrap();

        let catalog = store.read_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0], entry);
    }

    #[test]
    fn consumption_rows_contribute_to_catalog() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::open(dir.path().join("control.csv"), Duration::from_millis(200))
            .unwrap();

        store.append_consumption_row(&test_record("ABC123", false)).unwrap();

        let catalog = store.read_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].barcode, "ABC123");
        assert_eq!(catalog[0].marca.as_deref(), Some("WNT"));
        assert_eq!(catalog[0].precio, Some(8.5));
    }

    #[test]
    fn new_registration_appends_consumption_and_catalog_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("control.csv");
        let store = CsvStore::open(&path, Duration::from_millis(200)).unwrap();

        store.append_registration(&test_record("NEW999", true)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        // header + consumption row + catalog row
        assert_eq!(contents.lines().count(), 3);
        let catalog = store.read_catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.iter().all(|e| e.barcode == "NEW999"));
    }

    #[test]
    fn locked_store_reports_busy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("control.csv");
        let store = CsvStore::open(&path, Duration::from_millis(100)).unwrap();

        let _guard = lock::try_lock(&path).unwrap().expect("lock is free");
        let err = store
            .append_consumption_row(&test_record("ABC123", false))
            .unwrap_err();
        assert!(err.is_busy());
        assert!(!store.is_writable());
    }

    #[test]
    fn reads_organization_header_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Control FRESAS.csv");
        std::fs::write(
            &path,
            "FECHA,OP,UDS,CÓDIGO ESCANEADO,REFERENCIA FRESA,PROVEEDOR MARCA,TIPO DE FRESA,PRECIO,FICHA\n\
             ,,,8412345000,R-55,SUMITOMO,FRESA PLANA,\"12,50 €\",\n",
        )
        .unwrap();

        let store = CsvStore::open(&path, Duration::from_millis(200)).unwrap();
        let catalog = store.read_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].barcode, "8412345000");
        assert_eq!(catalog[0].referencia.as_deref(), Some("R-55"));
        assert_eq!(catalog[0].marca.as_deref(), Some("SUMITOMO"));
        assert_eq!(catalog[0].precio, Some(12.5));
    }

    #[test]
    fn header_without_barcode_column_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "FECHA,MARCA\n").unwrap();

        let store = CsvStore::open(&path, Duration::from_millis(200)).unwrap();
        let err = store.read_catalog().unwrap_err();
        assert!(matches!(err, StoreError::Unreadable(_)));
    }

    #[test]
    fn barcode_cells_are_normalized_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("control.csv");
        std::fs::write(
            &path,
            "FECHA,OPERARIO,CANTIDAD,CODIGO ESCANEADO,REFERENCIA,MARCA,TIPO,PRECIO,PROYECTO\n\
             ,,,\"8412345,00\",,HORN,,,\n",
        )
        .unwrap();

        let store = CsvStore::open(&path, Duration::from_millis(200)).unwrap();
        let catalog = store.read_catalog().unwrap();
        assert_eq!(catalog[0].barcode, "8412345");
    }
}
