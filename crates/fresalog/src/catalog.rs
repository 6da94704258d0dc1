//! In-memory catalog index.
//!
//! A read-through projection of the authoritative store: barcode → entry,
//! rebuilt from a fresh read on demand, never merged with stale data. The
//! snapshot is swapped atomically so readers see either the old or the new
//! catalog, never a torn intermediate.

use fresalog_core::{normalize_barcode, CatalogEntry};
use fresalog_store::{StoreAdapter, StoreError};
use std::collections::{hash_map, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;

type Snapshot = Arc<HashMap<String, CatalogEntry>>;

#[derive(Default)]
pub struct CatalogIndex {
    snapshot: RwLock<Snapshot>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Snapshot {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Rebuild the index from a fresh store read and install the result as
    /// the new snapshot.
    ///
    /// On a failed read the previous snapshot stays installed and the error
    /// is returned: stale data still answers lookups, while an empty index
    /// would wrongly present every barcode as new.
    pub fn rebuild(&self, store: &dyn StoreAdapter) -> Result<usize, StoreError> {
        let rows = store.read_catalog()?;

        let mut map: HashMap<String, CatalogEntry> = HashMap::with_capacity(rows.len());
        for row in rows {
            match map.entry(row.barcode.clone()) {
                hash_map::Entry::Occupied(mut e) => e.get_mut().merge_from(&row),
                hash_map::Entry::Vacant(v) => {
                    v.insert(row);
                }
            }
        }

        let count = map.len();
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Arc::new(map),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(map),
        }
        debug!(entries = count, "catalog index rebuilt");
        Ok(count)
    }

    /// Find the entry for a barcode. Normalization is applied here exactly
    /// as at index-build time, so scanned and stored codes always agree.
    pub fn lookup(&self, barcode: &str) -> Option<CatalogEntry> {
        let key = normalize_barcode(barcode);
        self.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All entries, ordered by barcode.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let snapshot = self.read();
        let mut entries: Vec<CatalogEntry> = snapshot.values().cloned().collect();
        entries.sort_by(|a, b| a.barcode.cmp(&b.barcode));
        entries
    }

    /// Distinct brand names, sorted.
    pub fn marcas(&self) -> Vec<String> {
        let snapshot = self.read();
        let set: BTreeSet<String> = snapshot
            .values()
            .filter_map(|e| e.marca.clone())
            .collect();
        set.into_iter().collect()
    }

    /// Case-insensitive substring search over barcode, referencia and
    /// marca, ordered by barcode, capped at `limit`.
    pub fn search(&self, term: &str, limit: usize) -> Vec<CatalogEntry> {
        let needle = term.to_lowercase();
        let mut matches: Vec<CatalogEntry> = self
            .read()
            .values()
            .filter(|e| {
                e.barcode.to_lowercase().contains(&needle)
                    || e.referencia
                        .as_deref()
                        .is_some_and(|r| r.to_lowercase().contains(&needle))
                    || e.marca
                        .as_deref()
                        .is_some_and(|m| m.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.barcode.cmp(&b.barcode));
        matches.truncate(limit);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fresalog_store::MemoryStore;

    fn entry(barcode: &str, marca: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            barcode: barcode.to_string(),
            referencia: None,
            marca: marca.map(String::from),
            tipo: None,
            precio: None,
        }
    }

    #[test]
    fn rebuild_installs_fresh_snapshot() {
        let store = MemoryStore::with_catalog(vec![entry("ABC123", Some("WNT"))]);
        let index = CatalogIndex::new();

        assert_eq!(index.rebuild(&store).unwrap(), 1);
        assert!(index.lookup("ABC123").is_some());

        store
            .append_or_mark_new_catalog_entry(&entry("DEF456", None))
            .unwrap();
        assert_eq!(index.rebuild(&store).unwrap(), 2);
        assert!(index.lookup("DEF456").is_some());
    }

    #[test]
    fn lookup_normalizes_the_probe() {
        let store = MemoryStore::with_catalog(vec![entry("ABC123", None)]);
        let index = CatalogIndex::new();
        index.rebuild(&store).unwrap();

        assert!(index.lookup(" abc123 ").is_some());
        assert!(index.lookup("ABC123,00").is_some());
        assert!(index.lookup("ZZZ").is_none());
    }

    #[test]
    fn failed_rebuild_keeps_previous_snapshot() {
        let store = MemoryStore::with_catalog(vec![entry("ABC123", None)]);
        let index = CatalogIndex::new();
        index.rebuild(&store).unwrap();

        store.set_unreadable(true);
        assert!(index.rebuild(&store).is_err());

        // Stale beats empty.
        assert_eq!(index.len(), 1);
        assert!(index.lookup("ABC123").is_some());
    }

    #[test]
    fn duplicate_rows_merge_with_later_values_winning() {
        let first = entry("ABC123", Some("WNT"));
        let mut second = entry("ABC123", None);
        second.precio = Some(9.9);
        let store = MemoryStore::with_catalog(vec![first, second]);

        let index = CatalogIndex::new();
        assert_eq!(index.rebuild(&store).unwrap(), 1);
        let merged = index.lookup("ABC123").unwrap();
        assert_eq!(merged.marca.as_deref(), Some("WNT"));
        assert_eq!(merged.precio, Some(9.9));
    }

    #[test]
    fn search_and_marcas() {
        let store = MemoryStore::with_catalog(vec![
            entry("ABC123", Some("MITSUBISHI")),
            entry("DEF456", Some("HORN")),
            entry("GHI789", Some("HORN")),
        ]);
        let index = CatalogIndex::new();
        index.rebuild(&store).unwrap();

        assert_eq!(index.marcas(), vec!["HORN".to_string(), "MITSUBISHI".to_string()]);
        assert_eq!(index.search("horn", 10).len(), 2);
        assert_eq!(index.search("horn", 1).len(), 1);
        assert_eq!(index.search("abc", 10)[0].barcode, "ABC123");
    }
}
