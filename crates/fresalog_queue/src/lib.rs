//! Durable pending queue for consumption events.
//!
//! When the authoritative store is busy, registrations land here instead of
//! in memory. The queue is a write-ahead log in NDJSON format: one JSON
//! object per line, appended and fsynced before `enqueue` acknowledges, so
//! a process restart (or power loss after the acknowledge) never loses an
//! accepted event.
//!
//! Sequence numbers strictly increase across the life of the queue and
//! determine replay order. They are never reused: removal appends a
//! tombstone line rather than rewriting history, and compaction on open
//! preserves the sequence floor through a `watermark` record even after a
//! full drain.

use fresalog_core::ConsumptionRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Queue operation result type.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors from pending-queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queue log corrupt at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[error("no pending entry with sequence {0}")]
    NotFound(u64),

    #[error("queue writer lock poisoned")]
    Lock,
}

/// A consumption record together with its replay position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub seq: u64,
    pub record: ConsumptionRecord,
}

/// One line of the on-disk log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Enqueued { entry: PendingEntry },
    Removed { seq: u64 },
    Watermark { next_seq: u64 },
}

struct QueueInner {
    writer: BufWriter<File>,
    live: BTreeMap<u64, ConsumptionRecord>,
    next_seq: u64,
}

/// Append-only durable queue of pending consumption events.
///
/// One writer lock serializes sequence assignment and the append itself, so
/// file order always matches sequence order and concurrent enqueues can
/// never collide on a number.
pub struct PendingQueue {
    path: PathBuf,
    inner: Mutex<QueueInner>,
}

impl PendingQueue {
    /// Open (or create) the queue log at `path`.
    ///
    /// Replays the log into memory, drops a torn trailing line left by a
    /// crash mid-append, and compacts tombstones away through a temp file
    /// plus atomic rename. Corruption anywhere before the final line fails
    /// the open: a queue that silently skipped interior entries would
    /// reorder or lose events.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut live = BTreeMap::new();
        let mut next_seq = 1u64;
        let mut needs_compaction = false;

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let lines: Vec<&str> = contents
                .lines()
                .filter(|l| !l.trim().is_empty())
                .collect();

            for (i, &line) in lines.iter().enumerate() {
                match serde_json::from_str::<LogRecord>(line) {
                    Ok(LogRecord::Enqueued { entry }) => {
                        next_seq = next_seq.max(entry.seq + 1);
                        live.insert(entry.seq, entry.record);
                    }
                    Ok(LogRecord::Removed { seq }) => {
                        next_seq = next_seq.max(seq + 1);
                        live.remove(&seq);
                        needs_compaction = true;
                    }
                    Ok(LogRecord::Watermark { next_seq: floor }) => {
                        next_seq = next_seq.max(floor);
                    }
                    Err(_) if i == lines.len() - 1 => {
                        // Torn trailing line from a crash mid-append. The
                        // entry was never acknowledged, so dropping it is
                        // safe.
                        warn!(line = i + 1, "dropping torn trailing queue line");
                        needs_compaction = true;
                    }
                    Err(e) => {
                        return Err(QueueError::Corrupt {
                            line: i + 1,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if needs_compaction {
            compact(&path, next_seq, &live)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(
            path = %path.display(),
            pending = live.len(),
            next_seq,
            "opened pending queue"
        );

        Ok(Self {
            path,
            inner: Mutex::new(QueueInner {
                writer: BufWriter::new(file),
                live,
                next_seq,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and return its sequence number.
    ///
    /// The entry is flushed and fsynced before this returns: a success here
    /// means the event survives a crash.
    pub fn enqueue(&self, record: &ConsumptionRecord) -> Result<u64> {
        let mut inner = self.inner.lock().map_err(|_| QueueError::Lock)?;

        let seq = inner.next_seq;
        // Burn the number up front; a failed append must not hand the same
        // sequence to a later entry.
        inner.next_seq += 1;

        let entry = PendingEntry {
            seq,
            record: record.clone(),
        };
        let line = serde_json::to_string(&LogRecord::Enqueued { entry })?;
        writeln!(inner.writer, "{}", line)?;
        inner.writer.flush()?;
        inner.writer.get_ref().sync_data()?;

        inner.live.insert(seq, record.clone());
        debug!(seq, barcode = %record.barcode, "enqueued pending consumption");
        Ok(seq)
    }

    /// Remove a drained entry by sequence number.
    pub fn remove(&self, seq: u64) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| QueueError::Lock)?;
        if !inner.live.contains_key(&seq) {
            return Err(QueueError::NotFound(seq));
        }

        let line = serde_json::to_string(&LogRecord::Removed { seq })?;
        writeln!(inner.writer, "{}", line)?;
        inner.writer.flush()?;
        inner.writer.get_ref().sync_data()?;

        inner.live.remove(&seq);
        Ok(())
    }

    /// Snapshot of the live entries, oldest first.
    pub fn peek_ordered(&self) -> Vec<PendingEntry> {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .live
            .iter()
            .map(|(&seq, record)| PendingEntry {
                seq,
                record: record.clone(),
            })
            .collect()
    }

    /// Number of entries awaiting reconciliation.
    pub fn count(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.live.len(),
            Err(poisoned) => poisoned.into_inner().live.len(),
        }
    }
}

/// Rewrite the log with only live entries plus a watermark, atomically.
///
/// The temp file is fully written and synced before the rename, so a crash
/// during compaction leaves the previous log intact.
fn compact(path: &Path, next_seq: u64, live: &BTreeMap<u64, ConsumptionRecord>) -> Result<()> {
    let tmp = match path.extension() {
        Some(ext) => path.with_extension(format!("{}.tmp", ext.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        let watermark = serde_json::to_string(&LogRecord::Watermark { next_seq })?;
        writeln!(writer, "{}", watermark)?;
        for (&seq, record) in live {
            let entry = PendingEntry {
                seq,
                record: record.clone(),
            };
            let line = serde_json::to_string(&LogRecord::Enqueued { entry })?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), live = live.len(), "compacted queue log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(barcode: &str) -> ConsumptionRecord {
        ConsumptionRecord {
            timestamp: Utc::now(),
            barcode: barcode.to_string(),
            referencia: Some("R-9".into()),
            marca: Some("TAEGU".into()),
            tipo: Some("FRESA PLANA".into()),
            precio: Some(4.2),
            cantidad: 3,
            operario: "Marta".into(),
            proyecto: None,
            is_new: false,
        }
    }

    #[test]
    fn sequences_start_at_one_and_increase() {
        let dir = tempdir().unwrap();
        let queue = PendingQueue::open(dir.path().join("pending.ndjson")).unwrap();

        assert_eq!(queue.enqueue(&record("A")).unwrap(), 1);
        assert_eq!(queue.enqueue(&record("B")).unwrap(), 2);
        assert_eq!(queue.enqueue(&record("C")).unwrap(), 3);
        assert_eq!(queue.count(), 3);

        let entries = queue.peek_ordered();
        assert_eq!(
            entries.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(entries[0].record.barcode, "A");
    }

    #[test]
    fn entries_survive_reopen_with_same_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.ndjson");

        let queue = PendingQueue::open(&path).unwrap();
        let original = record("ABC123");
        let seq = queue.enqueue(&original).unwrap();
        drop(queue);

        // Fresh open simulates the process restart.
        let reopened = PendingQueue::open(&path).unwrap();
        let entries = reopened.peek_ordered();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, seq);
        assert_eq!(entries[0].record, original);
    }

    #[test]
    fn removal_is_durable_and_not_found_twice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.ndjson");

        let queue = PendingQueue::open(&path).unwrap();
        let s1 = queue.enqueue(&record("A")).unwrap();
        let s2 = queue.enqueue(&record("B")).unwrap();

        queue.remove(s1).unwrap();
        assert!(matches!(queue.remove(s1), Err(QueueError::NotFound(_))));
        assert_eq!(queue.count(), 1);
        drop(queue);

        let reopened = PendingQueue::open(&path).unwrap();
        let entries = reopened.peek_ordered();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, s2);
    }

    #[test]
    fn sequences_never_reused_after_full_drain_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.ndjson");

        let queue = PendingQueue::open(&path).unwrap();
        queue.enqueue(&record("A")).unwrap();
        let s2 = queue.enqueue(&record("B")).unwrap();
        queue.remove(1).unwrap();
        queue.remove(s2).unwrap();
        assert_eq!(queue.count(), 0);
        drop(queue);

        // Compaction on reopen rewrites an empty log; the watermark must
        // keep the counter moving forward.
        let reopened = PendingQueue::open(&path).unwrap();
        assert_eq!(reopened.count(), 0);
        assert_eq!(reopened.enqueue(&record("C")).unwrap(), 3);
    }

    #[test]
    fn torn_trailing_line_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.ndjson");

        let queue = PendingQueue::open(&path).unwrap();
        queue.enqueue(&record("A")).unwrap();
        drop(queue);

        // Simulate a crash mid-append: a partial JSON object with no close.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"op\":\"enqueued\",\"entry\":{\"seq\":2,")
            .unwrap();
        drop(file);

        let reopened = PendingQueue::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
        // The torn line was never acknowledged; its number may be reissued
        // or skipped, but the surviving entry keeps seq 1.
        assert_eq!(reopened.peek_ordered()[0].seq, 1);
    }

    #[test]
    fn interior_corruption_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.ndjson");

        let queue = PendingQueue::open(&path).unwrap();
        queue.enqueue(&record("A")).unwrap();
        queue.enqueue(&record("B")).unwrap();
        drop(queue);

        // Mangle the first line, keep the second intact.
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(String::from).collect();
        lines[0] = "not json at all".to_string();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        assert!(matches!(
            PendingQueue::open(&path),
            Err(QueueError::Corrupt { line: 1, .. })
        ));
    }

    #[test]
    fn log_lines_round_trip_every_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.ndjson");

        let queue = PendingQueue::open(&path).unwrap();
        let original = ConsumptionRecord {
            timestamp: Utc::now(),
            barcode: "XYZ999".into(),
            referencia: None,
            marca: Some("HORN".into()),
            tipo: Some("PENDIENTE".into()),
            precio: None,
            cantidad: 1,
            operario: "Juan".into(),
            proyecto: Some("F-7".into()),
            is_new: true,
        };
        queue.enqueue(&original).unwrap();
        drop(queue);

        let reopened = PendingQueue::open(&path).unwrap();
        assert_eq!(reopened.peek_ordered()[0].record, original);
    }
}
