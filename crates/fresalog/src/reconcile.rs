//! Ordered drain of the pending queue into the authoritative store.

use crate::engine::Engine;
use fresalog_core::SyncReport;
use fresalog_queue::QueueError;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

impl Engine {
    /// Drain the pending queue into the store, oldest first.
    pub fn sync(&self) -> Result<SyncReport, QueueError> {
        self.sync_with_cancel(&AtomicBool::new(false))
    }

    /// Drain the pending queue, checking `cancel` between entries.
    ///
    /// Each entry goes through the same direct-write path as registration
    /// and is removed from the queue before the next one is attempted. A
    /// busy store stops the run immediately — skipping ahead would let a
    /// later new-entry row land before an earlier one and corrupt the
    /// audit trail. A non-transient failure on a single entry is counted
    /// and skipped so one malformed record cannot block the rest.
    pub fn sync_with_cancel(&self, cancel: &AtomicBool) -> Result<SyncReport, QueueError> {
        let entries = self.queue.peek_ordered();
        let mut report = SyncReport::default();
        let mut merged_new_entry = false;

        for entry in entries {
            if cancel.load(Ordering::Relaxed) {
                info!("sync cancelled, stopping between entries");
                break;
            }

            let attempt = {
                let _gate = self
                    .write_gate
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                self.store.append_registration(&entry.record)
            };

            match attempt {
                Ok(()) => {
                    self.queue.remove(entry.seq)?;
                    report.merged += 1;
                    if entry.record.is_new {
                        merged_new_entry = true;
                    }
                    debug!(seq = entry.seq, barcode = %entry.record.barcode, "pending entry merged");
                }
                Err(e) if e.is_busy() => {
                    info!(
                        merged = report.merged,
                        remaining = self.queue.count(),
                        "store busy, pausing reconciliation"
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        seq = entry.seq,
                        barcode = %entry.record.barcode,
                        error = %e,
                        "pending entry failed to merge, skipping"
                    );
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.queue.count();
        if merged_new_entry {
            if let Err(e) = self.refresh_catalog() {
                warn!("catalog rebuild after sync failed: {}", e);
            }
        }
        if report.merged > 0 || report.failed > 0 {
            info!(
                merged = report.merged,
                failed = report.failed,
                remaining = report.remaining,
                "sync complete"
            );
        }
        Ok(report)
    }
}
