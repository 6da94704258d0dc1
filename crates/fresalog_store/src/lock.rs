//! Advisory locking for the authoritative store file.
//!
//! The shared spreadsheet only tolerates one writer at a time. Writers
//! coordinate through a `.lock` sibling file using the `fs2` crate for
//! cross-platform file locking (MSRV 1.75 compatible; std's File::lock
//! requires Rust 1.89+).
//!
//! Third-party spreadsheet applications do not honor this lock; they are
//! detected separately when the store file itself refuses to open for
//! append.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// How often a deadline-bounded acquisition retries the lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A guard that holds the exclusive write lock on the store file.
///
/// The lock is released when the guard is dropped.
pub struct StoreLockGuard {
    _file: File,
    lock_path: PathBuf,
}

impl StoreLockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl std::fmt::Debug for StoreLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLockGuard")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

/// Lock file path for a store path: `control.csv` → `control.csv.lock`.
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut lock_path = store_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

/// Try to acquire the exclusive lock without waiting.
///
/// Returns `Ok(None)` when another process holds the lock.
pub fn try_lock(store_path: &Path) -> io::Result<Option<StoreLockGuard>> {
    let lock_path = lock_path_for(store_path);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    // Fully qualified call: std::fs::File grows its own try_lock_exclusive
    // in Rust 1.89+ with a different error type.
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            debug!("acquired store lock: {}", lock_path.display());
            Ok(Some(StoreLockGuard {
                _file: file,
                lock_path,
            }))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

/// Acquire the exclusive lock, polling until `timeout` expires.
///
/// Returns `Ok(None)` when the deadline passes with the lock still held
/// elsewhere, so callers are never parked indefinitely behind a spreadsheet
/// someone left open.
pub fn lock_within(store_path: &Path, timeout: Duration) -> io::Result<Option<StoreLockGuard>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(guard) = try_lock(store_path)? {
            return Ok(Some(guard));
        }
        if Instant::now() >= deadline {
            debug!(
                "store lock still held after {:?}: {}",
                timeout,
                store_path.display()
            );
            return Ok(None);
        }
        std::thread::sleep(LOCK_POLL_INTERVAL);
    }
}

/// Check whether another process currently holds the write lock.
pub fn is_locked(store_path: &Path) -> bool {
    matches!(try_lock(store_path), Ok(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_naming() {
        assert_eq!(
            lock_path_for(Path::new("/data/control.csv")),
            PathBuf::from("/data/control.csv.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/store")),
            PathBuf::from("/data/store.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/my.store.csv")),
            PathBuf::from("/data/my.store.csv.lock")
        );
    }

    #[test]
    fn lock_and_release() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("control.csv");

        let guard = try_lock(&store).unwrap().expect("first lock succeeds");
        assert!(guard.lock_path().exists());
        drop(guard);

        assert!(try_lock(&store).unwrap().is_some());
    }

    #[test]
    fn contended_lock_reports_held() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("control.csv");

        let _guard = try_lock(&store).unwrap().expect("first lock succeeds");
        assert!(try_lock(&store).unwrap().is_none());
        assert!(is_locked(&store));
    }

    #[test]
    fn deadline_bounded_acquisition_gives_up() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("control.csv");

        let _guard = try_lock(&store).unwrap().expect("first lock succeeds");
        let started = Instant::now();
        let second = lock_within(&store, Duration::from_millis(120)).unwrap();
        assert!(second.is_none());
        assert!(started.elapsed() >= Duration::from_millis(120));
    }
}
