//! Runtime paths and settings.

use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

static CREATE_DIR_WARNED: Once = Once::new();

/// Resolve the Fresalog home directory.
///
/// Priority:
/// 1) FRESALOG_HOME
/// 2) <home>/.fresalog
/// 3) ./.fresalog
pub fn fresalog_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FRESALOG_HOME") {
        return PathBuf::from(override_path);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".fresalog");
    }
    PathBuf::from(".").join(".fresalog")
}

fn ensure_home_dir(home: &PathBuf) {
    if let Err(err) = std::fs::create_dir_all(home) {
        CREATE_DIR_WARNED.call_once(|| {
            eprintln!(
                "Warning: failed to create Fresalog home directory {}: {}. Set FRESALOG_HOME.",
                home.display(),
                err
            );
        });
    }
}

/// Default authoritative store path: <home>/control_fresas.csv
pub fn default_store_path() -> PathBuf {
    let home = fresalog_home();
    ensure_home_dir(&home);
    home.join("control_fresas.csv")
}

/// Default pending queue path: <home>/pending_consumos.ndjson
pub fn default_queue_path() -> PathBuf {
    let home = fresalog_home();
    ensure_home_dir(&home);
    home.join("pending_consumos.ndjson")
}

/// Default logs directory: <home>/logs
pub fn default_logs_dir() -> PathBuf {
    let home = fresalog_home();
    ensure_home_dir(&home);
    home.join("logs")
}

/// Settings resolved from the environment, with per-field overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the authoritative spreadsheet file.
    pub store_path: PathBuf,
    /// Path to the pending queue log.
    pub queue_path: PathBuf,
    /// How long a store write attempt may wait for the file lock before it
    /// is abandoned as busy.
    pub lock_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        let store_path = std::env::var("FRESALOG_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_store_path());
        let queue_path = std::env::var("FRESALOG_QUEUE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_queue_path());
        let lock_timeout = std::env::var("FRESALOG_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(2000));
        Self {
            store_path,
            queue_path,
            lock_timeout,
        }
    }
}
