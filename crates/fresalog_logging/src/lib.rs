//! Shared logging setup for Fresalog binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "fresalog=info,fresalog_store=info,fresalog_queue=info,fresalog_core=info";
const MAX_LOG_FILES: usize = 3;
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Logging configuration for a Fresalog binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a size-rotated file writer plus stderr output.
///
/// The file layer always logs at the env-filter level; stderr stays at
/// `warn` unless `verbose` is set, so CLI output is not drowned in spans.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = fresalog_core::config::default_logs_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_writer = RotatingWriter::create(log_dir, config.app_name)
        .context("Failed to initialize rotating log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

struct RotatingFile {
    dir: PathBuf,
    base_name: String,
    file: File,
    current_size: u64,
}

impl RotatingFile {
    fn open(dir: PathBuf, base_name: String) -> io::Result<Self> {
        let path = dir.join(format!("{}.log", base_name));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();
        Ok(Self {
            dir,
            base_name,
            file,
            current_size,
        })
    }

    fn path_for(&self, index: usize) -> PathBuf {
        if index == 0 {
            self.dir.join(format!("{}.log", self.base_name))
        } else {
            self.dir.join(format!("{}.log.{}", self.base_name, index))
        }
    }

    /// Shift `name.log` → `name.log.1` → … and start a fresh file, keeping
    /// at most `MAX_LOG_FILES` around.
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.path_for(MAX_LOG_FILES - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for idx in (0..MAX_LOG_FILES - 1).rev() {
            let src = self.path_for(idx);
            if src.exists() {
                fs::rename(&src, self.path_for(idx + 1))?;
            }
        }

        let fresh = Self::open(self.dir.clone(), self.base_name.clone())?;
        self.file = fresh.file;
        self.current_size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Clonable `MakeWriter` over the shared rotating file.
#[derive(Clone)]
struct RotatingWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl RotatingWriter {
    fn create(dir: PathBuf, app_name: &str) -> io::Result<Self> {
        let base_name = sanitize_name(app_name);
        let file = RotatingFile::open(dir, base_name)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct RotatingWriterGuard {
    inner: Arc<Mutex<RotatingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for RotatingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        file.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
