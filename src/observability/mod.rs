//! Observability.
//!
//! The library emits `tracing` spans and events and `metrics` counters but
//! installs nothing by default. Hosts that want log output call
//! [`init_logging`] once at startup; hosts that want metrics install their
//! own recorder.

mod logging;

pub use logging::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig};

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber.
///
/// Calling this again after a successful install is a no-op.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or another global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Ok(());
    }

    let layer = match &config.file {
        Some(path) => fmt_layer(config.format, open_log_file(path)?, false),
        None => fmt_layer(config.format, io::stderr, true),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(config.filter())
        .try_init()
        .map_err(init_error)?;

    // A concurrent caller may have won the race; either way logging is up.
    let _ = LOGGING_INIT.set(());
    Ok(())
}

/// Returns `true` once [`init_logging`] has installed a subscriber.
#[must_use]
pub fn logging_initialized() -> bool {
    LOGGING_INIT.get().is_some()
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {}", path.display(), e),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parents_and_appends() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("logs").join("roles.log");

        let mut writer = open_log_file(&path).expect("open log file");
        writer.write_all(b"first\n").expect("write");
        let mut again = open_log_file(&path).expect("reopen log file");
        again.write_all(b"second\n").expect("write");
        again.flush().expect("flush");

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let config = LoggingConfig {
            file: Some(dir.path().join("init.log")),
            format: LogFormat::Json,
            ..LoggingConfig::default()
        };

        // Another test binary subscriber may already be global; only a
        // successful first install makes the second call a guaranteed no-op.
        if init_logging(&config).is_ok() {
            assert!(logging_initialized());
            assert!(init_logging(&config).is_ok());
        }
    }
}
