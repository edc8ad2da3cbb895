//! Logging setup for the wgsync binary.
//!
//! Logs go to stderr so command output on stdout stays clean for shell
//! pipelines. A rolling file appender can be layered on top through the
//! settings file.

use std::io;
use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log initialization options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level (default: INFO).
    pub level: Level,

    /// Directory for daily-rolling log files; stderr-only when unset.
    pub log_dir: Option<PathBuf>,

    /// Base filename for rolling log files.
    pub log_file_name: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: Level::INFO,
            log_dir: None,
            log_file_name: "wgsync.log".to_string(),
        }
    }
}

/// Maps a settings-file level name onto a level, defaulting to INFO.
pub fn parse_level(name: &str) -> Level {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initializes the global subscriber.
///
/// Returns the file-writer guard when file logging is enabled; keep it
/// alive for the duration of the program so buffered logs are flushed.
pub fn init(options: LogOptions) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(options.level.into());

    let mut layers = Vec::new();
    let mut guard = None;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .boxed();
    layers.push(stderr_layer);

    if let Some(log_dir) = &options.log_dir {
        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, log_dir, &options.log_file_name);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let file_layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(non_blocking)
            .boxed();
        layers.push(file_layer);
    }

    // Ignore the error if a subscriber is already set in this process.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();

    guard
}
