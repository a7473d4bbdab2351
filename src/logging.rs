use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt::time::UtcTime, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize logging: stdout plus an optional rolling file, configured from `logging`.
///
/// The level comes from `logging.level` when set, then `RUST_LOG`, then "info".
/// The returned guard flushes the file writer on drop and must be held by `main`.
#[must_use]
pub fn init_with_config(cfg: &LoggingConfig) -> Option<WorkerGuard> {
    let (file_writer, guard) = match open_file_writer(cfg) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let filter = env_filter(cfg);
    let result = match cfg.format {
        LogFormat::Json => {
            let file_layer = file_writer.map(|writer| {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(writer)
            });
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_timer(UtcTime::rfc_3339())
                        .with_writer(std::io::stdout),
                )
                .with(file_layer)
                .try_init()
        }
        LogFormat::Text => {
            let file_layer = file_writer.map(|writer| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(writer)
            });
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(true)
                        .with_timer(UtcTime::rfc_3339())
                        .with_writer(std::io::stdout),
                )
                .with(file_layer)
                .try_init()
        }
    };

    // A global subscriber may already exist in tests.
    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }

    guard
}

fn env_filter(cfg: &LoggingConfig) -> EnvFilter {
    match cfg.level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn rotation(raw: &str) -> Rotation {
    match raw.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn open_file_writer(cfg: &LoggingConfig) -> Option<(NonBlocking, WorkerGuard)> {
    if !cfg.enable_file_logging {
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&cfg.dir) {
        eprintln!(
            "Failed to create log directory '{}' ({e}), continuing with stdout logs",
            cfg.dir
        );
        return None;
    }

    let appender = RollingFileAppender::new(rotation(&cfg.rotation), &cfg.dir, &cfg.filename);
    Some(tracing_appender::non_blocking(appender))
}
