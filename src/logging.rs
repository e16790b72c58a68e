//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two modes:
//! - **Node** ([`init_production`]): daily-rotated JSON file plus stderr, used
//!   by `orgkernel run` when a logs directory is configured
//! - **CLI** ([`init_cli`]): stderr only
//!
//! `RUST_LOG` always wins over the built-in default filter.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix inside the logs directory.
pub const LOG_FILE_PREFIX: &str = "orgkernel.log";

/// Keeps the non-blocking file writer alive. Dropping it flushes pending
/// entries.
#[derive(Debug)]
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Default filter for a `-v` count: 0 → `info`, 1 → `debug`, more → `trace`.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "orgkernel=debug,info",
        _ => "trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)))
}

/// Log JSON to `{logs_dir}/orgkernel.log.YYYY-MM-DD` and text to stderr.
///
/// A subscriber installed earlier (e.g. by a test harness) is left alone.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_production(logs_dir: &Path, verbosity: u8) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already set; file logging not installed");
    }

    Ok(LoggingGuard { _guard: guard })
}

/// Log human-readable text to stderr only.
pub fn init_cli(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(std::io::stderr)
        .try_init();
}
