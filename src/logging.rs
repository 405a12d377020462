//! Tracing subscriber setup for the binary.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Where and how log events are written.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Lower the default level to `debug`.
    pub verbose: bool,
    /// Write the log file as JSON lines.
    pub json: bool,
    /// Log file, appended to. `None` logs to stderr only.
    pub file: Option<PathBuf>,
}

/// Installs the global subscriber.
///
/// Events go to stderr and, when configured, to the log file through a
/// non-blocking writer. `RUST_LOG` overrides the default level. Keep the
/// returned guard alive until exit so buffered events are flushed.
pub fn setup_logging(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let level = if options.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let Some(log_path) = &options.file else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    if options.json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(Some(guard))
}
