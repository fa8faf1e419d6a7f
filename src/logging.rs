//! Structured logging setup (tracing + tracing-subscriber + tracing-appender).
//!
//! `RUST_LOG` controls the filter (default `info`). Output goes through a
//! non-blocking writer, to stdout or to a daily rolling file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogConfig, LogFormat};

const LOG_FILE_PREFIX: &str = "travel_records.log";

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost on exit.
pub fn init(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let (writer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let builder = fmt().with_env_filter(filter).with_writer(writer);
    match config.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init()?,
        LogFormat::Pretty => builder.with_ansi(config.dir.is_none()).try_init()?,
    }

    Ok(guard)
}
