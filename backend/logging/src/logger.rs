//! Structured Logger
//!
//! Wraps `tracing` with a console layer, an optional rolling NDJSON file
//! layer, and environment-based level control.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global structured logger.
///
/// `RUST_LOG` takes precedence over `level`. When `log_dir` is given, JSON
/// lines are also written to `screenlink.log.YYYY-MM-DD` there.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_logger(log_dir: Option<&Path>, level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = log_dir.map(|dir| {
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "screenlink.log");
        fmt::layer()
            .json()
            .with_writer(file_appender)
            .with_ansi(false)
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
