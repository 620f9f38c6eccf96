//! Logging setup.
//!
//! The controller logs structured fields (`routing_number`, `filename`,
//! `kind`) from a long-running loop, so output goes to a non-blocking
//! rolling file, optionally as JSON for log shipping, with a readable
//! stdout mirror for anyone watching a tick live.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop; hold it for the life of the process.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let rotation = match config.rotation.as_str() {
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    };
    let appender = RollingFileAppender::new(rotation, &config.log_dir, &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    // RUST_LOG wins when set; otherwise the configured level, with sqlx
    // capped at warn so the per-tick cursor queries don't flood the file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.use_json {
        registry
            .with(fmt::layer().json().with_writer(file_writer).with_ansi(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(file_writer)
                    .with_ansi(false),
            )
            .with(fmt::layer().with_target(false))
            .init();
    }

    guard
}
