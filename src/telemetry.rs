//! Log subscriber setup.
//!
//! Three sinks: the console, `<LOG_DIR>/all.log` with everything the filter
//! lets through, and `<LOG_DIR>/error.log` with errors only. `RUST_LOG`
//! overrides the configured level when set.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::Error;

/// Flushes the file writers when dropped. Hold it until the process exits.
#[must_use = "dropping the guard stops file logging"]
pub struct TelemetryGuard {
    _all: WorkerGuard,
    _errors: WorkerGuard,
}

pub fn init(config: &LogConfig) -> Result<TelemetryGuard, Error> {
    let (all, all_guard) = tracing_appender::non_blocking(log_file(config, "all.log")?);
    let (errors, errors_guard) = tracing_appender::non_blocking(log_file(config, "error.log")?);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Telemetry(format!("invalid log level `{}`: {e}", config.level)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(all)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(errors)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .map_err(|e| Error::Telemetry(e.to_string()))?;

    Ok(TelemetryGuard { _all: all_guard, _errors: errors_guard })
}

fn log_file(config: &LogConfig, name: &str) -> Result<RollingFileAppender, Error> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(&config.dir)
        .map_err(|e| Error::Telemetry(format!("cannot open {}/{name}: {e}", config.dir.display())))
}
