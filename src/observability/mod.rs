//! Logging initialisation.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a pretty
//! or JSON formatter. `RUST_LOG` takes precedence over the configured level.
//! Metrics are recorded through the `metrics` facade; no exporter is
//! installed here.

use crate::config::{LogFormat, LoggingSettings};
use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Builds the event filter: `RUST_LOG` if set and valid, else `level`.
#[must_use]
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging for the process.
///
/// Calling it again after a successful initialisation is a no-op.
///
/// # Errors
///
/// Returns an error if another global subscriber was installed elsewhere.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(&settings.level);
    match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .with(filter)
            .try_init()
            .map_err(init_error)?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(filter)
            .try_init()
            .map_err(init_error)?,
    }

    let _ = LOGGING_INIT.set(());
    Ok(())
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::operation("logging_init", e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_falls_back_on_bad_directive() {
        let filter = build_filter("not a [valid directive");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let settings = LoggingSettings::default();
        let first = init_logging(&settings);
        // A test harness may already own the global subscriber.
        if first.is_ok() {
            assert!(init_logging(&settings).is_ok());
        }
    }
}
