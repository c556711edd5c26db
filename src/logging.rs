//! # Diagnostics logging.
//!
//! The crate reports its own trouble (delivery failures, unauthorized
//! credential, unusable log file) through `tracing`. Nothing is installed
//! implicitly: applications that already have a subscriber keep it, others
//! call [`init_logging`] once at startup.
//!
//! Output goes to **stderr**, never stdout, so diagnostics never mix with
//! the monitored program's captured stdout.
//!
//! `RUST_LOG` overrides the level given to [`init_logging`], e.g.
//! `RUST_LOG=jobvisor=debug`.
//!
//! The monitored code's own events are a different matter: during a run the
//! supervisor scopes a dispatcher built by [`capture_dispatch`] to that code,
//! so its log lines are captured like printed output (echoed, persisted and
//! relayed).

use std::sync::Arc;

use tracing::Dispatch;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::capture::{CaptureMakeWriter, OutputCapture};
use crate::error::LogError;

/// Installs a global `fmt` subscriber writing to stderr.
///
/// `level` is an `EnvFilter` directive (`"info"`, `"jobvisor=debug"`, ...)
/// used when `RUST_LOG` is unset.
pub fn init_logging(level: &str) -> Result<(), LogError> {
    let filter = build_filter(level, std::env::var(EnvFilter::DEFAULT_ENV).ok())?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
        .map_err(|e| LogError::AlreadyInstalled(e.to_string()))
}

/// Dispatcher formatting events matching `filter` into `capture`.
///
/// Plain text (no ANSI colors): the lines end up in log files and on the
/// collector.
pub fn capture_dispatch(filter: &str, capture: Arc<OutputCapture>) -> Result<Dispatch, LogError> {
    let filter = build_filter(filter, None)?;
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(CaptureMakeWriter::new(capture))
            .with_ansi(false)
            .with_target(false),
    );
    Ok(Dispatch::new(subscriber))
}

fn build_filter(level: &str, env_override: Option<String>) -> Result<EnvFilter, LogError> {
    let directive = env_override
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level.to_string());
    EnvFilter::try_new(&directive).map_err(|e| LogError::InvalidFilter {
        directive,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_over_level() {
        let filter = build_filter("info", Some("jobvisor=trace".into())).unwrap();
        assert_eq!(filter.to_string(), "jobvisor=trace");
    }

    #[test]
    fn blank_override_falls_back_to_level() {
        let filter = build_filter("warn", Some("  ".into())).unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn capture_dispatch_respects_its_filter() {
        let capture = Arc::new(OutputCapture::new());
        let dispatch = capture_dispatch("info", Arc::clone(&capture)).unwrap();

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("too chatty");
            tracing::warn!(step = 7, "gradient exploded");
        });

        let (text, _) = capture.snapshot_since(0);
        assert!(!text.contains("too chatty"));
        assert!(text.contains("WARN"));
        assert!(text.contains("gradient exploded step=7"));
    }

    #[test]
    fn capture_dispatch_rejects_bad_filter() {
        let err = capture_dispatch("jobvisor=loud", Arc::new(OutputCapture::new())).unwrap_err();
        assert_eq!(err.as_label(), "log_invalid_filter");
    }

    #[test]
    fn invalid_directive_is_reported() {
        let err = build_filter("jobvisor=loud", None).unwrap_err();
        assert_eq!(err.as_label(), "log_invalid_filter");
    }
}
