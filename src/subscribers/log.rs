//! # LogWriter: renders run events through `tracing`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  jobvisor: run started run=3f1c.. job="mnist"
//! WARN  jobvisor: delivery incomplete run=3f1c.. reason="503" pending=4
//! INFO  jobvisor: run finished run=3f1c.. status=success
//! INFO  jobvisor: final drain confirmed run=3f1c.. undelivered=0
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let run = e.run_id.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::RunStarted => {
                info!(run, job = ?e.job, "run started");
            }
            EventKind::LogFileUnavailable => {
                warn!(run, reason, "local log file unavailable");
            }
            EventKind::ShutdownRequested => {
                info!(run, source = reason, "shutdown requested");
            }
            EventKind::RunFinished => {
                let status = e.status.map(|s| s.as_str()).unwrap_or("unknown");
                info!(run, status, "run finished");
            }
            EventKind::DeliveryIncomplete => {
                warn!(run, reason, pending = ?e.count, "delivery incomplete");
            }
            EventKind::MessageDropped => {
                warn!(run, reason, "message dropped");
            }
            EventKind::Unauthorized => {
                warn!(run, reason, "delivery unauthorized");
            }
            EventKind::HeartbeatSent => {
                debug!(run, "heartbeat sent");
            }
            EventKind::DrainCompleted if reason == "drained" => {
                info!(run, undelivered = ?e.count, "final drain confirmed");
            }
            EventKind::DrainCompleted => {
                warn!(run, outcome = reason, undelivered = ?e.count, "final drain settled with messages left");
            }
            EventKind::DrainTimedOut => {
                warn!(run, undelivered = ?e.count, "final drain timed out");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
