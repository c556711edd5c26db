//! # Events emitted during a supervised run.
//!
//! The [`EventKind`] enum classifies events across three categories:
//! - **Lifecycle events**: run started / finished, shutdown requested
//! - **Delivery events**: incomplete drains, dropped (poison) messages,
//!   unauthorized latch, heartbeats
//! - **Shutdown events**: final drain confirmed or timed out
//!
//! The [`Event`] struct carries metadata such as the run id, job name,
//! reason text, final status and counters.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Event, EventKind, FinalStatus};
//!
//! let ev = Event::new(EventKind::RunFinished)
//!     .with_run("3f1c...")
//!     .with_job("mnist")
//!     .with_status(FinalStatus::Success);
//!
//! assert_eq!(ev.kind, EventKind::RunFinished);
//! assert_eq!(ev.job.as_deref(), Some("mnist"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::message::FinalStatus;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of run events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// `run_started` was enqueued; the monitored code is about to start.
    ///
    /// Sets:
    /// - `run_id`, `job`
    RunStarted,

    /// Local log file could not be opened or written; the run continues.
    ///
    /// Sets:
    /// - `run_id`, `job`
    /// - `reason`: I/O error text
    LogFileUnavailable,

    /// Cancellation observed (OS interrupt or cancellation token).
    ///
    /// Sets:
    /// - `run_id`
    /// - `reason`: `"signal"` or `"token"`
    ShutdownRequested,

    /// Terminal state reached; `run_ended` was enqueued.
    ///
    /// Sets:
    /// - `run_id`, `job`
    /// - `status`: final status
    RunFinished,

    // === Delivery events ===
    /// A drain stopped early on a transient failure; the message was re-queued.
    ///
    /// Sets:
    /// - `run_id`
    /// - `reason`: transport message
    /// - `count`: messages still pending
    DeliveryIncomplete,

    /// A message was permanently rejected and dropped.
    ///
    /// Sets:
    /// - `run_id`
    /// - `reason`: transport message
    MessageDropped,

    /// The collector rejected the credential; delivery stops for the run.
    ///
    /// Sets:
    /// - `run_id`
    /// - `reason`: transport message
    Unauthorized,

    /// An idle drain sent a heartbeat.
    ///
    /// Sets:
    /// - `run_id`
    HeartbeatSent,

    // === Shutdown events ===
    /// The delivery worker settled its final drain within the bound.
    ///
    /// Sets:
    /// - `run_id`
    /// - `reason`: how it settled, `"drained"` or `"unauthorized"`
    /// - `count`: messages left undelivered (0 on a clean flush)
    DrainCompleted,

    /// The final drain did not confirm within the bound.
    ///
    /// Sets:
    /// - `run_id`
    /// - `count`: messages left undelivered
    DrainTimedOut,
}

/// Run event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Run the event belongs to.
    pub run_id: Option<Arc<str>>,
    /// Job name, where relevant.
    pub job: Option<Arc<str>>,
    /// Human-readable reason (transport message, I/O error, ...).
    pub reason: Option<Arc<str>>,
    /// Final status (only for `RunFinished`).
    pub status: Option<FinalStatus>,
    /// Counter (pending messages, ...).
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            run_id: None,
            job: None,
            reason: None,
            status: None,
            count: None,
        }
    }

    /// Attaches the run id.
    #[inline]
    pub fn with_run(mut self, run_id: impl Into<Arc<str>>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Attaches the job name.
    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the final status.
    #[inline]
    pub fn with_status(mut self, status: FinalStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a counter (saturating at `u32::MAX`).
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    #[inline]
    pub fn is_delivery_problem(&self) -> bool {
        matches!(
            self.kind,
            EventKind::DeliveryIncomplete | EventKind::MessageDropped | EventKind::Unauthorized
        )
    }
}
