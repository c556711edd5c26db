//! # Outbound FIFO of envelopes and its drain against a [`Transport`].
//!
//! ```text
//!  MetricClient ─┐                      ┌──────────────────────────────┐
//!  Harvester    ─┼─ enqueue ──► [tail … head] ──► drain_once ──► Transport
//!  Supervisor   ─┘                      └──────────────────────────────┘
//!                                         ▲            │
//!                                         └─ Transient ┘ (push_front, stop)
//! ```
//!
//! ## Rules
//! - FIFO in enqueue order; a transiently failed envelope goes back to the
//!   **head** and is retried before anything newer.
//! - An entry leaves the queue only after `Delivered` or `Poison`.
//! - `Unauthorized` latches for the rest of the run: no further sends.
//! - Once the terminal envelope (`run_ended`) is enqueued the queue is sealed;
//!   later enqueues are refused, so `run_ended` stays last.
//! - An empty drain sends a synthesized heartbeat once `heartbeat_interval`
//!   passed since the last successful send (never after `run_ended` went out).
//! - Diagnostics are logged once per distinct envelope, not once per retry.
//! - Drains are serialized: two concurrent `drain_once` calls run one after
//!   the other.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::events::{Bus, Event, EventKind};
use crate::message::{Envelope, RunId, codec};

use super::transport::{SendOutcome, Transport};

/// Result of one [`DeliveryQueue::drain_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// The queue was emptied.
    Drained {
        /// Envelopes confirmed by the transport.
        sent: usize,
        /// Poison envelopes dropped.
        dropped: usize,
    },
    /// A transient failure stopped the drain; the failed envelope is back at the head.
    Incomplete {
        sent: usize,
        dropped: usize,
        /// Envelopes still queued.
        pending: usize,
    },
    /// Delivery is latched off for this run.
    Unauthorized,
}

impl DrainResult {
    /// True if nothing is left to send.
    pub fn is_drained(&self) -> bool {
        matches!(self, DrainResult::Drained { .. })
    }

    /// Short stable label: `drained`, `incomplete` or `unauthorized`.
    pub fn as_label(&self) -> &'static str {
        match self {
            DrainResult::Drained { .. } => "drained",
            DrainResult::Incomplete { .. } => "incomplete",
            DrainResult::Unauthorized => "unauthorized",
        }
    }
}

struct DrainState {
    last_success: Instant,
    retrying: HashSet<u64>,
    terminal_sent: bool,
    credential_warned: bool,
}

/// Concurrency-safe outbound queue bound to one run.
pub struct DeliveryQueue {
    run_id: RunId,
    pending: Mutex<VecDeque<Envelope>>,
    sealed: AtomicBool,
    unauthorized: AtomicBool,
    drain: tokio::sync::Mutex<DrainState>,
    heartbeat_interval: Duration,
    send_timeout: Duration,
    bus: Bus,
}

impl DeliveryQueue {
    /// Creates an empty queue for `run_id`.
    pub fn new(run_id: RunId, cfg: &Config, bus: Bus) -> Self {
        Self {
            run_id,
            pending: Mutex::new(VecDeque::new()),
            sealed: AtomicBool::new(false),
            unauthorized: AtomicBool::new(false),
            drain: tokio::sync::Mutex::new(DrainState {
                last_success: Instant::now(),
                retrying: HashSet::new(),
                terminal_sent: false,
                credential_warned: false,
            }),
            heartbeat_interval: cfg.heartbeat_interval,
            send_timeout: cfg.send_timeout,
            bus,
        }
    }

    /// Appends `envelope` at the tail. Safe from any thread.
    ///
    /// Returns `false` (and drops the envelope) if the run's terminal envelope
    /// was already enqueued.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        let mut pending = self.lock_pending();
        if self.sealed.load(Ordering::Acquire) {
            debug!(run = %self.run_id, kind = envelope.kind(), "envelope refused: run already ended");
            return false;
        }
        if envelope.is_terminal() {
            self.sealed.store(true, Ordering::Release);
        }
        pending.push_back(envelope);
        true
    }

    /// Number of envelopes waiting.
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    /// True if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock_pending().is_empty()
    }

    /// True once `run_ended` was enqueued.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// True once the transport rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized.load(Ordering::Acquire)
    }

    /// Run this queue belongs to.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Sends from the head until the queue is empty or a send fails.
    pub async fn drain_once(
        &self,
        transport: &dyn Transport,
        credential: Option<&str>,
    ) -> DrainResult {
        if self.is_unauthorized() {
            return DrainResult::Unauthorized;
        }
        let mut state = self.drain.lock().await;

        if credential.is_none() && !state.credential_warned {
            state.credential_warned = true;
            warn!(
                run = %self.run_id,
                transport = transport.name(),
                "no credential available, sending without one"
            );
        }

        let mut sent = 0;
        let mut dropped = 0;

        while let Some(envelope) = self.pop_front() {
            match self.send(transport, &envelope, credential).await {
                SendOutcome::Delivered => {
                    sent += 1;
                    state.last_success = Instant::now();
                    state.retrying.remove(&envelope.seq());
                    if envelope.is_terminal() {
                        state.terminal_sent = true;
                    }
                }
                SendOutcome::Transient(reason) => {
                    let first_failure = state.retrying.insert(envelope.seq());
                    let kind = envelope.kind();
                    self.push_front(envelope);
                    let pending = self.len();
                    if first_failure {
                        warn!(run = %self.run_id, kind, %reason, pending, "delivery failed, will retry");
                        self.bus.publish(
                            Event::new(EventKind::DeliveryIncomplete)
                                .with_run(self.run_id.as_str())
                                .with_reason(reason)
                                .with_count(pending),
                        );
                    }
                    return DrainResult::Incomplete {
                        sent,
                        dropped,
                        pending,
                    };
                }
                SendOutcome::Poison(reason) => {
                    dropped += 1;
                    state.retrying.remove(&envelope.seq());
                    warn!(run = %self.run_id, kind = envelope.kind(), %reason, "message rejected, dropping");
                    self.bus.publish(
                        Event::new(EventKind::MessageDropped)
                            .with_run(self.run_id.as_str())
                            .with_reason(reason),
                    );
                }
                SendOutcome::Unauthorized(reason) => {
                    self.push_front(envelope);
                    self.latch_unauthorized(&reason);
                    return DrainResult::Unauthorized;
                }
            }
        }

        if !state.terminal_sent && state.last_success.elapsed() >= self.heartbeat_interval {
            let beat = codec::heartbeat(&self.run_id);
            match self.send(transport, &beat, credential).await {
                SendOutcome::Delivered => {
                    state.last_success = Instant::now();
                    self.bus
                        .publish(Event::new(EventKind::HeartbeatSent).with_run(self.run_id.as_str()));
                }
                SendOutcome::Unauthorized(reason) => {
                    self.latch_unauthorized(&reason);
                    return DrainResult::Unauthorized;
                }
                SendOutcome::Transient(reason) | SendOutcome::Poison(reason) => {
                    debug!(run = %self.run_id, %reason, "heartbeat not delivered");
                }
            }
        }

        DrainResult::Drained { sent, dropped }
    }

    async fn send(
        &self,
        transport: &dyn Transport,
        envelope: &Envelope,
        credential: Option<&str>,
    ) -> SendOutcome {
        match tokio::time::timeout(self.send_timeout, transport.send(envelope, credential)).await {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::Transient(format!(
                "send timed out after {} ms",
                self.send_timeout.as_millis()
            )),
        }
    }

    fn latch_unauthorized(&self, reason: &str) {
        if !self.unauthorized.swap(true, Ordering::AcqRel) {
            error!(run = %self.run_id, %reason, "collector rejected the credential, delivery stopped for this run");
            self.bus.publish(
                Event::new(EventKind::Unauthorized)
                    .with_run(self.run_id.as_str())
                    .with_reason(reason),
            );
        }
    }

    fn pop_front(&self) -> Option<Envelope> {
        self.lock_pending().pop_front()
    }

    fn push_front(&self, envelope: Envelope) {
        self.lock_pending().push_front(envelope);
    }

    #[cfg(test)]
    pub(crate) fn pending_snapshot(&self) -> Vec<Envelope> {
        self.lock_pending().iter().cloned().collect()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<Envelope>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
