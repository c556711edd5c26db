//! # Transport sink contract.
//!
//! The core never speaks HTTP (or any wire protocol) itself. A [`Transport`]
//! sends one [`Envelope`] and classifies the result into the four outcomes
//! the delivery queue acts on:
//!
//! | Outcome          | Queue reaction                                   |
//! |------------------|--------------------------------------------------|
//! | `Delivered`      | continue with the next message                   |
//! | `Transient`      | re-queue at the head, stop this drain            |
//! | `Poison`         | drop the message, continue                       |
//! | `Unauthorized`   | latch, stop all delivery for the run             |
//!
//! Status-code mapping (e.g. 4xx non-auth → poison, 5xx/timeout → transient)
//! belongs to concrete transports.

use async_trait::async_trait;

use crate::message::Envelope;

/// Classified result of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Confirmed by the collector.
    Delivered,
    /// Network trouble, timeout, unexpected server error: retry later.
    Transient(String),
    /// Permanently rejected (malformed): never retry.
    Poison(String),
    /// Credential rejected.
    Unauthorized(String),
}

impl SendOutcome {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SendOutcome::Delivered => "delivered",
            SendOutcome::Transient(_) => "transient",
            SendOutcome::Poison(_) => "poison",
            SendOutcome::Unauthorized(_) => "unauthorized",
        }
    }
}

/// Remote sink for envelopes.
///
/// Implementations must be cheap to share (`Arc<dyn Transport>`) and must not
/// hold locks across the returned future for longer than one send.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Sends one envelope. `credential` is the currently resolved API key.
    async fn send(&self, envelope: &Envelope, credential: Option<&str>) -> SendOutcome;
}

/// Transport that accepts and discards everything (offline mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardTransport;

#[async_trait]
impl Transport for DiscardTransport {
    fn name(&self) -> &str {
        "discard"
    }

    async fn send(&self, _envelope: &Envelope, _credential: Option<&str>) -> SendOutcome {
        SendOutcome::Delivered
    }
}
