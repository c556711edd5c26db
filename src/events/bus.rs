//! # Broadcast bus for run events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Publishing never blocks the
//! event loop or the delivery worker, which matters because both publish
//! from inside their timing-sensitive loops.
//!
//! ```text
//!   RunSupervisor ──┐
//!   DeliveryQueue ──┼──► Bus ──► subscriber_listener ──► SubscriberSet
//!   LocalLog      ──┘     └────► Bus::subscribe() receivers (tests, embedders)
//! ```
//!
//! ## Rules
//! - Events published while nobody listens are dropped.
//! - A receiver only observes events sent after it subscribed.
//! - Receivers further than `capacity` behind get `RecvError::Lagged(n)`.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle onto one broadcast channel of [`Event`]s.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget publish.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New independent receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of receivers currently attached.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
