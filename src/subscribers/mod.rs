//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the fan-out
//! [`SubscriberSet`], and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//!   RunSupervisor / DeliveryQueue ── publish(Event) ──► Bus
//!                                                        │
//!                                         subscriber_listener (RunSupervisor)
//!                                                        │
//!                                                  SubscriberSet::emit
//!                                             ┌──────────┼──────────┐
//!                                             ▼          ▼          ▼
//!                                         LogWriter   Custom      ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use jobvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct DeliveryAlarm;
//!
//! #[async_trait]
//! impl Subscribe for DeliveryAlarm {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::Unauthorized {
//!             // page someone
//!         }
//!     }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
