//! # Remote delivery.
//!
//! - [`DeliveryQueue`]: the run's outbound FIFO and its drain logic.
//! - [`Transport`]: the sink contract (`Delivered | Transient | Poison | Unauthorized`).
//! - [`CredentialSource`] / [`CachedCredential`]: opaque API key supply.
//!
//! The periodic worker that calls [`DeliveryQueue::drain_once`] lives in the
//! supervisor core.

mod credential;
mod queue;
mod transport;

pub use credential::{CachedCredential, CredentialSource, ENV_API_KEY, EnvCredential};
pub use queue::{DeliveryQueue, DrainResult};
pub use transport::{DiscardTransport, SendOutcome, Transport};
