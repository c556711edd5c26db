//! Wire messages: envelope types and their construction.
//!
//! ## Contents
//! - [`Envelope`], [`Payload`], [`RunId`], [`Level`], [`FinalStatus`] data model
//! - [`codec`] pure constructors (`run_started`, `log`, `metric`, ...) and
//!   the remote chunking helper

pub mod codec;
mod envelope;

pub use envelope::{Envelope, FinalStatus, Level, Payload, RunId};
