//! Output capture: buffers, writers and local echo.
//!
//! ## Contents
//! - [`OutputCapture`] lock-protected append-only buffer with offset readers
//! - [`CaptureWriter`] `io::Write` handle given to monitored code
//! - [`CaptureMakeWriter`] the same, as a `tracing-subscriber` writer
//! - [`Utf8Decoder`] incremental byte → text decoding shared with subprocess piping
//! - [`Echo`], [`StdEcho`], [`NoEcho`] local terminal echo

mod buffer;
mod echo;
mod writer;

pub use buffer::OutputCapture;
pub use echo::{Echo, NoEcho, StdEcho};
pub use writer::{CaptureMakeWriter, CaptureWriter, Utf8Decoder};
