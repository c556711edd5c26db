//! # `io::Write` front-end for an [`OutputCapture`].
//!
//! Monitored code writes bytes; the capture stores text. [`Utf8Decoder`]
//! bridges the two: a multi-byte character split across two writes is held
//! back until its tail arrives, and invalid sequences become U+FFFD.
//!
//! [`CaptureMakeWriter`] plugs a capture into `tracing-subscriber`'s fmt
//! layer, so formatted log lines land in the stream like any other output.

use std::io;
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

use super::OutputCapture;

/// Incremental lossy UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `bytes` after any carried-over prefix.
    ///
    /// An incomplete sequence at the end is kept for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8.
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Emits whatever is still pending (lossy) and resets the decoder.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Writer handle into one capture stream.
///
/// Cloning yields an independent writer (own decoder) onto the same capture.
pub struct CaptureWriter {
    capture: Arc<OutputCapture>,
    decoder: Utf8Decoder,
}

impl CaptureWriter {
    pub fn new(capture: Arc<OutputCapture>) -> Self {
        Self {
            capture,
            decoder: Utf8Decoder::new(),
        }
    }

    /// Appends text directly, bypassing byte decoding.
    pub fn write_text(&self, text: &str) {
        self.capture.write(text);
    }

    /// Underlying capture.
    pub fn capture(&self) -> &Arc<OutputCapture> {
        &self.capture
    }
}

impl Clone for CaptureWriter {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.capture))
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = self.decoder.decode(buf);
        self.capture.write(&text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.capture.flush();
        Ok(())
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        let tail = self.decoder.finish();
        self.capture.write(&tail);
    }
}

/// `MakeWriter` handing out a fresh [`CaptureWriter`] per formatted event.
#[derive(Clone)]
pub struct CaptureMakeWriter {
    capture: Arc<OutputCapture>,
}

impl CaptureMakeWriter {
    pub fn new(capture: Arc<OutputCapture>) -> Self {
        Self { capture }
    }
}

impl<'a> MakeWriter<'a> for CaptureMakeWriter {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter::new(Arc::clone(&self.capture))
    }
}
