//! # Append-only output buffer with independent read cursors.
//!
//! [`OutputCapture`] receives text written by the monitored code (from any
//! thread) and lets several readers harvest it at their own pace:
//!
//! ```text
//!   writer thread(s) ──write()──► [ buf: "a\nb\nc\n..." ]   (never shrinks)
//!                                     ▲            ▲
//!                     local cursor ───┘            └─── remote cursor
//!                  (every tick, echo + file)     (batched, coarser)
//! ```
//!
//! ## Rules
//! - Data is never removed; offsets only grow.
//! - `snapshot_since(offset)` returns exactly the bytes appended after
//!   `offset` together with the new offset, under the same lock as `write`.
//! - `flush()` runs the registered callback (used to request an out-of-band
//!   capture pass); it does not touch the buffer.

use std::sync::{Arc, Mutex, MutexGuard};

type FlushHook = Arc<dyn Fn() + Send + Sync>;

/// Thread-safe growing text buffer.
#[derive(Default)]
pub struct OutputCapture {
    buf: Mutex<String>,
    on_flush: Mutex<Option<FlushHook>>,
}

impl OutputCapture {
    /// Creates an empty capture without a flush callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` to the buffer.
    pub fn write(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.lock_buf().push_str(text);
    }

    /// Returns the text appended since `offset` and the offset to use next time.
    ///
    /// An `offset` beyond the end (or inside a character) is clamped to the
    /// nearest valid position at or before it.
    pub fn snapshot_since(&self, offset: usize) -> (String, usize) {
        let buf = self.lock_buf();
        let mut start = offset.min(buf.len());
        while !buf.is_char_boundary(start) {
            start -= 1;
        }
        (buf[start..].to_string(), buf.len())
    }

    /// Current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.lock_buf().len()
    }

    /// True if nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes the registered flush callback, if any.
    pub fn flush(&self) {
        let hook = self
            .on_flush
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Registers (or replaces) the flush callback.
    pub fn set_on_flush<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_flush.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    fn lock_buf(&self) -> MutexGuard<'_, String> {
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }
}
