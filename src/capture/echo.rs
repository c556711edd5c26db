//! # Local echo of captured output.
//!
//! While a run is supervised its output is captured, so something has to put
//! it back on the terminal. [`Echo`] is that seam: [`StdEcho`] writes to the
//! process's real stdout/stderr; tests substitute a recording implementation.

use std::io::{self, Write};

/// Destination for the immediate local echo.
pub trait Echo: Send + Sync + 'static {
    /// Text captured on the monitored code's stdout.
    fn stdout(&self, text: &str);

    /// Text captured on the monitored code's stderr.
    fn stderr(&self, text: &str);
}

/// Echo to the real process streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdEcho;

impl Echo for StdEcho {
    fn stdout(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn stderr(&self, text: &str) {
        let mut err = io::stderr().lock();
        let _ = err.write_all(text.as_bytes());
        let _ = err.flush();
    }
}

/// Echo that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEcho;

impl Echo for NoEcho {
    fn stdout(&self, _text: &str) {}

    fn stderr(&self, _text: &str) {}
}
