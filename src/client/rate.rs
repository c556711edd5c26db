//! Per-name metric rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Last admitted emission per metric name.
///
/// Advisory only: the first emission of a name is always admitted, and a
/// skipped emission does not move the window.
#[derive(Debug)]
pub(crate) struct MetricRateState {
    interval: Duration,
    last: HashMap<String, Instant>,
}

impl MetricRateState {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    /// Records an emission of `name` at `now` regardless of the window.
    pub(crate) fn record(&mut self, name: &str, now: Instant) {
        self.last.insert(name.to_string(), now);
    }

    /// Returns `true` and records `now` if `name` may be emitted.
    pub(crate) fn admit(&mut self, name: &str, now: Instant) -> bool {
        match self.last.get_mut(name) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                self.last.insert(name.to_string(), now);
                true
            }
        }
    }
}
