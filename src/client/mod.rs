//! # User-facing metric API bound to one run.
//!
//! [`MetricClient`] is handed to the monitored code through the
//! [`RunContext`](crate::RunContext). It is cheap to clone and safe to use
//! from any thread.
//!
//! ```text
//!   metric(name, v) ──► validate ──► rate limit ──► DeliveryQueue
//!                                                └─► "| name: v |" ─► stdout capture
//!   param(name, v)  ──► serialize ──► ParamRegistry ──► DeliveryQueue
//!   iter(n)         ──► internal param ──► Iter ──► internal metric per index
//! ```
//!
//! ## Rules
//! - Validation failures return an error and enqueue nothing.
//! - A metric name is emitted at most once per `metric_interval`; the first
//!   emission of a name is never skipped.
//! - A param name may be recorded once per run.
//! - `iter(n)` progress obeys the same rate limit, except for the last index,
//!   which is always sent so the collector sees the loop complete.
//! - Internal values (`is_internal = true`) are never written to the log.
//!
//! # Example
//! ```no_run
//! # fn demo(client: jobvisor::MetricClient) -> Result<(), jobvisor::ValidationError> {
//! let lr = client.param("learning_rate", 0.01)?;
//! for epoch in client.iter(10)? {
//!     let loss = 1.0 / (epoch as f64 + 1.0) * lr;
//!     client.metric("loss", loss)?;
//! }
//! # Ok(())
//! # }
//! ```

mod iter;
mod params;
mod rate;

pub use iter::Iter;

use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::capture::OutputCapture;
use crate::delivery::DeliveryQueue;
use crate::error::ValidationError;
use crate::message::{RunId, codec};

use params::ParamRegistry;
use rate::MetricRateState;

struct Inner {
    queue: Arc<DeliveryQueue>,
    stdout: Arc<OutputCapture>,
    rates: Mutex<MetricRateState>,
    params: Mutex<ParamRegistry>,
    iterations: AtomicUsize,
}

/// Handle for emitting metrics and params of one run.
#[derive(Clone)]
pub struct MetricClient {
    inner: Arc<Inner>,
}

impl MetricClient {
    pub(crate) fn new(
        queue: Arc<DeliveryQueue>,
        stdout: Arc<OutputCapture>,
        metric_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                stdout,
                rates: Mutex::new(MetricRateState::new(metric_interval)),
                params: Mutex::new(ParamRegistry::default()),
                iterations: AtomicUsize::new(0),
            }),
        }
    }

    /// Run this client reports to.
    pub fn run_id(&self) -> &RunId {
        self.inner.queue.run_id()
    }

    /// Emits a metric and logs it. See [`MetricClient::metric_with`].
    pub fn metric(&self, name: &str, value: impl Into<Value>) -> Result<bool, ValidationError> {
        self.metric_with(name, value, true)
    }

    /// Emits a metric.
    ///
    /// Returns `Ok(false)` if the emission was skipped by rate limiting.
    /// Only finite JSON numbers are accepted.
    pub fn metric_with(
        &self,
        name: &str,
        value: impl Into<Value>,
        log: bool,
    ) -> Result<bool, ValidationError> {
        let value = codec::real_value(name, &value.into())?;
        self.emit_metric(name, value, false, log)
    }

    /// Records a param, logs it and hands the value back.
    pub fn param<V: Serialize>(&self, name: &str, value: V) -> Result<V, ValidationError> {
        self.param_with(name, value, true)
    }

    /// Records a param and hands the value back.
    ///
    /// Fails with `NotSerializable` if `value` has no JSON form and with
    /// `DuplicateParam` if `name` was already recorded.
    pub fn param_with<V: Serialize>(
        &self,
        name: &str,
        value: V,
        log: bool,
    ) -> Result<V, ValidationError> {
        let json = serde_json::to_value(&value).map_err(|e| ValidationError::NotSerializable {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.record_param(name, json, false, log)?;
        Ok(value)
    }

    /// Records a param from its display form: numeric-like text becomes a
    /// float, anything else stays text. Returns the recorded value.
    pub fn param_display(&self, name: &str, value: impl Display) -> Result<Value, ValidationError> {
        let json = codec::coerce_display(&value.to_string());
        self.record_param(name, json.clone(), false, true)?;
        Ok(json)
    }

    /// Counted iteration `0..n` with progress tracking; logs each index.
    pub fn iter(&self, n: u64) -> Result<Iter, ValidationError> {
        self.iter_with(n, true)
    }

    /// Counted iteration `0..n` with progress tracking.
    ///
    /// Each call gets its own `hd_iter_<k>` metric (k counts calls within the
    /// run); the `hd_iter_<k>_epochs` param holding `n` is recorded here,
    /// before the first index is yielded.
    pub fn iter_with(&self, n: u64, log: bool) -> Result<Iter, ValidationError> {
        let k = self.inner.iterations.fetch_add(1, Ordering::Relaxed);
        let metric = format!("hd_iter_{k}");
        self.record_param(&format!("{metric}_epochs"), Value::from(n), true, false)?;
        Ok(Iter::new(self.clone(), metric, n, log))
    }

    /// Internal progress metric; `force` bypasses (but still feeds) the rate limit.
    pub(crate) fn emit_internal_metric(&self, name: &str, value: f64, force: bool) {
        // Internal names are non-empty and values finite: cannot fail.
        let _ = self.send_metric(name, value, true, false, force);
    }

    pub(crate) fn write_line(&self, line: &str) {
        let mut text = String::with_capacity(line.len() + 1);
        text.push_str(line);
        text.push('\n');
        self.inner.stdout.write(&text);
    }

    fn emit_metric(
        &self,
        name: &str,
        value: f64,
        internal: bool,
        log: bool,
    ) -> Result<bool, ValidationError> {
        self.send_metric(name, value, internal, log, false)
    }

    fn send_metric(
        &self,
        name: &str,
        value: f64,
        internal: bool,
        log: bool,
        force: bool,
    ) -> Result<bool, ValidationError> {
        let envelope = codec::metric(self.run_id(), name, value, internal)?;
        let admitted = {
            let mut rates = self.inner.rates.lock().unwrap_or_else(|e| e.into_inner());
            if force {
                rates.record(name, Instant::now());
                true
            } else {
                rates.admit(name, Instant::now())
            }
        };
        if !admitted || !self.inner.queue.enqueue(envelope) {
            return Ok(false);
        }
        if log && !internal {
            self.write_line(&format!("| {name}: {value:10.6} |"));
        }
        Ok(true)
    }

    fn record_param(
        &self,
        name: &str,
        value: Value,
        internal: bool,
        log: bool,
    ) -> Result<(), ValidationError> {
        let line = (log && !internal).then(|| format!("{{ {name}: {} }}", display_value(&value)));
        let envelope = codec::param(self.run_id(), name, value, internal)?;
        self.inner
            .params
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .register(name)?;
        self.inner.queue.enqueue(envelope);
        if let Some(line) = line {
            self.write_line(&line);
        }
        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
