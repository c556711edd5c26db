//! # Envelope construction.
//!
//! Pure functions: no state, no I/O. The only failure mode is input
//! validation, which happens before an envelope exists, so every constructed
//! envelope is serializable.
//!
//! Timestamps are milliseconds since the Unix epoch (UTC) for cross-clock
//! comparability.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::error::ValidationError;
use crate::message::envelope::{Envelope, FinalStatus, Level, Payload, RunId};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// First envelope of every run.
pub fn run_started(run_id: &RunId, job_name: &str) -> Envelope {
    Envelope::new(
        run_id,
        now_ms(),
        Payload::RunStarted {
            job_name: job_name.to_string(),
        },
    )
}

/// Last envelope of every run.
pub fn run_ended(run_id: &RunId, final_status: FinalStatus) -> Envelope {
    Envelope::new(run_id, now_ms(), Payload::RunEnded { final_status })
}

/// Captured output chunk. Each log envelope gets its own random id.
pub fn log(run_id: &RunId, level: Level, body: impl Into<String>) -> Envelope {
    Envelope::new(
        run_id,
        now_ms(),
        Payload::Log {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            body: body.into(),
        },
    )
}

/// Named real-valued measurement.
pub fn metric(
    run_id: &RunId,
    name: &str,
    value: f64,
    is_internal: bool,
) -> Result<Envelope, ValidationError> {
    check_name(name)?;
    if !value.is_finite() {
        return Err(ValidationError::NotReal {
            name: name.to_string(),
            got: value.to_string(),
        });
    }
    Ok(Envelope::new(
        run_id,
        now_ms(),
        Payload::Metric {
            name: name.to_string(),
            value,
            is_internal,
        },
    ))
}

/// One named hyperparameter.
pub fn param(
    run_id: &RunId,
    name: &str,
    value: Value,
    is_internal: bool,
) -> Result<Envelope, ValidationError> {
    check_name(name)?;
    let mut params = BTreeMap::new();
    params.insert(name.to_string(), value);
    Ok(Envelope::new(
        run_id,
        now_ms(),
        Payload::Param {
            params,
            is_internal,
        },
    ))
}

/// Liveness signal with an empty payload.
pub fn heartbeat(run_id: &RunId) -> Envelope {
    Envelope::new(run_id, now_ms(), Payload::Heartbeat {})
}

/// Renders an envelope as one JSON document.
pub fn to_json(envelope: &Envelope) -> serde_json::Result<String> {
    serde_json::to_string(envelope)
}

/// Canonical `f64` of a JSON value, if it is a finite number.
pub fn real_value(name: &str, value: &Value) -> Result<f64, ValidationError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NotReal {
            name: name.to_string(),
            got: value.to_string(),
        })
}

/// Coerces display text to a JSON value: numeric-like text becomes a float,
/// everything else stays a string.
pub fn coerce_display(text: &str) -> Value {
    text.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// Splits `text` into pieces of at most `max_bytes` bytes on char boundaries.
///
/// A character wider than `max_bytes` forms a piece of its own.
pub fn chunk_text(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(1);
    let mut chunks = Vec::with_capacity(text.len() / max_bytes + 1);
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_bytes).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + 1;
            while !text.is_char_boundary(end) {
                end += 1;
            }
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}
