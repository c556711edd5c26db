//! # Wire unit sent to the remote collector.
//!
//! Every message a run produces is an [`Envelope`]:
//! ```text
//! { "type": "<kind>", "timestamp_ms": <epoch ms>, "run_id": "<uuid>", "payload": { ... } }
//! ```
//!
//! Envelopes are immutable once constructed. `timestamp_ms` is taken at
//! construction time, never at send time, so retries keep the original time.
//! A process-local `seq` (not serialized) orders envelopes for logging and
//! "log once per distinct message" bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Global sequence counter for envelope identity.
static ENVELOPE_SEQ: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_seq() -> u64 {
    ENVELOPE_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Opaque unique identifier of one run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunId(Arc<str>);

impl RunId {
    /// Generates a fresh random (v4) run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    /// Borrows the id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Severity of a captured log body: stdout is `INFO`, stderr is `ERROR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Error,
}

/// Terminal status reported in `run_ended`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    Failure,
    UserCanceled,
}

impl FinalStatus {
    /// Wire spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Success => "success",
            FinalStatus::Failure => "failure",
            FinalStatus::UserCanceled => "user_canceled",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific body of an envelope.
///
/// Serialized without a tag: the tag lives in the envelope's `type` field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    RunStarted {
        job_name: String,
    },
    RunEnded {
        final_status: FinalStatus,
    },
    Log {
        id: String,
        level: Level,
        body: String,
    },
    Metric {
        name: String,
        value: f64,
        is_internal: bool,
    },
    Param {
        params: BTreeMap<String, Value>,
        is_internal: bool,
    },
    Heartbeat {},
}

impl Payload {
    /// Wire name of the envelope type carrying this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::RunStarted { .. } => "run_started",
            Payload::RunEnded { .. } => "run_ended",
            Payload::Log { .. } => "log",
            Payload::Metric { .. } => "metric",
            Payload::Param { .. } => "param",
            Payload::Heartbeat {} => "heartbeat",
        }
    }
}

/// Structured, typed, timestamped message for the remote collector.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    seq: u64,
    timestamp_ms: i64,
    run_id: RunId,
    payload: Payload,
}

impl Envelope {
    pub(crate) fn new(run_id: &RunId, timestamp_ms: i64, payload: Payload) -> Self {
        Self {
            seq: next_seq(),
            timestamp_ms,
            run_id: run_id.clone(),
            payload,
        }
    }

    /// Process-local identity (monotonic in construction order).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wire type name (`run_started`, `log`, ...).
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Construction time in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Run this envelope belongs to.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Type-specific body.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// True for `run_ended`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, Payload::RunEnded { .. })
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Envelope", 4)?;
        s.serialize_field("type", self.kind())?;
        s.serialize_field("timestamp_ms", &self.timestamp_ms)?;
        s.serialize_field("run_id", &self.run_id)?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}
