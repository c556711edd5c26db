#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobvisor::{Config, Echo, Envelope, Payload, SendOutcome, Transport};

/// Sink that records what it accepts; scripted outcomes are consumed first.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
    script: Mutex<VecDeque<SendOutcome>>,
    attempts: Mutex<Vec<&'static str>>,
    reject_all: Option<SendOutcome>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = SendOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Answers every send with `outcome`.
    pub fn always(outcome: SendOutcome) -> Arc<Self> {
        Arc::new(Self {
            reject_all: Some(outcome),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|e| e.kind()).collect()
    }

    /// Every attempted envelope kind, including rejected ones.
    pub fn attempts(&self) -> Vec<&'static str> {
        self.attempts.lock().unwrap().clone()
    }

    /// Concatenated log bodies of one level ("INFO" / "ERROR").
    pub fn log_text(&self, level: jobvisor::Level) -> String {
        self.sent()
            .iter()
            .filter_map(|e| match e.payload() {
                Payload::Log { level: l, body, .. } if *l == level => Some(body.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, envelope: &Envelope, _credential: Option<&str>) -> SendOutcome {
        self.attempts.lock().unwrap().push(envelope.kind());
        if let Some(outcome) = &self.reject_all {
            return outcome.clone();
        }
        let scripted = self.script.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or(SendOutcome::Delivered);
        if outcome == SendOutcome::Delivered {
            self.sent.lock().unwrap().push(envelope.clone());
        }
        outcome
    }
}

/// Echo that keeps what the terminal would have shown.
#[derive(Default)]
pub struct RecordingEcho {
    out: Mutex<String>,
    err: Mutex<String>,
}

impl RecordingEcho {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stdout_text(&self) -> String {
        self.out.lock().unwrap().clone()
    }

    pub fn stderr_text(&self) -> String {
        self.err.lock().unwrap().clone()
    }
}

impl Echo for RecordingEcho {
    fn stdout(&self, text: &str) {
        self.out.lock().unwrap().push_str(text);
    }

    fn stderr(&self, text: &str) {
        self.err.lock().unwrap().push_str(text);
    }
}

/// Fast cadences, no signal handling, logs under `log_dir`.
pub fn test_config(log_dir: &Path) -> Config {
    Config {
        capture_interval: Duration::from_millis(10),
        delivery_interval: Duration::from_millis(10),
        remote_batch_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_secs(3600),
        metric_interval: Duration::ZERO,
        send_timeout: Duration::from_secs(1),
        grace: Duration::from_secs(5),
        cancel_grace: Duration::from_secs(2),
        log_dir: Some(log_dir.to_path_buf()),
        handle_signals: false,
        exit_on_interrupt: false,
        ..Config::default()
    }
}

/// All `.log` files below `dir`.
pub fn log_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(log_files(&path));
        } else if path.extension().is_some_and(|ext| ext == "log") {
            out.push(path);
        }
    }
    out
}
