//! # Capture pass: local echo every tick, remote delivery in batches.
//!
//! ```text
//!             ┌───────── local cursor ──► Echo + LocalLog      (every pass)
//!  capture ───┤
//!             └───────── remote cursor ─► chunk ─► DeliveryQueue
//!                                          (once per remote_batch_interval,
//!                                           or when forced while draining)
//! ```
//!
//! ## Rules
//! - Both cursors only move forward: a byte range is echoed once and
//!   enqueued once.
//! - stdout is delivered as `INFO`, stderr as `ERROR`.
//! - Remote bodies never exceed `max_chunk_bytes`.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{Echo, OutputCapture};
use crate::delivery::DeliveryQueue;
use crate::message::{Level, codec};

use super::local_log::LocalLog;

struct Stream {
    capture: Arc<OutputCapture>,
    level: Level,
    local: usize,
    remote: usize,
}

impl Stream {
    fn new(capture: Arc<OutputCapture>, level: Level) -> Self {
        Self {
            capture,
            level,
            local: 0,
            remote: 0,
        }
    }

    fn harvest_local(&mut self, echo: &dyn Echo, log: &mut LocalLog) {
        let (text, next) = self.capture.snapshot_since(self.local);
        self.local = next;
        if text.is_empty() {
            return;
        }
        match self.level {
            Level::Info => echo.stdout(&text),
            Level::Error => echo.stderr(&text),
        }
        log.write(&text);
    }

    fn harvest_remote(&mut self, queue: &DeliveryQueue, chunk_bytes: usize) {
        let (text, next) = self.capture.snapshot_since(self.remote);
        self.remote = next;
        for chunk in codec::chunk_text(&text, chunk_bytes) {
            queue.enqueue(codec::log(queue.run_id(), self.level, chunk));
        }
    }
}

pub(crate) struct Harvester {
    out: Stream,
    err: Stream,
    echo: Arc<dyn Echo>,
    log: LocalLog,
    queue: Arc<DeliveryQueue>,
    batch_interval: Duration,
    chunk_bytes: usize,
    last_remote: Instant,
}

impl Harvester {
    pub(crate) fn new(
        stdout: Arc<OutputCapture>,
        stderr: Arc<OutputCapture>,
        echo: Arc<dyn Echo>,
        log: LocalLog,
        queue: Arc<DeliveryQueue>,
        batch_interval: Duration,
        chunk_bytes: usize,
    ) -> Self {
        Self {
            out: Stream::new(stdout, Level::Info),
            err: Stream::new(stderr, Level::Error),
            echo,
            log,
            queue,
            batch_interval,
            chunk_bytes,
            last_remote: Instant::now(),
        }
    }

    /// One capture pass. `force_remote` bypasses the batching delay.
    pub(crate) fn pass(&mut self, force_remote: bool) {
        self.out.harvest_local(self.echo.as_ref(), &mut self.log);
        self.err.harvest_local(self.echo.as_ref(), &mut self.log);
        self.log.flush();

        if force_remote || self.last_remote.elapsed() >= self.batch_interval {
            self.out.harvest_remote(&self.queue, self.chunk_bytes);
            self.err.harvest_remote(&self.queue, self.chunk_bytes);
            self.last_remote = Instant::now();
        }
    }

    /// Local log location, while the file is usable.
    pub(crate) fn log_path(&self) -> Option<&Path> {
        self.log.path()
    }
}
