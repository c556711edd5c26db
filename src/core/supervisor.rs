//! # RunSupervisor: owns one run from start to drained end.
//!
//! The [`RunSupervisor`] wires the capture streams, the delivery queue and
//! its worker, the metric client and the local log around one execution of
//! monitored code, then drives the run through its phases.
//!
//! ## High-level architecture
//! ```text
//! Initializing:
//!   DeliveryQueue::enqueue(run_started)        (always the first envelope)
//!   LocalLog::open()                           (best-effort)
//!   spawn_delivery_worker(stop token)          ── tick ─► drain_once(transport)
//!   OutputCapture x2 (stdout/INFO, stderr/ERROR) with flush hooks ─► Notify
//!
//! Running (event loop, select! biased):
//!   ├─ execution.outcome()        → Draining(outcome)
//!   ├─ OS interrupt               → Draining(canceled), then exit(130)
//!   ├─ cancel token               → Draining(canceled), then Err(Canceled)
//!   ├─ wake.notified()            → harvester.pass(false)   (flush requested)
//!   └─ ticker.tick()              → harvester.pass(false)   (capture_interval)
//!
//! Draining:
//!   run.finish(state) ─► summary lines ─► harvester.pass(true)
//!   ─► enqueue(run_ended{status}) ─► stop.cancel()
//!   ─► timeout(grace | cancel_grace, worker rendezvous)
//!        ├─ settled     → Bus.publish(DrainCompleted{drained | unauthorized})
//!        ├─ elapsed     → worker.abort(), Bus.publish(DrainTimedOut)
//!        └─ OS interrupt → wait cut to cancel_grace, then exit(130)
//!
//! Terminated:
//!   Ok(value) | Err(Failed(e)) | Err(Panicked) | Err(Canceled)
//! ```
//!
//! Events published on the [`Bus`] are forwarded to the configured
//! subscribers through a [`SubscriberSet`].
//!
//! ## Rules
//! - `run_started` precedes every other envelope; `run_ended` is the last
//!   one enqueued (the queue is sealed after it).
//! - The monitored code's error is held until draining completed, then
//!   returned untouched.
//! - Local echo never waits on the network: the event loop only enqueues.
//! - Every wait in the shutdown path is bounded, and stays interruptible:
//!   the signal listener is armed from `Initializing` to `Terminated`.
//! - With `Config::capture_tracing` set, `tracing` events emitted by the
//!   monitored code are formatted into its captured stdout.
//!
//! ## Example
//! ```no_run
//! use std::io::Write;
//! use jobvisor::{RunSupervisor, RunError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sup = RunSupervisor::builder("mnist").build();
//!     let res: Result<u32, RunError<std::io::Error>> = sup
//!         .run(|ctx| {
//!             writeln!(ctx.stdout(), "training...")?;
//!             for epoch in ctx.client().iter(3).expect("fresh run") {
//!                 ctx.client().metric("loss", 1.0 / (epoch + 1) as f64).ok();
//!             }
//!             Ok(42)
//!         })
//!         .await;
//!     assert_eq!(res.unwrap(), 42);
//! }
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, debug, warn};

use crate::capture::{Echo, OutputCapture};
use crate::client::MetricClient;
use crate::config::Config;
use crate::delivery::{CachedCredential, DeliveryQueue, Transport};
use crate::error::{EXIT_CODE_INTERRUPTED, RunError};
use crate::events::{Bus, Event, EventKind};
use crate::logging;
use crate::message::{FinalStatus, RunId, codec};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::builder::RunSupervisorBuilder;
use super::context::RunContext;
use super::delivery::{DeliveryWorker, MIN_TICK, spawn_delivery_worker};
use super::harvester::Harvester;
use super::local_log::LocalLog;
use super::run::{Phase, Run, RunState, human_duration};
use super::runner::{self, Execution, Outcome};
use super::shutdown::{self, CancelSource};

enum Ended<T, E> {
    Finished(Outcome<T, E>),
    Canceled(CancelSource),
}

/// Per-run wiring created at the start of `Initializing`.
struct Wiring {
    stdout: Arc<OutputCapture>,
    stderr: Arc<OutputCapture>,
    queue: Arc<DeliveryQueue>,
    harvester: Harvester,
    wake: Arc<Notify>,
    stop: CancellationToken,
    worker: DeliveryWorker,
}

/// Supervises exactly one run.
pub struct RunSupervisor {
    cfg: Config,
    run: Arc<Run>,
    bus: Bus,
    transport: Arc<dyn Transport>,
    credential: Arc<CachedCredential>,
    echo: Arc<dyn Echo>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    token: CancellationToken,
}

impl RunSupervisor {
    /// Starts configuring a supervisor for a run of `job_name`.
    pub fn builder(job_name: impl Into<String>) -> RunSupervisorBuilder {
        RunSupervisorBuilder::new(job_name)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        run: Arc<Run>,
        bus: Bus,
        transport: Arc<dyn Transport>,
        credential: Arc<CachedCredential>,
        echo: Arc<dyn Echo>,
        subscribers: Vec<Arc<dyn Subscribe>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            run,
            bus,
            transport,
            credential,
            echo,
            subscribers,
            token,
        }
    }

    /// Shared handle onto the run's identity and lifecycle; stays readable
    /// after the supervisor was consumed.
    pub fn run_handle(&self) -> Arc<Run> {
        Arc::clone(&self.run)
    }

    pub fn run_id(&self) -> &RunId {
        self.run.run_id()
    }

    /// Event bus of this run. Subscribe before calling `run`.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Cancelling this token cancels the run (returns `Err(Canceled)`).
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Supervises a blocking closure executed on a dedicated thread.
    pub async fn run<F, T, E>(self, f: F) -> Result<T, RunError<E>>
    where
        F: FnOnce(RunContext) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.supervise(|ctx, dispatch| runner::start_blocking(ctx, dispatch, f))
            .await
    }

    /// Supervises an async closure spawned on the current tokio runtime.
    pub async fn run_async<F, Fut, T, E>(self, f: F) -> Result<T, RunError<E>>
    where
        F: FnOnce(RunContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.supervise(|ctx, dispatch| runner::start_async(ctx, dispatch, f))
            .await
    }

    /// Like [`RunSupervisor::run`], for callers without a runtime: builds a
    /// multi-threaded tokio runtime for the duration of the run.
    pub fn run_blocking<F, T, E>(self, f: F) -> Result<T, RunError<E>>
    where
        F: FnOnce(RunContext) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(RunError::Spawn)?;
        rt.block_on(self.run(f))
    }

    async fn supervise<T, E, S>(self, start: S) -> Result<T, RunError<E>>
    where
        S: FnOnce(RunContext, Option<Dispatch>) -> Execution<T, E>,
    {
        let listener_stop = CancellationToken::new();
        let listener = self.subscriber_listener(listener_stop.clone());

        // Armed for the whole run, draining included; fused so a signal that
        // already ended the event loop is not awaited twice.
        let mut interrupt = Box::pin(shutdown::interrupted(self.cfg.handle_signals).fuse());

        self.run.mark_started();
        let mut wiring = self.initialize();
        let code_token = self.token.child_token();
        let ctx = RunContext::new(
            MetricClient::new(
                Arc::clone(&wiring.queue),
                Arc::clone(&wiring.stdout),
                self.cfg.metric_interval,
            ),
            Arc::clone(&wiring.stdout),
            Arc::clone(&wiring.stderr),
            Arc::clone(&self.run),
            code_token.clone(),
        );

        let dispatch = self.run_dispatch(&wiring.stdout);

        self.run.advance(Phase::Running);
        let mut execution = start(ctx, dispatch);
        let ended = self
            .event_loop(&mut execution, &mut wiring, &mut interrupt)
            .await;

        let result = match ended {
            Ended::Finished(outcome) => {
                self.run.finish(outcome.state());
                let interrupted = self.drain(wiring, self.cfg.grace, &mut interrupt).await;
                if interrupted && self.cfg.exit_on_interrupt {
                    self.stop_listener(listener_stop, listener).await;
                    std::process::exit(EXIT_CODE_INTERRUPTED);
                }
                outcome.into_result()
            }
            Ended::Canceled(source) => {
                self.bus.publish(
                    Event::new(EventKind::ShutdownRequested)
                        .with_run(self.run.run_id().as_str())
                        .with_reason(source.as_str()),
                );
                code_token.cancel();
                execution.abort();
                self.run.finish(RunState::Canceled);
                let interrupted = self
                    .drain(wiring, self.cfg.cancel_grace, &mut interrupt)
                    .await;

                if (source == CancelSource::Signal || interrupted) && self.cfg.exit_on_interrupt {
                    self.stop_listener(listener_stop, listener).await;
                    std::process::exit(EXIT_CODE_INTERRUPTED);
                }
                Err(RunError::Canceled)
            }
        };

        self.stop_listener(listener_stop, listener).await;
        result
    }

    /// Phase `Initializing`: queue with `run_started` first, log file,
    /// captures with flush hooks, delivery worker.
    fn initialize(&self) -> Wiring {
        let run_id = self.run.run_id();
        let queue = Arc::new(DeliveryQueue::new(
            run_id.clone(),
            &self.cfg,
            self.bus.clone(),
        ));
        queue.enqueue(codec::run_started(run_id, self.run.job_name()));
        self.bus.publish(
            Event::new(EventKind::RunStarted)
                .with_run(run_id.as_str())
                .with_job(self.run.job_name()),
        );

        let wake = Arc::new(Notify::new());
        let stdout = Arc::new(OutputCapture::new());
        let stderr = Arc::new(OutputCapture::new());
        for capture in [&stdout, &stderr] {
            let wake = Arc::clone(&wake);
            capture.set_on_flush(move || wake.notify_one());
        }

        let log = LocalLog::open(self.cfg.log_dir.as_deref(), &self.run, self.bus.clone());
        let harvester = Harvester::new(
            Arc::clone(&stdout),
            Arc::clone(&stderr),
            Arc::clone(&self.echo),
            log,
            Arc::clone(&queue),
            self.cfg.remote_batch_interval,
            self.cfg.chunk_bytes_clamped(),
        );

        let stop = CancellationToken::new();
        let worker = spawn_delivery_worker(
            Arc::clone(&queue),
            Arc::clone(&self.transport),
            Arc::clone(&self.credential),
            self.cfg.delivery_interval,
            stop.clone(),
        );

        Wiring {
            stdout,
            stderr,
            queue,
            harvester,
            wake,
            stop,
            worker,
        }
    }

    /// Tracing dispatcher routing the monitored code's events into its stdout.
    fn run_dispatch(&self, stdout: &Arc<OutputCapture>) -> Option<Dispatch> {
        let filter = self.cfg.capture_tracing.as_deref()?;
        match logging::capture_dispatch(filter, Arc::clone(stdout)) {
            Ok(dispatch) => Some(dispatch),
            Err(e) => {
                warn!(run = %self.run.run_id(), error = %e, "tracing capture disabled for this run");
                None
            }
        }
    }

    /// Phase `Running`: waits for the code while harvesting output.
    async fn event_loop<T, E, I>(
        &self,
        execution: &mut Execution<T, E>,
        wiring: &mut Wiring,
        interrupt: &mut I,
    ) -> Ended<T, E>
    where
        I: Future<Output = ()> + Unpin,
    {
        let mut ticker = time::interval(self.cfg.capture_interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                outcome = execution.outcome() => return Ended::Finished(outcome),
                _ = &mut *interrupt => return Ended::Canceled(CancelSource::Signal),
                _ = self.token.cancelled() => return Ended::Canceled(CancelSource::Token),
                _ = wiring.wake.notified() => wiring.harvester.pass(false),
                _ = ticker.tick() => wiring.harvester.pass(false),
            }
        }
    }

    /// Phase `Draining` through `Terminated`; every wait is bounded by `bound`.
    ///
    /// An OS interrupt while waiting for the worker shortens the remaining
    /// wait to `cancel_grace`. Returns `true` if that happened.
    async fn drain<I>(&self, wiring: Wiring, bound: Duration, interrupt: &mut I) -> bool
    where
        I: Future<Output = ()> + Unpin,
    {
        let Wiring {
            stdout,
            queue,
            mut harvester,
            stop,
            worker,
            ..
        } = wiring;

        self.run.advance(Phase::Draining);
        let status = self.run.final_status().unwrap_or(FinalStatus::Failure);
        let run_id = self.run.run_id().as_str();

        stdout.write(&self.summary(harvester.log_path(), status));
        harvester.pass(true);
        queue.enqueue(codec::run_ended(self.run.run_id(), status));
        self.bus.publish(
            Event::new(EventKind::RunFinished)
                .with_run(run_id)
                .with_job(self.run.job_name())
                .with_status(status),
        );

        stop.cancel();
        let DeliveryWorker { mut done, handle } = worker;
        let deadline = Instant::now() + bound;
        let mut interrupted = false;

        let settled = tokio::select! {
            biased;
            res = time::timeout_at(deadline, &mut done) => res,
            _ = &mut *interrupt => {
                interrupted = true;
                warn!(run = run_id, "interrupted while draining, shortening the final drain");
                self.bus.publish(
                    Event::new(EventKind::ShutdownRequested)
                        .with_run(run_id)
                        .with_reason(CancelSource::Signal.as_str()),
                );
                let cut = deadline.min(Instant::now() + self.cfg.cancel_grace);
                time::timeout_at(cut, &mut done).await
            }
        };

        match settled {
            Ok(Ok(res)) => {
                debug!(run = run_id, ?res, "final drain settled");
                self.bus.publish(
                    Event::new(EventKind::DrainCompleted)
                        .with_run(run_id)
                        .with_reason(res.as_label())
                        .with_count(queue.len()),
                );
            }
            Ok(Err(_)) | Err(_) => {
                handle.abort();
                let undelivered = queue.len();
                warn!(run = run_id, undelivered, bound_ms = bound.as_millis() as u64, "final drain not confirmed in time");
                self.bus.publish(
                    Event::new(EventKind::DrainTimedOut)
                        .with_run(run_id)
                        .with_count(undelivered),
                );
            }
        }

        self.run.advance(Phase::Terminated);
        interrupted
    }

    /// Completion summary: where the log is, how the run ended, how long it took.
    fn summary(&self, log_path: Option<&Path>, status: FinalStatus) -> String {
        let job = self.run.job_name();
        let location = match log_path {
            Some(path) => format!(
                "Logs for this run of {job} are available locally at: {}",
                path.display()
            ),
            None => format!("Logs for this run of {job} could not be stored locally"),
        };
        format!(
            "{location}\n{job} finished with status {status} after {}\n",
            human_duration(self.run.elapsed())
        )
    }

    /// Forwards bus events to the subscriber set until `stop`, then flushes it.
    fn subscriber_listener(&self, stop: CancellationToken) -> Option<JoinHandle<()>> {
        if self.subscribers.is_empty() {
            return None;
        }
        let set = SubscriberSet::new(self.subscribers.clone());
        let mut rx = self.bus.subscribe();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        }))
    }

    async fn stop_listener(&self, stop: CancellationToken, listener: Option<JoinHandle<()>>) {
        stop.cancel();
        if let Some(handle) = listener {
            if time::timeout(self.cfg.cancel_grace, handle).await.is_err() {
                debug!(run = %self.run.run_id(), "subscribers still busy after run end");
            }
        }
    }
}
