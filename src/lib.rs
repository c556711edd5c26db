//! # jobvisor
//!
//! **Jobvisor** is the client side of a job-monitoring service: it wraps one
//! execution of user code (a closure, an async block, a subprocess), captures
//! its console output, lets it emit metrics and hyperparameters, and relays
//! everything to a remote collector on a best-effort channel while keeping a
//! local log file.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌─────────────────────────────────────────────┐
//!                 │ monitored code (own thread / tokio task)    │
//!                 │   ctx.stdout() / ctx.stderr()  ctx.client() │
//!                 └───────┬────────────────────────────┬────────┘
//!                         ▼                            ▼
//!                ┌─────────────────┐          ┌─────────────────┐
//!                │ OutputCapture×2 │          │  MetricClient   │
//!                │ (append-only)   │          │ rate limit,     │
//!                └────────┬────────┘          │ param registry  │
//!                         │ event loop tick   └────────┬────────┘
//!                         ▼                            │
//!    Echo + LocalLog ◄── Harvester ── batched logs ──┐ │
//!                                                    ▼ ▼
//!                                          ┌─────────────────────┐
//!                                          │   DeliveryQueue     │
//!                                          │ FIFO, head retries  │
//!                                          └──────────┬──────────┘
//!                                                     │ delivery worker tick
//!                                                     ▼
//!                                               dyn Transport ──► collector
//!
//!   RunSupervisor ── publish(Event) ──► Bus ──► SubscriberSet ──► Subscribe impls
//! ```
//!
//! ### Lifecycle
//! ```text
//! Initializing ─► Running ─► Draining ─► Terminated
//!   run_started     capture    summary, forced pass,   Ok(T) | Err(RunError<E>)
//!   log file        + deliver  run_ended, bounded
//!   worker                     rendezvous with worker
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Own one run, multiplex execution/capture/delivery, drain on end | [`RunSupervisor`], [`RunContext`], [`Run`]  |
//! | **Capture**       | Thread-safe output buffers, `io::Write` handles, local echo     | [`OutputCapture`], [`CaptureWriter`], [`Echo`] |
//! | **Metrics**       | Rate-limited metrics, unique params, counted iteration          | [`MetricClient`], [`Iter`]                  |
//! | **Delivery**      | FIFO queue, retry/poison/unauthorized handling, heartbeats      | [`DeliveryQueue`], [`Transport`]            |
//! | **Messages**      | Envelope data model and pure constructors                       | [`Envelope`], [`message::codec`]            |
//! | **Events**        | Observe the run from outside                                    | [`Bus`], [`Event`], [`Subscribe`]           |
//! | **Errors**        | Typed errors with stable labels                                 | [`RunError`], [`ValidationError`]           |
//! | **Configuration** | Cadences, bounds, paths                                         | [`Config`]                                  |
//!
//! ## Example
//! ```no_run
//! use std::io::Write;
//! use jobvisor::{Config, RunSupervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let _ = jobvisor::logging::init_logging("warn");
//!
//!     let sup = RunSupervisor::builder("mnist")
//!         .with_config(Config::from_env())
//!         .build();
//!
//!     let res = sup
//!         .run(|ctx| {
//!             let lr = ctx.client().param("lr", 0.01).map_err(|e| e.to_string())?;
//!             for epoch in ctx.client().iter(5).map_err(|e| e.to_string())? {
//!                 writeln!(ctx.stdout(), "epoch {epoch}").map_err(|e| e.to_string())?;
//!                 ctx.client().metric("loss", lr / (epoch + 1) as f64).ok();
//!             }
//!             Ok::<_, String>(())
//!         })
//!         .await;
//!
//!     if let Err(e) = res {
//!         std::process::exit(e.exit_code());
//!     }
//! }
//! ```

mod capture;
mod client;
mod config;
mod core;
mod delivery;
mod error;
mod events;
mod subscribers;

pub mod command;
pub mod logging;
pub mod message;

// ---- Public re-exports ----

pub use capture::{
    CaptureMakeWriter, CaptureWriter, Echo, NoEcho, OutputCapture, StdEcho, Utf8Decoder,
};
pub use client::{Iter, MetricClient};
pub use config::{Config, ENV_LOG_DIR, ENV_SERVER, default_log_dir};
pub use core::{Phase, Run, RunContext, RunState, RunSupervisor, RunSupervisorBuilder};
pub use delivery::{
    CachedCredential, CredentialSource, DeliveryQueue, DiscardTransport, DrainResult,
    ENV_API_KEY, EnvCredential, SendOutcome, Transport,
};
pub use error::{CommandError, EXIT_CODE_INTERRUPTED, LogError, RunError, ValidationError};
pub use events::{Bus, Event, EventKind};
pub use message::{Envelope, FinalStatus, Level, Payload, RunId};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
