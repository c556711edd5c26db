//! Runtime core: one run's lifecycle.
//!
//! The only public entry point is [`RunSupervisor`] (with its builder), which
//! drives a run through `Initializing → Running → Draining → Terminated`.
//!
//! Internal modules:
//! - [`supervisor`]: the state machine and event loop;
//! - [`runner`]: executes the monitored code, reports a tagged outcome;
//! - [`harvester`]: capture passes (local echo/log file, batched remote);
//! - [`delivery`]: periodic queue drains and the final flush;
//! - [`local_log`]: best-effort per-run log file;
//! - [`shutdown`]: cross-platform interrupt detection;
//! - [`run`]: run identity and lock-guarded lifecycle;
//! - [`context`]: the handle given to monitored code.

mod builder;
mod context;
mod delivery;
mod harvester;
mod local_log;
mod run;
mod runner;
mod shutdown;
mod supervisor;

pub use builder::RunSupervisorBuilder;
pub use context::RunContext;
pub use run::{Phase, Run, RunState};
pub use supervisor::RunSupervisor;
