//! # One supervised execution.
//!
//! [`Run`] holds the identity (run id, job name) and the lock-guarded
//! lifecycle data of a run. Every reader goes through the accessors; nothing
//! outside this module touches the raw fields.
//!
//! ## State vs. phase
//! ```text
//! state:  Running ──(exactly once)──► Succeeded | Failed | Canceled
//! phase:  Initializing ─► Running ─► Draining ─► Terminated   (forward only)
//! ```
//! `state` is what happened to the monitored code; `phase` is where the
//! supervisor is in its own shutdown sequence.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::message::{FinalStatus, RunId};

/// Outcome state of the monitored code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunState {
    /// True for every state except `Running`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }

    /// Wire status for a terminal state.
    pub fn final_status(&self) -> Option<FinalStatus> {
        match self {
            RunState::Running => None,
            RunState::Succeeded => Some(FinalStatus::Success),
            RunState::Failed => Some(FinalStatus::Failure),
            RunState::Canceled => Some(FinalStatus::UserCanceled),
        }
    }
}

/// Supervisor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Initializing,
    Running,
    Draining,
    Terminated,
}

struct Lifecycle {
    state: RunState,
    phase: Phase,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
}

/// Identity and lifecycle of one run.
pub struct Run {
    run_id: RunId,
    job_name: Arc<str>,
    lifecycle: Mutex<Lifecycle>,
}

impl Run {
    /// Creates a run with a fresh id, starting now.
    pub fn new(job_name: &str) -> Self {
        Self {
            run_id: RunId::generate(),
            job_name: job_name.into(),
            lifecycle: Mutex::new(Lifecycle {
                state: RunState::Running,
                phase: Phase::Initializing,
                start_time: Local::now(),
                end_time: None,
            }),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn state(&self) -> RunState {
        self.lock().state
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.lock().start_time
    }

    /// Unset until the run reached a terminal state.
    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.lock().end_time
    }

    /// Final status, once terminal.
    pub fn final_status(&self) -> Option<FinalStatus> {
        self.state().final_status()
    }

    /// Time from start to end (or to now, while running).
    pub fn elapsed(&self) -> Duration {
        let lc = self.lock();
        let end = lc.end_time.unwrap_or_else(Local::now);
        (end - lc.start_time).to_std().unwrap_or(Duration::ZERO)
    }

    /// Moves to a terminal `state`. Only the first call has an effect.
    ///
    /// Returns `false` if the run was already terminal or `state` is `Running`.
    pub(crate) fn finish(&self, state: RunState) -> bool {
        let mut lc = self.lock();
        if lc.state.is_terminal() || !state.is_terminal() {
            return false;
        }
        lc.state = state;
        lc.end_time = Some(Local::now());
        true
    }

    /// Restarts the clock when supervision actually begins.
    ///
    /// A run may be built long before it is supervised. No effect once the
    /// run left `Initializing`.
    pub(crate) fn mark_started(&self) {
        let mut lc = self.lock();
        if lc.phase == Phase::Initializing && lc.end_time.is_none() {
            lc.start_time = Local::now();
        }
    }

    /// Advances the phase; moving backwards is ignored.
    pub(crate) fn advance(&self, phase: Phase) {
        let mut lc = self.lock();
        if phase > lc.phase {
            lc.phase = phase;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lc = self.lock();
        f.debug_struct("Run")
            .field("run_id", &self.run_id)
            .field("job_name", &self.job_name)
            .field("state", &lc.state)
            .field("phase", &lc.phase)
            .finish()
    }
}

/// Renders a duration as `H:MM:SS`.
pub(crate) fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
