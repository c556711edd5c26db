//! # Execute the monitored code and report one tagged outcome.
//!
//! The monitored code runs off the event loop:
//! - blocking closures on a dedicated, never-joined OS thread;
//! - async closures as a tokio task.
//!
//! Either way the result travels back through a oneshot channel as an
//! [`Outcome`], so nothing is re-raised across a thread boundary.
//!
//! ```text
//! Success:   f(ctx) → Ok(v)    → Outcome::Success(v)
//! Failure:   f(ctx) → Err(e)   → Outcome::Failure(e)
//! Panic:     f(ctx) → unwind   → Outcome::Panicked(msg)
//! Spawn:     no thread         → Outcome::Unstarted(io error)
//! ```
//!
//! ## Rules
//! - Exactly one outcome is sent per execution.
//! - A dropped sender (the code vanished without reporting) reads as a panic.
//! - The blocking thread is detached: process exit never waits for it.
//! - A run dispatcher, when given, is the default `tracing` subscriber of the
//!   monitored code only (its thread, or its future).

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use futures::future::Either;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

use crate::core::context::RunContext;
use crate::core::local_log::safe_job_name;
use crate::core::run::RunState;
use crate::error::RunError;
use crate::subscribers::panic_message;

/// Tagged result of the monitored code.
pub(crate) enum Outcome<T, E> {
    Success(T),
    Failure(E),
    Panicked(String),
    Unstarted(std::io::Error),
}

impl<T, E> Outcome<T, E> {
    pub(crate) fn state(&self) -> RunState {
        match self {
            Outcome::Success(_) => RunState::Succeeded,
            _ => RunState::Failed,
        }
    }

    pub(crate) fn into_result(self) -> Result<T, RunError<E>> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(e) => Err(RunError::Failed(e)),
            Outcome::Panicked(message) => Err(RunError::Panicked { message }),
            Outcome::Unstarted(e) => Err(RunError::Spawn(e)),
        }
    }

    fn from_caught(res: std::thread::Result<Result<T, E>>) -> Self {
        match res {
            Ok(Ok(v)) => Outcome::Success(v),
            Ok(Err(e)) => Outcome::Failure(e),
            Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
        }
    }
}

/// Pending execution of the monitored code.
pub(crate) struct Execution<T, E> {
    rx: oneshot::Receiver<Outcome<T, E>>,
    abort: Option<AbortHandle>,
}

impl<T, E> Execution<T, E> {
    fn ready(outcome: Outcome<T, E>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx, abort: None }
    }

    /// Completes with the outcome; cancel-safe (poll it from `select!`).
    pub(crate) async fn outcome(&mut self) -> Outcome<T, E> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Panicked("monitored code exited without reporting".to_string()),
        }
    }

    /// Stops async code. Blocking code cannot be stopped and is left running
    /// detached; it only observes the run's cancellation token.
    pub(crate) fn abort(&self) {
        if let Some(handle) = &self.abort {
            handle.abort();
        }
    }
}

/// Runs a blocking closure on its own thread.
pub(crate) fn start_blocking<F, T, E>(
    ctx: RunContext,
    dispatch: Option<Dispatch>,
    f: F,
) -> Execution<T, E>
where
    F: FnOnce(RunContext) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name(format!("jobvisor-{}", safe_job_name(ctx.job_name())))
        .spawn(move || {
            let res = panic::catch_unwind(AssertUnwindSafe(|| match dispatch {
                Some(dispatch) => tracing::dispatcher::with_default(&dispatch, || f(ctx)),
                None => f(ctx),
            }));
            let _ = tx.send(Outcome::from_caught(res));
        });

    match spawned {
        Ok(_detached) => Execution { rx, abort: None },
        Err(e) => Execution::ready(Outcome::Unstarted(e)),
    }
}

/// Runs an async closure as a tokio task.
pub(crate) fn start_async<F, Fut, T, E>(
    ctx: RunContext,
    dispatch: Option<Dispatch>,
    f: F,
) -> Execution<T, E>
where
    F: FnOnce(RunContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let res = AssertUnwindSafe(async move {
            match dispatch {
                Some(dispatch) => Either::Left(f(ctx).with_subscriber(dispatch)),
                None => Either::Right(f(ctx)),
            }
            .await
        })
        .catch_unwind()
        .await;
        let _ = tx.send(Outcome::from_caught(res));
    });
    Execution {
        rx,
        abort: Some(handle.abort_handle()),
    }
}
