//! Error types used by the jobvisor runtime and the metric client.
//!
//! This module defines two main error enums:
//!
//! - [`RunError`]: how a supervised run ended when it did not succeed.
//! - [`ValidationError`]: caller mistakes rejected synchronously by the
//!   [`MetricClient`](crate::MetricClient).
//!
//! plus [`CommandError`] for subprocess piping and [`LogError`] for
//! diagnostics setup.
//!
//! Every type provides `as_label` for logs/metrics; [`RunError`] additionally
//! maps to a process exit code.

use thiserror::Error;

/// Exit code used after a user interrupt (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// # Non-successful end of a supervised run.
///
/// Returned by [`RunSupervisor::run`](crate::RunSupervisor::run) only after the
/// run reached its terminal phase: output was captured and the delivery queue
/// was given its final drain.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError<E> {
    /// The monitored code returned an error; it is handed back untouched.
    #[error("monitored code failed: {0}")]
    Failed(E),

    /// The monitored code panicked.
    #[error("monitored code panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The run was canceled (interrupt signal or cancellation token).
    #[error("run canceled by user")]
    Canceled,

    /// The monitored code could not be started (thread or runtime creation failed).
    #[error("failed to start monitored code: {0}")]
    Spawn(#[source] std::io::Error),
}

impl<E> RunError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use jobvisor::RunError;
    ///
    /// let err: RunError<std::io::Error> = RunError::Canceled;
    /// assert_eq!(err.as_label(), "run_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Failed(_) => "run_failed",
            RunError::Panicked { .. } => "run_panicked",
            RunError::Canceled => "run_canceled",
            RunError::Spawn(_) => "run_spawn_failed",
        }
    }

    /// Process exit code conventionally associated with this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Failed(_) => 1,
            RunError::Panicked { .. } => 101,
            RunError::Canceled => EXIT_CODE_INTERRUPTED,
            RunError::Spawn(_) => 1,
        }
    }

    /// Returns the monitored code's own error, if that is what ended the run.
    pub fn into_failure(self) -> Option<E> {
        match self {
            RunError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// True if the run ended through cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RunError::Canceled)
    }
}

/// # Caller mistakes rejected at the call site.
///
/// Validation errors are never queued and never swallowed: the offending
/// call returns the error and nothing is sent.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Metric and param names must be non-empty.
    #[error("name must not be empty")]
    EmptyName,

    /// Metric value is not a finite real number.
    #[error("metric {name:?}: value must be a real number, got {got}")]
    NotReal {
        /// Metric name.
        name: String,
        /// Rendering of the rejected value.
        got: String,
    },

    /// A param with this name was already recorded for the run.
    #[error("param {name:?} was already recorded for this run")]
    DuplicateParam {
        /// Param name.
        name: String,
    },

    /// Param value could not be represented as JSON.
    #[error("param {name:?} is not serializable: {reason}")]
    NotSerializable {
        /// Param name.
        name: String,
        /// Serializer message.
        reason: String,
    },
}

impl ValidationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::EmptyName => "validation_empty_name",
            ValidationError::NotReal { .. } => "validation_not_real",
            ValidationError::DuplicateParam { .. } => "validation_duplicate_param",
            ValidationError::NotSerializable { .. } => "validation_not_serializable",
        }
    }
}

/// # Failures of [`pipe_command`](crate::command::pipe_command).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// The child process could not be started.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// Program being started.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the child's output or waiting for it failed.
    #[error("i/o error while supervising child: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Spawn { .. } => "command_spawn",
            CommandError::Io(_) => "command_io",
        }
    }
}

/// # Failure to install the diagnostics subscriber.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LogError {
    /// The level/filter directive did not parse.
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter {
        /// Directive as given.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("global tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

impl LogError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LogError::InvalidFilter { .. } => "log_invalid_filter",
            LogError::AlreadyInstalled(_) => "log_already_installed",
        }
    }
}
