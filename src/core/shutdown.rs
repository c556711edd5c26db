//! # Interrupt detection for the event loop.
//!
//! Only the event loop listens for OS signals; the delivery worker and the
//! monitored code never see them directly. They learn about cancellation
//! through tokens.
//!
//! ## Signals
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT` (and Ctrl-C)
//!
//! **Other platforms:** Ctrl-C via [`tokio::signal::ctrl_c`]

use tracing::warn;

/// What triggered a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelSource {
    /// OS termination signal.
    Signal,
    /// The supervisor's cancellation token.
    Token,
}

impl CancelSource {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            CancelSource::Signal => "signal",
            CancelSource::Token => "token",
        }
    }
}

/// Completes on the first termination signal.
///
/// Registration errors are returned; each call installs fresh listeners.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = interrupt.recv() => {},
        _ = terminate.recv() => {},
        _ = quit.recv() => {},
    }
    Ok(())
}

/// Completes on the first termination signal.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Completes on an OS interrupt when `enabled`; otherwise never.
///
/// If the listeners cannot be installed the run continues without signal
/// handling (warned once) instead of failing.
pub(crate) async fn interrupted(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }
    if let Err(e) = wait_for_shutdown_signal().await {
        warn!(error = %e, "cannot listen for termination signals, continuing without");
        std::future::pending::<()>().await;
    }
}
