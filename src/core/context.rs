use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureMakeWriter, CaptureWriter, OutputCapture};
use crate::client::MetricClient;
use crate::core::run::Run;
use crate::message::RunId;

/// Handle passed to the monitored code.
///
/// Writes to [`RunContext::stdout`] / [`RunContext::stderr`] are captured:
/// echoed locally, appended to the run's log file and relayed remotely.
///
/// # Example
/// ```no_run
/// use std::io::Write;
/// # fn body(ctx: jobvisor::RunContext) -> std::io::Result<()> {
/// writeln!(ctx.stdout(), "epoch 1 done")?;
/// ctx.client().metric("loss", 0.42).ok();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RunContext {
    client: MetricClient,
    stdout: Arc<OutputCapture>,
    stderr: Arc<OutputCapture>,
    run: Arc<Run>,
    token: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(
        client: MetricClient,
        stdout: Arc<OutputCapture>,
        stderr: Arc<OutputCapture>,
        run: Arc<Run>,
        token: CancellationToken,
    ) -> Self {
        Self {
            client,
            stdout,
            stderr,
            run,
            token,
        }
    }

    /// Metric/param API bound to this run.
    pub fn client(&self) -> &MetricClient {
        &self.client
    }

    /// New writer onto the captured stdout stream.
    pub fn stdout(&self) -> CaptureWriter {
        CaptureWriter::new(Arc::clone(&self.stdout))
    }

    /// New writer onto the captured stderr stream.
    pub fn stderr(&self) -> CaptureWriter {
        CaptureWriter::new(Arc::clone(&self.stderr))
    }

    /// `tracing-subscriber` writer onto the captured stdout stream.
    ///
    /// The supervisor already scopes such a subscriber to the monitored code
    /// when `Config::capture_tracing` is set; this is for code that builds
    /// its own (e.g. on threads it spawns).
    pub fn log_writer(&self) -> CaptureMakeWriter {
        CaptureMakeWriter::new(Arc::clone(&self.stdout))
    }

    pub fn run_id(&self) -> &RunId {
        self.run.run_id()
    }

    pub fn job_name(&self) -> &str {
        self.run.job_name()
    }

    /// Cancelled when the run is being shut down; long-running code should
    /// poll it and return early.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
