//! # Subprocess monitoring.
//!
//! [`pipe_command`] runs a child process inside a supervised run: its stdout
//! and stderr are piped into the run's captures as they arrive, so the child
//! gets the same local echo, log file and remote relay as in-process code.
//!
//! ```text
//!   child stdout ──read──► Utf8Decoder ──► ctx.stdout() ──flush──► capture pass
//!   child stderr ──read──► Utf8Decoder ──► ctx.stderr() ──flush──► capture pass
//! ```
//!
//! ## Rules
//! - Bytes are decoded incrementally: a UTF-8 sequence split across two
//!   reads is reassembled; invalid bytes become U+FFFD.
//! - Every read is followed by a flush, so interactive output (progress
//!   bars) is not held until the next tick.
//! - When the run's cancellation token fires the child is killed.
//!
//! # Example
//! ```no_run
//! use jobvisor::{RunSupervisor, command::pipe_command};
//! use tokio::process::Command;
//!
//! # async fn demo() {
//! let sup = RunSupervisor::builder("train.py").build();
//! let status = sup
//!     .run_async(|ctx| async move {
//!         let mut cmd = Command::new("python");
//!         cmd.arg("train.py");
//!         pipe_command(&ctx, cmd).await
//!     })
//!     .await;
//! # }
//! ```

use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::capture::CaptureWriter;
use crate::core::RunContext;
use crate::error::CommandError;

const READ_BUF: usize = 8 * 1024;

/// Spawns `command` with piped output, forwards it into the run's captures
/// and returns the child's exit status once both streams closed.
///
/// A non-zero exit is not an error here; inspect the returned status.
pub async fn pipe_command(ctx: &RunContext, mut command: Command) -> Result<ExitStatus, CommandError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(run = %ctx.run_id(), program = %program, pid = ?child.id(), "child spawned");

    let out = pump(child.stdout.take(), ctx.stdout());
    let err = pump(child.stderr.take(), ctx.stderr());
    let pumps = async {
        let (out, err) = tokio::join!(out, err);
        out.and(err)
    };

    tokio::select! {
        res = pumps => res?,
        _ = ctx.cancel_token().cancelled() => {
            debug!(run = %ctx.run_id(), program = %program, "run canceled, killing child");
            child.start_kill()?;
        }
    }
    Ok(child.wait().await?)
}

async fn pump<R>(reader: Option<R>, mut writer: CaptureWriter) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n])?;
        writer.flush()?;
    }
}
