//! `NativeExecutor` — runs commands directly on the host via `sh -c`,
//! using `tokio::process::Command` with a cancellation-aware wait.
//!
//! Cancellation sends SIGINT first, gives the child `CANCEL_GRACE_PERIOD` to
//! exit on its own, then escalates to SIGKILL — the grace period exists so a
//! command with its own cleanup (e.g. a test runner flushing a report) gets
//! a chance to do so before being killed outright.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ExecOutput, ExecSpec, Executor};
use crate::error::{Result, ZimError};
use crate::util::constants::CANCEL_GRACE_PERIOD;

/// Executes commands as a host subprocess (`sh -c <command>`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeExecutor;

#[async_trait]
impl Executor for NativeExecutor {
    async fn run(&self, command: &str, spec: &ExecSpec, cancel: CancellationToken) -> Result<ExecOutput> {
        debug!(command, dir = %spec.working_dir.display(), "executing native command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ZimError::ExecutorLaunchFailed { node_id: String::new(), reason: e.to_string() })?;

        let mut stdout_pipe = child.stdout.take().expect("stdout piped at spawn");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped at spawn");

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ZimError::IoError)?;
                let mut stdout = Vec::new();
                let mut stderr = Vec::new();
                let _ = stdout_pipe.read_to_end(&mut stdout).await;
                let _ = stderr_pipe.read_to_end(&mut stderr).await;
                Ok(ExecOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            }
            _ = cancel.cancelled() => {
                warn!(command, "cancellation requested, sending SIGINT");
                send_sigint(&child);
                force_kill(&mut child).await;
                Err(ZimError::Cancelled)
            }
        }
    }
}

#[cfg(unix)]
fn send_sigint(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is this child's own process id, obtained from the
        // `Child` handle we still hold; sending SIGINT to it is the same
        // operation `kill -INT <pid>` performs.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
    }
}

#[cfg(not(unix))]
fn send_sigint(_child: &Child) {
    // No POSIX signal delivery on this platform; fall through to the
    // unconditional kill in `force_kill` after the grace period.
}

/// Wait out the grace period for the SIGINT to take effect, then escalate to
/// SIGKILL if the child is still alive. Exposed separately from `run` so a
/// caller that already holds a spawned `Child` (rather than going through
/// `Executor::run`) can apply the same escalation.
pub async fn force_kill(child: &mut Child) {
    if tokio::time::timeout(CANCEL_GRACE_PERIOD, child.wait()).await.is_ok() {
        return;
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
