//! Executor — run one shell command either natively or inside a container
//! with a mounted workspace.
//!
//! Docker's actual container-runtime internals (registry auth, image pulls,
//! volume-driver plumbing) are explicitly out of scope;
//! [`container::ContainerExecutor`] only goes as far as a thin `docker run`
//! invocation, enough to exercise the trait boundary.

mod container;
mod native;

pub use container::ContainerExecutor;
pub use native::NativeExecutor;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Everything an `Executor` needs besides the command string itself.
pub struct ExecSpec {
    pub working_dir: PathBuf,
    pub env: FxHashMap<String, String>,
    /// Container image to run in; empty string means "run natively" even
    /// when dispatched through a `ContainerExecutor` (callers check this
    /// before picking an executor, but the field travels along so
    /// logging/middleware can report it).
    pub image: String,
}

/// Captured result of one command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one already-substituted, shell-escaped command string to
/// completion, honoring cancellation.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, command: &str, spec: &ExecSpec, cancel: CancellationToken) -> Result<ExecOutput>;
}
