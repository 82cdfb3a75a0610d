//! `ContainerExecutor` — a thin `docker run` wrapper. Per this
//! crate owns only the trait boundary; registry auth, image pulls and
//! volume-driver plumbing stay external collaborators.

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ExecOutput, ExecSpec, Executor};
use crate::error::{Result, ZimError};

const CONTAINER_WORKDIR: &str = "/workspace";

/// Runs commands inside `docker run --rm -v <workdir>:/workspace -w /workspace <image> sh -c <command>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerExecutor;

#[async_trait]
impl Executor for ContainerExecutor {
    async fn run(&self, command: &str, spec: &ExecSpec, cancel: CancellationToken) -> Result<ExecOutput> {
        if spec.image.is_empty() {
            return Err(ZimError::ExecutorLaunchFailed {
                node_id: String::new(),
                reason: "container executor invoked with no image".to_string(),
            });
        }
        debug!(image = %spec.image, command, "executing containerized command");

        let mount = format!("{}:{CONTAINER_WORKDIR}", spec.working_dir.display());
        let mut cmd = Command::new("docker");
        cmd.arg("run").arg("--rm").arg("-v").arg(&mount).arg("-w").arg(CONTAINER_WORKDIR);
        for (key, value) in &spec.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&spec.image).arg("sh").arg("-c").arg(command).kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| ZimError::ExecutorLaunchFailed { node_id: String::new(), reason: e.to_string() })?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output.map_err(ZimError::IoError)?;
                Ok(ExecOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            _ = cancel.cancelled() => Err(ZimError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[tokio::test]
    async fn missing_image_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ExecSpec { working_dir: dir.path().to_path_buf(), env: FxHashMap::default(), image: String::new() };
        let err = ContainerExecutor.run("echo hi", &spec, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ZimError::ExecutorLaunchFailed { .. }));
    }
}
