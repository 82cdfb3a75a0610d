//! Runner Pipeline — produces one rule's `RunOutcome`, threading a
//! `RunContext` through a composable middleware chain down to the core
//! runner.
//!
//! The chain is expressed as an explicit `Chain` + index rather than nested
//! boxed closures: each [`Middleware`] decides whether to continue by
//! calling `chain.proceed(ctx, cancel).await`, which is how the cache-read
//! stage short-circuits on a hit without ever reaching `core_runner`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::blobstore::BlobStore;
use crate::error::{Result, ZimError};
use crate::event::CacheStatus;
use crate::executor::{ExecSpec, Executor};
use crate::model::{CommandRecord, Component, Resource, Rule};
use crate::runner::builtins;
use crate::util::envsub;

/// Everything one rule's execution needs, threaded through the middleware
/// chain.
pub struct RunContext {
    pub node_id: Arc<str>,
    pub component: Component,
    pub rule: Rule,
    pub key: String,
    pub inputs: Vec<Resource>,
    /// Declared output paths, already `${VAR}`-substituted, relative to the
    /// component directory.
    pub outputs: Vec<String>,
    pub env: FxHashMap<String, String>,
    pub executor: Arc<dyn Executor>,
    pub blobstore: Arc<dyn BlobStore>,
    pub cache_allowed: bool,
    pub cache_mode_may_read: bool,
    pub cache_mode_may_write: bool,
    pub artifacts_dir: PathBuf,
}

impl RunContext {
    pub fn component_dir(&self) -> &std::path::Path {
        &self.component.directory
    }
}

/// What the runner pipeline produces for one node.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub key: String,
    pub outputs: Vec<PathBuf>,
    pub duration: Duration,
    pub cache_status: CacheStatus,
}

/// One stage in the pipeline. Composed outermost-first: `log` wraps
/// everything, `cache-read` is the outermost mutator.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &RunContext, chain: &Chain, next: usize, cancel: CancellationToken)
        -> Result<RunOutcome>;
}

/// The ordered stage list plus the terminal `core_runner` step.
pub struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Default production chain: `log → cache-read → upload-on-success →
    /// cleanup → core-runner`.
    pub fn default_chain() -> Self {
        Self::new(vec![
            Arc::new(super::middleware::LogMiddleware),
            Arc::new(super::middleware::CacheReadMiddleware),
            Arc::new(super::middleware::UploadOnSuccessMiddleware),
            Arc::new(super::middleware::CleanupMiddleware),
        ])
    }

    pub async fn run(&self, ctx: &RunContext, cancel: CancellationToken) -> Result<RunOutcome> {
        self.proceed(ctx, 0, cancel).await
    }

    /// Continue to the next stage, or the core runner once every stage has
    /// run — this is the `next` a middleware calls to hand off control.
    pub async fn proceed(&self, ctx: &RunContext, index: usize, cancel: CancellationToken) -> Result<RunOutcome> {
        match self.stages.get(index) {
            Some(stage) => stage.handle(ctx, self, index + 1, cancel).await,
            None => core_runner(ctx, cancel).await,
        }
    }
}

/// Core runner: ensure output directories exist,
/// dispatch every command, verify declared outputs were produced, copy them
/// into the artifacts directory.
pub async fn core_runner(ctx: &RunContext, cancel: CancellationToken) -> Result<RunOutcome> {
    let start = Instant::now();
    let base = ctx.component_dir();

    for output in &ctx.outputs {
        let resolved = envsub::expand(output, &ctx.env)?;
        if let Some(parent) = base.join(&resolved).parent() {
            fs::create_dir_all(parent)?;
        }
    }

    for (index, record) in ctx.rule.command.clone().into_records().into_iter().enumerate() {
        run_one_command(ctx, &record, index, cancel.clone()).await?;
    }

    let mut produced = Vec::with_capacity(ctx.outputs.len());
    for output in &ctx.outputs {
        let resolved = envsub::expand(output, &ctx.env)?;
        let absolute = base.join(&resolved);
        if !absolute.exists() {
            return Err(ZimError::OutputMissing { node_id: ctx.node_id.to_string(), declared_path: resolved });
        }
        produced.push(absolute);
    }

    let mut artifacts = Vec::with_capacity(produced.len());
    for (declared, absolute) in ctx.outputs.iter().zip(&produced) {
        let resolved = envsub::expand(declared, &ctx.env)?;
        let dest = ctx.artifacts_dir.join(&resolved);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_preserving_mode(absolute, &dest)?;
        artifacts.push(dest);
    }

    Ok(RunOutcome { key: ctx.key.clone(), outputs: artifacts, duration: start.elapsed(), cache_status: CacheStatus::Miss })
}

#[cfg(unix)]
fn copy_preserving_mode(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::copy(src, dst)?;
    let mode = fs::metadata(src)?.permissions().mode();
    fs::set_permissions(dst, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_preserving_mode(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}

async fn run_one_command(
    ctx: &RunContext,
    record: &CommandRecord,
    index: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let base = ctx.component_dir();
    match record {
        CommandRecord::Run { run } => {
            let expanded = envsub::expand(run, &ctx.env)?;
            // `native: true` bypasses the component's container even when
            // one is declared — an empty `image` is what routes
            // `ContainerOrNativeExecutor` (and any other image-dispatching
            // `Executor`) onto the host.
            let image = if ctx.rule.native { String::new() } else { ctx.component.image().to_string() };
            let spec = ExecSpec { working_dir: base.to_path_buf(), env: ctx.env.clone(), image };
            let output = ctx.executor.run(&expanded, &spec, cancel).await?;
            if !output.success() {
                return Err(ZimError::CommandFailed {
                    node_id: ctx.node_id.to_string(),
                    command_index: index,
                    exit: output.exit_code,
                    stderr: output.stderr,
                });
            }
            Ok(())
        }
        CommandRecord::Mkdir { mkdir } => builtins::mkdir(base, &envsub::expand(mkdir, &ctx.env)?),
        CommandRecord::Cleandir { cleandir } => builtins::cleandir(base, &envsub::expand(cleandir, &ctx.env)?),
        CommandRecord::Remove { remove } => builtins::remove(base, remove),
        CommandRecord::Move { r#move } => builtins::move_path(base, r#move),
        CommandRecord::Copy { copy } => builtins::copy_path(base, copy),
        CommandRecord::Zip { zip } => builtins::zip(base, zip),
        CommandRecord::Unzip { unzip } => builtins::unzip(base, unzip),
        CommandRecord::Archive { archive } => builtins::archive(base, archive),
        CommandRecord::Unarchive { unarchive } => builtins::unarchive(base, unarchive),
    }
    .map(|()| debug!(node_id = %ctx.node_id, command_index = index, "command completed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::FsBlobStore;
    use crate::executor::NativeExecutor;
    use crate::model::Component;

    fn component(dir: &std::path::Path) -> Component {
        let mut c: Component = serde_yaml::from_str("name: svc\n").unwrap();
        c.directory = dir.to_path_buf();
        c
    }

    fn rule(command: &str, outputs: &[&str]) -> Rule {
        let mut r: Rule = serde_yaml::from_str(&format!(
            "command: {command}\noutputs: [{}]\n",
            outputs.iter().map(|o| format!("\"{o}\"")).collect::<Vec<_>>().join(", ")
        ))
        .unwrap();
        r.name = Arc::from("build");
        r
    }

    #[derive(Default, Debug, Clone)]
    struct RecordingExecutor {
        seen_images: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn run(
            &self,
            _command: &str,
            spec: &crate::executor::ExecSpec,
            _cancel: CancellationToken,
        ) -> Result<crate::executor::ExecOutput> {
            self.seen_images.lock().push(spec.image.clone());
            Ok(crate::executor::ExecOutput { exit_code: 0, stdout: String::new(), stderr: String::new() })
        }
    }

    fn ctx(dir: &std::path::Path, command: &str, outputs: &[&str]) -> RunContext {
        RunContext {
            node_id: Arc::from("svc.build"),
            component: component(dir),
            rule: rule(command, outputs),
            key: "testkey".into(),
            inputs: vec![],
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            env: FxHashMap::default(),
            executor: Arc::new(NativeExecutor),
            blobstore: Arc::new(FsBlobStore::new(dir.join("cache"))),
            cache_allowed: true,
            cache_mode_may_read: true,
            cache_mode_may_write: true,
            artifacts_dir: dir.join("artifacts"),
        }
    }

    #[tokio::test]
    async fn core_runner_produces_declared_output() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path(), "touch out.txt", &["out.txt"]);
        let outcome = core_runner(&context, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.outputs.len(), 1);
        assert!(outcome.outputs[0].exists());
    }

    #[tokio::test]
    async fn core_runner_errors_on_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path(), "true", &["never-created.txt"]);
        let err = core_runner(&context, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ZimError::OutputMissing { .. }));
    }

    #[tokio::test]
    async fn core_runner_propagates_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path(), "exit 7", &[]);
        let err = core_runner(&context, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ZimError::CommandFailed { exit: 7, .. }));
    }

    #[tokio::test]
    async fn native_rule_bypasses_component_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = ctx(dir.path(), "true", &[]);
        context.component.docker = Some(crate::model::DockerSpec { image: "golang:1.22".into() });
        context.rule.native = true;
        let recorder = RecordingExecutor::default();
        context.executor = Arc::new(recorder.clone());

        run_one_command(&context, &CommandRecord::Run { run: "true".into() }, 0, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(recorder.seen_images.lock().as_slice(), [""]);
    }

    #[tokio::test]
    async fn non_native_rule_in_containerized_component_uses_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = ctx(dir.path(), "true", &[]);
        context.component.docker = Some(crate::model::DockerSpec { image: "golang:1.22".into() });
        context.rule.native = false;
        let recorder = RecordingExecutor::default();
        context.executor = Arc::new(recorder.clone());

        run_one_command(&context, &CommandRecord::Run { run: "true".into() }, 0, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(recorder.seen_images.lock().as_slice(), ["golang:1.22"]);
    }
}
