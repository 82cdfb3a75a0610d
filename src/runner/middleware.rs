//! The four production middleware stages:
//! `log → cache-read → upload-on-success → cleanup → core-runner`.

use std::fs;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::event::CacheStatus;
use crate::hash;
use crate::util::envsub;

use super::pipeline::{Chain, Middleware, RunContext, RunOutcome};

/// Wraps the whole remaining chain with start/end logging. Outermost stage.
pub struct LogMiddleware;

#[async_trait]
impl Middleware for LogMiddleware {
    async fn handle(&self, ctx: &RunContext, chain: &Chain, next: usize, cancel: CancellationToken) -> Result<RunOutcome> {
        info!(node_id = %ctx.node_id, key = %ctx.key, "rule starting");
        let result = chain.proceed(ctx, next, cancel).await;
        match &result {
            Ok(outcome) => info!(
                node_id = %ctx.node_id,
                duration_ms = outcome.duration.as_millis() as u64,
                cache_status = ?outcome.cache_status,
                "rule finished"
            ),
            Err(e) => warn!(node_id = %ctx.node_id, error = %e, "rule failed"),
        }
        result
    }
}

/// Outermost mutator: consult `BlobStore.Head(key)` and, on a hit, download
/// every declared output and short-circuit without running anything.
pub struct CacheReadMiddleware;

#[async_trait]
impl Middleware for CacheReadMiddleware {
    async fn handle(&self, ctx: &RunContext, chain: &Chain, next: usize, cancel: CancellationToken) -> Result<RunOutcome> {
        if !(ctx.cache_allowed && ctx.cache_mode_may_read) {
            return chain.proceed(ctx, next, cancel).await;
        }

        let Some(_meta) = ctx.blobstore.head(&ctx.key).await? else {
            return chain.proceed(ctx, next, cancel).await;
        };
        let Some(blob_keys) = ctx.blobstore.get_index(&ctx.key).await? else {
            return chain.proceed(ctx, next, cancel).await;
        };
        if blob_keys.len() != ctx.outputs.len() {
            // Index doesn't match this rule's current output count (e.g. an
            // older schema's entry survived under the same key somehow) —
            // treat it as a miss rather than serving a mismatched result.
            return chain.proceed(ctx, next, cancel).await;
        }

        let mut produced = Vec::with_capacity(ctx.outputs.len());
        for (declared, blob_key) in ctx.outputs.iter().zip(&blob_keys) {
            let resolved = envsub::expand(declared, &ctx.env)?;
            let component_dest = ctx.component_dir().join(&resolved);
            if let Some(parent) = component_dest.parent() {
                fs::create_dir_all(parent)?;
            }
            ctx.blobstore.get(blob_key, &component_dest).await?;

            let artifact_dest = ctx.artifacts_dir.join(&resolved);
            if let Some(parent) = artifact_dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&component_dest, &artifact_dest)?;
            produced.push(artifact_dest);
        }

        Ok(RunOutcome { key: ctx.key.clone(), outputs: produced, duration: Duration::ZERO, cache_status: CacheStatus::Hit })
    }
}

/// Runs the remaining chain; on success, if the cache permits writes,
/// uploads every produced output blob and records the rule-key → blob-set
/// index. Upload failures degrade to "no cache for this
/// rule" rather than failing the build, matching the ZIM-060-range cache
/// errors' documented severity.
pub struct UploadOnSuccessMiddleware;

#[async_trait]
impl Middleware for UploadOnSuccessMiddleware {
    async fn handle(&self, ctx: &RunContext, chain: &Chain, next: usize, cancel: CancellationToken) -> Result<RunOutcome> {
        let outcome = chain.proceed(ctx, next, cancel).await?;
        if outcome.cache_status == CacheStatus::Hit || !(ctx.cache_allowed && ctx.cache_mode_may_write) {
            return Ok(outcome);
        }

        let mut blob_keys = Vec::with_capacity(outcome.outputs.len());
        for path in &outcome.outputs {
            let digest = match hash::hash_file(path) {
                Ok(d) => d,
                Err(e) => {
                    warn!(node_id = %ctx.node_id, error = %e, "failed to hash output for cache upload");
                    return Ok(outcome);
                }
            };
            if let Err(e) = ctx.blobstore.put(&digest, path).await {
                warn!(node_id = %ctx.node_id, error = %e, "cache upload failed, continuing without cache for this rule");
                return Ok(outcome);
            }
            blob_keys.push(digest);
        }
        if let Err(e) = ctx.blobstore.put_index(&ctx.key, &blob_keys).await {
            warn!(node_id = %ctx.node_id, error = %e, "cache index write failed, continuing without cache for this rule");
        }

        Ok(outcome)
    }
}

/// Removes any stale declared outputs left over from a previous run before
/// invoking the core runner, so output verification never passes against
/// leftover files the current command list didn't actually produce.
pub struct CleanupMiddleware;

#[async_trait]
impl Middleware for CleanupMiddleware {
    async fn handle(&self, ctx: &RunContext, chain: &Chain, next: usize, cancel: CancellationToken) -> Result<RunOutcome> {
        for declared in &ctx.outputs {
            let resolved = envsub::expand(declared, &ctx.env)?;
            let path = ctx.component_dir().join(&resolved);
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        chain.proceed(ctx, next, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::FsBlobStore;
    use crate::executor::NativeExecutor;
    use crate::model::{Component, Rule};
    use rustc_hash::FxHashMap;
    use std::sync::Arc;

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

    fn ctx(dir: &std::path::Path, key: &str, command: &str, outputs: &[&str]) -> RunContext {
        RunContext {
            node_id: Arc::from("svc.build"),
            component: component(dir),
            rule: rule(command, outputs),
            key: key.into(),
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
    async fn cache_miss_runs_full_chain_and_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Chain::default_chain();
        let context = ctx(dir.path(), "key-1", "echo hi > out.txt", &["out.txt"]);

        let outcome = chain.run(&context, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.cache_status, CacheStatus::Miss);
        assert!(context.blobstore.get_index("key-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_run_with_same_key_is_a_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Chain::default_chain();
        let first = ctx(dir.path(), "key-2", "echo hi > out.txt", &["out.txt"]);
        chain.run(&first, CancellationToken::new()).await.unwrap();

        // New context sharing the same blobstore + key, command replaced
        // with one that would fail if it actually ran.
        let mut second = ctx(dir.path(), "key-2", "exit 1", &["out.txt"]);
        second.blobstore = first.blobstore.clone();
        let outcome = chain.run(&second, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.cache_status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn disabled_cache_mode_never_reads_or_writes() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Chain::default_chain();
        let mut context = ctx(dir.path(), "key-3", "echo hi > out.txt", &["out.txt"]);
        context.cache_mode_may_read = false;
        context.cache_mode_may_write = false;

        chain.run(&context, CancellationToken::new()).await.unwrap();
        assert!(context.blobstore.get_index("key-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_stale_output_before_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path(), "key-4", "true", &["out.txt"]);
        std::fs::write(context.component_dir().join("out.txt"), "stale").unwrap();

        let chain = Chain::new(vec![Arc::new(CleanupMiddleware)]);
        let err = chain.run(&context, CancellationToken::new()).await.unwrap_err();
        // The stale file was removed before core_runner ran, so the
        // no-op command leaves the declared output missing.
        assert!(matches!(err, crate::error::ZimError::OutputMissing { .. }));
    }
}
