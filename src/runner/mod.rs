//! Runner Pipeline — wires the resource resolver, rule-key builder, and
//! middleware chain together into the scheduler's `NodeExecutor` callback.

pub mod builtins;
pub mod middleware;
pub mod pipeline;

pub use middleware::{CacheReadMiddleware, CleanupMiddleware, LogMiddleware, UploadOnSuccessMiddleware};
pub use pipeline::{Chain, Middleware, RunContext, RunOutcome};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::blobstore::BlobStore;
use crate::config::BuildContext;
use crate::error::{Result, ZimError};
use crate::event::EventKind;
use crate::executor::Executor;
use crate::graph::Graph;
use crate::key::{self, ToolchainEntry};
use crate::model::{Component, Export, Project, Resource, Rule};
use crate::resolver::{self, HashMemo};
use crate::scheduler::{NodeExecution, NodeExecutor};

/// Binds a loaded [`Project`] and its [`Graph`] to one build's shared
/// state — the input-hash memo, per-component toolchain cache, and the map
/// of already-computed rule keys the scheduler's topological order
/// guarantees are populated before a dependent needs them.
pub struct RunnerExecutor {
    project: Arc<Project>,
    graph: Arc<Graph>,
    ctx: BuildContext,
    executor: Arc<dyn Executor>,
    blobstore: Arc<dyn BlobStore>,
    hash_memo: HashMemo,
    toolchain_cache: DashMap<Arc<str>, Vec<ToolchainEntry>>,
    computed_keys: DashMap<Arc<str>, String>,
}

impl RunnerExecutor {
    pub fn new(
        project: Arc<Project>,
        graph: Arc<Graph>,
        ctx: BuildContext,
        executor: Arc<dyn Executor>,
        blobstore: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            project,
            graph,
            ctx,
            executor,
            blobstore,
            hash_memo: HashMemo::new(),
            toolchain_cache: DashMap::new(),
            computed_keys: DashMap::new(),
        }
    }

    fn toolchain_for(&self, component: &Component) -> Result<Vec<ToolchainEntry>> {
        if let Some(cached) = self.toolchain_cache.get(&component.name) {
            return Ok(cached.value().clone());
        }
        let entries = key::run_toolchain(component)?;
        self.toolchain_cache.insert(component.name.clone(), entries.clone());
        Ok(entries)
    }

    /// Export-style `requires` contribute files to the input set but create
    /// no scheduler edge — resolved here, at use time.
    fn export_sources<'a>(&'a self, component: &'a Component, rule: &'a Rule) -> Vec<(&'a Path, &'a Export)> {
        rule.requires
            .iter()
            .filter(|r| r.is_export())
            .filter_map(|r| {
                let comp_name = r.resolved_component(&component.name);
                let comp = self.project.component(comp_name)?;
                let export = comp.export(r.export.as_deref()?)?;
                Some((comp.directory.as_path(), export))
            })
            .collect()
    }

    /// Merged component+rule environment plus the automatic variables
    /// lists, injected into every rule command.
    ///
    /// Path-bearing values are shell-escaped with `shell_words` before
    /// joining, so a rule command substituting `${INPUTS}` straight into a
    /// shell string doesn't break (or let a crafted filename inject a
    /// second command) on a path containing whitespace or shell metacharacters.
    fn build_env(
        &self,
        component: &Component,
        rule: &Rule,
        node_id: &str,
        inputs: &[Resource],
        dep_ids: &[Arc<str>],
    ) -> FxHashMap<String, String> {
        let mut env = key::merged_env(component, rule);

        let input_paths: Vec<String> =
            inputs.iter().map(|r| r.relative_path.to_string_lossy().into_owned()).collect();
        let dep_names: Vec<String> = dep_ids.iter().map(|d| d.to_string()).collect();

        env.insert("COMPONENT".into(), component.name.to_string());
        env.insert("NAME".into(), component.name.to_string());
        env.insert("KIND".into(), component.kind.clone().unwrap_or_default());
        env.insert("RULE".into(), rule.name.to_string());
        env.insert("NODE_ID".into(), node_id.to_string());
        env.insert("INPUT".into(), shell_quote(input_paths.first().map(String::as_str).unwrap_or_default()));
        env.insert("INPUTS".into(), shell_join(&input_paths));
        env.insert("OUTPUT".into(), shell_quote(rule.outputs.first().map(String::as_str).unwrap_or_default()));
        env.insert("OUTPUTS".into(), shell_join(&rule.outputs));
        env.insert("DEP".into(), dep_names.first().cloned().unwrap_or_default());
        env.insert("DEPS".into(), dep_names.join(" "));
        env.insert("ARTIFACTS_DIR".into(), shell_quote(&self.ctx.artifacts_dir.to_string_lossy()));
        env.insert(
            "ARTIFACT".into(),
            shell_quote(&self.ctx.artifacts_dir_for(&component.name, &rule.name).to_string_lossy()),
        );
        env
    }
}

/// Shell-quote one path-bearing value if it needs it, leaving a plain word
/// (the common case) untouched.
fn shell_quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

/// Quote each path independently, then join with a single space, so a
/// multi-value automatic variable like `${INPUTS}` still splits into the
/// right number of shell words even when an individual path has spaces.
fn shell_join(values: &[String]) -> String {
    values.iter().map(|v| shell_quote(v)).collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl NodeExecutor for RunnerExecutor {
    async fn execute(&self, node_id: Arc<str>, cancel: CancellationToken) -> Result<NodeExecution> {
        let (component, rule) = self
            .project
            .rule_by_node_id(&node_id)
            .ok_or_else(|| ZimError::UnknownRule { node_id: node_id.to_string() })?;
        let node = self
            .graph
            .node(&node_id)
            .ok_or_else(|| ZimError::UnknownRule { node_id: node_id.to_string() })?;

        let export_sources = self.export_sources(component, rule);
        let inputs = resolver::resolve_effective_inputs(
            &node_id,
            &component.directory,
            &rule.inputs,
            &export_sources,
            &self.hash_memo,
        )?;
        let toolchain = self.toolchain_for(component)?;

        let mut dep_keys: FxHashMap<Arc<str>, String> = FxHashMap::default();
        for dep_id in &node.depends_on {
            if let Some(computed) = self.computed_keys.get(dep_id) {
                dep_keys.insert(dep_id.clone(), computed.value().clone());
            }
        }

        let document =
            key::build_key_document(&self.project.name, component, rule, &inputs, &node.depends_on, &dep_keys, &toolchain)?;
        let rule_key = key::key_of(&document)?;
        self.ctx.event_log.emit(EventKind::NodeKeyed { node_id: node_id.clone(), key: rule_key.clone() });

        let env = self.build_env(component, rule, &node_id, &inputs, &node.depends_on);

        let run_ctx = RunContext {
            node_id: node_id.clone(),
            component: component.clone(),
            rule: rule.clone(),
            key: rule_key.clone(),
            inputs,
            outputs: rule.outputs.clone(),
            env,
            executor: self.executor.clone(),
            blobstore: self.blobstore.clone(),
            cache_allowed: rule.cache,
            cache_mode_may_read: self.ctx.cache_mode.may_read(),
            cache_mode_may_write: self.ctx.cache_mode.may_write(),
            artifacts_dir: self.ctx.artifacts_dir_for(&component.name, &rule.name),
        };

        let outcome = Chain::default_chain().run(&run_ctx, cancel).await?;
        self.computed_keys.insert(node_id, rule_key);
        Ok(NodeExecution { cache_status: outcome.cache_status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::FsBlobStore;
    use crate::config::CacheMode;
    use crate::executor::NativeExecutor;
    use crate::graph::build_graph;

    fn project_with_chain(dir: &std::path::Path) -> Project {
        let mut lib: Component = serde_yaml::from_str("name: libA\n").unwrap();
        lib.directory = dir.join("libA");
        std::fs::create_dir_all(&lib.directory).unwrap();
        lib.rules.insert(
            "build".into(),
            serde_yaml::from_str("outputs: [\"lib.out\"]\ncommand: echo lib > lib.out\n").unwrap(),
        );
        lib.finalize();

        let mut svc: Component = serde_yaml::from_str("name: svc\n").unwrap();
        svc.directory = dir.join("svc");
        std::fs::create_dir_all(&svc.directory).unwrap();
        svc.rules.insert(
            "build".into(),
            serde_yaml::from_str(
                "outputs: [\"svc.out\"]\nrequires: [{component: libA, rule: build}]\ncommand: echo svc > svc.out\n",
            )
            .unwrap(),
        );
        svc.finalize();

        Project::new("proj", vec![lib, svc]).unwrap()
    }

    #[tokio::test]
    async fn executes_dependency_before_dependent_and_caches_keys() {
        let dir = tempfile::tempdir().unwrap();
        let project = Arc::new(project_with_chain(dir.path()));
        let graph = Arc::new(build_graph(&project, &[("build".into(), Some(vec!["svc".into()]))]).unwrap());
        let ctx = BuildContext::new(dir.path(), 2, CacheMode::ReadWrite);
        let runner = RunnerExecutor::new(
            project,
            graph,
            ctx,
            Arc::new(NativeExecutor),
            Arc::new(FsBlobStore::new(dir.path().join("cache"))),
        );

        let lib_outcome = runner.execute(Arc::from("libA.build"), CancellationToken::new()).await.unwrap();
        assert_eq!(lib_outcome.cache_status, crate::event::CacheStatus::Miss);

        let svc_outcome = runner.execute(Arc::from("svc.build"), CancellationToken::new()).await.unwrap();
        assert_eq!(svc_outcome.cache_status, crate::event::CacheStatus::Miss);
    }

    #[tokio::test]
    async fn missing_dependency_key_is_programmer_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = Arc::new(project_with_chain(dir.path()));
        let graph = Arc::new(build_graph(&project, &[("build".into(), Some(vec!["svc".into()]))]).unwrap());
        let ctx = BuildContext::new(dir.path(), 2, CacheMode::ReadWrite);
        let runner = RunnerExecutor::new(
            project,
            graph,
            ctx,
            Arc::new(NativeExecutor),
            Arc::new(FsBlobStore::new(dir.path().join("cache"))),
        );

        // svc depends on libA, but libA.build was never executed first —
        // its key was never recorded, so this must fail rather than
        // silently key against an empty dependency.
        let err = runner.execute(Arc::from("svc.build"), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ZimError::ProgrammerError { .. }));
    }
}
