//! Rule-Key Builder — composes the canonical key document and hashes it to
//! a 40-hex-character `RuleKey`.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{Result, ZimError};
use crate::graph::Graph;
use crate::hash;
use crate::model::{CommandRecord, Component, Project, Resource, Rule};
use crate::resolver::{self, HashMemo};
use crate::util::constants::CACHE_KEY_VERSION;

/// One entry in the `deps` field of a key document.
#[derive(Debug, Clone, Serialize)]
pub struct DepKey {
    pub node_id: String,
    pub key: String,
}

/// One entry in the `inputs` field.
#[derive(Debug, Clone, Serialize)]
pub struct InputEntry {
    pub path: String,
    pub hash: String,
}

/// One entry in the `toolchain` field: a probe name and its trimmed stdout.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainEntry {
    pub name: String,
    pub output: String,
}

/// The canonical key document.
/// `serde_json` preserves struct field declaration order for map
/// serialization, and [`hash::hash_value`] additionally canonicalizes by
/// sorting keys — so this fixed order is for human-readable `--detail`
/// output; determinism itself comes from the canonicalizing hasher.
#[derive(Debug, Clone, Serialize)]
pub struct KeyDocument {
    pub project: String,
    pub component: String,
    pub rule: String,
    pub image: String,
    pub output_count: usize,
    pub inputs: Vec<InputEntry>,
    pub deps: Vec<DepKey>,
    pub env: FxHashMap<String, String>,
    pub toolchain: Vec<ToolchainEntry>,
    pub cache_key_version: u32,
    pub commands: Vec<CommandRecord>,
    pub native: bool,
}

/// Merge component and rule environments, rule entries overriding the
/// component's.
pub fn merged_env(component: &Component, rule: &Rule) -> FxHashMap<String, String> {
    let mut env = component.environment.clone();
    env.extend(rule.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Run every toolchain probe in a component once, trimming stdout
///. Probes run on the host even when the component
/// targets a container, which changes keys across hosts sharing the same
/// image. The
/// `ZIM_TOOLCHAIN_IN_CONTAINER` environment variable is the exposed knob:
/// when set (to any value) and the component declares an image, probes run
/// inside that image via `docker run` instead.
pub fn run_toolchain(component: &Component) -> Result<Vec<ToolchainEntry>> {
    let in_container =
        std::env::var_os("ZIM_TOOLCHAIN_IN_CONTAINER").is_some() && !component.image().is_empty();

    component
        .toolchain
        .items
        .iter()
        .map(|probe| {
            let output = if in_container {
                probe_in_container(component, &probe.command)
            } else {
                std::process::Command::new("sh").arg("-c").arg(&probe.command).output()
            }
            .map_err(|e| ZimError::ToolchainFailure {
                component: component.name.to_string(),
                name: probe.name.clone(),
                exit: -1,
                stderr: e.to_string(),
            })?;
            if !output.status.success() {
                return Err(ZimError::ToolchainFailure {
                    component: component.name.to_string(),
                    name: probe.name.clone(),
                    exit: output.status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
            Ok(ToolchainEntry {
                name: probe.name.clone(),
                output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            })
        })
        .collect()
}

/// Run one toolchain probe inside the component's declared image, mounting
/// its directory at `/workspace` the same way [`crate::executor::ContainerExecutor`]
/// mounts a rule's workspace.
fn probe_in_container(component: &Component, command: &str) -> std::io::Result<std::process::Output> {
    let image = component.image();
    std::process::Command::new("docker")
        .args(["run", "--rm", "-v"])
        .arg(format!("{}:/workspace", component.directory.display()))
        .args(["-w", "/workspace", image, "sh", "-c", command])
        .output()
}

/// Build the canonical key document for one rule instance.
///
/// `deps` must already carry the computed keys of every dependency — the
/// scheduler is responsible for the topological ordering that guarantees
/// this. A missing dependency key is a scheduler bug,
/// not a user error, hence `ProgrammerError` rather than any user-facing
/// variant.
#[allow(clippy::too_many_arguments)]
pub fn build_key_document(
    project_name: &str,
    component: &Component,
    rule: &Rule,
    inputs: &[Resource],
    dep_node_ids: &[Arc<str>],
    dep_keys: &FxHashMap<Arc<str>, String>,
    toolchain: &[ToolchainEntry],
) -> Result<KeyDocument> {
    let node_id = rule.node_id(&component.name);

    let mut deps = Vec::with_capacity(dep_node_ids.len());
    for dep_id in dep_node_ids {
        let key = dep_keys.get(dep_id).ok_or_else(|| ZimError::ProgrammerError {
            node_id: node_id.to_string(),
            dep_id: dep_id.to_string(),
        })?;
        deps.push(DepKey { node_id: dep_id.to_string(), key: key.clone() });
    }
    deps.sort_by(|a, b| a.node_id.cmp(&b.node_id));

    let inputs = inputs
        .iter()
        .map(|r| InputEntry {
            path: r.relative_path.to_string_lossy().into_owned(),
            hash: r.hash.clone(),
        })
        .collect();

    Ok(KeyDocument {
        project: project_name.to_string(),
        component: component.name.to_string(),
        rule: rule.name.to_string(),
        image: component.image().to_string(),
        output_count: rule.output_count(),
        inputs,
        deps,
        env: merged_env(component, rule),
        toolchain: toolchain.to_vec(),
        cache_key_version: CACHE_KEY_VERSION,
        commands: rule.command.clone().into_records(),
        native: rule.native,
    })
}

/// `Key(rule) -> string`.
pub fn key_of(document: &KeyDocument) -> Result<String> {
    hash::hash_value(document)
}

/// Compute every node's key document and digest in one pass, without
/// running anything — the `key`/`key --detail` CLI's path
/// rather than the scheduler's. Dependency keys are required before a
/// dependent's key can be built, so this walks the graph in
/// post-order: every node's `depends_on` is visited and keyed first.
pub fn compute_project_keys(
    project: &Project,
    graph: &Graph,
) -> Result<FxHashMap<Arc<str>, (KeyDocument, String)>> {
    let memo = HashMemo::new();
    let mut toolchains: FxHashMap<Arc<str>, Vec<ToolchainEntry>> = FxHashMap::default();
    let mut computed: FxHashMap<Arc<str>, (KeyDocument, String)> = FxHashMap::default();
    let mut visiting: Vec<Arc<str>> = Vec::new();

    for root in &graph.roots {
        key_one(project, graph, root, &memo, &mut toolchains, &mut computed, &mut visiting)?;
    }
    Ok(computed)
}

#[allow(clippy::too_many_arguments)]
fn key_one(
    project: &Project,
    graph: &Graph,
    node_id: &Arc<str>,
    memo: &HashMemo,
    toolchains: &mut FxHashMap<Arc<str>, Vec<ToolchainEntry>>,
    computed: &mut FxHashMap<Arc<str>, (KeyDocument, String)>,
    visiting: &mut Vec<Arc<str>>,
) -> Result<()> {
    if computed.contains_key(node_id) {
        return Ok(());
    }
    let node = graph.node(node_id).ok_or_else(|| ZimError::UnknownRule { node_id: node_id.to_string() })?;

    visiting.push(node_id.clone());
    for dep in &node.depends_on {
        key_one(project, graph, dep, memo, toolchains, computed, visiting)?;
    }
    visiting.pop();

    let (component, rule) = project
        .rule_by_node_id(node_id)
        .ok_or_else(|| ZimError::UnknownRule { node_id: node_id.to_string() })?;

    if !toolchains.contains_key(&component.name) {
        let entries = run_toolchain(component)?;
        toolchains.insert(component.name.clone(), entries);
    }
    let toolchain = toolchains.get(&component.name).cloned().unwrap_or_default();

    let export_sources: Vec<(&std::path::Path, &crate::model::Export)> = rule
        .requires
        .iter()
        .filter(|r| r.is_export())
        .filter_map(|r| {
            let comp_name = r.resolved_component(&component.name);
            let comp = project.component(comp_name)?;
            let export = comp.export(r.export.as_deref()?)?;
            Some((comp.directory.as_path(), export))
        })
        .collect();
    let inputs =
        resolver::resolve_effective_inputs(node_id, &component.directory, &rule.inputs, &export_sources, memo)?;

    let mut dep_keys: FxHashMap<Arc<str>, String> = FxHashMap::default();
    for dep in &node.depends_on {
        if let Some((_, k)) = computed.get(dep) {
            dep_keys.insert(dep.clone(), k.clone());
        }
    }

    let document =
        build_key_document(&project.name, component, rule, &inputs, &node.depends_on, &dep_keys, &toolchain)?;
    let digest = key_of(&document)?;
    computed.insert(node_id.clone(), (document, digest));
    Ok(())
}
