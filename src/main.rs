//! Zim CLI — caching build orchestrator for monorepos.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use zim::blobstore::FsBlobStore;
use zim::config::{BuildContext, CacheMode, ZimConfig};
use zim::error::{Result, ZimError};
use zim::executor::{ContainerExecutor, Executor, NativeExecutor};
use zim::graph::{self, Graph};
use zim::key;
use zim::model::{Component, Export, Project};
use zim::resolver;
use zim::runner::RunnerExecutor;
use zim::scheduler;

/// The per-component descriptor file a discovered directory must contain.
const COMPONENT_FILE: &str = "zim.yaml";

#[derive(Parser)]
#[command(name = "zim")]
#[command(about = "Caching build orchestrator for monorepos")]
#[command(version)]
struct Cli {
    /// Repository root to discover components under (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one or more rules and their transitive dependencies.
    Run {
        /// Rule names to build (e.g. `build`, `test`).
        rules: Vec<String>,

        /// Restrict to these components (comma-separated).
        #[arg(short = 'c', long, value_delimiter = ',')]
        components: Option<Vec<String>>,

        /// Cache consultation mode.
        #[arg(long, value_enum, default_value = "read-write")]
        cache: CliCacheMode,

        /// Continue past failed nodes, only skipping their descendants.
        #[arg(long)]
        force: bool,

        /// Worker pool size (defaults to logical CPU count, or config/env).
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Run built-ins/commands natively even when a component declares a container.
        #[arg(long)]
        native: bool,
    },

    /// Print the RuleKey (and optionally the full key document) for one rule.
    Key {
        /// Rule to key, as `<component>.<rule>`.
        #[arg(short = 'r', long)]
        rule: String,

        /// Print the full canonical key document as JSON instead of just the digest.
        #[arg(long)]
        detail: bool,
    },

    /// Introspect the loaded project.
    List {
        #[command(subcommand)]
        what: ListWhat,
    },
}

#[derive(Subcommand)]
enum ListWhat {
    /// List every rule's NodeID (`<component>.<rule>`).
    Rules,
    /// List every component name.
    Components,
    /// List the effective, resolved input set for one rule.
    Inputs {
        #[arg(short = 'r', long)]
        rule: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliCacheMode {
    ReadWrite,
    WriteOnly,
    Disabled,
}

impl From<CliCacheMode> for CacheMode {
    fn from(value: CliCacheMode) -> Self {
        match value {
            CliCacheMode::ReadWrite => CacheMode::ReadWrite,
            CliCacheMode::WriteOnly => CacheMode::WriteOnly,
            CliCacheMode::Disabled => CacheMode::Disabled,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().expect("current directory must be readable"));

    let result = dispatch(cli, &root).await;

    if let Err(e) = result {
        eprintln!("{} [{}] {}", "error:".red().bold(), e.code(), e);
        if let Some(severity) = cache_error_note(&e) {
            eprintln!("  {} {}", "note:".yellow(), severity);
        }
        std::process::exit(e.exit_code());
    }
}

fn cache_error_note(e: &ZimError) -> Option<&'static str> {
    e.is_cache_error().then_some("cache errors never fail the build; it continues without cache for this rule")
}

async fn dispatch(cli: Cli, root: &Path) -> Result<()> {
    match cli.command {
        Commands::Run { rules, components, cache, force, jobs, native } => {
            run_command(root, rules, components, cache.into(), force, jobs, native).await
        }
        Commands::Key { rule, detail } => key_command(root, &rule, detail),
        Commands::List { what } => list_command(root, what),
    }
}

/// Discover every `zim.yaml` under `root` and hydrate a [`Project`].
///
/// Component discovery and YAML schema validation are the CLI binary's
/// concern, not the core library's — this glue lives in `main.rs`, never
/// `lib.rs`.
fn discover_project(root: &Path) -> Result<Project> {
    let mut components = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| ZimError::UserError { reason: e.to_string() })?;
        if entry.file_name() != COMPONENT_FILE {
            continue;
        }
        let path = entry.path();
        let content = std::fs::read_to_string(path)?;
        let mut component: Component = serde_yaml::from_str(&content)?;
        component.directory = path.parent().unwrap_or(root).to_path_buf();
        component.finalize();
        components.push(component);
    }

    if components.is_empty() {
        return Err(ZimError::UserError {
            reason: format!("no `{COMPONENT_FILE}` files found under {}", root.display()),
        });
    }

    let project_name = root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "zim".to_string());
    Project::new(project_name, components)
}

fn requests_for(rules: Vec<String>, components: Option<Vec<String>>) -> Vec<(String, Option<Vec<String>>)> {
    rules.into_iter().map(|r| (r, components.clone())).collect()
}

async fn run_command(
    root: &Path,
    rules: Vec<String>,
    components: Option<Vec<String>>,
    cache_mode: CacheMode,
    force: bool,
    jobs: Option<usize>,
    native: bool,
) -> Result<()> {
    if rules.is_empty() {
        return Err(ZimError::UserError { reason: "`run` requires at least one rule name".to_string() });
    }

    let project = Arc::new(discover_project(root)?);
    let requests = requests_for(rules, components);
    let graph = Arc::new(graph::build_graph(&project, &requests)?);

    let config = ZimConfig::load().unwrap_or_default();
    let worker_count = jobs.unwrap_or_else(|| config.jobs());
    let ctx = BuildContext::new(root.to_path_buf(), worker_count, cache_mode).with_force(force);

    let cache_dir = dirs::cache_dir().unwrap_or_else(|| root.join(".zim-cache")).join("zim");
    let blobstore = Arc::new(FsBlobStore::new(cache_dir));
    // `--native` forces every command onto the host even for containerized
    // components; otherwise dispatch per-command on whether the component
    // declares an image (built-ins still always run on the host regardless
    // — that branch lives inside `RunnerExecutor`/the core runner itself).
    let executor: Arc<dyn Executor> =
        if native { Arc::new(NativeExecutor) } else { Arc::new(ContainerOrNativeExecutor) };

    let runner = Arc::new(RunnerExecutor::new(project.clone(), graph.clone(), ctx.clone(), executor, blobstore));

    println!(
        "{} building {} node(s) with {} worker(s), cache={:?}",
        "→".cyan(),
        graph.len(),
        ctx.worker_count,
        ctx.cache_mode
    );

    let result = scheduler::run(&graph, &ctx, runner).await?;

    println!(
        "{} {} succeeded, {} failed, {} skipped",
        "✓".green(),
        result.succeeded.len(),
        result.failed.len(),
        result.skipped.len()
    );

    // `--force` only changes skip propagation inside the scheduler (it keeps
    // running past a failed node's siblings instead of stopping early) — it
    // never turns a failed rule into a successful build, so the CLI still
    // has to fail here even though `scheduler::run` returned `Ok`.
    if !result.failed.is_empty() {
        let nodes = result.failed.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ");
        return Err(ZimError::BuildFailed { failed: result.failed.len(), nodes });
    }

    Ok(())
}

/// Dispatches each command to a container when the owning component
/// declares an image, and to the host otherwise — the default `Executor`
/// the `run` subcommand wires in.
struct ContainerOrNativeExecutor;

#[async_trait::async_trait]
impl Executor for ContainerOrNativeExecutor {
    async fn run(
        &self,
        command: &str,
        spec: &zim::executor::ExecSpec,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<zim::executor::ExecOutput> {
        if spec.image.is_empty() {
            NativeExecutor.run(command, spec, cancel).await
        } else {
            ContainerExecutor.run(command, spec, cancel).await
        }
    }
}

fn key_command(root: &Path, rule_ref: &str, detail: bool) -> Result<()> {
    let project = discover_project(root)?;
    let (component_name, rule_name) = rule_ref.split_once('.').ok_or_else(|| ZimError::UserError {
        reason: format!("expected `<component>.<rule>`, got '{rule_ref}'"),
    })?;

    let requests = vec![(rule_name.to_string(), Some(vec![component_name.to_string()]))];
    let graph = graph::build_graph(&project, &requests)?;
    let keys = key::compute_project_keys(&project, &graph)?;

    let node_id: Arc<str> = Arc::from(rule_ref);
    let (document, digest) = keys
        .get(&node_id)
        .ok_or_else(|| ZimError::UnknownRule { node_id: rule_ref.to_string() })?;

    if detail {
        println!("{}", serde_json::to_string_pretty(document)?);
    } else {
        println!("{digest}");
    }
    Ok(())
}

fn list_command(root: &Path, what: ListWhat) -> Result<()> {
    let project = discover_project(root)?;
    match what {
        ListWhat::Rules => {
            for node_id in project.all_node_ids() {
                println!("{node_id}");
            }
        }
        ListWhat::Components => {
            let mut names: Vec<&str> = project.components.keys().map(String::as_str).collect();
            names.sort();
            for name in names {
                println!("{name}");
            }
        }
        ListWhat::Inputs { rule: node_id } => {
            let (component, rule) = project
                .rule_by_node_id(&node_id)
                .ok_or_else(|| ZimError::UnknownRule { node_id: node_id.clone() })?;
            let export_sources: Vec<(&Path, &Export)> = rule
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
            let memo = resolver::HashMemo::new();
            let inputs =
                resolver::resolve_effective_inputs(&node_id, &component.directory, &rule.inputs, &export_sources, &memo)?;
            for resource in inputs {
                println!("{}", resource.relative_path.display());
            }
        }
    }
    Ok(())
}
