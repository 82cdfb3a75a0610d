// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Zim error types with stable error codes.
//!
//! Error code ranges:
//! - ZIM-000-009: project model / user errors
//! - ZIM-010-019: resource resolution errors
//! - ZIM-020-029: rule-key errors
//! - ZIM-030-039: graph errors
//! - ZIM-040-049: scheduler errors
//! - ZIM-050-059: runner / command errors
//! - ZIM-060-069: cache / blobstore errors
//! - ZIM-070-079: executor errors
//! - ZIM-080-089: envsub errors
//! - ZIM-090-099: infrastructure (IO/encoding) errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ZimError>;

/// Trait for errors that provide fix suggestions to surface in CLI output.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
#[diagnostic(url(docsrs))]
pub enum ZimError {
    // ═══════════════════════════════════════════
    // PROJECT MODEL / USER ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[ZIM-001] Unknown rule '{node_id}'")]
    #[diagnostic(code(zim::unknown_rule), help("Run `zim list rules` to see available rules"))]
    UnknownRule { node_id: String },

    #[error("[ZIM-002] Unknown component '{component}'")]
    #[diagnostic(code(zim::unknown_component))]
    UnknownComponent { component: String },

    #[error("[ZIM-003] Malformed requires entry on '{node_id}': {reason}")]
    #[diagnostic(code(zim::malformed_requires))]
    MalformedRequires { node_id: String, reason: String },

    #[error("[ZIM-004] {reason}")]
    #[diagnostic(code(zim::user_error))]
    UserError { reason: String },

    // ═══════════════════════════════════════════
    // RESOURCE RESOLUTION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[ZIM-010] Malformed glob pattern '{pattern}': {reason}")]
    #[diagnostic(code(zim::pattern_error), help("Patterns support **, *, ?, [...] and {{a,b}} brace groups; a leading '!' negates"))]
    PatternError { pattern: String, reason: String },

    #[error("[ZIM-011] Input '{path}' for rule '{node_id}' does not exist")]
    #[diagnostic(code(zim::missing_input))]
    MissingInput { node_id: String, path: String },

    // ═══════════════════════════════════════════
    // RULE-KEY ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[ZIM-020] Toolchain probe '{name}' in component '{component}' exited {exit}: {stderr}")]
    #[diagnostic(code(zim::toolchain_failure))]
    ToolchainFailure {
        component: String,
        name: String,
        exit: i32,
        stderr: String,
    },

    #[error("[ZIM-021] Cannot key '{node_id}': dependency '{dep_id}' has no computed key yet")]
    #[diagnostic(code(zim::programmer_error), help("This indicates a scheduler ordering bug, not a user error"))]
    ProgrammerError { node_id: String, dep_id: String },

    #[error("[ZIM-022] Failed to canonicalize key document for '{node_id}': {reason}")]
    #[diagnostic(code(zim::encoding_error))]
    EncodingError { node_id: String, reason: String },

    // ═══════════════════════════════════════════
    // GRAPH ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[ZIM-030] Cyclic dependency: {path}")]
    #[diagnostic(code(zim::cyclic_dependency), help("Remove one of the `requires` edges in the cycle"))]
    CyclicDependency { path: String },

    #[error("[ZIM-031] Rule '{node_id}' requires unknown node '{dep_id}'")]
    #[diagnostic(code(zim::missing_dependency))]
    MissingDependency { node_id: String, dep_id: String },

    #[error("[ZIM-032] Duplicate NodeID '{node_id}' across project")]
    #[diagnostic(code(zim::duplicate_node_id))]
    DuplicateNodeId { node_id: String },

    // ═══════════════════════════════════════════
    // SCHEDULER ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[ZIM-040] Build failed: {failed} node(s) did not succeed: {nodes}")]
    #[diagnostic(code(zim::build_failed))]
    BuildFailed { failed: usize, nodes: String },

    #[error("[ZIM-041] Build cancelled")]
    #[diagnostic(code(zim::cancelled))]
    Cancelled,

    #[error("[ZIM-042] Scheduler deadlock: no node ready but build incomplete")]
    #[diagnostic(code(zim::deadlock), help("This indicates a scheduler bug — every node should be Ready, Skipped, or terminal"))]
    Deadlock,

    // ═══════════════════════════════════════════
    // RUNNER / COMMAND ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[ZIM-050] Command {command_index} of rule '{node_id}' failed (exit {exit}): {stderr}")]
    #[diagnostic(code(zim::command_failed))]
    CommandFailed {
        node_id: String,
        command_index: usize,
        exit: i32,
        stderr: String,
    },

    #[error("[ZIM-051] Rule '{node_id}' declared output '{declared_path}' but it was not produced")]
    #[diagnostic(code(zim::output_missing), help("Check the rule's commands actually write to the declared output path"))]
    OutputMissing { node_id: String, declared_path: String },

    #[error("[ZIM-052] Unsupported built-in command '{tag}' in rule '{node_id}'")]
    #[diagnostic(code(zim::unknown_builtin))]
    UnknownBuiltin { node_id: String, tag: String },

    // ═══════════════════════════════════════════
    // CACHE / BLOBSTORE ERRORS (060-069) — never fatal, degrade to no-cache
    // ═══════════════════════════════════════════
    #[error("[ZIM-060] Cache {operation} failed: {underlying}")]
    #[diagnostic(code(zim::cache_error), severity(warning), help("Build continues without cache for this rule"))]
    CacheError { operation: String, underlying: String },

    #[error("[ZIM-061] Blob '{key}' not found")]
    #[diagnostic(code(zim::not_found))]
    NotFound { key: String },

    // ═══════════════════════════════════════════
    // EXECUTOR ERRORS (070-079)
    // ═══════════════════════════════════════════
    #[error("[ZIM-070] Executor failed to launch for rule '{node_id}': {reason}")]
    #[diagnostic(code(zim::executor_launch_failed))]
    ExecutorLaunchFailed { node_id: String, reason: String },

    // ═══════════════════════════════════════════
    // ENVSUB ERRORS (080-089)
    // ═══════════════════════════════════════════
    #[error("[ZIM-080] Recursive expansion detected while resolving '${{{var}}}' (depth exceeded {max_depth})")]
    #[diagnostic(code(zim::recursive_expansion), help("Check for a cycle such as a -> ${{b}} and b -> ${{a}}"))]
    RecursiveExpansion { var: String, max_depth: usize },

    #[error("[ZIM-081] Undefined variable '${{{var}}}' referenced in rule '{node_id}'")]
    #[diagnostic(code(zim::undefined_variable))]
    UndefinedVariable { node_id: String, var: String },

    // ═══════════════════════════════════════════
    // INFRASTRUCTURE ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[ZIM-090] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[ZIM-091] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[ZIM-092] YAML parse error: {0}")]
    #[diagnostic(code(zim::yaml_parse), help("Check YAML indentation and quoting"))]
    YamlParse(#[from] serde_yaml::Error),
}

impl ZimError {
    /// Stable error code, e.g. "ZIM-030".
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownRule { .. } => "ZIM-001",
            Self::UnknownComponent { .. } => "ZIM-002",
            Self::MalformedRequires { .. } => "ZIM-003",
            Self::UserError { .. } => "ZIM-004",
            Self::PatternError { .. } => "ZIM-010",
            Self::MissingInput { .. } => "ZIM-011",
            Self::ToolchainFailure { .. } => "ZIM-020",
            Self::ProgrammerError { .. } => "ZIM-021",
            Self::EncodingError { .. } => "ZIM-022",
            Self::CyclicDependency { .. } => "ZIM-030",
            Self::MissingDependency { .. } => "ZIM-031",
            Self::DuplicateNodeId { .. } => "ZIM-032",
            Self::BuildFailed { .. } => "ZIM-040",
            Self::Cancelled => "ZIM-041",
            Self::Deadlock => "ZIM-042",
            Self::CommandFailed { .. } => "ZIM-050",
            Self::OutputMissing { .. } => "ZIM-051",
            Self::UnknownBuiltin { .. } => "ZIM-052",
            Self::CacheError { .. } => "ZIM-060",
            Self::NotFound { .. } => "ZIM-061",
            Self::ExecutorLaunchFailed { .. } => "ZIM-070",
            Self::RecursiveExpansion { .. } => "ZIM-080",
            Self::UndefinedVariable { .. } => "ZIM-081",
            Self::IoError(_) => "ZIM-090",
            Self::JsonError(_) => "ZIM-091",
            Self::YamlParse(_) => "ZIM-092",
        }
    }

    /// True for errors that must degrade to "no cache" rather than fail the build.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::CacheError { .. } | Self::NotFound { .. })
    }

    /// Exit code: 0 success, 1 rule failure, 2 user error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownRule { .. }
            | Self::UnknownComponent { .. }
            | Self::MalformedRequires { .. }
            | Self::UserError { .. }
            | Self::PatternError { .. }
            | Self::CyclicDependency { .. }
            | Self::MissingDependency { .. }
            | Self::DuplicateNodeId { .. } => 2,
            _ => 1,
        }
    }
}
