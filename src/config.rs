//! Zim configuration.
//!
//! Two layers:
//!
//! 1. `BuildContext` — the ephemeral, per-invocation state threaded through
//!    the scheduler and every middleware: worker count, cache mode, the
//!    project/artifacts roots, the shared event log, and a cancellation
//!    token. Never persisted.
//! 2. `ZimConfig` — small, non-secret user defaults persisted at
//!    `~/.config/zim/config.toml` (default worker count, default cache mode,
//!    default remote cache endpoint). Credentials for that endpoint are the
//!    auth-token service's concern, not this crate's.
//!
//! ## Priority order (highest to lowest)
//!
//! 1. CLI flags (`--jobs`, `--cache`)
//! 2. Environment variables (`ZIM_JOBS`, `ZIM_CACHE`)
//! 3. Config file (`~/.config/zim/config.toml`)
//! 4. Built-in defaults

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ZimError};
use crate::event::EventLog;

/// Cache consultation mode, threaded through the runner pipeline and its
/// middleware via `BuildContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Consult the cache before running; populate it after.
    ReadWrite,
    /// Never consult the cache; always run and upload on success.
    WriteOnly,
    /// Bypass the cache entirely.
    Disabled,
}

impl Default for CacheMode {
    fn default() -> Self {
        Self::ReadWrite
    }
}

impl CacheMode {
    pub fn may_read(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    pub fn may_write(self) -> bool {
        matches!(self, Self::ReadWrite | Self::WriteOnly)
    }
}

/// Persisted, non-secret user defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZimConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Defaults {
    /// Default worker pool size. `None` means "logical CPU count".
    pub jobs: Option<usize>,
    /// Default cache mode.
    pub cache: Option<CacheMode>,
    /// Default remote cache endpoint (no credentials — see module docs).
    pub cache_endpoint: Option<String>,
}

impl ZimConfig {
    /// `~/.config/zim/`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("zim")
    }

    /// `~/.config/zim/config.toml`
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file. Returns the default config if no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| ZimError::UserError { reason: format!("failed to parse {}: {e}", path.display()) })
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ZimError::UserError { reason: format!("failed to serialize config: {e}") })?;
        fs::write(Self::config_path(), content)?;
        Ok(())
    }

    /// Worker count with env-var and built-in fallback.
    pub fn jobs(&self) -> usize {
        if let Ok(v) = std::env::var("ZIM_JOBS") {
            if let Ok(n) = v.parse() {
                return n;
            }
        }
        self.defaults
            .jobs
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    pub fn cache_mode(&self) -> CacheMode {
        if let Ok(v) = std::env::var("ZIM_CACHE") {
            match v.as_str() {
                "read-write" => return CacheMode::ReadWrite,
                "write-only" => return CacheMode::WriteOnly,
                "disabled" => return CacheMode::Disabled,
                _ => {}
            }
        }
        self.defaults.cache.unwrap_or_default()
    }
}

/// Per-invocation state threaded through the scheduler, runner and every
/// middleware — logger, cache mode, worker count, cancellation token —
/// instead of reaching for globals.
#[derive(Clone)]
pub struct BuildContext {
    pub project_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub worker_count: usize,
    pub cache_mode: CacheMode,
    pub force: bool,
    pub event_log: EventLog,
    pub cancel: CancellationToken,
}

impl BuildContext {
    pub fn new(project_root: impl Into<PathBuf>, worker_count: usize, cache_mode: CacheMode) -> Self {
        let project_root = project_root.into();
        let artifacts_dir = project_root.join("artifacts");
        Self {
            project_root,
            artifacts_dir,
            worker_count: worker_count.max(1),
            cache_mode,
            force: false,
            event_log: EventLog::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn artifacts_dir_for(&self, component: &str, rule: &str) -> PathBuf {
        self.artifacts_dir.join(component).join(rule)
    }

    /// Child token so cancelling one run doesn't affect sibling runs sharing a context.
    pub fn child_cancel(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}

pub type SharedBuildContext = Arc<BuildContext>;
