//! EventLog — structured progress events for one build run.
//!
//! After each state transition the scheduler emits a structured event
//! `{node_id, state, duration_ms, cache_status}` to an observer channel.
//! This is that event plus the append-only log that collects it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a node's output was pulled from cache or actually computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
    Disabled,
    /// Not applicable: the node was skipped or failed before reaching the cache middleware.
    NotApplicable,
}

/// Single event in the build's execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering).
    pub id: u64,
    /// Time since the build started (ms).
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// All structured event kinds emitted by the scheduler and runner pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BuildStarted {
        node_count: usize,
    },
    BuildCompleted {
        total_duration_ms: u64,
        succeeded: usize,
        skipped: usize,
    },
    BuildFailed {
        error: String,
        failed_nodes: Vec<Arc<str>>,
    },

    /// A node entered `Ready`: every dependency reached a terminal state it can proceed past.
    NodeReady {
        node_id: Arc<str>,
    },
    /// A node was claimed by a worker and entered `Running`.
    NodeRunning {
        node_id: Arc<str>,
    },
    /// A node reached a terminal state.
    NodeTransitioned {
        node_id: Arc<str>,
        state: String,
        duration_ms: u64,
        cache_status: CacheStatus,
    },
    /// Fine-grained: the rule key computed for a node, for `key --detail` and debugging.
    NodeKeyed {
        node_id: Arc<str>,
        key: String,
    },
    /// Fine-grained: a single command within a node's command list ran.
    CommandExecuted {
        node_id: Arc<str>,
        command_index: usize,
        exit: i32,
    },
    /// Fine-grained: ${VAR} substitution resolved a command string.
    EnvsubResolved {
        node_id: Arc<str>,
        template: String,
        result: String,
    },
}

impl EventKind {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeReady { node_id }
            | Self::NodeRunning { node_id }
            | Self::NodeTransitioned { node_id, .. }
            | Self::NodeKeyed { node_id, .. }
            | Self::CommandExecuted { node_id, .. }
            | Self::EnvsubResolved { node_id, .. } => Some(node_id),
            Self::BuildStarted { .. } | Self::BuildCompleted { .. } | Self::BuildFailed { .. } => None,
        }
    }

    pub fn is_build_event(&self) -> bool {
        matches!(
            self,
            Self::BuildStarted { .. } | Self::BuildCompleted { .. } | Self::BuildFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log. One per build invocation.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event, returning its monotonic ID.
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event);
        id
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    pub fn filter_node(&self, node_id: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.node_id() == Some(node_id))
                .cloned()
                .collect()
        })
    }

    pub fn build_events(&self) -> Vec<Event> {
        self.with_events(|events| events.iter().filter(|e| e.kind.is_build_event()).cloned().collect())
    }

    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
