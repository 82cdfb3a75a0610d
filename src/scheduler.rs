//! Scheduler — executes the DAG with a bounded worker pool, respecting
//! dependency order.
//!
//! A single coordinator loop owns all
//! mutable scheduling state (no locks needed on it), while node execution
//! itself runs in spawned tasks bounded by a `tokio::sync::Semaphore` of
//! size `W`. Completion events flow back to the coordinator over a channel,
//! which is also how `--force` mode's "continue past failures" and default
//! mode's "stop enqueuing, let in-flight finish" are both expressed as the
//! same propagation loop with one boolean flipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::BuildContext;
use crate::error::{Result, ZimError};
use crate::event::{CacheStatus, EventKind};
use crate::graph::Graph;

/// Scheduler-visible lifecycle of one DAG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// What running one node produced, for scheduling and reporting purposes.
/// The runner pipeline returns the richer `RunOutcome`; the scheduler only
/// needs enough to decide success/failure and log cache status.
pub struct NodeExecution {
    pub cache_status: CacheStatus,
}

/// The capability the scheduler consumes to actually run one node. The
/// runner pipeline (`crate::runner`) is the production implementation;
/// tests substitute a fake.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, node_id: Arc<str>, cancel: CancellationToken) -> Result<NodeExecution>;
}

/// Outcome of one scheduler run.
#[derive(Debug, Default)]
pub struct SchedulerResult {
    pub succeeded: Vec<Arc<str>>,
    pub failed: Vec<Arc<str>>,
    pub skipped: Vec<Arc<str>>,
}

impl SchedulerResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

struct NodeRuntime {
    dependents: Vec<Arc<str>>,
    remaining: usize,
    any_dep_failed: bool,
}

enum Message {
    Ready(Arc<str>),
    Done { node_id: Arc<str>, state: NodeState, duration_ms: u64, cache_status: CacheStatus },
}

/// Execute `graph` to completion, honoring edge ordering, at-most-once
/// execution, bounded parallelism, and `--force`/cancellation semantics.
pub async fn run(
    graph: &Graph,
    ctx: &BuildContext,
    executor: Arc<dyn NodeExecutor>,
) -> Result<SchedulerResult> {
    let total = graph.len();
    ctx.event_log.emit(EventKind::BuildStarted { node_count: total });
    let build_start = Instant::now();

    if total == 0 {
        ctx.event_log.emit(EventKind::BuildCompleted {
            total_duration_ms: 0,
            succeeded: 0,
            skipped: 0,
        });
        return Ok(SchedulerResult::default());
    }

    let mut runtimes: FxHashMap<Arc<str>, NodeRuntime> = FxHashMap::default();
    for node in graph.nodes.values() {
        runtimes.insert(
            node.node_id.clone(),
            NodeRuntime {
                dependents: node.dependents.clone(),
                remaining: node.depends_on.len(),
                any_dep_failed: false,
            },
        );
    }

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
    let semaphore = Arc::new(Semaphore::new(ctx.worker_count));
    let failed_dispatch = Arc::new(AtomicBool::new(false));

    let mut result = SchedulerResult::default();
    let mut completed = 0usize;

    for leaf in graph.leaves() {
        ctx.event_log.emit(EventKind::NodeReady { node_id: leaf.clone() });
        msg_tx.send(Message::Ready(leaf)).ok();
    }

    while completed < total {
        let Some(message) = msg_rx.recv().await else { break };
        match message {
            Message::Ready(node_id) => {
                let should_skip = (failed_dispatch.load(Ordering::SeqCst) && !ctx.force)
                    || ctx.cancel.is_cancelled();
                if should_skip {
                    msg_tx
                        .send(Message::Done {
                            node_id,
                            state: NodeState::Skipped,
                            duration_ms: 0,
                            cache_status: CacheStatus::NotApplicable,
                        })
                        .ok();
                    continue;
                }

                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let executor = executor.clone();
                let cancel = ctx.child_cancel();
                let event_log = ctx.event_log.clone();
                let tx = msg_tx.clone();
                let node_for_log = node_id.clone();

                event_log.emit(EventKind::NodeRunning { node_id: node_for_log.clone() });

                tokio::spawn(async move {
                    let _permit = permit;
                    let start = Instant::now();
                    let outcome = executor.execute(node_id.clone(), cancel).await;
                    let duration_ms = start.elapsed().as_millis() as u64;
                    let (state, cache_status) = match outcome {
                        Ok(exec) => (NodeState::Succeeded, exec.cache_status),
                        Err(ZimError::Cancelled) => (NodeState::Failed, CacheStatus::NotApplicable),
                        Err(_) => (NodeState::Failed, CacheStatus::NotApplicable),
                    };
                    tx.send(Message::Done { node_id, state, duration_ms, cache_status }).ok();
                });
            }
            Message::Done { node_id, state, duration_ms, cache_status } => {
                completed += 1;
                ctx.event_log.emit(EventKind::NodeTransitioned {
                    node_id: node_id.clone(),
                    state: state.as_str().to_string(),
                    duration_ms,
                    cache_status,
                });

                match state {
                    NodeState::Succeeded => result.succeeded.push(node_id.clone()),
                    NodeState::Failed => {
                        result.failed.push(node_id.clone());
                        if !ctx.force {
                            failed_dispatch.store(true, Ordering::SeqCst);
                        }
                    }
                    NodeState::Skipped => result.skipped.push(node_id.clone()),
                    _ => debug_assert!(state.is_terminal(), "non-terminal state reached Done"),
                }

                let dependents = runtimes.get(&node_id).map(|rt| rt.dependents.clone()).unwrap_or_default();
                for dependent in dependents {
                    let Some(rt) = runtimes.get_mut(&dependent) else { continue };
                    rt.remaining = rt.remaining.saturating_sub(1);
                    if state == NodeState::Failed || state == NodeState::Skipped {
                        rt.any_dep_failed = rt.any_dep_failed || state == NodeState::Failed;
                        // A skipped dependency also propagates skip-ness,
                        // since it never produced usable outputs.
                        if state == NodeState::Skipped {
                            rt.any_dep_failed = true;
                        }
                    }
                    if rt.remaining == 0 {
                        if rt.any_dep_failed {
                            msg_tx
                                .send(Message::Done {
                                    node_id: dependent,
                                    state: NodeState::Skipped,
                                    duration_ms: 0,
                                    cache_status: CacheStatus::NotApplicable,
                                })
                                .ok();
                        } else {
                            ctx.event_log.emit(EventKind::NodeReady { node_id: dependent.clone() });
                            msg_tx.send(Message::Ready(dependent)).ok();
                        }
                    }
                }
            }
        }
    }

    let total_duration_ms = build_start.elapsed().as_millis() as u64;
    ctx.event_log.emit(EventKind::BuildCompleted {
        total_duration_ms,
        succeeded: result.succeeded.len(),
        skipped: result.skipped.len(),
    });

    if ctx.cancel.is_cancelled() {
        return Err(ZimError::Cancelled);
    }

    if !result.failed.is_empty() {
        let nodes = result.failed.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ");
        ctx.event_log.emit(EventKind::BuildFailed {
            error: format!("{} node(s) failed", result.failed.len()),
            failed_nodes: result.failed.clone(),
        });
        if !ctx.force {
            return Err(ZimError::BuildFailed { failed: result.failed.len(), nodes });
        }
    }

    Ok(result)
}
