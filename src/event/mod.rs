//! Event module — observability for one build run.
//!
//! Provides a full audit trail of scheduler state transitions with replay
//! capability:
//! - `Event`: envelope with id + timestamp + kind
//! - `EventKind`: node-level and build-level variants
//! - `EventLog`: thread-safe, append-only log

mod log;

pub use log::{CacheStatus, Event, EventKind, EventLog};
