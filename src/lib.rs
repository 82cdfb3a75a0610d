//! Zim — a caching build orchestrator for monorepos.
//!
//! ## Module architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  model/     Component, Rule, Resource, Export, Project       │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  resolver/  Glob resolution, effective input sets             │
//! │  key/       Canonical key document + RuleKey hashing          │
//! │  graph/     DAG construction over `requires`                  │
//! │  scheduler/ Bounded worker pool, dependency-ordered execution  │
//! │  runner/    Middleware chain + core runner for one node        │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                       │
//! │  blobstore/ Content-addressed cache (trait + local fs impl)    │
//! │  executor/  Native / container command execution (trait)       │
//! │  event/     Structured progress events for one build run       │
//! │  hash       SHA-1 over bytes, files, and canonical JSON        │
//! │  util/      ${VAR} substitution, shared runtime constants       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`model`] | Components, rules, resources, exports — the `Project` hand-off type |
//! | [`hash`] | Fingerprint/Hasher: stable digests over bytes, files, canonical JSON |
//! | [`resolver`] | Glob expansion into sorted, de-duplicated file lists |
//! | [`key`] | Rule-Key Builder: the canonical key document and its digest |
//! | [`graph`] | DAG construction over `requires`, cycle detection |
//! | [`scheduler`] | Bounded worker pool executing the DAG in dependency order |
//! | [`runner`] | Per-node pipeline: resolve, key, middleware chain, execute |
//! | [`blobstore`] | Content-addressed cache trait plus a local filesystem impl |
//! | [`executor`] | Native / containerized command execution trait |
//! | [`event`] | Structured progress events for one build run |
//! | [`config`] | `BuildContext` (per-invocation) and `ZimConfig` (persisted defaults) |
//! | [`error`] | `ZimError` — stable, documented error codes |
//!
//! Component discovery and YAML schema validation are treated as external
//! collaborators (see the CLI binary's own loader): this crate's public
//! surface begins at an already-hydrated [`model::Project`].

pub mod blobstore;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod graph;
pub mod hash;
pub mod key;
pub mod model;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod util;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

// Error types
pub use error::{Result, ZimError};

// Config types
pub use config::{BuildContext, CacheMode, SharedBuildContext, ZimConfig};

// Model types (domain)
pub use model::{Component, Export, Project, Resource, Rule};

// Graph / scheduler / runner types (application layer)
pub use graph::{build_graph, Graph, Node};
pub use runner::RunnerExecutor;
pub use scheduler::{NodeExecutor, SchedulerResult};

// Event types
pub use event::{CacheStatus, Event, EventKind, EventLog};

// Blobstore / executor types (infrastructure)
pub use blobstore::{BlobStore, FsBlobStore};
pub use executor::{ContainerExecutor, Executor, NativeExecutor};
