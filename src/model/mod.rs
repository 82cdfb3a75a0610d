//! Project model — components, rules, resources, exports.
//!
//! This is "consumed, not built" by the core: in a full Zim deployment,
//! YAML parsing and component discovery live upstream and hand the core a
//! fully-hydrated `Project`. This module is that hand-off type plus the
//! minimal YAML deserialization needed to construct one from a component
//! file, using plain deserialize-then-`Arc`-wrap structs throughout.

mod command;
mod component;
mod project;
mod resource;
mod rule;

pub use command::{
    ArchiveParams, CommandList, CommandRecord, CopyParams, MoveParams, RemovePaths, UnarchiveParams,
    UnzipParams, ZipParams,
};
pub use component::{Component, DockerSpec, ToolchainProbe};
pub use project::Project;
pub use resource::{Export, Resource};
pub use rule::{RequireRef, Rule};
