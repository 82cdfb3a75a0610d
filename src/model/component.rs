//! `Component` — a directory in the monorepo described by one component
//! YAML file.

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::resource::Export;
use super::rule::Rule;

/// One probe in a component's `toolchain:` list. Its trimmed stdout
/// contributes to the key of every rule in the component.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToolchainProbe {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DockerSpec {
    pub image: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ToolchainSpec {
    #[serde(default)]
    pub items: Vec<ToolchainProbe>,
}

/// A directory in the monorepo, immutable after project load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Component {
    pub name: Arc<str>,
    #[serde(default)]
    pub kind: Option<String>,
    /// Absolute directory this component lives in. Not part of the YAML
    /// shape — filled in by the (external) component discoverer at load
    /// time, hence `skip` + `default`.
    #[serde(skip)]
    pub directory: PathBuf,
    #[serde(default)]
    pub environment: FxHashMap<String, String>,
    #[serde(default)]
    pub toolchain: ToolchainSpec,
    #[serde(default, rename = "docker")]
    pub docker: Option<DockerSpec>,
    #[serde(default)]
    pub exports: FxHashMap<String, Export>,
    #[serde(default)]
    pub rules: FxHashMap<String, Rule>,
}

impl Component {
    /// Container image declared for this component, or empty string — the
    /// key document's `image` field is never `null`.
    pub fn image(&self) -> &str {
        self.docker.as_ref().map(|d| d.image.as_str()).unwrap_or("")
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }

    /// Fill in each rule's `name` field (skipped during deserialization
    /// since the name is the map key, not a YAML field) — must run once
    /// right after deserializing a component.
    pub fn finalize(&mut self) {
        for (name, rule) in self.rules.iter_mut() {
            rule.name = Arc::from(name.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_without_docker_has_empty_image() {
        let yaml = "name: svc\n";
        let component: Component = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(component.image(), "");
    }

    #[test]
    fn component_with_docker_reports_image() {
        let yaml = "name: svc\ndocker:\n  image: golang:1.22\n";
        let component: Component = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(component.image(), "golang:1.22");
    }

    #[test]
    fn finalize_assigns_rule_names_from_map_keys() {
        let yaml = "name: svc\nrules:\n  build:\n    command: echo hi\n";
        let mut component: Component = serde_yaml::from_str(yaml).unwrap();
        component.finalize();
        assert_eq!(component.rule("build").unwrap().name.as_ref(), "build");
        assert_eq!(component.rule("build").unwrap().node_id("svc").as_ref(), "svc.build");
    }
}
