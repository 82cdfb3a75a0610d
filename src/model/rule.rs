//! `Rule` and `RequireRef` — a named build step within a component.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::command::CommandList;

/// One entry in a rule's `requires:` list. Either a rule-style dependency
/// (creates a scheduler edge the dependent waits on) or an export-style
/// dependency (contributes files to the dependent's input set but creates no
/// execution edge).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequireRef {
    /// Component the reference points into. `None` means "this component".
    #[serde(default)]
    pub component: Option<String>,
    /// Rule-style requirement: depend on `<component>.<rule>` and wait for it.
    #[serde(default)]
    pub rule: Option<String>,
    /// Export-style requirement: pull in `<component>`'s named export's files.
    #[serde(default)]
    pub export: Option<String>,
}

impl RequireRef {
    pub fn is_export(&self) -> bool {
        self.export.is_some()
    }

    /// The component this reference resolves against, given the component
    /// the owning rule lives in.
    pub fn resolved_component<'a>(&'a self, owning_component: &'a str) -> &'a str {
        self.component.as_deref().unwrap_or(owning_component)
    }
}

/// A named build step. Identified by `(component.name, rule.name)`; its
/// logical identity is `NodeID = "<component>.<rule>"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Rule {
    #[serde(skip)]
    pub name: Arc<str>,
    #[serde(default)]
    pub inputs: Vec<String>,
    /// May contain `${VAR}` template references, resolved at run time.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub requires: Vec<RequireRef>,
    #[serde(alias = "commands")]
    pub command: CommandList,
    #[serde(default)]
    pub environment: FxHashMap<String, String>,
    /// Bypass the container even when the component declares one.
    #[serde(default)]
    pub native: bool,
    /// Whether this rule's outputs participate in the cache at all.
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// `NodeID = "<component>.<rule>"`.
    pub fn node_id(&self, component: &str) -> Arc<str> {
        Arc::from(format!("{component}.{}", self.name))
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_deserializes_bare_string_command() {
        let yaml = "inputs: [\"*.go\"]\noutputs: [\"svc\"]\ncommand: touch ${OUTPUT}\n";
        let mut rule: Rule = serde_yaml::from_str(yaml).unwrap();
        rule.name = Arc::from("build");
        assert_eq!(rule.command.len(), 1);
        assert_eq!(rule.node_id("svc").as_ref(), "svc.build");
    }

    #[test]
    fn require_ref_export_has_no_rule() {
        let yaml = "component: libA\nexport: public\n";
        let req: RequireRef = serde_yaml::from_str(yaml).unwrap();
        assert!(req.is_export());
        assert_eq!(req.resolved_component("svc"), "libA");
    }

    #[test]
    fn require_ref_defaults_component_to_owner() {
        let yaml = "rule: build\n";
        let req: RequireRef = serde_yaml::from_str(yaml).unwrap();
        assert!(!req.is_export());
        assert_eq!(req.resolved_component("svc"), "svc");
    }

    #[test]
    fn cache_defaults_to_true() {
        let yaml = "command: echo hi\n";
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.cache);
    }
}
