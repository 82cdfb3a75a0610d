//! `Project` — the fully-hydrated model the core consumes.
//!
//! Component discovery and YAML schema validation are out of scope for the
//! core; this type is the hand-off point. It is
//! constructed once per invocation and is immutable thereafter.

use rustc_hash::FxHashMap;

use crate::error::{Result, ZimError};

use super::component::Component;
use super::rule::Rule;

/// A fully-hydrated project: every component, with every rule's `NodeID`
/// guaranteed unique.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub components: FxHashMap<String, Component>,
}

/// Component and rule names become `NodeID` halves (`<component>.<rule>`)
/// and shell-visible environment variable values; both must start with a
/// letter and contain only alphanumerics, hyphens or underscores.
fn valid_name(name: &str) -> bool {
    let name_pattern = regex::Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("static pattern");
    name_pattern.is_match(name)
}

impl Project {
    /// Build a project from already-discovered, already-finalized
    /// components, checking the `NodeID` uniqueness invariant.
    pub fn new(name: impl Into<String>, components: Vec<Component>) -> Result<Self> {
        let mut map = FxHashMap::default();
        let mut seen = FxHashMap::default();
        for component in components {
            if !valid_name(&component.name) {
                return Err(ZimError::UserError {
                    reason: format!(
                        "component name '{}' must start with a letter and contain only alphanumerics, '-' or '_'",
                        component.name
                    ),
                });
            }
            for rule_name in component.rules.keys() {
                if !valid_name(rule_name) {
                    return Err(ZimError::UserError {
                        reason: format!(
                            "rule name '{rule_name}' in component '{}' must start with a letter and contain only alphanumerics, '-' or '_'",
                            component.name
                        ),
                    });
                }
                let node_id = format!("{}.{rule_name}", component.name);
                if seen.insert(node_id.clone(), ()).is_some() {
                    return Err(ZimError::DuplicateNodeId { node_id });
                }
            }
            map.insert(component.name.to_string(), component);
        }
        Ok(Self { name: name.into(), components: map })
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Resolve `(component, rule)` by `NodeID = "<component>.<rule>"`.
    pub fn rule_by_node_id(&self, node_id: &str) -> Option<(&Component, &Rule)> {
        let (component_name, rule_name) = node_id.split_once('.')?;
        let component = self.components.get(component_name)?;
        let rule = component.rule(rule_name)?;
        Some((component, rule))
    }

    /// All `(component, rule)` pairs matching a root request: a rule name
    /// plus an optional component-name filter.
    pub fn resolve_request<'a>(
        &'a self,
        rule_name: &str,
        component_filter: Option<&[String]>,
    ) -> Vec<(&'a Component, &'a Rule)> {
        self.components
            .values()
            .filter(|c| component_filter.is_none_or(|f| f.iter().any(|n| n == c.name.as_ref())))
            .filter_map(|c| c.rule(rule_name).map(|r| (c, r)))
            .collect()
    }

    /// Every `NodeID` in the project, for `list rules`.
    pub fn all_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .components
            .values()
            .flat_map(|c| c.rules.keys().map(move |r| format!("{}.{r}", c.name)))
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rule;
    use std::sync::Arc;

    fn rule(name: &str) -> Rule {
        let mut r: Rule = serde_yaml::from_str("command: echo hi\n").unwrap();
        r.name = Arc::from(name);
        r
    }

    fn component(name: &str, rule_names: &[&str]) -> Component {
        let mut c: Component = serde_yaml::from_str(&format!("name: {name}\n")).unwrap();
        for rn in rule_names {
            c.rules.insert(rn.to_string(), rule(rn));
        }
        c
    }

    #[test]
    fn component_name_with_invalid_format_is_rejected() {
        let components = vec![component("1bad-name", &["build"])];
        let err = Project::new("proj", components).unwrap_err();
        assert!(matches!(err, ZimError::UserError { .. }));
    }

    #[test]
    fn duplicate_node_id_across_components_is_rejected() {
        let components = vec![component("svc", &["build"]), component("svc", &["build"])];
        let err = Project::new("proj", components).unwrap_err();
        assert!(matches!(err, ZimError::DuplicateNodeId { .. }));
    }

    #[test]
    fn resolve_request_filters_by_component_name() {
        let components = vec![component("svc", &["build"]), component("lib", &["build"])];
        let project = Project::new("proj", components).unwrap();
        let filter = vec!["svc".to_string()];
        let matches = project.resolve_request("build", Some(&filter));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0.name.as_ref(), "svc");
    }

    #[test]
    fn rule_by_node_id_splits_on_first_dot() {
        let components = vec![component("svc", &["build"])];
        let project = Project::new("proj", components).unwrap();
        let (c, r) = project.rule_by_node_id("svc.build").unwrap();
        assert_eq!(c.name.as_ref(), "svc");
        assert_eq!(r.name.as_ref(), "build");
    }
}
