//! `Resource` and `Export` — the file-level building blocks of the project
//! model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A semantic reference to one file: a path relative to the repository root
/// plus its content hash. The hash is filled in by the resource resolver,
/// never by deserialization — hence it isn't part of the `Export` YAML shape.
///
/// Collections of `Resource` are always kept sorted lexicographically by
/// `relative_path`; this ordering is load-bearing for key stability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Resource {
    pub relative_path: PathBuf,
    pub hash: String,
}

impl Resource {
    pub fn new(relative_path: PathBuf, hash: String) -> Self {
        Self { relative_path, hash }
    }
}

/// A named, globbed set of files a component publishes to consumers
///. Resolved to a sorted file set at use-time by the
/// resource resolver — an `Export` itself carries only patterns.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct Export {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Export {
    /// Patterns in resolver order: positive globs first, then `!`-prefixed
    /// ignores appended so they apply after every positive match.
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns = self.resources.clone();
        patterns.extend(self.ignore.iter().map(|p| format!("!{p}")));
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_sort_lexicographically_by_path() {
        let mut resources = vec![
            Resource::new(PathBuf::from("b/file.go"), "h1".into()),
            Resource::new(PathBuf::from("a/file.go"), "h2".into()),
        ];
        resources.sort();
        assert_eq!(resources[0].relative_path, PathBuf::from("a/file.go"));
    }

    #[test]
    fn export_patterns_append_ignores_as_negations() {
        let export = Export {
            resources: vec!["src/**/*.rs".into()],
            ignore: vec!["src/**/*_test.rs".into()],
        };
        assert_eq!(export.patterns(), vec!["src/**/*.rs", "!src/**/*_test.rs"]);
    }
}
