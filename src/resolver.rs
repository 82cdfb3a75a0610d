//! Resource Resolver — expand glob patterns into ordered file lists,
//! applying ignores and memoizing input hashes.
//!
//! Directory traversal uses `ignore::WalkBuilder` (the ripgrep-author crate
//! already in the dependency stack for fast recursive walks) with all of its
//! automatic ignore-file handling disabled: Zim's negation semantics are
//! the explicit `!pattern` entries a rule author writes, not `.gitignore`.
//! Pattern matching is `globset`, which natively supports `**`, `*`, `?`,
//! `[...]` and `{a,b}` brace alternation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rustc_hash::FxHashMap;

use crate::error::{Result, ZimError};
use crate::hash;
use crate::model::{Export, Resource};

/// Compile patterns (each optionally `!`-negated) into a single `GlobSet`
/// plus a parallel negation flag per pattern index.
fn compile_patterns(patterns: &[String]) -> Result<(GlobSet, Vec<bool>)> {
    let mut builder = GlobSetBuilder::new();
    let mut negations = Vec::with_capacity(patterns.len());
    for raw in patterns {
        let (negate, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let glob = Glob::new(body)
            .map_err(|e| ZimError::PatternError { pattern: raw.clone(), reason: e.to_string() })?;
        builder.add(glob);
        negations.push(negate);
    }
    let set = builder
        .build()
        .map_err(|e| ZimError::PatternError { pattern: patterns.join(","), reason: e.to_string() })?;
    Ok((set, negations))
}

/// Walk `base_dir` once, collecting every regular file's path relative to
/// it. Symlinked directories are followed (same reasoning as `hash_file`'s
/// symlink note); directories themselves are never emitted.
fn walk_regular_files(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let walker = ignore::WalkBuilder::new(base_dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .ignore(false)
        .follow_links(true)
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| ZimError::UserError { reason: e.to_string() })?;
        let file_type = match entry.file_type() {
            Some(ft) => ft,
            None => continue, // stdin sentinel, never produced for a real walk
        };
        if !file_type.is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(base_dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        out.push(relative);
    }
    Ok(out)
}

/// Resolve a list of glob patterns (with `!`-negation) against `base_dir`
/// into a sorted, de-duplicated list of regular-file relative paths
///-(d)).
pub fn resolve_patterns(base_dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let (set, negations) = compile_patterns(patterns)?;
    let all_files = walk_regular_files(base_dir)?;

    let mut matched: BTreeSet<PathBuf> = BTreeSet::new();
    for file in &all_files {
        let hits = set.matches(file);
        if hits.is_empty() {
            continue;
        }
        // Apply matches in pattern order: a later negation removes an
        // earlier positive match).
        let mut included = false;
        for idx in &hits {
            if negations[*idx] {
                included = false;
            } else {
                included = true;
            }
        }
        if included {
            matched.insert(file.clone());
        } else {
            matched.remove(file);
        }
    }

    Ok(matched.into_iter().collect())
}

/// Resolve patterns into hashed, sorted `Resource`s, stat'ing and hashing
/// each match. This is the path used when an input or export actually needs
/// content hashes (as opposed to e.g. `list inputs`, which only needs paths).
pub fn resolve_resources(base_dir: &Path, patterns: &[String]) -> Result<Vec<Resource>> {
    let relative_paths = resolve_patterns(base_dir, patterns)?;
    let mut resources = Vec::with_capacity(relative_paths.len());
    for relative in relative_paths {
        let absolute = base_dir.join(&relative);
        let hash = hash::hash_file(&absolute)?;
        resources.push(Resource::new(relative, hash));
    }
    resources.sort();
    Ok(resources)
}

/// Memoization table for input-file hashes, keyed by absolute path
///. One instance per scheduler
/// run; protected internally so concurrent workers hashing the same file
/// never race (content is stable during a run, so "last writer wins" on a
/// cache-filling race is harmless).
#[derive(Default)]
pub struct HashMemo {
    inner: parking_lot::Mutex<FxHashMap<PathBuf, String>>,
}

impl HashMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_file(&self, absolute_path: &Path) -> Result<String> {
        if let Some(cached) = self.inner.lock().get(absolute_path) {
            return Ok(cached.clone());
        }
        let digest = hash::hash_file(absolute_path)?;
        self.inner.lock().insert(absolute_path.to_path_buf(), digest.clone());
        Ok(digest)
    }
}

/// Hash a resolved input, attributing a vanished-between-walk-and-read file
/// to the node that declared it rather than surfacing a bare `IoError` —
/// the matched path existed when `walk_regular_files` saw it, so a failure
/// to open/read it now means it was removed (or replaced by something
/// unreadable) out from under this build.
fn hash_resolved_input(memo: &HashMemo, node_id: &str, absolute: &Path, relative: &Path) -> Result<String> {
    memo.hash_file(absolute).map_err(|_| ZimError::MissingInput {
        node_id: node_id.to_string(),
        path: relative.display().to_string(),
    })
}

/// Resolve the **effective input set** for a rule: the union of its own
/// input patterns and the files contributed by any export-style `requires`
///. Export resolution is flat, not transitive — the export's
/// own patterns are resolved directly against the exporting component's
/// directory, one level only.
pub fn resolve_effective_inputs(
    node_id: &str,
    rule_base_dir: &Path,
    rule_inputs: &[String],
    export_sources: &[(&Path, &Export)],
    memo: &HashMemo,
) -> Result<Vec<Resource>> {
    let mut all: BTreeSet<Resource> = BTreeSet::new();

    for relative in resolve_patterns(rule_base_dir, rule_inputs)? {
        let absolute = rule_base_dir.join(&relative);
        let digest = hash_resolved_input(memo, node_id, &absolute, &relative)?;
        all.insert(Resource::new(relative, digest));
    }

    for (export_dir, export) in export_sources {
        for relative in resolve_patterns(export_dir, &export.patterns())? {
            let absolute = export_dir.join(&relative);
            let digest = hash_resolved_input(memo, node_id, &absolute, &relative)?;
            all.insert(Resource::new(relative, digest));
        }
    }

    Ok(all.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn resolves_star_glob_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.go", "b");
        write(dir.path(), "a.go", "a");
        write(dir.path(), "c.txt", "c");

        let matches = resolve_patterns(dir.path(), &["*.go".to_string()]).unwrap();
        assert_eq!(matches, vec![PathBuf::from("a.go"), PathBuf::from("b.go")]);
    }

    #[test]
    fn double_star_matches_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a/b.rs", "x");
        write(dir.path(), "src/c.rs", "y");

        let matches = resolve_patterns(dir.path(), &["src/**/*.rs".to_string()]).unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn negation_removes_previously_matched_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "foo_test.go", "t");
        write(dir.path(), "foo.go", "f");

        let matches =
            resolve_patterns(dir.path(), &["*.go".to_string(), "!*_test.go".to_string()]).unwrap();
        assert_eq!(matches, vec![PathBuf::from("foo.go")]);
    }

    #[test]
    fn directories_are_never_emitted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sub/file.go", "x");

        let matches = resolve_patterns(dir.path(), &["**/*".to_string()]).unwrap();
        assert!(matches.iter().all(|p| dir.path().join(p).is_file()));
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_patterns(dir.path(), &["[".to_string()]).unwrap_err();
        assert!(matches!(err, ZimError::PatternError { .. }));
    }

    #[test]
    fn hash_memo_returns_identical_digest_for_same_path() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.go", "hello");
        let memo = HashMemo::new();
        let h1 = memo.hash_file(&dir.path().join("a.go")).unwrap();
        let h2 = memo.hash_file(&dir.path().join("a.go")).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn vanished_input_is_reported_as_missing_input_not_io_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.go", "package main");
        let memo = HashMemo::new();

        // Walk sees the file, then it's removed before it's hashed —
        // simulated directly since a race is hard to reproduce deterministically.
        fs::remove_file(dir.path().join("main.go")).unwrap();
        let absolute = dir.path().join("main.go");
        let relative = PathBuf::from("main.go");
        let err = hash_resolved_input(&memo, "svc.build", &absolute, &relative).unwrap_err();
        assert!(matches!(err, ZimError::MissingInput { ref node_id, ref path } if node_id == "svc.build" && path == "main.go"));
    }

    #[test]
    fn brace_expansion_matches_alternatives() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "1");
        write(dir.path(), "b.tsx", "2");
        write(dir.path(), "c.md", "3");

        let matches = resolve_patterns(dir.path(), &["*.{ts,tsx}".to_string()]).unwrap();
        assert_eq!(matches.len(), 2);
    }
}
