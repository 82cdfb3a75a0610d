//! Shared test fixtures for building small on-disk projects.
//!
//! Exported behind `#[cfg(any(test, feature = "test-fixtures"))]` so both
//! this crate's own unit tests and an external integration-test crate (see
//! `tests/cli_tests.rs`) can build the same shapes without duplicating the
//! component-YAML boilerplate. Callers own the temporary directory (e.g. via
//! `tempfile::tempdir()` in their own dev-dependencies) — this module only
//! ever writes inside a directory it's handed.

use std::fs;
use std::path::Path;

use crate::model::{Component, Project};

/// Write one component's `zim.yaml` under `root/<name>/` and return the
/// finalized, directory-stamped [`Component`].
pub fn write_component(root: &Path, name: &str, yaml_body: &str) -> Component {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("create component dir");
    let full = format!("name: {name}\n{yaml_body}");
    let mut component: Component = serde_yaml::from_str(&full).expect("parse fixture component yaml");
    component.directory = dir;
    component.finalize();
    component
}

/// The S1 scenario: one component `svc`, rule `build` with input
/// `*.go` (one file `main.go`), output `svc`, command `touch ${OUTPUT}`.
pub fn s1_single_rule_project(root: &Path) -> Project {
    let svc_dir = root.join("svc");
    fs::create_dir_all(&svc_dir).expect("create svc dir");
    fs::write(svc_dir.join("main.go"), "package main; func main(){}\n").expect("write main.go");

    let svc = write_component(
        root,
        "svc",
        "rules:\n  build:\n    inputs: [\"*.go\"]\n    outputs: [\"svc\"]\n    command: touch ${OUTPUT}\n",
    );
    Project::new("proj", vec![svc]).expect("build s1 project")
}

/// The S2 scenario: `libA` and `libB`, both required by
/// `svc.build`.
pub fn s2_two_dep_project(root: &Path) -> Project {
    let lib_a = write_component(
        root,
        "libA",
        "rules:\n  build:\n    inputs: [\"*.txt\"]\n    outputs: [\"a.out\"]\n    command: cp a.txt a.out\n",
    );
    fs::write(lib_a.directory.join("a.txt"), "alpha\n").expect("write a.txt");

    let lib_b = write_component(
        root,
        "libB",
        "rules:\n  build:\n    inputs: [\"*.txt\"]\n    outputs: [\"b.out\"]\n    command: cp b.txt b.out\n",
    );
    fs::write(lib_b.directory.join("b.txt"), "beta\n").expect("write b.txt");

    let svc = write_component(
        root,
        "svc",
        "rules:\n  build:\n    outputs: [\"svc.out\"]\n    requires:\n      - {component: libA, rule: build}\n      - {component: libB, rule: build}\n    command: touch svc.out\n",
    );

    Project::new("proj", vec![lib_a, lib_b, svc]).expect("build s2 project")
}

/// The S3 scenario: a cyclic `libA -> libB -> libA` edge.
pub fn s3_cyclic_project(root: &Path) -> Project {
    let lib_a = write_component(
        root,
        "libA",
        "rules:\n  build:\n    requires: [{component: libB, rule: build}]\n    command: echo a\n",
    );
    let lib_b = write_component(
        root,
        "libB",
        "rules:\n  build:\n    requires: [{component: libA, rule: build}]\n    command: echo b\n",
    );
    Project::new("proj", vec![lib_a, lib_b]).expect("build s3 project")
}
