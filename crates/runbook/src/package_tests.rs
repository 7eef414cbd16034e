// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::manifest::SequenceManifest;

fn manifest_with_deps(deps: &[&str]) -> SequenceManifest {
    let yaml = format!(
        r#"
name: pkg
version: "1.0.0"
entry_point:
  module: sequences.pkg
  class_name: Pkg
dependencies:
  default:
{}
"#,
        deps.iter().map(|d| format!("    - {d}")).collect::<Vec<_>>().join("\n")
    );
    SequenceManifest::from_yaml_str(&yaml).expect("parse manifest")
}

#[test]
fn dependency_hash_is_order_independent() {
    let a = dependency_hash(&["numpy".to_string(), "pyvisa".to_string()]);
    let b = dependency_hash(&["pyvisa".to_string(), "numpy".to_string()]);
    assert_eq!(a, b);
}

#[test]
fn dependency_hash_differs_for_different_sets() {
    let a = dependency_hash(&["numpy".to_string()]);
    let b = dependency_hash(&["numpy".to_string(), "pyvisa".to_string()]);
    assert_ne!(a, b);
}

#[tokio::test]
async fn no_dependencies_short_circuits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = manifest_with_deps(&[]);
    let outcome = install_if_needed(dir.path(), &manifest).await.expect("install");
    assert_eq!(outcome, InstallOutcome::NoDependencies);
}

#[tokio::test]
async fn existing_marker_is_treated_as_cached() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = manifest_with_deps(&["numpy"]);
    let hash = dependency_hash(&manifest.dependency_list());
    tokio::fs::write(marker_path(dir.path(), &hash), b"").await.expect("write marker");

    let outcome = install_if_needed(dir.path(), &manifest).await.expect("install");
    assert_eq!(outcome, InstallOutcome::AlreadyCached);
}
