// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency-install cache for a `sequence_package` directory, grounded on
//! the original dependency installer: hash the declared requirement list,
//! skip `pip install` when a marker for that hash already exists, and shell
//! out with the same subprocess idiom the CLI Sequence Worker uses to run
//! the sequence itself (`tokio::process::Command`, not the shell-AST
//! crate).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::manifest::SequenceManifest;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to read install cache: {0}")]
    Io(String),
    #[error("pip install failed: {0}")]
    InstallFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Manifest declares no dependencies; nothing to do.
    NoDependencies,
    /// A marker for this exact dependency set already exists.
    AlreadyCached,
    /// `pip install` ran and succeeded for these packages.
    Installed(Vec<String>),
}

/// Stable cache key for a dependency list: sorted, newline-joined, then
/// SHA-256 hex. Order-independent so reordering `manifest.yaml` entries
/// doesn't force a reinstall.
pub fn dependency_hash(packages: &[String]) -> String {
    let mut sorted = packages.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(sorted.join("\n").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn marker_path(package_dir: &Path, hash: &str) -> PathBuf {
    package_dir.join(format!(".deps-{hash}.installed"))
}

/// Install a sequence package's declared dependencies if they are not
/// already cached for the current manifest's exact requirement set.
pub async fn install_if_needed(package_dir: &Path, manifest: &SequenceManifest) -> Result<InstallOutcome, PackageError> {
    let packages = manifest.dependency_list();
    if packages.is_empty() {
        return Ok(InstallOutcome::NoDependencies);
    }

    let hash = dependency_hash(&packages);
    let marker = marker_path(package_dir, &hash);
    if tokio::fs::try_exists(&marker).await.map_err(|e| PackageError::Io(e.to_string()))? {
        return Ok(InstallOutcome::AlreadyCached);
    }

    tracing::info!(package = %manifest.name, count = packages.len(), "installing sequence package dependencies");

    let output = Command::new("pip")
        .arg("install")
        .arg("--quiet")
        .args(&packages)
        .output()
        .await
        .map_err(|e| PackageError::InstallFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(PackageError::InstallFailed(stderr));
    }

    clear_stale_markers(package_dir).await.map_err(|e| PackageError::Io(e.to_string()))?;
    tokio::fs::write(&marker, b"").await.map_err(|e| PackageError::Io(e.to_string()))?;

    Ok(InstallOutcome::Installed(packages))
}

/// Remove markers for prior dependency sets so a stale cache doesn't
/// accumulate one file per manifest edit.
async fn clear_stale_markers(package_dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(package_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(".deps-") && name.ends_with(".installed") {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
