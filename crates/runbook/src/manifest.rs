// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `manifest.yaml` schema for a `sequence_package` directory (spec.md
//! §4.16). Mirrors the pydantic `SequenceManifest` model the CLI Sequence
//! Worker's Python side used to validate, minus the runtime-introspected
//! step list (the sequence SDK that walks decorated step functions stays
//! out of scope, §1 Non-goals) — `steps` here is an optional author-supplied
//! hint so a worker can snapshot step names before the subprocess reports
//! its first `step_start` event.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MANIFEST_FILE_NAME: &str = "manifest.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest not found at {0}")]
    NotFound(String),
    #[error("failed to read manifest: {0}")]
    Io(String),
    #[error("failed to parse manifest: {0}")]
    Parse(String),
}

/// Module + class the CLI Sequence Worker subprocess instantiates to run
/// the sequence. Kept as an opaque pair of strings; the SDK interprets
/// them, not this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub module: String,
    #[serde(alias = "class")]
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Author-supplied step hint, used only for early `SequenceMetadata`
/// snapshots. Authoritative step identity still comes from the worker's
/// own `step_start`/`step_complete` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub entry_point: EntryPoint,
    #[serde(default)]
    pub hardware: BTreeMap<String, HardwareDefinition>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDefinition>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Optional named lists of pip-installable requirements, keyed
    /// arbitrarily (e.g. `"default"`, `"test"`) the way the original
    /// dependency installer grouped `pyproject.toml` extras.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl SequenceManifest {
    /// Parse a manifest from its YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ManifestError> {
        serde_yaml::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Load `manifest.yaml` from a sequence package directory.
    pub async fn load(package_dir: &Path) -> Result<Self, ManifestError> {
        let path = package_dir.join(MANIFEST_FILE_NAME);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ManifestError::NotFound(path.display().to_string()),
                _ => ManifestError::Io(e.to_string()),
            })?;
        Self::from_yaml_str(&text)
    }

    /// Step names in author-declared order, falling back to declaration
    /// order when `order` is absent.
    pub fn step_names(&self) -> Vec<String> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.order.unwrap_or(u32::MAX));
        steps.into_iter().map(|s| s.name).collect()
    }

    /// Hardware keys this manifest declares as required, for the Batch
    /// Manager's `hardware_satisfies` preflight check.
    pub fn required_hardware(&self) -> Vec<&str> {
        self.hardware
            .iter()
            .filter(|(_, def)| def.required)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    pub fn dependency_list(&self) -> Vec<String> {
        let mut all: Vec<String> = self.dependencies.values().flatten().cloned().collect();
        all.sort();
        all.dedup();
        all
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
