// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch configuration — the static (or config-service-created) record that
//! names a batch, binds it to a sequence package, and reserves its slot.

use crate::ids::{BatchId, SlotId};
use std::collections::BTreeMap;

/// Barcode scanner configuration attached to a batch, if it owns one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BarcodeScannerConfig {
    pub device_path: String,
    pub baud_rate: u32,
    /// If set, a successful scan auto-starts a sequence using the scanned
    /// value as the WIP id (see `workflow.auto_sequence_start`).
    #[serde(default)]
    pub auto_start: bool,
}

/// Static configuration for one batch. Created on YAML load or via the
/// Batch Config Service; destroyed only when the batch is not running.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchConfig {
    pub id: BatchId,
    pub name: String,
    pub sequence_package: String,
    pub slot_id: SlotId,
    #[serde(default)]
    pub auto_start: bool,
    /// device-id -> driver config. Must resolve against the set declared by
    /// the sequence manifest unless the batch overrides hardware explicitly.
    #[serde(default)]
    pub hardware: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub process_id: Option<i64>,
    /// Read from both the legacy top-level location and `config.headerId`
    /// on load; written only to the canonical `config.headerId` location.
    /// See `header_id()`/`set_header_id()`.
    #[serde(default)]
    pub header_id: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    pub barcode_scanner: Option<BarcodeScannerConfig>,
}

impl BatchConfig {
    /// Resolves `header_id` from either the legacy top-level field or the
    /// `config.headerId` map entry, preferring the canonical location.
    pub fn header_id(&self) -> Option<String> {
        self.config
            .get("headerId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.header_id.clone())
    }

    /// Always writes to the canonical `config.headerId` location, never the
    /// legacy top-level field.
    pub fn set_header_id(&mut self, header_id: impl Into<String>) {
        self.config.insert("headerId".to_string(), serde_json::Value::String(header_id.into()));
    }

    /// Whether the sequence manifest's declared hardware keys and this
    /// batch's own `hardware` map agree, unless the batch explicitly
    /// overrides the manifest (a non-empty `hardware` map is itself the
    /// override).
    pub fn hardware_satisfies(&self, manifest_keys: &[String]) -> bool {
        if !self.hardware.is_empty() {
            return true;
        }
        manifest_keys.is_empty()
    }

    /// Dict-typed fields (`config`, `parameters`, `hardware`) are merged on
    /// update, not replaced.
    pub fn merge_dicts(
        &mut self,
        config: Option<BTreeMap<String, serde_json::Value>>,
        parameters: Option<BTreeMap<String, serde_json::Value>>,
        hardware: Option<BTreeMap<String, serde_json::Value>>,
    ) {
        if let Some(c) = config {
            self.config.extend(c);
        }
        if let Some(p) = parameters {
            self.parameters.extend(p);
        }
        if let Some(h) = hardware {
            self.hardware.extend(h);
        }
    }
}

crate::builder! {
    pub struct BatchConfigBuilder => BatchConfig {
        into {
            id: BatchId = BatchId::new("batch_1"),
            name: String = "Batch 1",
            sequence_package: String = "mock_success",
        }
        set {
            slot_id: SlotId = SlotId::FIRST,
            auto_start: bool = false,
            hardware: BTreeMap<String, serde_json::Value> = BTreeMap::new(),
            parameters: BTreeMap<String, serde_json::Value> = BTreeMap::new(),
            process_id: Option<i64> = None,
            header_id: Option<String> = None,
            config: BTreeMap<String, serde_json::Value> = BTreeMap::new(),
        }
        option {
            barcode_scanner: BarcodeScannerConfig = None,
        }
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
