// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch Config Service (C11, spec.md §4.11): persist-first create/update/
//! delete of batch configuration, backed by the station YAML file plus the
//! Batch Manager's in-memory config table.
//!
//! The in-memory step is expressed as a [`ConfigTable`] trait rather than a
//! bare `HashMap` so the rollback path (I7) is actually exercisable: a real
//! `HashMap` insert cannot fail, but the in-memory step this mirrors is
//! conceptually fallible (the original indexes a concurrently-read table),
//! and `station-adapters::Driver` already establishes the pattern of fixing
//! a fallible boundary as a trait in this corpus.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use station_core::{BarcodeScannerConfig, BatchConfig, BatchId, ConfigError, SlotId, StationConfig, StoreError};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

/// Errors raised by the Batch Config Service.
#[derive(Debug, Error)]
pub enum ConfigServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no unused slot in 1..=12")]
    NoSlotAvailable,

    #[error("batch not found: {0}")]
    NotFound(BatchId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// The in-memory config table the Batch Manager reads batch configs from.
/// A real insert cannot fail; `FailingTable` (tests only) exercises the
/// rollback path this trait makes expressible.
pub trait ConfigTable: Send + Sync {
    fn insert(&self, cfg: BatchConfig) -> Result<(), ConfigServiceError>;
    fn remove(&self, id: &BatchId);
    fn get(&self, id: &BatchId) -> Option<BatchConfig>;
    fn snapshot(&self) -> Vec<BatchConfig>;
}

/// The production `ConfigTable`: a plain map guarded by a `parking_lot`
/// lock, shared between the config service and the Batch Manager.
#[derive(Clone, Default)]
pub struct SharedConfigTable {
    inner: Arc<RwLock<HashMap<BatchId, BatchConfig>>>,
}

impl SharedConfigTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigTable for SharedConfigTable {
    fn insert(&self, cfg: BatchConfig) -> Result<(), ConfigServiceError> {
        self.inner.write().insert(cfg.id.clone(), cfg);
        Ok(())
    }

    fn remove(&self, id: &BatchId) {
        self.inner.write().remove(id);
    }

    fn get(&self, id: &BatchId) -> Option<BatchConfig> {
        self.inner.read().get(id).cloned()
    }

    fn snapshot(&self) -> Vec<BatchConfig> {
        self.inner.read().values().cloned().collect()
    }
}

/// Fields needed to create a batch. `slot_id: None` allocates the lowest
/// unused slot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateBatchRequest {
    pub id: BatchId,
    pub name: String,
    pub sequence_package: String,
    pub slot_id: Option<SlotId>,
    pub auto_start: bool,
    pub hardware: BTreeMap<String, Value>,
    pub parameters: BTreeMap<String, Value>,
    pub process_id: Option<i64>,
    pub header_id: Option<String>,
    pub config: BTreeMap<String, Value>,
    pub barcode_scanner: Option<BarcodeScannerConfig>,
}

impl CreateBatchRequest {
    pub fn new(id: impl Into<BatchId>, name: impl Into<String>, sequence_package: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sequence_package: sequence_package.into(),
            slot_id: None,
            auto_start: false,
            hardware: BTreeMap::new(),
            parameters: BTreeMap::new(),
            process_id: None,
            header_id: None,
            config: BTreeMap::new(),
            barcode_scanner: None,
        }
    }
}

/// Fields to change on an existing batch. Dict-typed fields are merged, not
/// replaced (spec.md §4.11); `None` means "leave unchanged".
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UpdateBatchRequest {
    pub name: Option<String>,
    pub auto_start: Option<bool>,
    pub config: Option<BTreeMap<String, Value>>,
    pub parameters: Option<BTreeMap<String, Value>>,
    pub hardware: Option<BTreeMap<String, Value>>,
    pub process_id: Option<i64>,
    pub header_id: Option<String>,
}

struct ServiceState {
    full: StationConfig,
}

/// Batch Config Service (C11). Owns the YAML round trip and the shared
/// config table; callers that must also gate on "batch is running" (the
/// Batch Manager) check that themselves before calling `update`/`delete`.
pub struct BatchConfigService {
    config_path: PathBuf,
    table: Arc<dyn ConfigTable>,
    state: AsyncMutex<ServiceState>,
}

const MAX_BACKUPS: u32 = 5;

impl BatchConfigService {
    /// `full_config` is the already-loaded, already-validated
    /// `StationConfig` (see `container::ServiceContainer`); its `batches`
    /// list is mirrored into `table` so the two never start out of sync.
    pub fn new(config_path: PathBuf, table: Arc<dyn ConfigTable>, full_config: StationConfig) -> Self {
        for batch in &full_config.batches {
            let _ = table.insert(batch.clone());
        }
        Self { config_path, table, state: AsyncMutex::new(ServiceState { full: full_config }) }
    }

    pub fn table(&self) -> Arc<dyn ConfigTable> {
        Arc::clone(&self.table)
    }

    pub async fn create(&self, req: CreateBatchRequest) -> Result<BatchConfig, ConfigServiceError> {
        if req.name.trim().is_empty() {
            return Err(ConfigServiceError::Validation("name is required".to_string()));
        }
        if req.sequence_package.trim().is_empty() {
            return Err(ConfigServiceError::Validation("sequence_package is required".to_string()));
        }

        let mut guard = self.state.lock().await;
        if guard.full.batches.iter().any(|b| b.id == req.id) {
            return Err(ConfigServiceError::Validation(format!("batch already exists: {}", req.id)));
        }

        let slot_id = match req.slot_id {
            Some(slot) => {
                if guard.full.batches.iter().any(|b| b.slot_id == slot) {
                    return Err(ConfigServiceError::Validation(format!("slot {slot} already in use")));
                }
                slot
            }
            None => Self::lowest_unused_slot(&guard.full.batches)?,
        };

        let cfg = BatchConfig {
            id: req.id,
            name: req.name,
            sequence_package: req.sequence_package,
            slot_id,
            auto_start: req.auto_start,
            hardware: req.hardware,
            parameters: req.parameters,
            process_id: req.process_id,
            header_id: req.header_id,
            config: req.config,
            barcode_scanner: req.barcode_scanner,
        };

        let mut candidate = guard.full.clone();
        candidate.batches.push(cfg.clone());
        self.write_yaml(&candidate)?;

        if let Err(e) = self.table.insert(cfg.clone()) {
            warn!(batch_id = %cfg.id, error = %e, "in-memory config insert failed, rolling back yaml write");
            if let Err(rollback_err) = self.write_yaml(&guard.full) {
                warn!(batch_id = %cfg.id, error = %rollback_err, "yaml rollback also failed");
            }
            return Err(ConfigServiceError::Persistence(e.to_string()));
        }

        guard.full = candidate;
        info!(batch_id = %cfg.id, slot_id = %cfg.slot_id, "batch config created");
        Ok(cfg)
    }

    pub async fn update(&self, id: &BatchId, req: UpdateBatchRequest) -> Result<BatchConfig, ConfigServiceError> {
        let mut guard = self.state.lock().await;
        let index = guard
            .full
            .batches
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| ConfigServiceError::NotFound(id.clone()))?;

        let mut cfg = guard.full.batches[index].clone();
        if let Some(name) = req.name {
            cfg.name = name;
        }
        if let Some(auto_start) = req.auto_start {
            cfg.auto_start = auto_start;
        }
        if req.process_id.is_some() {
            cfg.process_id = req.process_id;
        }
        if req.header_id.is_some() {
            cfg.header_id = req.header_id;
        }
        cfg.merge_dicts(req.config, req.parameters, req.hardware);

        let mut candidate = guard.full.clone();
        candidate.batches[index] = cfg.clone();
        self.write_yaml(&candidate)?;

        if let Err(e) = self.table.insert(cfg.clone()) {
            if let Err(rollback_err) = self.write_yaml(&guard.full) {
                warn!(batch_id = %id, error = %rollback_err, "yaml rollback also failed");
            }
            return Err(ConfigServiceError::Persistence(e.to_string()));
        }

        guard.full = candidate;
        Ok(cfg)
    }

    pub async fn delete(&self, id: &BatchId) -> Result<(), ConfigServiceError> {
        let mut guard = self.state.lock().await;
        let index = guard
            .full
            .batches
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| ConfigServiceError::NotFound(id.clone()))?;

        let mut candidate = guard.full.clone();
        candidate.batches.remove(index);
        self.write_yaml(&candidate)?;
        self.table.remove(id);
        guard.full = candidate;
        info!(batch_id = %id, "batch config deleted");
        Ok(())
    }

    pub fn get(&self, id: &BatchId) -> Option<BatchConfig> {
        self.table.get(id)
    }

    pub fn list(&self) -> Vec<BatchConfig> {
        self.table.snapshot()
    }

    /// I1: the lowest slot in `1..=12` not already claimed by an existing
    /// batch.
    fn lowest_unused_slot(batches: &[BatchConfig]) -> Result<SlotId, ConfigServiceError> {
        let used: std::collections::HashSet<SlotId> = batches.iter().map(|b| b.slot_id).collect();
        SlotId::all().find(|slot| !used.contains(slot)).ok_or(ConfigServiceError::NoSlotAvailable)
    }

    /// Atomic write (temp file + rename) with up to [`MAX_BACKUPS`] rotated
    /// backups of the previous file (spec.md §4.11 step 3).
    fn write_yaml(&self, config: &StationConfig) -> Result<(), ConfigServiceError> {
        let yaml = serde_yaml::to_string(config).map_err(ConfigError::Parse)?;

        if self.config_path.exists() {
            self.rotate_backups()?;
        }

        let tmp_path = self.config_path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, yaml)
            .map_err(|e| ConfigServiceError::Persistence(format!("write {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &self.config_path)
            .map_err(|e| ConfigServiceError::Persistence(format!("rename into {}: {e}", self.config_path.display())))?;
        Ok(())
    }

    fn rotate_backups(&self) -> Result<(), ConfigServiceError> {
        let oldest = self.backup_path(MAX_BACKUPS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for generation in (1..MAX_BACKUPS).rev() {
            let from = self.backup_path(generation);
            let to = self.backup_path(generation + 1);
            if from.exists() {
                std::fs::rename(&from, &to)
                    .map_err(|e| ConfigServiceError::Persistence(format!("rotate backup: {e}")))?;
            }
        }
        std::fs::copy(&self.config_path, self.backup_path(1))
            .map_err(|e| ConfigServiceError::Persistence(format!("snapshot backup: {e}")))?;
        Ok(())
    }

    fn backup_path(&self, generation: u32) -> PathBuf {
        let file_name = self.config_path.file_name().and_then(|n| n.to_str()).unwrap_or("station.yaml");
        self.config_path.with_file_name(format!("{file_name}.bak.{generation}"))
    }
}

/// Load a `StationConfig` for `config_path`, tolerating a missing file (a
/// fresh station with no batches yet) by falling back to a minimal default
/// identity — used only by the CLI and tests, never by the manager's own
/// startup path (`StationConfig::load_default` there must fail loudly).
pub fn load_or_default(config_path: &Path, station_id: &str, station_name: &str) -> Result<StationConfig, ConfigError> {
    if config_path.exists() {
        StationConfig::load(config_path)
    } else {
        Ok(StationConfig {
            station: station_core::StationIdentity {
                id: station_id.to_string(),
                name: station_name.to_string(),
                description: String::new(),
            },
            server: Default::default(),
            backend: Default::default(),
            workflow: Default::default(),
            git_sync: Default::default(),
            paths: Default::default(),
            ipc: Default::default(),
            batches: Vec::new(),
        })
    }
}

#[cfg(test)]
#[path = "config_service_tests.rs"]
mod tests;
