// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed configuration tree, loaded from the station YAML file named by
//! `STATION_CONFIG` (default `./station.yaml`).

use crate::batch::BatchConfig;
use crate::error::ConfigError;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StationIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), cors: CorsConfig::default() }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub station_id: Option<String>,
    pub equipment_id: Option<String>,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

fn default_backend_timeout_secs() -> u64 {
    10
}

fn default_sync_interval_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            station_id: None,
            equipment_id: None,
            timeout_secs: default_backend_timeout_secs(),
            sync_interval_secs: default_sync_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowInputMode {
    Barcode,
    Manual,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_input_mode")]
    pub input_mode: WorkflowInputMode,
    #[serde(default)]
    pub require_operator_login: bool,
    #[serde(default)]
    pub auto_sequence_start: bool,
    pub default_operator_id: Option<String>,
}

fn default_input_mode() -> WorkflowInputMode {
    WorkflowInputMode::Manual
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            input_mode: default_input_mode(),
            require_operator_login: false,
            auto_sequence_start: false,
            default_operator_id: None,
        }
    }
}

/// Carried on the config struct so the wire/config contract round-trips on
/// rewrite; the poller implementing `git_sync.*` is a separable subsystem
/// and is not implemented by this core (see DESIGN.md Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GitSyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub auto_pull: bool,
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for GitSyncConfig {
    fn default() -> Self {
        Self { enabled: false, poll_interval_secs: default_poll_interval_secs(), auto_pull: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_sequences_dir")]
    pub sequences_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_sequences_dir() -> String {
    "sequences".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { sequences_dir: default_sequences_dir(), data_dir: default_data_dir() }
    }
}

/// The manager process binds exactly one ROUTER socket (`router_port`) and
/// one SUB socket (`sub_port`); every worker process connects a DEALER to
/// the former and a PUB to the latter (spec.md §4.5, §6). All workers and
/// the manager run on the same physical station host, so both bind and
/// connect sides resolve to `127.0.0.1`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IpcConfig {
    #[serde(default = "default_router_port")]
    pub router_port: u16,
    #[serde(default = "default_sub_port")]
    pub sub_port: u16,
}

fn default_router_port() -> u16 {
    5555
}

fn default_sub_port() -> u16 {
    5557
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self { router_port: default_router_port(), sub_port: default_sub_port() }
    }
}

impl IpcConfig {
    /// `tcp://` endpoint for the manager's ROUTER socket (commands), used
    /// both to bind it and, by every worker's DEALER, to connect to it.
    pub fn router_endpoint(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.router_port)
    }

    /// `tcp://` endpoint for the manager's SUB socket (events), used both
    /// to bind it and, by every worker's PUB, to connect to it.
    pub fn sub_endpoint(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.sub_port)
    }
}

/// Full recognized configuration tree for the station control service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StationConfig {
    pub station: StationIdentity,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub git_sync: GitSyncConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub batches: Vec<BatchConfig>,
}

impl StationConfig {
    /// Parse from a YAML document, apply environment overrides, then
    /// validate. Does not touch the filesystem; see `load` for that.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: StationConfig = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Read `STATION_CONFIG` (default `./station.yaml`), parse, override,
    /// and validate.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var("STATION_CONFIG").unwrap_or_else(|_| "./station.yaml".to_string());
        Self::load(Path::new(&path))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_yaml_str(&text)
    }

    /// `CORS_ALLOWED_ORIGINS` (comma-separated) overrides
    /// `server.cors.allowed_origins` when set.
    fn apply_env_overrides(&mut self) {
        if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
            self.server.cors.allowed_origins =
                origins.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }
    }

    /// Slot uniqueness and sequence-package-reference sanity, performed
    /// before the Service Container wires anything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_slots = HashSet::new();
        let mut seen_ids = HashSet::new();
        for batch in &self.batches {
            if !seen_ids.insert(batch.id.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate batch id: {}", batch.id)));
            }
            if !seen_slots.insert(batch.slot_id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate slot id {} (batch {})",
                    batch.slot_id, batch.id
                )));
            }
            if batch.sequence_package.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "batch {} has no sequence_package",
                    batch.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
