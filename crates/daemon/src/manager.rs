// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch Manager (C8, spec.md §4.8): the single in-process authority over
//! which batches are running, owning both the runtime process handles and
//! (via `ConfigTable`) the static config every batch starts from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use station_core::{BatchConfig, BatchId, Clock, ManagerError};
use station_runbook::SequenceManifest;
use station_storage::{BatchStore, StatsSummary};
use station_wire::{Command, CommandType, Event, EventType, Response};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config_service::ConfigTable;
use crate::ipc::IpcServer;
use crate::router::StatusSnapshot;
use crate::spawn::ProcessSpawner;

const START_TIMEOUT: Duration = Duration::from_secs(10);
const START_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SLOW_START_THRESHOLD: Duration = Duration::from_secs(3);
const STOP_IPC_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_GRACE_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_COMMAND_WAIT: Duration = Duration::from_secs(10);
const GET_STATUS_TIMEOUT: Duration = Duration::from_secs(2);
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

struct BatchRuntimeHandle {
    child: Child,
    pid: Option<u32>,
    started_at_epoch_ms: u64,
}

/// `get_all_batch_statuses`' per-batch entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BatchRuntimeStatus {
    pub status: String,
    pub sequence_package: String,
    pub parameters: Value,
    pub slot_id: u8,
    pub pid: Option<u32>,
    pub worker_status: Option<Value>,
}

pub type BatchManagerStatus = HashMap<String, BatchRuntimeStatus>;

/// Single instance in the manager process. Owns `batches` (runtime process
/// handles); the static config table is shared with the Batch Config
/// Service via `config_table` rather than duplicated.
pub struct BatchManager<C: Clock> {
    config_path: PathBuf,
    sequences_dir: PathBuf,
    data_dir: PathBuf,
    config_table: Arc<dyn ConfigTable>,
    ipc: Arc<IpcServer>,
    spawner: Arc<dyn ProcessSpawner>,
    events_tx: mpsc::UnboundedSender<Event>,
    batches: Mutex<HashMap<BatchId, BatchRuntimeHandle>>,
    clock: C,
}

impl<C: Clock> BatchManager<C> {
    pub fn new(
        config_path: PathBuf,
        sequences_dir: PathBuf,
        data_dir: PathBuf,
        config_table: Arc<dyn ConfigTable>,
        ipc: Arc<IpcServer>,
        spawner: Arc<dyn ProcessSpawner>,
        clock: C,
    ) -> Self {
        let events_tx = ipc.events_sender();
        Self {
            config_path,
            sequences_dir,
            data_dir,
            config_table,
            ipc,
            spawner,
            events_tx,
            batches: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn iso_now(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.clock.epoch_ms() as i64)
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    fn emit_lifecycle(&self, batch_id: &BatchId, data: Value) {
        let event =
            Event { event_type: EventType::StatusUpdate, batch_id: batch_id.clone(), data, timestamp: self.iso_now() };
        let _ = self.events_tx.send(event);
    }

    pub fn is_running(&self, batch_id: &BatchId) -> bool {
        self.batches.lock().contains_key(batch_id)
    }

    /// Spawn any batches whose config has `auto_start: true`. Called once
    /// during Service Container init, after the manager itself exists.
    pub async fn start_auto_start_batches(&self) {
        let auto_start_ids: Vec<BatchId> =
            self.config_table.snapshot().into_iter().filter(|b| b.auto_start).map(|b| b.id).collect();
        for batch_id in auto_start_ids {
            if let Err(e) = self.start_batch(&batch_id).await {
                warn!(%batch_id, error = %e, "auto_start batch failed to start");
            }
        }
    }

    /// spec.md §4.8 `start_batch`.
    pub async fn start_batch(&self, batch_id: &BatchId) -> Result<(), ManagerError> {
        let mut config = self.config_table.get(batch_id).ok_or_else(|| ManagerError::BatchNotFound(batch_id.clone()))?;

        if self.is_running(batch_id) {
            return Err(ManagerError::AlreadyRunning(batch_id.clone()));
        }
        if self.ipc.is_worker_connected(batch_id) {
            warn!(%batch_id, "stale worker identity found before start, unregistering");
            self.ipc.unregister(batch_id);
        }

        if config.hardware.is_empty() {
            if let Some(hardware) = self.manifest_hardware(&config.sequence_package).await {
                config.hardware = hardware;
                let _ = self.config_table.insert(config.clone());
            }
        }

        self.ipc.open_batch(batch_id).map_err(ManagerError::Ipc)?;

        let start_began = self.clock.now();
        let child = self
            .spawner
            .spawn(&self.config_path, batch_id.as_str())
            .map_err(|e| ManagerError::Spawn(e.to_string()))?;
        let pid = child.id();

        self.batches.lock().insert(
            batch_id.clone(),
            BatchRuntimeHandle { child, pid, started_at_epoch_ms: self.clock.epoch_ms() },
        );

        let registered = self.ipc.wait_for_worker(batch_id, START_TIMEOUT, START_POLL_INTERVAL).await;
        let elapsed = self.clock.now().duration_since(start_began);
        if elapsed > SLOW_START_THRESHOLD {
            warn!(%batch_id, elapsed_ms = elapsed.as_millis() as u64, "worker registration was slow");
        }

        if !registered {
            self.force_stop(batch_id).await;
            return Err(ManagerError::StartTimeout(batch_id.clone()));
        }

        info!(%batch_id, pid, "batch started");
        self.emit_lifecycle(batch_id, serde_json::json!({"status": "started", "pid": pid}));
        Ok(())
    }

    async fn manifest_hardware(&self, sequence_package: &str) -> Option<std::collections::BTreeMap<String, Value>> {
        let package_dir = self.sequences_dir.join(sequence_package);
        match SequenceManifest::load(&package_dir).await {
            Ok(manifest) => Some(
                manifest
                    .hardware
                    .iter()
                    .map(|(key, def)| (key.clone(), serde_json::json!({"type": def.kind})))
                    .collect(),
            ),
            Err(e) => {
                warn!(sequence_package, error = %e, "could not load manifest for hardware auto-merge");
                None
            }
        }
    }

    /// spec.md §4.8 `stop_batch`.
    pub async fn stop_batch(&self, batch_id: &BatchId) -> Result<(), ManagerError> {
        if !self.is_running(batch_id) {
            return Err(ManagerError::NotRunning(batch_id.clone()));
        }

        if self.ipc.is_worker_connected(batch_id) {
            let command = Command::new(CommandType::Shutdown, batch_id.clone(), nanoid::nanoid!());
            if let Err(e) = self.ipc.send_command(command, STOP_IPC_TIMEOUT).await {
                warn!(%batch_id, error = %e, "shutdown command failed, proceeding to force stop");
            }
        }

        self.force_stop(batch_id).await;
        info!(%batch_id, "batch stopped");
        self.emit_lifecycle(batch_id, serde_json::json!({"status": "stopped"}));
        Ok(())
    }

    /// Graceful-join-then-SIGTERM-then-SIGKILL child stop plus IPC
    /// unregister, without emitting an event — used by both `stop_batch`
    /// (which emits BATCH_STOPPED itself) and a failed `start_batch`
    /// (which emits nothing, per spec.md's "if timeout, stop the child,
    /// unregister, raise").
    async fn force_stop(&self, batch_id: &BatchId) {
        let handle = self.batches.lock().remove(batch_id);
        if let Some(mut handle) = handle {
            match tokio::time::timeout(STOP_GRACE_TIMEOUT, handle.child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    if let Some(pid) = handle.pid {
                        send_signal(pid, Signal::Term);
                    }
                    if tokio::time::timeout(STOP_GRACE_TIMEOUT, handle.child.wait()).await.is_err() {
                        let _ = handle.child.start_kill();
                        let _ = handle.child.wait().await;
                    }
                }
            }
        }
        self.ipc.unregister(batch_id);
    }

    /// spec.md §4.8 `restart_batch` = stop ∘ start.
    pub async fn restart_batch(&self, batch_id: &BatchId) -> Result<(), ManagerError> {
        if self.is_running(batch_id) {
            self.stop_batch(batch_id).await?;
        }
        self.start_batch(batch_id).await
    }

    /// spec.md §4.8 `send_command`.
    pub async fn send_command(
        &self,
        batch_id: &BatchId,
        command_type: CommandType,
        params: Value,
    ) -> Result<Value, ManagerError> {
        if !self.is_running(batch_id) {
            return Err(ManagerError::NotRunning(batch_id.clone()));
        }
        if !self.ipc.is_worker_connected(batch_id) {
            if !self.ipc.wait_for_worker(batch_id, SEND_COMMAND_WAIT, START_POLL_INTERVAL).await {
                return Err(ManagerError::WorkerNotReady);
            }
        }

        let command = Command::new(command_type, batch_id.clone(), nanoid::nanoid!()).with_params(params);
        let response = self.ipc.send_command(command, SEND_COMMAND_WAIT).await.map_err(ManagerError::Ipc)?;
        Self::response_to_result(response)
    }

    fn response_to_result(response: Response) -> Result<Value, ManagerError> {
        if response.is_ok() {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(ManagerError::Validation(response.error.unwrap_or_else(|| "worker returned an error".to_string())))
        }
    }

    /// spec.md §4.8 `get_batch_status`.
    pub async fn get_batch_status(&self, batch_id: &BatchId) -> Result<BatchRuntimeStatus, ManagerError> {
        let config = self.config_table.get(batch_id).ok_or_else(|| ManagerError::BatchNotFound(batch_id.clone()))?;
        self.status_for(batch_id, &config).await
    }

    async fn status_for(&self, batch_id: &BatchId, config: &BatchConfig) -> Result<BatchRuntimeStatus, ManagerError> {
        let pid = self.batches.lock().get(batch_id).and_then(|h| h.pid);
        let running = self.is_running(batch_id);
        let connected = self.ipc.is_worker_connected(batch_id);

        let (status, worker_status) = if !running {
            ("stopped".to_string(), None)
        } else if !connected {
            ("starting".to_string(), None)
        } else {
            let command = Command::new(CommandType::GetStatus, batch_id.clone(), nanoid::nanoid!());
            match self.ipc.send_command(command, GET_STATUS_TIMEOUT).await {
                Ok(response) if response.is_ok() => ("running".to_string(), response.data),
                Ok(_) => ("running".to_string(), None),
                Err(e) => {
                    warn!(%batch_id, error = %e, "get_status request failed");
                    ("running".to_string(), None)
                }
            }
        };

        Ok(BatchRuntimeStatus {
            status,
            sequence_package: config.sequence_package.clone(),
            parameters: serde_json::to_value(&config.parameters).unwrap_or(Value::Null),
            slot_id: config.slot_id.get(),
            pid,
            worker_status,
        })
    }

    /// spec.md §4.8 `get_all_batch_statuses`: snapshot the key set first so
    /// a batch created/deleted mid-iteration can't shift the result.
    pub async fn get_all_batch_statuses(&self) -> BatchManagerStatus {
        let configs = self.config_table.snapshot();
        let mut statuses = HashMap::with_capacity(configs.len());
        for config in configs {
            match self.status_for(&config.id, &config).await {
                Ok(status) => {
                    statuses.insert(config.id.as_str().to_string(), status);
                }
                Err(e) => warn!(batch_id = %config.id, error = %e, "failed to read batch status"),
            }
        }
        statuses
    }

    /// Per-batch execution statistics (spec.md §4.8 "Statistics are always
    /// read from the per-batch store").
    pub async fn get_batch_stats(&self, batch_id: &BatchId, limit: i64) -> Result<StatsSummary, ManagerError> {
        let store = self.open_batch_store(batch_id).await?;
        let executions = store.list_executions(limit).await.map_err(|e| ManagerError::Persistence(e.to_string()))?;
        Ok(StatsSummary::from_executions(&executions))
    }

    async fn open_batch_store(&self, batch_id: &BatchId) -> Result<BatchStore, ManagerError> {
        let path = self.data_dir.join(format!("batch_{}.db", batch_id.as_str()));
        BatchStore::open(&path).await.map_err(|e| ManagerError::Persistence(e.to_string()))
    }

    /// spec.md §4.8 monitor loop: every second, pop any handle whose child
    /// has exited, unregister it, and emit BATCH_CRASHED with the exit
    /// code. Runs until `token` is cancelled.
    pub async fn run_monitor_loop(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(MONITOR_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => self.monitor_tick().await,
            }
        }
    }

    async fn monitor_tick(&self) {
        let batch_ids: Vec<BatchId> = self.batches.lock().keys().cloned().collect();
        for batch_id in batch_ids {
            let exit_status = {
                let mut batches = self.batches.lock();
                match batches.get_mut(&batch_id) {
                    Some(handle) => match handle.child.try_wait() {
                        Ok(Some(status)) => Some(status),
                        Ok(None) => None,
                        Err(e) => {
                            warn!(%batch_id, error = %e, "try_wait failed in monitor loop");
                            None
                        }
                    },
                    None => continue,
                }
            };

            if let Some(status) = exit_status {
                self.batches.lock().remove(&batch_id);
                self.ipc.unregister(&batch_id);
                let exit_code = status.code();
                warn!(%batch_id, exit_code, "batch crashed");
                self.emit_lifecycle(&batch_id, serde_json::json!({"status": "crashed", "exitCode": exit_code}));
            }
        }
    }
}

/// Lets the Event Router ask for a batch's current status on subscribe
/// without being generic over `Clock` itself.
#[async_trait::async_trait]
impl<C: Clock + Send + Sync> StatusSnapshot for BatchManager<C> {
    async fn status_snapshot(&self, batch_id: &BatchId) -> Option<Value> {
        self.get_batch_status(batch_id).await.ok().and_then(|status| serde_json::to_value(status).ok())
    }
}

enum Signal {
    Term,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    let raw = match signal {
        Signal::Term => nix::sys::signal::Signal::SIGTERM,
    };
    let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), raw);
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: Signal) {}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
