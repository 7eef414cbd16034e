// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync Engine (C4, spec.md §4.4): three cooperative loops running in the
//! manager process — health, sync, heartbeat — draining each batch's
//! offline-work queue against the MES backend once connectivity is
//! confirmed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use station_adapters::{BackendClient, ProcessCompleteRequest, ProcessStartRequest, SerialConvertRequest};
use station_core::{BackendError, BatchId, Clock, SyncAction, SyncEntityType, SyncQueueItem, MAX_RETRIES};
use station_storage::BatchStore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config_service::ConfigTable;

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const SYNC_BATCH_SIZE: i64 = 10;

/// One batch's lazily-opened sync queue, kept open for the engine's
/// lifetime once first touched.
pub struct SyncTarget {
    pub batch_id: BatchId,
    pub store: BatchStore,
}

pub struct SyncEngine<C: Clock> {
    backend: BackendClient<C>,
    config_table: Arc<dyn ConfigTable>,
    data_dir: PathBuf,
    station_id: String,
    station_name: String,
    sync_interval: Duration,
    clock: C,
    connected: AtomicBool,
    consecutive_failures: AtomicU32,
    targets: Mutex<HashMap<BatchId, SyncTarget>>,
}

impl<C: Clock> SyncEngine<C> {
    pub fn new(
        backend: BackendClient<C>,
        config_table: Arc<dyn ConfigTable>,
        data_dir: PathBuf,
        station_id: impl Into<String>,
        station_name: impl Into<String>,
        sync_interval: Duration,
        clock: C,
    ) -> Self {
        Self {
            backend,
            config_table,
            data_dir,
            station_id: station_id.into(),
            station_name: station_name.into(),
            sync_interval,
            clock,
            connected: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            targets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Number of health checks that have failed in a row, reset on the
    /// next success. Surfaced in logs so an extended outage shows its
    /// own duration instead of repeating a bare "lost" line.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Drive all three loops until `token` is cancelled; in-flight HTTP
    /// calls are dropped when their owning loop's `select!` arm is
    /// cancelled (spec.md §4.4 "in-flight HTTP is aborted").
    pub async fn run(&self, token: CancellationToken) {
        tokio::join!(
            self.run_health_loop(token.clone()),
            self.run_sync_loop(token.clone()),
            self.run_heartbeat_loop(token.clone()),
        );
    }

    async fn run_health_loop(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(HEALTH_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => self.health_tick().await,
            }
        }
    }

    async fn health_tick(&self) {
        let healthy = self.backend.health_check().await;
        let was_connected = self.connected.swap(healthy, Ordering::Relaxed);

        if healthy {
            let prior_failures = self.consecutive_failures.swap(0, Ordering::Relaxed);
            if was_connected != healthy {
                info!(consecutive_failures = prior_failures, "backend connectivity restored");
            }
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if was_connected != healthy {
                warn!(consecutive_failures = failures, "backend connectivity lost");
            } else {
                warn!(consecutive_failures = failures, "backend still unreachable");
            }
        }
    }

    async fn run_sync_loop(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.sync_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => self.sync_tick().await,
            }
        }
    }

    async fn sync_tick(&self) {
        if !self.is_connected() {
            return;
        }

        let batch_ids: Vec<BatchId> = self.config_table.snapshot().into_iter().map(|b| b.id).collect();
        for batch_id in batch_ids {
            if let Err(e) = self.drain_batch(&batch_id).await {
                warn!(%batch_id, error = %e, "failed to open sync queue for batch");
            }
        }
    }

    async fn drain_batch(&self, batch_id: &BatchId) -> Result<(), station_core::StoreError> {
        let mut targets = self.targets.lock().await;
        let store = match targets.entry(batch_id.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.get().store.clone(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = self.data_dir.join(format!("batch_{}.db", batch_id.as_str()));
                let store = BatchStore::open(&path).await?;
                entry.insert(SyncTarget { batch_id: batch_id.clone(), store: store.clone() }).store.clone()
            }
        };
        drop(targets);

        let items = store.get_pending_items(SYNC_BATCH_SIZE, MAX_RETRIES).await?;
        for item in items {
            match self.dispatch(&item).await {
                Ok(()) => {
                    if let Err(e) = store.dequeue(item.id).await {
                        warn!(%batch_id, item_id = item.id, error = %e, "failed to dequeue synced item");
                    }
                }
                Err(e) => {
                    warn!(%batch_id, item_id = item.id, action = %item.action, error = %e, "sync dispatch failed");
                    if let Err(store_err) = store.mark_failed(item.id, &e.to_string()).await {
                        warn!(%batch_id, item_id = item.id, error = %store_err, "failed to record sync failure");
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, item: &SyncQueueItem) -> Result<(), BackendError> {
        match (item.entity_type, item.action) {
            (SyncEntityType::WipProcess, SyncAction::StartProcess) => self.dispatch_start_process(item).await,
            (SyncEntityType::WipProcess, SyncAction::CompleteProcess) => self.dispatch_complete_process(item).await,
            (SyncEntityType::WipProcess, SyncAction::ConvertToSerial) => self.dispatch_convert_to_serial(item).await,
            (entity_type, action) => Err(BackendError::Backend {
                status: None,
                message: format!("no MES endpoint for {entity_type}/{action}"),
                is_retryable: false,
            }),
        }
    }

    async fn resolve_wip_int_id(&self, item: &SyncQueueItem, process_id: i64) -> Result<i64, BackendError> {
        if let Some(id) = item.payload.get("wip_int_id").and_then(|v| v.as_i64()) {
            return Ok(id);
        }
        let wip_id = item.payload.get("wip_id").and_then(|v| v.as_str()).unwrap_or(&item.entity_id);
        self.backend.lookup_wip(wip_id, Some(process_id)).await.map(|r| r.wip_int_id)
    }

    async fn dispatch_start_process(&self, item: &SyncQueueItem) -> Result<(), BackendError> {
        let process_id = item.payload.get("process_id").and_then(|v| v.as_i64()).unwrap_or_default();
        let wip_int_id = self.resolve_wip_int_id(item, process_id).await?;
        let operator_id = item
            .payload
            .get("operator_id")
            .and_then(|v| v.as_str().and_then(|s| s.parse::<i64>().ok()).or_else(|| v.as_i64()));
        let equipment_id = item.payload.get("equipment_id").and_then(|v| v.as_str()).map(str::to_string);
        let request = ProcessStartRequest { process_id, operator_id, equipment_id, started_at: Some(self.iso_now()) };
        self.backend.start_process(wip_int_id, &request).await.map(|_| ())
    }

    async fn dispatch_complete_process(&self, item: &SyncQueueItem) -> Result<(), BackendError> {
        let process_id = item.payload.get("process_id").and_then(|v| v.as_i64()).unwrap_or_default();
        let wip_int_id = self.resolve_wip_int_id(item, process_id).await?;
        let operator_id = item
            .payload
            .get("operator_id")
            .and_then(|v| v.as_str().and_then(|s| s.parse::<i64>().ok()).or_else(|| v.as_i64()))
            .unwrap_or_default();
        let result = item.payload.get("result").and_then(|v| v.as_str()).unwrap_or("FAIL").to_string();
        let duration_ms = item.payload.get("duration_ms").and_then(|v| v.as_u64());
        let measurements = item.payload.get("measurements").cloned().unwrap_or_else(|| serde_json::json!({}));
        let defect_codes = item
            .payload
            .get("defects")
            .and_then(|v| v.as_array())
            .map(|defects| defects.iter().filter_map(|d| d.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let request = ProcessCompleteRequest {
            result,
            measurements,
            defect_codes,
            duration_ms,
            started_at: None,
            completed_at: Some(self.iso_now()),
        };
        self.backend.complete_process(wip_int_id, process_id, operator_id, &request).await.map(|_| ())
    }

    async fn dispatch_convert_to_serial(&self, item: &SyncQueueItem) -> Result<(), BackendError> {
        let wip_int_id = self.resolve_wip_int_id(item, 0).await?;
        let serial = item.payload.get("serial").and_then(|v| v.as_str()).map(str::to_string);
        self.backend.convert_to_serial(wip_int_id, &SerialConvertRequest { serial }).await.map(|_| ())
    }

    fn iso_now(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.clock.epoch_ms() as i64)
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    async fn run_heartbeat_loop(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => self.heartbeat_tick().await,
            }
        }
    }

    async fn heartbeat_tick(&self) {
        match self.backend.heartbeat(&self.station_id).await {
            Ok(()) => {}
            Err(BackendError::Backend { status: Some(404), .. }) => {
                warn!(station_id = %self.station_id, "station not registered, re-registering");
                if let Err(e) = self.backend.register_station(&self.station_id, &self.station_name).await {
                    warn!(station_id = %self.station_id, error = %e, "station re-registration failed");
                }
            }
            Err(e) => warn!(station_id = %self.station_id, error = %e, "heartbeat failed"),
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
