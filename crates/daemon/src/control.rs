// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin control protocol: the accessible control plane `stationctl`
//! drives in place of the out-of-scope REST surface (spec.md §1
//! Non-goals; see SPEC_FULL.md's crate-mapping table). One request, one
//! response, length-prefixed JSON over a Unix socket at
//! `<data_dir>/control.sock` — the same framing `station-wire` already
//! gives the worker IPC fabric, reused here for a second, simpler
//! transport rather than inventing another one.
//!
//! Grounded on the teacher's own `DaemonClient`/`Request`-`Response`
//! pattern (`crates/cli/src/client_queries.rs`): a tagged request enum, a
//! tagged response enum, one connection per call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use station_core::{BatchConfig, BatchId, Clock};
use station_storage::StatsSummary;
use station_wire::{read_message, write_message, FramingError};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config_service::{BatchConfigService, ConfigServiceError, CreateBatchRequest, UpdateBatchRequest};
use crate::manager::{BatchManager, BatchManagerStatus, BatchRuntimeStatus};
use crate::router::EventRouter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlRequest {
    ListBatches,
    ListConfigs,
    GetStatus { batch_id: BatchId },
    StartBatch { batch_id: BatchId },
    StopBatch { batch_id: BatchId },
    RestartBatch { batch_id: BatchId },
    GetStats { batch_id: BatchId, limit: i64 },
    CreateBatch(CreateBatchRequest),
    UpdateBatch { batch_id: BatchId, request: UpdateBatchRequest },
    DeleteBatch { batch_id: BatchId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlResponse {
    Ok,
    Statuses(BatchManagerStatus),
    Status(BatchRuntimeStatus),
    Stats(StatsSummary),
    Config(BatchConfig),
    Configs(Vec<BatchConfig>),
    Error(String),
}

impl ControlResponse {
    fn from_manager_result<T>(result: Result<T, station_core::ManagerError>, ok: impl FnOnce(T) -> Self) -> Self {
        match result {
            Ok(value) => ok(value),
            Err(e) => ControlResponse::Error(e.to_string()),
        }
    }

    fn from_config_result<T>(result: Result<T, ConfigServiceError>, ok: impl FnOnce(T) -> Self) -> Self {
        match result {
            Ok(value) => ok(value),
            Err(e) => ControlResponse::Error(e.to_string()),
        }
    }
}

/// Binds `socket_path` and serves [`ControlRequest`]s against a
/// [`BatchManager`] and [`BatchConfigService`] until `token` is cancelled.
pub struct ControlServer<C: Clock> {
    socket_path: PathBuf,
    manager: Arc<BatchManager<C>>,
    config_service: Arc<BatchConfigService>,
    router: Arc<EventRouter>,
}

impl<C: Clock + Send + Sync + 'static> ControlServer<C> {
    pub fn new(
        socket_path: PathBuf,
        manager: Arc<BatchManager<C>>,
        config_service: Arc<BatchConfigService>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self { socket_path, manager, config_service, router }
    }

    pub async fn serve(self, token: CancellationToken) -> std::io::Result<()> {
        if let Some(dir) = self.socket_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "control socket listening");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = std::fs::remove_file(&self.socket_path);
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let manager = Arc::clone(&self.manager);
                    let config_service = Arc::clone(&self.config_service);
                    let router = Arc::clone(&self.router);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, manager, config_service, router).await {
                            debug!(error = %e, "control connection ended");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection<C: Clock + Send + Sync + 'static>(
    mut stream: UnixStream,
    manager: Arc<BatchManager<C>>,
    config_service: Arc<BatchConfigService>,
    router: Arc<EventRouter>,
) -> Result<(), FramingError> {
    let request: ControlRequest = read_message(&mut stream).await?;
    let response = dispatch(request, manager.as_ref(), config_service.as_ref(), router.as_ref()).await;
    write_message(&mut stream, &response).await
}

async fn dispatch<C: Clock + Send + Sync>(
    request: ControlRequest,
    manager: &BatchManager<C>,
    config_service: &BatchConfigService,
    router: &EventRouter,
) -> ControlResponse {
    match request {
        ControlRequest::ListBatches => ControlResponse::Statuses(manager.get_all_batch_statuses().await),
        ControlRequest::ListConfigs => ControlResponse::Configs(config_service.list()),
        ControlRequest::GetStatus { batch_id } => {
            ControlResponse::from_manager_result(manager.get_batch_status(&batch_id).await, ControlResponse::Status)
        }
        ControlRequest::StartBatch { batch_id } => {
            ControlResponse::from_manager_result(manager.start_batch(&batch_id).await, |()| ControlResponse::Ok)
        }
        ControlRequest::StopBatch { batch_id } => {
            ControlResponse::from_manager_result(manager.stop_batch(&batch_id).await, |()| ControlResponse::Ok)
        }
        ControlRequest::RestartBatch { batch_id } => {
            ControlResponse::from_manager_result(manager.restart_batch(&batch_id).await, |()| ControlResponse::Ok)
        }
        ControlRequest::GetStats { batch_id, limit } => {
            ControlResponse::from_manager_result(manager.get_batch_stats(&batch_id, limit).await, ControlResponse::Stats)
        }
        ControlRequest::CreateBatch(req) => match config_service.create(req).await {
            Ok(cfg) => {
                let data = serde_json::to_value(&cfg).unwrap_or(serde_json::Value::Null);
                router.notify_batch_created(&cfg.id, data).await;
                ControlResponse::Config(cfg)
            }
            Err(e) => ControlResponse::Error(e.to_string()),
        },
        ControlRequest::UpdateBatch { batch_id, request } => {
            if manager.is_running(&batch_id) {
                return ControlResponse::Error(format!("batch {batch_id} is running, stop it before updating"));
            }
            ControlResponse::from_config_result(config_service.update(&batch_id, request).await, ControlResponse::Config)
        }
        ControlRequest::DeleteBatch { batch_id } => {
            if manager.is_running(&batch_id) {
                return ControlResponse::Error(format!("batch {batch_id} is running, stop it before deleting"));
            }
            match config_service.delete(&batch_id).await {
                Ok(()) => {
                    router.notify_batch_deleted(&batch_id).await;
                    ControlResponse::Ok
                }
                Err(e) => ControlResponse::Error(e.to_string()),
            }
        }
    }
}

/// `stationctl`'s half: one connection per call, matching the teacher's
/// own preference for a stateless admin client over a persistent session.
pub struct ControlClient {
    socket_path: PathBuf,
}

impl ControlClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub async fn call(&self, request: ControlRequest) -> Result<ControlResponse, ControlClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| ControlClientError::Connect(self.socket_path.clone(), e.to_string()))?;
        write_message(&mut stream, &request).await.map_err(|e| ControlClientError::Protocol(e.to_string()))?;
        read_message(&mut stream).await.map_err(|e| ControlClientError::Protocol(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlClientError {
    #[error("could not connect to stationd at {0}: {1} (is the daemon running?)")]
    Connect(PathBuf, String),

    #[error("control protocol error: {0}")]
    Protocol(String),
}

/// Conventional control socket location under a data directory.
pub fn default_socket_path(data_dir: &Path) -> PathBuf {
    data_dir.join("control.sock")
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
