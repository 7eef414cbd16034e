// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service Container (C10, spec.md §4.10): deterministic wiring of every
//! other component in the manager process, in a fixed init order, with a
//! teardown that reverses it and never lets one failed step skip the rest.
//!
//! Grounded on the teacher's own startup sequence (lock file, directories,
//! state load, then adapters, in `lifecycle::startup`) re-expressed for
//! this service's component graph instead of the teacher's agent runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use station_adapters::BackendClient;
use station_core::{Clock, StationConfig};
use station_storage::StationStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config_service::{BatchConfigService, SharedConfigTable};
use crate::ipc::IpcServer;
use crate::manager::BatchManager;
use crate::router::EventRouter;
use crate::spawn::{ProcessSpawner, RealSpawner};
use crate::sync::SyncEngine;

#[derive(Debug, thiserror::Error)]
pub enum ServiceContainerError {
    #[error("service container not initialized")]
    NotInitialized,

    #[error(transparent)]
    Store(#[from] station_core::StoreError),

    #[error(transparent)]
    Ipc(#[from] station_core::IpcError),

    #[error(transparent)]
    Backend(#[from] station_core::BackendError),
}

/// Everything the container needs to wire up a manager process that the
/// caller can't derive from `StationConfig` alone.
pub struct ContainerConfig {
    pub config_path: PathBuf,
    pub station_config: StationConfig,
    pub spawner: Arc<dyn ProcessSpawner>,
}

impl ContainerConfig {
    pub fn new(config_path: PathBuf, station_config: StationConfig) -> Self {
        Self { config_path, station_config, spawner: Arc::new(RealSpawner) }
    }
}

struct Wired<C: Clock> {
    station_store: StationStore,
    ipc: Arc<IpcServer>,
    manager: Arc<BatchManager<C>>,
    router: Arc<EventRouter>,
    config_service: Arc<BatchConfigService>,
    sync_engine: Option<Arc<SyncEngine<C>>>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

/// Owns the manager process's component graph. `initialize` is idempotent;
/// a second call is a no-op with a warning rather than a panic, matching
/// spec.md's "double init is a no-op with a warning."
pub struct ServiceContainer<C: Clock> {
    initialized: AtomicBool,
    wired: parking_lot::Mutex<Option<Wired<C>>>,
}

impl<C: Clock + Clone + Send + Sync + 'static> ServiceContainer<C> {
    pub fn new() -> Self {
        Self { initialized: AtomicBool::new(false), wired: parking_lot::Mutex::new(None) }
    }

    /// Wire every component in order: Persistent Store -> IPC Server ->
    /// Sequence Loader (directory check) -> Batch Manager (starting any
    /// `auto_start` batches) -> Event Router (WebSocket listener) -> Sync
    /// Engine, only if `backend.url` is configured.
    pub async fn initialize(
        &self,
        container_config: ContainerConfig,
        data_dir: PathBuf,
        sequences_dir: PathBuf,
        clock: C,
    ) -> Result<(), ServiceContainerError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("service container already initialized, ignoring duplicate initialize() call");
            return Ok(());
        }

        let ContainerConfig { config_path, station_config, spawner } = container_config;

        std::fs::create_dir_all(&data_dir).map_err(|e| station_core::StoreError::Database(e.to_string()))?;
        let station_store = StationStore::open(&data_dir.join("station.db")).await?;
        info!(path = %data_dir.join("station.db").display(), "persistent store opened");

        let config_table = Arc::new(SharedConfigTable::new());
        let config_service =
            Arc::new(BatchConfigService::new(config_path.clone(), config_table.clone(), station_config.clone()));
        info!(batches = station_config.batches.len(), "batch config table loaded");

        let (ipc, events_rx) = IpcServer::new(station_config.ipc.clone());
        ipc.start().await?;

        if let Err(e) = std::fs::create_dir_all(&sequences_dir) {
            warn!(path = %sequences_dir.display(), error = %e, "could not create sequences directory");
        }
        let package_count = std::fs::read_dir(&sequences_dir).map(|entries| entries.count()).unwrap_or(0);
        info!(count = package_count, dir = %sequences_dir.display(), "sequence packages discovered");

        let manager = Arc::new(BatchManager::new(
            config_path.clone(),
            sequences_dir,
            data_dir.clone(),
            config_table.clone() as Arc<dyn crate::config_service::ConfigTable>,
            Arc::clone(&ipc),
            spawner,
            clock.clone(),
        ));
        manager.start_auto_start_batches().await;
        info!("batch manager started");

        let router = Arc::new(EventRouter::new());
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        let bridge_router = Arc::clone(&router);
        let bridge_token = shutdown.clone();
        tasks.push(tokio::spawn(async move { bridge_router.run_bridge(events_rx, bridge_token).await }));

        let serve_router = Arc::clone(&router);
        let serve_manager: Arc<dyn crate::router::StatusSnapshot> = manager.clone();
        let serve_token = shutdown.clone();
        let addr = SocketAddr::new(
            station_config.server.host.parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED.into()),
            station_config.server.port,
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve_router.serve(addr, serve_manager, serve_token).await {
                warn!(error = %e, "event router listener exited");
            }
        }));

        let monitor_manager = Arc::clone(&manager);
        let monitor_token = shutdown.clone();
        tasks.push(tokio::spawn(async move { monitor_manager.run_monitor_loop(monitor_token).await }));

        let control_server = crate::control::ControlServer::new(
            crate::control::default_socket_path(&data_dir),
            Arc::clone(&manager),
            Arc::clone(&config_service),
            Arc::clone(&router),
        );
        let control_token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = control_server.serve(control_token).await {
                warn!(error = %e, "control socket listener exited");
            }
        }));

        let sync_engine = if station_config.backend.url.is_some() {
            let backend = BackendClient::new(station_config.backend.clone())?;
            let engine = Arc::new(SyncEngine::new(
                backend,
                config_table as Arc<dyn crate::config_service::ConfigTable>,
                data_dir,
                station_config.station.id.clone(),
                station_config.station.name.clone(),
                std::time::Duration::from_secs(station_config.backend.sync_interval_secs),
                clock,
            ));
            let sync_task_engine = Arc::clone(&engine);
            let sync_token = shutdown.clone();
            tasks.push(tokio::spawn(async move { sync_task_engine.run(sync_token).await }));
            info!("sync engine started");
            Some(engine)
        } else {
            info!("no backend url configured, sync engine not started");
            None
        };

        *self.wired.lock() =
            Some(Wired { station_store, ipc, manager, router, config_service, sync_engine, tasks, shutdown });
        Ok(())
    }

    pub fn manager(&self) -> Result<Arc<BatchManager<C>>, ServiceContainerError> {
        self.wired.lock().as_ref().map(|w| Arc::clone(&w.manager)).ok_or(ServiceContainerError::NotInitialized)
    }

    pub fn router(&self) -> Result<Arc<EventRouter>, ServiceContainerError> {
        self.wired.lock().as_ref().map(|w| Arc::clone(&w.router)).ok_or(ServiceContainerError::NotInitialized)
    }

    pub fn config_service(&self) -> Result<Arc<BatchConfigService>, ServiceContainerError> {
        self.wired.lock().as_ref().map(|w| Arc::clone(&w.config_service)).ok_or(ServiceContainerError::NotInitialized)
    }

    pub fn ipc(&self) -> Result<Arc<IpcServer>, ServiceContainerError> {
        self.wired.lock().as_ref().map(|w| Arc::clone(&w.ipc)).ok_or(ServiceContainerError::NotInitialized)
    }

    pub fn station_store(&self) -> Result<StationStore, ServiceContainerError> {
        self.wired.lock().as_ref().map(|w| w.station_store.clone()).ok_or(ServiceContainerError::NotInitialized)
    }

    pub fn is_connected_to_backend(&self) -> bool {
        self.wired.lock().as_ref().and_then(|w| w.sync_engine.as_ref()).map(|e| e.is_connected()).unwrap_or(false)
    }

    /// Reverse teardown order. Each step runs even if an earlier one
    /// failed or panicked a background task; nothing here can abort the
    /// overall shutdown.
    pub async fn shutdown(&self) {
        let wired = self.wired.lock().take();
        let Some(wired) = wired else {
            warn!("shutdown called on an uninitialized or already-shut-down service container");
            return;
        };

        wired.shutdown.cancel();
        for task in wired.tasks {
            let _ = task.await;
        }

        let running: Vec<_> = wired.manager.get_all_batch_statuses().await.into_iter().collect();
        for (batch_id, status) in running {
            if status.status == "running" || status.status == "starting" {
                let id = station_core::BatchId::new(batch_id);
                if let Err(e) = wired.manager.stop_batch(&id).await {
                    warn!(%id, error = %e, "failed to stop batch during shutdown");
                }
            }
        }

        info!("service container shut down");
        self.initialized.store(false, Ordering::SeqCst);
    }
}

impl<C: Clock + Clone + Send + Sync + 'static> Default for ServiceContainer<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
