// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stationd`: manager process by default, batch worker process when
//! invoked as `stationd --worker <batch_id>` — the manager re-execs itself
//! this way rather than forking a distinct worker binary (see
//! `station_daemon::spawn`).

use std::collections::HashMap;
use std::path::PathBuf;

use station_adapters::BackendClient;
use station_core::{BatchId, Clock, StationConfig, SystemClock};
use station_daemon::{logging, ContainerConfig, ServiceContainer};
use station_engine::{BatchWorker, WorkerDeps, WorkerIpcClient};
use station_storage::BatchStore;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("--worker") => {
            let Some(batch_id) = args.next() else {
                eprintln!("usage: stationd --worker <batch_id>");
                std::process::exit(2);
            };
            run_worker(BatchId::new(batch_id)).await;
        }
        Some(other) => {
            eprintln!("unrecognized argument: {other}");
            std::process::exit(2);
        }
        None => run_manager().await,
    }
}

async fn run_manager() {
    logging::init_manager_logging();

    let station_config = match StationConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load station config");
            std::process::exit(1);
        }
    };

    let config_path =
        PathBuf::from(std::env::var("STATION_CONFIG").unwrap_or_else(|_| "./station.yaml".to_string()));
    let data_dir = PathBuf::from(&station_config.paths.data_dir);
    let sequences_dir = PathBuf::from(&station_config.paths.sequences_dir);

    let container = ServiceContainer::<SystemClock>::new();
    let container_config = ContainerConfig::new(config_path, station_config);
    if let Err(e) = container.initialize(container_config, data_dir, sequences_dir, SystemClock).await {
        error!(error = %e, "service container failed to initialize");
        std::process::exit(1);
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    container.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler, waiting on ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Worker mode: re-derive everything from `STATION_CONFIG` and the batch
/// id argument alone, matching spec.md §4.10's "nothing but the batch id
/// and config path crosses the process boundary."
async fn run_worker(batch_id: BatchId) {
    let station_config = match StationConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("worker {batch_id}: failed to load station config: {e}");
            std::process::exit(1);
        }
    };

    let data_dir = PathBuf::from(&station_config.paths.data_dir);
    let logs_dir = data_dir.join("logs");
    let _log_guard = logging::init_worker_logging(&logs_dir, batch_id.as_str());

    let Some(config) = station_config.batches.iter().find(|b| b.id == batch_id).cloned() else {
        error!(%batch_id, "no config found for batch, worker exiting");
        std::process::exit(1);
    };

    let store = match BatchStore::open(&data_dir.join(format!("batch_{batch_id}.db"))).await {
        Ok(store) => store,
        Err(e) => {
            error!(%batch_id, error = %e, "failed to open batch store");
            std::process::exit(1);
        }
    };

    let backend = match BackendClient::new(station_config.backend.clone()) {
        Ok(backend) => backend,
        Err(e) => {
            error!(%batch_id, error = %e, "failed to construct backend client");
            std::process::exit(1);
        }
    };

    let ipc = match WorkerIpcClient::connect(
        &station_config.ipc.router_endpoint(),
        &station_config.ipc.sub_endpoint(),
        batch_id.clone(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!(%batch_id, error = %e, "failed to connect to manager over ipc");
            std::process::exit(1);
        }
    };

    let deps = WorkerDeps {
        batch_id: batch_id.clone(),
        station_id: station_config.station.id.clone(),
        config,
        store,
        backend,
        clock: SystemClock,
        sequences_dir: PathBuf::from(&station_config.paths.sequences_dir),
        // No concrete `Driver`/`BarcodeScanner` implementation ships in this
        // repo (hardware SDK integration is out of scope); a real deployment
        // supplies these through a vendor adapter crate wired in here.
        drivers: HashMap::new(),
        barcode_scanner: None,
        auto_sequence_start: station_config.workflow.auto_sequence_start,
    };

    let worker = match BatchWorker::start(deps, ipc).await {
        Ok(worker) => worker,
        Err(e) => {
            error!(%batch_id, error = %e, "batch worker failed to start");
            std::process::exit(1);
        }
    };

    if let Err(e) = worker.run().await {
        error!(%batch_id, error = %e, "batch worker exited with an error");
        std::process::exit(1);
    }
}
