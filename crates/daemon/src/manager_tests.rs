use std::sync::Arc;
use std::time::Duration;

use station_core::{BatchConfigBuilder, FakeClock, IpcConfig};
use station_engine::WorkerIpcClient;
use station_wire::{CommandType, Response};

use super::*;
use crate::config_service::SharedConfigTable;
use crate::spawn::{FakeSpawner, ProcessSpawner};

async fn test_manager(dir: &std::path::Path) -> (Arc<BatchManager<FakeClock>>, Arc<IpcServer>) {
    let (ipc, _events_rx) = IpcServer::new(IpcConfig { router_port: 0, sub_port: 0 });
    ipc.start().await.expect("ipc start");
    let table: Arc<dyn ConfigTable> = Arc::new(SharedConfigTable::new());
    let _ = table.insert(BatchConfigBuilder::default().id("batch_a").name("Batch A").sequence_package("mock_success").build());
    let manager = Arc::new(BatchManager::new(
        dir.join("station.yaml"),
        dir.join("sequences"),
        dir.join("data"),
        table,
        Arc::clone(&ipc),
        Arc::new(FakeSpawner::long_lived()),
        FakeClock::new(),
    ));
    (manager, ipc)
}

#[tokio::test]
async fn start_batch_fails_for_unknown_batch() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, _ipc) = test_manager(tmp.path()).await;
    let err = manager.start_batch(&BatchId::new("ghost")).await.unwrap_err();
    assert!(matches!(err, ManagerError::BatchNotFound(_)));
}

#[tokio::test]
async fn send_command_and_status_fail_when_not_running() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, _ipc) = test_manager(tmp.path()).await;
    let batch_id = BatchId::new("batch_a");

    let err = manager.send_command(&batch_id, CommandType::Ping, Value::Null).await.unwrap_err();
    assert!(matches!(err, ManagerError::NotRunning(_)));

    let status = manager.get_batch_status(&batch_id).await.expect("status");
    assert_eq!(status.status, "stopped");
}

/// Spawns a fake worker that registers over IPC then answers every command
/// with `Response::ok`, echoing the command type in the reply payload.
async fn run_fake_worker(router_endpoint: String, sub_endpoint: String, batch_id: BatchId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut client = loop {
        match WorkerIpcClient::connect(&router_endpoint, &sub_endpoint, batch_id.clone()).await {
            Ok(c) => break c,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("fake worker failed to connect: {e}"),
        }
    };

    loop {
        let command = match client.recv_command().await {
            Ok(c) => c,
            Err(_) => return,
        };
        let response = Response::ok(command.request_id.clone(), serde_json::json!({"echo": command.command_type}));
        if client.send_response(&response).await.is_err() {
            return;
        }
    }
}

#[tokio::test]
async fn start_status_command_and_stop_round_trip() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, ipc) = test_manager(tmp.path()).await;
    let batch_id = BatchId::new("batch_a");

    let router_endpoint = format!("tcp://127.0.0.1:{}", ipc.router_port());
    let sub_endpoint = format!("tcp://127.0.0.1:{}", ipc.sub_port());
    let worker = tokio::spawn(run_fake_worker(router_endpoint, sub_endpoint, batch_id.clone()));

    manager.start_batch(&batch_id).await.expect("start_batch");
    assert!(manager.is_running(&batch_id));
    assert!(ipc.is_worker_connected(&batch_id));

    let err = manager.start_batch(&batch_id).await.unwrap_err();
    assert!(matches!(err, ManagerError::AlreadyRunning(_)));

    let status = manager.get_batch_status(&batch_id).await.expect("status");
    assert_eq!(status.status, "running");
    assert!(status.worker_status.is_some());

    let data = manager.send_command(&batch_id, CommandType::Ping, Value::Null).await.expect("send_command");
    assert_eq!(data["echo"], serde_json::json!("PING"));

    manager.stop_batch(&batch_id).await.expect("stop_batch");
    assert!(!manager.is_running(&batch_id));
    assert!(!ipc.is_worker_connected(&batch_id));

    worker.abort();
}

#[tokio::test]
async fn monitor_tick_detects_crash_and_emits_event() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (ipc, mut events_rx) = IpcServer::new(IpcConfig { router_port: 0, sub_port: 0 });
    ipc.start().await.expect("ipc start");
    let table: Arc<dyn ConfigTable> = Arc::new(SharedConfigTable::new());
    let _ = table.insert(BatchConfigBuilder::default().id("batch_a").name("Batch A").sequence_package("mock_success").build());
    let manager = BatchManager::new(
        tmp.path().join("station.yaml"),
        tmp.path().join("sequences"),
        tmp.path().join("data"),
        table,
        Arc::clone(&ipc),
        Arc::new(FakeSpawner::short_lived()),
        FakeClock::new(),
    );

    let batch_id = BatchId::new("batch_a");
    let child = FakeSpawner::short_lived().spawn(&tmp.path().join("station.yaml"), "batch_a").expect("spawn");
    manager.batches.lock().insert(batch_id.clone(), BatchRuntimeHandle {
        child,
        pid: None,
        started_at_epoch_ms: 0,
    });

    // Give the short-lived child time to exit before the manager polls it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.monitor_tick().await;

    assert!(!manager.is_running(&batch_id));
    let event = events_rx.try_recv().expect("crash event");
    assert_eq!(event.data["status"], serde_json::json!("crashed"));
}
