use std::sync::Arc;

use station_core::{BatchConfigBuilder, FakeClock, IpcConfig};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config_service::SharedConfigTable;
use crate::ipc::IpcServer;
use crate::router::EventRouter;
use crate::spawn::FakeSpawner;

fn test_manager(dir: &std::path::Path) -> (Arc<BatchManager<FakeClock>>, Arc<BatchConfigService>) {
    let ipc_config = IpcConfig { router_port: 0, sub_port: 0 };
    let (ipc, _events_rx) = IpcServer::new(ipc_config);
    let table: Arc<dyn crate::config_service::ConfigTable> = Arc::new(SharedConfigTable::new());
    let batch = BatchConfigBuilder::default().id("batch_a").name("Batch A").sequence_package("mock_success").build();
    let _ = table.insert(batch.clone());

    let station_config = station_core::StationConfig {
        station: station_core::StationIdentity { id: "station_1".to_string(), name: "Station One".to_string(), description: String::new() },
        server: Default::default(),
        backend: Default::default(),
        workflow: Default::default(),
        git_sync: Default::default(),
        paths: Default::default(),
        ipc: Default::default(),
        batches: vec![batch],
    };
    let config_service = Arc::new(BatchConfigService::new(dir.join("station.yaml"), Arc::clone(&table), station_config));

    let manager = Arc::new(BatchManager::new(
        dir.join("station.yaml"),
        dir.join("sequences"),
        dir.join("data"),
        table,
        Arc::clone(&ipc),
        Arc::new(FakeSpawner::long_lived()),
        FakeClock::new(),
    ));
    (manager, config_service)
}

#[tokio::test]
async fn dispatch_list_batches_reports_the_known_config() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, config_service) = test_manager(tmp.path());
    let router = EventRouter::new();

    let response = dispatch(ControlRequest::ListBatches, manager.as_ref(), config_service.as_ref(), &router).await;
    match response {
        ControlResponse::Statuses(statuses) => {
            assert_eq!(statuses.get("batch_a").map(|s| s.status.as_str()), Some("stopped"));
        }
        other => panic!("expected Statuses, got {other:?}"),
    }
}

#[tokio::test]
async fn dispatch_start_unknown_batch_returns_an_error_response() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, config_service) = test_manager(tmp.path());
    let router = EventRouter::new();

    let response = dispatch(
        ControlRequest::StartBatch { batch_id: BatchId::new("ghost") },
        manager.as_ref(),
        config_service.as_ref(),
        &router,
    )
    .await;
    assert!(matches!(response, ControlResponse::Error(_)));
}

#[tokio::test]
async fn dispatch_create_and_delete_batch_round_trips_through_the_config_service() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, config_service) = test_manager(tmp.path());
    let router = EventRouter::new();

    let create = CreateBatchRequest::new("batch_b", "Batch B", "mock_success");
    let response = dispatch(ControlRequest::CreateBatch(create), manager.as_ref(), config_service.as_ref(), &router).await;
    let created = match response {
        ControlResponse::Config(cfg) => cfg,
        other => panic!("expected Config, got {other:?}"),
    };
    assert_eq!(created.id, BatchId::new("batch_b"));

    let response = dispatch(
        ControlRequest::DeleteBatch { batch_id: created.id.clone() },
        manager.as_ref(),
        config_service.as_ref(),
        &router,
    )
    .await;
    assert!(matches!(response, ControlResponse::Ok));

    let response = dispatch(ControlRequest::ListConfigs, manager.as_ref(), config_service.as_ref(), &router).await;
    match response {
        ControlResponse::Configs(configs) => assert!(!configs.iter().any(|c| c.id == created.id)),
        other => panic!("expected Configs, got {other:?}"),
    }
}

#[tokio::test]
async fn dispatch_delete_and_update_reject_a_running_batch() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, config_service) = test_manager(tmp.path());
    let router = EventRouter::new();

    manager.start_batch(&BatchId::new("batch_a")).await.expect("start_batch");

    let response = dispatch(
        ControlRequest::DeleteBatch { batch_id: BatchId::new("batch_a") },
        manager.as_ref(),
        config_service.as_ref(),
        &router,
    )
    .await;
    assert!(matches!(response, ControlResponse::Error(_)), "delete while running should error, got {response:?}");

    let response = dispatch(
        ControlRequest::UpdateBatch { batch_id: BatchId::new("batch_a"), request: UpdateBatchRequest::default() },
        manager.as_ref(),
        config_service.as_ref(),
        &router,
    )
    .await;
    assert!(matches!(response, ControlResponse::Error(_)), "update while running should error, got {response:?}");

    manager.stop_batch(&BatchId::new("batch_a")).await.expect("stop_batch");
    let response = dispatch(
        ControlRequest::DeleteBatch { batch_id: BatchId::new("batch_a") },
        manager.as_ref(),
        config_service.as_ref(),
        &router,
    )
    .await;
    assert!(matches!(response, ControlResponse::Ok), "delete after stop should succeed, got {response:?}");
}

#[tokio::test]
async fn client_and_server_round_trip_over_the_unix_socket() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (manager, config_service) = test_manager(tmp.path());
    let socket_path = default_socket_path(tmp.path());

    let router = Arc::new(EventRouter::new());
    let server = ControlServer::new(socket_path.clone(), Arc::clone(&manager), Arc::clone(&config_service), router);
    let token = CancellationToken::new();
    let serve_token = token.clone();
    let handle = tokio::spawn(async move { server.serve(serve_token).await });

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while !socket_path.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let client = ControlClient::new(socket_path.clone());
    let response = client.call(ControlRequest::ListBatches).await.expect("call succeeds");
    assert!(matches!(response, ControlResponse::Statuses(_)));

    token.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn client_reports_a_connect_error_when_no_daemon_is_listening() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let client = ControlClient::new(tmp.path().join("no-such.sock"));
    let err = client.call(ControlRequest::ListBatches).await.unwrap_err();
    assert!(matches!(err, ControlClientError::Connect(_, _)));
}
