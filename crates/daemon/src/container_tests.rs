use station_core::{BackendConfig, GitSyncConfig, IpcConfig, PathsConfig, ServerConfig, StationIdentity, WorkflowConfig};

use super::*;
use crate::spawn::FakeSpawner;

fn test_config(_data_dir: &std::path::Path) -> StationConfig {
    StationConfig {
        station: StationIdentity { id: "station_1".to_string(), name: "Station One".to_string(), description: String::new() },
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, ..ServerConfig::default() },
        backend: BackendConfig::default(),
        workflow: WorkflowConfig::default(),
        git_sync: GitSyncConfig::default(),
        paths: PathsConfig::default(),
        ipc: IpcConfig { router_port: 0, sub_port: 0 },
        batches: Vec::new(),
    }
}

#[tokio::test]
async fn initialize_wires_every_accessor() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let container = ServiceContainer::<station_core::FakeClock>::new();
    let container_config = ContainerConfig {
        config_path: tmp.path().join("station.yaml"),
        station_config: test_config(tmp.path()),
        spawner: Arc::new(FakeSpawner::long_lived()),
    };

    container
        .initialize(container_config, tmp.path().join("data"), tmp.path().join("sequences"), station_core::FakeClock::new())
        .await
        .expect("initialize");

    assert!(container.manager().is_ok());
    assert!(container.router().is_ok());
    assert!(container.config_service().is_ok());
    assert!(container.ipc().is_ok());
    assert!(container.station_store().is_ok());
    assert!(!container.is_connected_to_backend());

    container.shutdown().await;
}

#[tokio::test]
async fn double_initialize_is_a_warned_no_op() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let container = ServiceContainer::<station_core::FakeClock>::new();
    let first = ContainerConfig {
        config_path: tmp.path().join("station.yaml"),
        station_config: test_config(tmp.path()),
        spawner: Arc::new(FakeSpawner::long_lived()),
    };
    container
        .initialize(first, tmp.path().join("data"), tmp.path().join("sequences"), station_core::FakeClock::new())
        .await
        .expect("initialize");

    let second = ContainerConfig {
        config_path: tmp.path().join("station.yaml"),
        station_config: test_config(tmp.path()),
        spawner: Arc::new(FakeSpawner::long_lived()),
    };
    container
        .initialize(second, tmp.path().join("data"), tmp.path().join("sequences"), station_core::FakeClock::new())
        .await
        .expect("second initialize is a no-op, not an error");

    container.shutdown().await;
}

#[tokio::test]
async fn accessors_fail_before_initialize_and_after_shutdown() {
    let container = ServiceContainer::<station_core::FakeClock>::new();
    assert!(matches!(container.manager(), Err(ServiceContainerError::NotInitialized)));

    let tmp = tempfile::tempdir().expect("tempdir");
    let container_config = ContainerConfig {
        config_path: tmp.path().join("station.yaml"),
        station_config: test_config(tmp.path()),
        spawner: Arc::new(FakeSpawner::long_lived()),
    };
    container
        .initialize(container_config, tmp.path().join("data"), tmp.path().join("sequences"), station_core::FakeClock::new())
        .await
        .expect("initialize");

    container.shutdown().await;
    assert!(matches!(container.manager(), Err(ServiceContainerError::NotInitialized)));
}
