use station_core::{BatchConfig, BatchId, SlotId, StationConfig};

use super::*;

fn empty_station_config() -> StationConfig {
    StationConfig {
        station: station_core::StationIdentity {
            id: "station-1".to_string(),
            name: "Station 1".to_string(),
            description: String::new(),
        },
        server: Default::default(),
        backend: Default::default(),
        workflow: Default::default(),
        git_sync: Default::default(),
        paths: Default::default(),
        ipc: Default::default(),
        batches: Vec::new(),
    }
}

fn service(dir: &std::path::Path) -> BatchConfigService {
    let table: Arc<dyn ConfigTable> = Arc::new(SharedConfigTable::new());
    BatchConfigService::new(dir.join("station.yaml"), table, empty_station_config())
}

#[tokio::test]
async fn create_allocates_lowest_unused_slot() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());

    let first = svc.create(CreateBatchRequest::new("batch_a", "Batch A", "mock_success")).await.expect("create a");
    assert_eq!(first.slot_id, SlotId::FIRST);

    let second = svc.create(CreateBatchRequest::new("batch_b", "Batch B", "mock_success")).await.expect("create b");
    assert_eq!(second.slot_id, SlotId::new(2).expect("slot 2"));

    assert!(tmp.path().join("station.yaml").exists());
}

#[tokio::test]
async fn create_rejects_duplicate_id() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());
    svc.create(CreateBatchRequest::new("batch_a", "Batch A", "mock_success")).await.expect("create a");
    let err = svc.create(CreateBatchRequest::new("batch_a", "Batch A Again", "mock_success")).await.unwrap_err();
    assert!(matches!(err, ConfigServiceError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_empty_name() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());
    let err = svc.create(CreateBatchRequest::new("batch_a", "", "mock_success")).await.unwrap_err();
    assert!(matches!(err, ConfigServiceError::Validation(_)));
}

#[tokio::test]
async fn no_slot_available_when_all_twelve_taken() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());
    for n in 1..=12u8 {
        svc.create(CreateBatchRequest::new(format!("batch_{n}"), format!("Batch {n}"), "mock_success"))
            .await
            .unwrap_or_else(|_| panic!("create batch_{n}"));
    }
    let err = svc.create(CreateBatchRequest::new("batch_13", "Batch 13", "mock_success")).await.unwrap_err();
    assert!(matches!(err, ConfigServiceError::NoSlotAvailable));
}

#[tokio::test]
async fn update_merges_dict_fields_without_clobbering() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());
    let mut req = CreateBatchRequest::new("batch_a", "Batch A", "mock_success");
    req.parameters.insert("speed".to_string(), serde_json::json!(5));
    svc.create(req).await.expect("create");

    let mut update = UpdateBatchRequest::default();
    let mut params = std::collections::BTreeMap::new();
    params.insert("torque".to_string(), serde_json::json!(10));
    update.parameters = Some(params);

    let updated = svc.update(&BatchId::new("batch_a"), update).await.expect("update");
    assert_eq!(updated.parameters.get("speed"), Some(&serde_json::json!(5)));
    assert_eq!(updated.parameters.get("torque"), Some(&serde_json::json!(10)));
}

#[tokio::test]
async fn update_missing_batch_errors_not_found() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());
    let err = svc.update(&BatchId::new("ghost"), UpdateBatchRequest::default()).await.unwrap_err();
    assert!(matches!(err, ConfigServiceError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_from_yaml_and_table() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let svc = service(tmp.path());
    svc.create(CreateBatchRequest::new("batch_a", "Batch A", "mock_success")).await.expect("create");
    svc.delete(&BatchId::new("batch_a")).await.expect("delete");
    assert!(svc.get(&BatchId::new("batch_a")).is_none());

    let text = std::fs::read_to_string(tmp.path().join("station.yaml")).expect("read yaml");
    let reloaded: StationConfig = serde_yaml::from_str(&text).expect("parse yaml");
    assert!(reloaded.batches.is_empty());
}

/// I7: when the in-memory step fails, the yaml write must be rolled back to
/// its pre-create state.
struct FailingTable;

impl ConfigTable for FailingTable {
    fn insert(&self, _cfg: BatchConfig) -> Result<(), ConfigServiceError> {
        Err(ConfigServiceError::Persistence("simulated in-memory failure".to_string()))
    }
    fn remove(&self, _id: &BatchId) {}
    fn get(&self, _id: &BatchId) -> Option<BatchConfig> {
        None
    }
    fn snapshot(&self) -> Vec<BatchConfig> {
        Vec::new()
    }
}

#[tokio::test]
async fn create_rolls_back_yaml_when_in_memory_insert_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config_path = tmp.path().join("station.yaml");
    let table: Arc<dyn ConfigTable> = Arc::new(FailingTable);
    let svc = BatchConfigService::new(config_path.clone(), table, empty_station_config());

    let err = svc.create(CreateBatchRequest::new("batch_a", "Batch A", "mock_success")).await.unwrap_err();
    assert!(matches!(err, ConfigServiceError::Persistence(_)));

    let text = std::fs::read_to_string(&config_path).expect("read yaml after rollback");
    let reloaded: StationConfig = serde_yaml::from_str(&text).expect("parse yaml");
    assert!(reloaded.batches.is_empty(), "rolled-back yaml must not contain the failed batch");
}
