// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use station_core::BatchConfigBuilder;

async fn store() -> StationStore {
    StationStore::open_in_memory().await.expect("open in-memory store")
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let store = store().await;
    let cfg = BatchConfigBuilder::default().id("batch_1").slot_id(SlotId::new(3).expect("slot")).build();
    store.create_batch_config(&cfg).await.expect("create");

    let fetched = store.get_batch_config(&BatchId::new("batch_1")).await.expect("get");
    assert_eq!(fetched.slot_id.get(), 3);
    assert_eq!(fetched.name, cfg.name);
}

#[tokio::test]
async fn create_rejects_duplicate_id() {
    let store = store().await;
    let cfg = BatchConfigBuilder::default().id("batch_1").build();
    store.create_batch_config(&cfg).await.expect("create");

    let result = store.create_batch_config(&cfg).await;
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
async fn update_rejects_missing_id() {
    let store = store().await;
    let cfg = BatchConfigBuilder::default().id("ghost").build();
    let result = store.update_batch_config(&cfg).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn delete_removes_row() {
    let store = store().await;
    let cfg = BatchConfigBuilder::default().id("batch_1").build();
    store.create_batch_config(&cfg).await.expect("create");
    store.delete_batch_config(&BatchId::new("batch_1")).await.expect("delete");

    let result = store.get_batch_config(&BatchId::new("batch_1")).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn used_slots_reflects_all_configs() {
    let store = store().await;
    store
        .create_batch_config(
            &BatchConfigBuilder::default().id("batch_1").slot_id(SlotId::new(1).expect("slot")).build(),
        )
        .await
        .expect("create 1");
    store
        .create_batch_config(
            &BatchConfigBuilder::default().id("batch_2").slot_id(SlotId::new(5).expect("slot")).build(),
        )
        .await
        .expect("create 2");

    let mut slots: Vec<u8> = store.used_slots().await.expect("slots").into_iter().map(|s| s.get()).collect();
    slots.sort();
    assert_eq!(slots, vec![1, 5]);
}

#[tokio::test]
async fn list_batch_configs_orders_by_slot() {
    let store = store().await;
    store
        .create_batch_config(
            &BatchConfigBuilder::default().id("batch_2").slot_id(SlotId::new(2).expect("slot")).build(),
        )
        .await
        .expect("create 2");
    store
        .create_batch_config(
            &BatchConfigBuilder::default().id("batch_1").slot_id(SlotId::new(1).expect("slot")).build(),
        )
        .await
        .expect("create 1");

    let configs = store.list_batch_configs().await.expect("list");
    assert_eq!(configs[0].id, BatchId::new("batch_1"));
    assert_eq!(configs[1].id, BatchId::new("batch_2"));
}

#[tokio::test]
async fn register_and_read_station() {
    let store = store().await;
    store.register_station("station-1", "Bay 4", 1_000).await.expect("register");
    let at = store.station_registered_at("station-1").await.expect("read");
    assert_eq!(at, Some(1_000));
}
