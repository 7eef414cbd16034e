// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use station_core::{ExecutionResultBuilder, LogEntryBuilder, StepResultStatus, SyncQueueItemBuilder};

async fn store() -> BatchStore {
    BatchStore::open_in_memory().await.expect("open in-memory store")
}

fn step(order: u32, name: &str, pass: bool) -> StepResultRow {
    StepResultRow {
        step_order: order,
        name: name.to_string(),
        status: if pass { StepResultStatus::Completed } else { StepResultStatus::Failed },
        pass: Some(pass),
        duration_ms: Some(500),
        payload: None,
        error: None,
    }
}

#[tokio::test]
async fn round_trips_execution_with_steps_in_order() {
    let store = store().await;
    let exec = ExecutionResultBuilder::default().started_at(1_000).build();
    store.create_execution(&exec).await.expect("create");

    let steps = vec![step(1, "mock_step_1", true), step(2, "mock_step_2", true), step(3, "mock_step_3", true)];
    store
        .complete_execution(&exec.execution_id, ExecutionStatus::Completed, Some(true), 5_000, 4_000, &steps)
        .await
        .expect("complete");

    let fetched = store.get_execution_with_steps(&exec.execution_id).await.expect("fetch");
    assert_eq!(fetched.status, ExecutionStatus::Completed);
    assert_eq!(fetched.overall_pass, Some(true));
    assert_eq!(fetched.duration_ms, Some(4_000));
    assert_eq!(fetched.steps.len(), 3);
    let orders: Vec<u32> = fetched.steps.iter().map(|s| s.step_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    for s in &fetched.steps {
        assert_eq!(s.pass, Some(true));
    }
}

#[tokio::test]
async fn marks_execution_synced() {
    let store = store().await;
    let exec = ExecutionResultBuilder::default().build();
    store.create_execution(&exec).await.expect("create");

    store.mark_execution_synced(&exec.execution_id, 42).await.expect("mark synced");
    let fetched = store.get_execution_with_steps(&exec.execution_id).await.expect("fetch");
    assert_eq!(fetched.synced_at, Some(42));
}

#[tokio::test]
async fn mark_execution_synced_not_found() {
    let store = store().await;
    let missing = ExecutionId::new();
    let result = store.mark_execution_synced(&missing, 1).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn sync_queue_enqueue_dequeue_and_count_pending() {
    let store = store().await;
    let item = SyncQueueItemBuilder::default().created_at(10).build();
    let id = store.enqueue(&item).await.expect("enqueue");
    assert_eq!(store.count_pending(5).await.expect("count"), 1);

    store.dequeue(id).await.expect("dequeue");
    assert_eq!(store.count_pending(5).await.expect("count"), 0);
}

#[tokio::test]
async fn mark_failed_increments_retry_and_is_pending_until_max() {
    let store = store().await;
    let item = SyncQueueItemBuilder::default().created_at(10).build();
    let id = store.enqueue(&item).await.expect("enqueue");

    for _ in 0..station_core::MAX_RETRIES {
        store.mark_failed(id, "timeout").await.expect("mark failed");
    }

    let pending = store.get_pending_items(10, station_core::MAX_RETRIES).await.expect("pending");
    assert!(pending.is_empty(), "item should no longer be pending after MAX_RETRIES failures");
}

#[tokio::test]
async fn get_pending_items_is_fifo_by_created_at() {
    let store = store().await;
    let first = SyncQueueItemBuilder::default().entity_id("wip-a").created_at(10).build();
    let second = SyncQueueItemBuilder::default().entity_id("wip-b").created_at(20).build();
    store.enqueue(&second).await.expect("enqueue second");
    store.enqueue(&first).await.expect("enqueue first");

    let pending = store.get_pending_items(10, 5).await.expect("pending");
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].entity_id, "wip-a");
    assert_eq!(pending[1].entity_id, "wip-b");
}

#[tokio::test]
async fn cleanup_old_items_removes_stale_exhausted_entries() {
    let store = store().await;
    let item = SyncQueueItemBuilder::default().created_at(0).build();
    let id = store.enqueue(&item).await.expect("enqueue");
    for _ in 0..station_core::MAX_RETRIES {
        store.mark_failed(id, "down").await.expect("mark failed");
    }

    let removed = store.cleanup_old_items(1_000_000, 1_000, station_core::MAX_RETRIES).await.expect("cleanup");
    assert_eq!(removed, 1);
    assert_eq!(store.count_pending(station_core::MAX_RETRIES).await.expect("count"), 0);
}

#[tokio::test]
async fn append_and_read_logs() {
    let store = store().await;
    let entry = LogEntryBuilder::default().message("hello").timestamp(5).build();
    store.append_log(&entry).await.expect("append");

    let logs = store.recent_logs(10).await.expect("recent");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "hello");
}

#[tokio::test]
async fn get_step_durations_sorted_ascending() {
    let store = store().await;
    let exec = ExecutionResultBuilder::default().build();
    store.create_execution(&exec).await.expect("create");
    let steps = vec![step(1, "a", true), step(2, "b", true)];
    store
        .complete_execution(&exec.execution_id, ExecutionStatus::Completed, Some(true), 1, 1, &steps)
        .await
        .expect("complete");

    let durations = store.get_step_durations().await.expect("durations");
    assert_eq!(durations, vec![500, 500]);
}
