use station_core::BatchId;
use station_wire::{Event, EventType};
use tokio_util::sync::CancellationToken;

use super::*;

struct FixedSnapshot(Value);

#[async_trait::async_trait]
impl StatusSnapshot for FixedSnapshot {
    async fn status_snapshot(&self, _batch_id: &BatchId) -> Option<Value> {
        Some(self.0.clone())
    }
}

async fn recv_text(rx: &mut mpsc::Receiver<Message>) -> String {
    match tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await {
        Ok(Some(Message::Text(text))) => text.to_string(),
        other => panic!("expected a text message, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_pushes_a_status_snapshot_immediately() {
    let router = EventRouter::new();
    let batch_id = BatchId::new("batch_a");
    let (conn, mut outbox) = router.connect().await;
    let snapshot = FixedSnapshot(json!({"status": "running"}));

    router.subscribe(conn, &[batch_id.clone()], &snapshot).await;

    let text = recv_text(&mut outbox).await;
    let parsed: Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(parsed["type"], "batch_status");
    assert_eq!(parsed["batchId"], batch_id.as_str());
    assert_eq!(parsed["data"]["status"], "running");
}

#[tokio::test]
async fn broadcast_only_reaches_subscribers_of_that_batch() {
    let router = EventRouter::new();
    let batch_a = BatchId::new("batch_a");
    let batch_b = BatchId::new("batch_b");
    let snapshot = FixedSnapshot(Value::Null);

    let (conn_a, mut outbox_a) = router.connect().await;
    router.subscribe(conn_a, &[batch_a.clone()], &snapshot).await;
    let _ = recv_text(&mut outbox_a).await; // the subscribe snapshot

    let (conn_b, mut outbox_b) = router.connect().await;
    router.subscribe(conn_b, &[batch_b.clone()], &snapshot).await;
    let _ = recv_text(&mut outbox_b).await;

    router.broadcast(&batch_a, json!({"type": "log", "data": "hello"})).await;

    let text = recv_text(&mut outbox_a).await;
    assert!(text.contains("hello"));
    assert!(tokio::time::timeout(std::time::Duration::from_millis(100), outbox_b.recv()).await.is_err());
}

#[tokio::test]
async fn unsubscribe_stops_further_delivery() {
    let router = EventRouter::new();
    let batch_id = BatchId::new("batch_a");
    let snapshot = FixedSnapshot(Value::Null);
    let (conn, mut outbox) = router.connect().await;
    router.subscribe(conn, &[batch_id.clone()], &snapshot).await;
    let _ = recv_text(&mut outbox).await;

    router.unsubscribe(conn, &[batch_id.clone()]).await;
    router.broadcast(&batch_id, json!({"type": "log"})).await;

    assert!(tokio::time::timeout(std::time::Duration::from_millis(100), outbox.recv()).await.is_err());
}

#[tokio::test]
async fn broadcast_all_reaches_every_connection_regardless_of_subscription() {
    let router = EventRouter::new();
    let (_conn_a, mut outbox_a) = router.connect().await;
    let (_conn_b, mut outbox_b) = router.connect().await;

    router.broadcast_all(json!({"type": "batch_created"})).await;

    assert!(recv_text(&mut outbox_a).await.contains("batch_created"));
    assert!(recv_text(&mut outbox_b).await.contains("batch_created"));
}

#[tokio::test]
async fn disconnect_removes_the_connection_from_broadcasts() {
    let router = EventRouter::new();
    let (conn, outbox) = router.connect().await;
    drop(outbox);
    router.disconnect(conn).await;

    router.broadcast_all(json!({"type": "noop"})).await;
}

#[tokio::test]
async fn run_bridge_forwards_recognized_event_types_and_drops_others() {
    let router = Arc::new(EventRouter::new());
    let batch_id = BatchId::new("batch_a");
    let snapshot = FixedSnapshot(Value::Null);
    let (conn, mut outbox) = router.connect().await;
    router.subscribe(conn, &[batch_id.clone()], &snapshot).await;
    let _ = recv_text(&mut outbox).await;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let bridge_router = Arc::clone(&router);
    let bridge_token = token.clone();
    let bridge = tokio::spawn(async move { bridge_router.run_bridge(events_rx, bridge_token).await });

    events_tx
        .send(Event::pong(batch_id.clone(), "2026-07-28T00:00:00Z"))
        .expect("send pong");
    events_tx
        .send(Event::log(
            batch_id.clone(),
            station_wire::LogData { level: "INFO".to_string(), message: "hi".to_string() },
            "2026-07-28T00:00:01Z",
        ))
        .expect("send log");

    let text = recv_text(&mut outbox).await;
    assert!(text.contains("\"type\":\"log\""));

    token.cancel();
    let _ = bridge.await;
}

#[test]
fn wire_type_name_matches_the_documented_snake_case_vocabulary() {
    assert_eq!(wire_type_name(EventType::StatusUpdate), "batch_status");
    assert_eq!(wire_type_name(EventType::StepStart), "step_start");
    assert_eq!(wire_type_name(EventType::StepComplete), "step_complete");
    assert_eq!(wire_type_name(EventType::SequenceComplete), "sequence_complete");
    assert_eq!(wire_type_name(EventType::Log), "log");
    assert_eq!(wire_type_name(EventType::Error), "error");
}

#[tokio::test]
async fn notify_batch_created_and_deleted_reach_every_connection() {
    let router = EventRouter::new();
    let batch_id = BatchId::new("batch_c");
    let (_conn_a, mut outbox_a) = router.connect().await;
    let (_conn_b, mut outbox_b) = router.connect().await;

    router.notify_batch_created(&batch_id, json!({"name": "Batch C"})).await;
    let text = recv_text(&mut outbox_a).await;
    assert!(text.contains("\"type\":\"batch_created\""));
    assert!(text.contains("Batch C"));
    let _ = recv_text(&mut outbox_b).await;

    router.notify_batch_deleted(&batch_id).await;
    let text = recv_text(&mut outbox_a).await;
    assert!(text.contains("\"type\":\"batch_deleted\""));
    let _ = recv_text(&mut outbox_b).await;
}
