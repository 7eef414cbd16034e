use std::time::Duration;

use station_core::{BatchId, IpcConfig};
use station_engine::WorkerIpcClient;
use station_wire::{Command, CommandType, Response};

use super::*;

fn test_config() -> IpcConfig {
    IpcConfig { router_port: 0, sub_port: 0 }
}

#[tokio::test]
async fn registers_and_round_trips_a_command() {
    let (server, _events_rx) = IpcServer::new(test_config());
    server.start().await.expect("start");
    let batch_id = BatchId::new("batch_1");
    server.open_batch(&batch_id).expect("open_batch");

    let router_endpoint = format!("tcp://127.0.0.1:{}", server.router_port());
    let sub_endpoint = format!("tcp://127.0.0.1:{}", server.sub_port());

    let worker_batch_id = batch_id.clone();
    let worker = tokio::spawn(async move {
        let mut client = WorkerIpcClient::connect(&router_endpoint, &sub_endpoint, worker_batch_id)
            .await
            .expect("worker connect");
        let command = client.recv_command().await.expect("recv command");
        client
            .send_response(&Response::ok(command.request_id.clone(), serde_json::json!({"pong": true})))
            .await
            .expect("send response");
    });

    assert!(server.wait_for_worker(&batch_id, Duration::from_secs(2), Duration::from_millis(10)).await);

    let command = Command::new(CommandType::Ping, batch_id.clone(), "req-1");
    let response = server.send_command(command, Duration::from_secs(2)).await.expect("send_command");
    assert!(response.is_ok());
    assert_eq!(response.request_id, "req-1");

    worker.await.expect("worker task");
}

#[tokio::test]
async fn send_command_to_unregistered_batch_errors() {
    let (server, _events_rx) = IpcServer::new(test_config());
    server.start().await.expect("start");
    let batch_id = BatchId::new("ghost");
    let command = Command::new(CommandType::Ping, batch_id, "req-1");
    let result = server.send_command(command, Duration::from_millis(100)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let (server, _events_rx) = IpcServer::new(test_config());
    server.start().await.expect("start");
    let batch_id = BatchId::new("batch_1");
    server.unregister(&batch_id);
    server.unregister(&batch_id);
    assert!(!server.is_worker_connected(&batch_id));
}
