// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker side of the IPC fabric (half of C5): a DEALER socket connected to
//! the manager's ROUTER (commands, this worker's `Register` handshake and
//! every reply correlated by `request_id`) and a PUB socket connected to
//! the manager's SUB (events, worker-to-manager only). Matches spec.md
//! §4.5's four-socket ZeroMQ topology — the manager binds, every worker
//! process connects.

use std::time::Duration;

use bytes::Bytes;
use station_core::{BatchId, IpcError};
use station_wire::{Command, Event, Register, RegisterAck, Response, REGISTER_ACK_TIMEOUT};
use zeromq::{DealerSocket, PubSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

/// A connected worker-side IPC client: a registered DEALER command
/// connection plus a PUB event sink.
pub struct WorkerIpcClient {
    dealer: DealerSocket,
    pub_socket: PubSocket,
    batch_id: BatchId,
}

impl WorkerIpcClient {
    /// Connect both sockets and complete the registration handshake on the
    /// DEALER (spec.md §4.5 steps 1-2). Fails if the manager does not
    /// acknowledge within [`REGISTER_ACK_TIMEOUT`].
    pub async fn connect(router_endpoint: &str, sub_endpoint: &str, batch_id: BatchId) -> Result<Self, IpcError> {
        let mut dealer = DealerSocket::new();
        dealer.connect(router_endpoint).await.map_err(|e| IpcError::Connection(e.to_string()))?;

        let mut pub_socket = PubSocket::new();
        pub_socket.connect(sub_endpoint).await.map_err(|e| IpcError::Connection(e.to_string()))?;

        let register_payload =
            serde_json::to_vec(&Register::new(batch_id.clone())).map_err(|e| IpcError::Protocol(e.to_string()))?;
        dealer
            .send(ZmqMessage::from(register_payload))
            .await
            .map_err(|e| IpcError::Connection(e.to_string()))?;

        let ack_message = tokio::time::timeout(REGISTER_ACK_TIMEOUT, dealer.recv())
            .await
            .map_err(|_| IpcError::Timeout(REGISTER_ACK_TIMEOUT))?
            .map_err(|e| IpcError::Connection(e.to_string()))?;
        let ack_payload = ack_message
            .into_vec()
            .pop_back()
            .ok_or_else(|| IpcError::Protocol("empty register ack message".to_string()))?;
        let ack: RegisterAck =
            serde_json::from_slice(&ack_payload).map_err(|e| IpcError::Protocol(e.to_string()))?;
        if !ack.is_ok() {
            return Err(IpcError::Protocol(format!("registration rejected: {}", ack.message)));
        }

        Ok(Self { dealer, pub_socket, batch_id })
    }

    /// Block for the next command addressed to this worker.
    pub async fn recv_command(&mut self) -> Result<Command, IpcError> {
        let message = self.dealer.recv().await.map_err(|e| IpcError::Connection(e.to_string()))?;
        let payload =
            message.into_vec().pop_back().ok_or_else(|| IpcError::Protocol("empty command message".to_string()))?;
        serde_json::from_slice(&payload).map_err(|e| IpcError::Protocol(e.to_string()))
    }

    /// Reply to a previously received command, correlated by `request_id`.
    pub async fn send_response(&mut self, response: &Response) -> Result<(), IpcError> {
        let payload = serde_json::to_vec(response).map_err(|e| IpcError::Protocol(e.to_string()))?;
        self.dealer.send(ZmqMessage::from(payload)).await.map_err(|e| IpcError::Connection(e.to_string()))
    }

    /// Publish one event, as `[batch_id_topic, payload]` so a future
    /// per-batch `SUB` filter could subscribe narrowly even though the
    /// manager currently subscribes to everything. Events are emitted in
    /// source order (spec.md §5 ordering guarantees); callers must not
    /// interleave concurrent writers on the same client.
    pub async fn send_event(&mut self, event: &Event) -> Result<(), IpcError> {
        let payload = serde_json::to_vec(event).map_err(|e| IpcError::Protocol(e.to_string()))?;
        let mut message = ZmqMessage::from(Bytes::from(self.batch_id.as_str().to_string().into_bytes()));
        message.push_back(Bytes::from(payload));
        self.pub_socket.send(message).await.map_err(|e| IpcError::Connection(e.to_string()))
    }

    /// Used by the Batch Worker's PING/SHUTDOWN paths to bound a single
    /// send under the IPC command timeout (spec.md §5, default 5000 ms).
    pub async fn send_event_with_timeout(&mut self, event: &Event, timeout: Duration) -> Result<(), IpcError> {
        tokio::time::timeout(timeout, self.send_event(event)).await.map_err(|_| IpcError::Timeout(timeout))?
    }
}

#[cfg(test)]
#[path = "ipc_client_tests.rs"]
mod tests;
