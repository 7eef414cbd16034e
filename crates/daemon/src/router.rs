// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Router (C9, spec.md §4.9): fans worker-emitted events (arriving
//! over the IPC event channel) out to WebSocket subscribers, and bridges
//! the CLI/operator-facing status query surface the same way.
//!
//! Re-expressed from the teacher's agent WebSocket attach proxy (a
//! client-side bridge) as a server: `station-daemon` owns the listener,
//! one outbox per connection, and a `conn -> set[batch_id]` subscription
//! table guarded by a single mutex (spec.md's own description of C9).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use station_core::BatchId;
use station_wire::{Event, EventType};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outbound mailbox capacity per connection. A subscriber slow enough to
/// fill this is dropped rather than let one stuck client back-pressure the
/// whole router (spec.md §4.9 design notes on backpressure).
const OUTBOX_CAPACITY: usize = 256;

pub type ConnectionId = u64;

/// What the Router asks the Batch Manager for when a client first
/// subscribes to a batch, so it doesn't have to wait for the next event to
/// learn the batch's current state. Implemented by `BatchManager<C>` so the
/// Router doesn't need to be generic over `Clock`.
#[async_trait::async_trait]
pub trait StatusSnapshot: Send + Sync {
    async fn status_snapshot(&self, batch_id: &BatchId) -> Option<Value>;
}

struct Connection {
    subscriptions: HashSet<BatchId>,
    outbox: mpsc::Sender<Message>,
}

/// WebSocket fan-out. One instance per manager process, shared by the
/// accept loop and the event-bridge task.
pub struct EventRouter {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self { connections: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a new, empty subscription set for a freshly accepted
    /// connection. Returns the id and the receiving half of its outbox,
    /// which the caller's write task drains onto the socket.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.connections.lock().await.insert(id, Connection { subscriptions: HashSet::new(), outbox: tx });
        (id, rx)
    }

    pub async fn disconnect(&self, conn: ConnectionId) {
        self.connections.lock().await.remove(&conn);
    }

    /// Add `batch_ids` to `conn`'s subscription set and immediately push
    /// each one's current status, via `manager`, so the client never waits
    /// for the next live event to learn where a batch stands.
    pub async fn subscribe(&self, conn: ConnectionId, batch_ids: &[BatchId], manager: &dyn StatusSnapshot) {
        let outbox = {
            let mut connections = self.connections.lock().await;
            let Some(entry) = connections.get_mut(&conn) else { return };
            for batch_id in batch_ids {
                entry.subscriptions.insert(batch_id.clone());
            }
            entry.outbox.clone()
        };

        for batch_id in batch_ids {
            if let Some(snapshot) = manager.status_snapshot(batch_id).await {
                let message = outbound_message("batch_status", batch_id, snapshot);
                let _ = outbox.try_send(Message::Text(message.to_string().into()));
            }
        }
    }

    pub async fn unsubscribe(&self, conn: ConnectionId, batch_ids: &[BatchId]) {
        let mut connections = self.connections.lock().await;
        if let Some(entry) = connections.get_mut(&conn) {
            for batch_id in batch_ids {
                entry.subscriptions.remove(batch_id);
            }
        }
    }

    /// Push to every connection subscribed to `batch_id`. A connection
    /// whose outbox is full is dropped rather than awaited on (a frozen
    /// client must not stall delivery to everyone else).
    pub async fn broadcast(&self, batch_id: &BatchId, message: Value) {
        let mut connections = self.connections.lock().await;
        let mut dead = Vec::new();
        for (&conn, entry) in connections.iter() {
            if !entry.subscriptions.contains(batch_id) {
                continue;
            }
            if entry.outbox.try_send(Message::Text(message.to_string().into())).is_err() {
                dead.push(conn);
            }
        }
        for conn in dead {
            warn!(conn, "event router outbox full, dropping connection");
            connections.remove(&conn);
        }
    }

    /// Push to every connection regardless of subscriptions; used only for
    /// station-wide events (batch created/deleted).
    pub async fn broadcast_all(&self, message: Value) {
        let mut connections = self.connections.lock().await;
        let mut dead = Vec::new();
        for (&conn, entry) in connections.iter() {
            if entry.outbox.try_send(Message::Text(message.to_string().into())).is_err() {
                dead.push(conn);
            }
        }
        for conn in dead {
            connections.remove(&conn);
        }
    }

    /// Station-wide notification that a new batch config exists (C11
    /// create), sent to every connection regardless of subscription since
    /// no client has subscribed to a batch id that didn't exist yet.
    pub async fn notify_batch_created(&self, batch_id: &BatchId, config: Value) {
        self.broadcast_all(outbound_message("batch_created", batch_id, config)).await;
    }

    /// Station-wide notification that a batch config was removed (C11
    /// delete).
    pub async fn notify_batch_deleted(&self, batch_id: &BatchId) {
        self.broadcast_all(outbound_message("batch_deleted", batch_id, json!({}))).await;
    }

    /// Drain the IPC event fan-in channel and forward recognized event
    /// types to their subscribers until `token` is cancelled. Event types
    /// outside the fan-out vocabulary (e.g. `PONG`) are dropped.
    pub async fn run_bridge(&self, mut events_rx: mpsc::UnboundedReceiver<Event>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.forward(event).await,
                        None => return,
                    }
                }
            }
        }
    }

    async fn forward(&self, event: Event) {
        if !matches!(
            event.event_type,
            EventType::StatusUpdate
                | EventType::StepStart
                | EventType::StepComplete
                | EventType::SequenceComplete
                | EventType::Log
                | EventType::Error
        ) {
            return;
        }
        let message = outbound_message(wire_type_name(event.event_type), &event.batch_id, event.data);
        self.broadcast(&event.batch_id, message).await;
    }

    /// Accept WebSocket connections on `addr` until `token` is cancelled.
    /// Each connection gets a read half (parsing `subscribe`/`unsubscribe`
    /// control frames) and a write half (draining its outbox), run
    /// concurrently until either end closes.
    pub async fn serve(
        self: Arc<Self>,
        addr: SocketAddr,
        manager: Arc<dyn StatusSnapshot>,
        token: CancellationToken,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "event router listening");
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let router = Arc::clone(&self);
                    let manager = Arc::clone(&manager);
                    let conn_token = token.clone();
                    tokio::spawn(async move {
                        if let Err(e) = router.handle_connection(stream, manager, conn_token).await {
                            debug!(%peer, error = %e, "event router connection ended");
                        }
                    });
                }
            }
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        manager: Arc<dyn StatusSnapshot>,
        token: CancellationToken,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws.split();
        let (conn, mut outbox) = self.connect().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                outgoing = outbox.recv() => {
                    match outgoing {
                        Some(message) => {
                            if write.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_control_frame(conn, &text, manager.as_ref()).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(conn, error = %e, "event router read error");
                            break;
                        }
                    }
                }
            }
        }

        self.disconnect(conn).await;
        Ok(())
    }

    async fn handle_control_frame(&self, conn: ConnectionId, text: &str, manager: &dyn StatusSnapshot) {
        let Ok(frame) = serde_json::from_str::<ControlFrame>(text) else {
            warn!(conn, "unrecognized event router control frame");
            return;
        };
        match frame.action.as_str() {
            "subscribe" => self.subscribe(conn, &frame.batch_ids, manager).await,
            "unsubscribe" => self.unsubscribe(conn, &frame.batch_ids).await,
            other => warn!(conn, action = other, "unknown event router action"),
        }
    }
}

#[derive(serde::Deserialize)]
struct ControlFrame {
    action: String,
    #[serde(default)]
    batch_ids: Vec<BatchId>,
}

/// Maps an internal [`EventType`] onto the outbound wire vocabulary
/// (`batch_status|step_start|step_complete|sequence_complete|log|error`,
/// plus `batch_created|batch_deleted` emitted directly by the Batch Config
/// Service rather than through an `EventType`, since no batch exists yet to
/// carry one). Only the six variants `forward` lets through reach here; the
/// rest fall back to the event's own screaming-snake-case name.
fn wire_type_name(event_type: EventType) -> &'static str {
    match event_type {
        EventType::StatusUpdate => "batch_status",
        EventType::StepStart => "step_start",
        EventType::StepComplete => "step_complete",
        EventType::SequenceComplete => "sequence_complete",
        EventType::Log => "log",
        EventType::Error => "error",
        EventType::Pong => "pong",
        EventType::BarcodeScanned => "barcode_scanned",
        EventType::WipProcessComplete => "wip_process_complete",
        EventType::InputRequest => "input_request",
    }
}

fn outbound_message(kind: &str, batch_id: &BatchId, data: Value) -> Value {
    json!({"type": kind, "batchId": batch_id, "data": data})
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
