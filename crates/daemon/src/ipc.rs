// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon side of the IPC fabric (half of C5, spec.md §4.5): one ROUTER
//! socket (commands/responses, identity-addressed per worker) and one SUB
//! socket (worker-to-manager event fan-in), bound once for the manager
//! process's lifetime. Every batch worker connects a DEALER to the ROUTER
//! and a PUB to the SUB — the four-socket topology spec.md §4.5 and §6
//! describe, not a per-batch transport.
//!
//! Framing is ZeroMQ's own multipart messages, not `station-wire`'s
//! length-prefixed framing (that framing is for plain byte streams; it has
//! no role here). Commands/responses are addressed by the ROUTER's
//! automatically-assigned per-connection routing id: on `REGISTER`, the
//! manager learns that id from the incoming multipart's first frame and
//! maps `batch_id -> routing_id`; every subsequent command for that batch
//! is sent as `[routing_id, payload_json]`. Events are two-frame
//! `[batch_id_topic, payload_json]` so a future per-batch `SUB` filter
//! could subscribe narrowly; the manager itself subscribes to everything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use station_core::{BatchId, IpcConfig, IpcError};
use station_wire::{Command, Event, RegisterAck, Response};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

/// A registered worker's ROUTER routing id plus the table of commands
/// awaiting a reply, keyed by `request_id`.
struct WorkerLink {
    identity: Bytes,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>,
}

/// One queued send for the router task: either a command addressed to a
/// known routing id, or a registration acknowledgment.
enum Outbound {
    Payload { identity: Bytes, payload: Vec<u8> },
}

/// Daemon-side IPC server. One instance per manager process; `start` binds
/// both sockets once and spawns their poll loops. `open_batch` is kept as a
/// no-op for API symmetry with the per-batch worker lifecycle — unlike the
/// ZeroMQ topology's earlier per-batch Unix sockets, there is nothing left
/// to bind per batch; the worker simply connects to the already-running
/// ROUTER/SUB and registers.
pub struct IpcServer {
    config: IpcConfig,
    links: Mutex<HashMap<BatchId, WorkerLink>>,
    events_tx: mpsc::UnboundedSender<Event>,
    outbox_tx: mpsc::UnboundedSender<Outbound>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    router_port: std::sync::atomic::AtomicU16,
    sub_port: std::sync::atomic::AtomicU16,
}

impl IpcServer {
    /// Returns the server plus the receiving half of the event fan-in
    /// channel, which the Service Container hands to the Event Router.
    /// Does not bind any socket yet; call `start` for that.
    pub fn new(config: IpcConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                config,
                links: Mutex::new(HashMap::new()),
                events_tx,
                outbox_tx,
                outbox_rx: Mutex::new(Some(outbox_rx)),
                router_port: std::sync::atomic::AtomicU16::new(0),
                sub_port: std::sync::atomic::AtomicU16::new(0),
            }),
            events_rx,
        )
    }

    /// Bind the ROUTER (commands) and SUB (events) sockets and spawn their
    /// poll loops. Idempotent-unsafe — call exactly once per server.
    pub async fn start(self: &Arc<Self>) -> Result<(), IpcError> {
        let mut router = RouterSocket::new();
        let router_endpoint =
            router.bind(&self.config.router_endpoint()).await.map_err(|e| IpcError::Connection(e.to_string()))?;
        self.router_port.store(bound_port(&router_endpoint.to_string()), std::sync::atomic::Ordering::SeqCst);

        let mut sub = SubSocket::new();
        let sub_endpoint =
            sub.bind(&self.config.sub_endpoint()).await.map_err(|e| IpcError::Connection(e.to_string()))?;
        sub.subscribe("").await.map_err(|e| IpcError::Connection(e.to_string()))?;
        self.sub_port.store(bound_port(&sub_endpoint.to_string()), std::sync::atomic::Ordering::SeqCst);

        let outbox_rx = self
            .outbox_rx
            .lock()
            .take()
            .ok_or_else(|| IpcError::Connection("ipc server already started".to_string()))?;

        let router_server = Arc::clone(self);
        tokio::spawn(async move { router_server.run_router(router, outbox_rx).await });

        let sub_server = Arc::clone(self);
        tokio::spawn(async move { sub_server.run_sub(sub).await });

        info!(router = %self.config.router_endpoint(), sub = %self.config.sub_endpoint(), "ipc server bound");
        Ok(())
    }

    /// Resolved ROUTER port — differs from `config.router_port` only when
    /// the config asked for an OS-assigned ephemeral port (0), as in tests.
    pub fn router_port(&self) -> u16 {
        self.router_port.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Resolved SUB port, see `router_port`.
    pub fn sub_port(&self) -> u16 {
        self.sub_port.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// No-op: nothing is bound per batch in the shared-ROUTER/SUB
    /// topology. Kept so the Batch Manager's start sequence (spec.md §4.8
    /// step 2) doesn't need a topology-specific branch.
    pub fn open_batch(self: &Arc<Self>, _batch_id: &BatchId) -> Result<(), IpcError> {
        Ok(())
    }

    /// Owns the ROUTER socket exclusively: handles inbound registrations
    /// and responses, and drains `outbox_rx` for outbound commands. A
    /// single task interleaving both directions avoids needing two handles
    /// to one `&mut self` socket.
    async fn run_router(self: Arc<Self>, mut router: RouterSocket, mut outbox_rx: mpsc::UnboundedReceiver<Outbound>) {
        loop {
            tokio::select! {
                incoming = router.recv() => {
                    match incoming {
                        Ok(message) => self.handle_router_message(message).await,
                        Err(e) => {
                            error!(error = %e, "router socket recv failed, ipc fabric is down");
                            return;
                        }
                    }
                }
                outbound = outbox_rx.recv() => {
                    let Some(Outbound::Payload { identity, payload }) = outbound else { return };
                    let mut message = ZmqMessage::from(identity);
                    message.push_back(payload.into());
                    if let Err(e) = router.send(message).await {
                        error!(error = %e, "router socket send failed");
                    }
                }
            }
        }
    }

    async fn handle_router_message(&self, message: ZmqMessage) {
        let mut frames = message.into_vec();
        if frames.len() < 2 {
            warn!(frames = frames.len(), "router received a message with no identity or payload frame");
            return;
        }
        let Some(identity) = frames.pop_front() else { return };
        let Some(payload) = frames.pop_back() else { return };

        let value: serde_json::Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "router received a non-json payload frame");
                return;
            }
        };

        if value.get("type").and_then(|t| t.as_str()) == Some("REGISTER") {
            self.handle_register(identity, value).await;
            return;
        }

        match serde_json::from_value::<Response>(value) {
            Ok(response) => {
                let pending = self.links.lock().values().find_map(|link| {
                    if link.identity == identity {
                        Some(Arc::clone(&link.pending))
                    } else {
                        None
                    }
                });
                if let Some(pending) = pending {
                    if let Some(tx) = pending.lock().remove(&response.request_id) {
                        let _ = tx.send(response);
                    }
                } else {
                    debug!(request_id = %response.request_id, "response from an unregistered identity, dropping");
                }
            }
            Err(e) => warn!(error = %e, "router received a payload that is neither REGISTER nor Response"),
        }
    }

    async fn handle_register(&self, identity: Bytes, value: serde_json::Value) {
        let batch_id = match value.get("batch_id").and_then(|b| b.as_str()) {
            Some(id) => BatchId::new(id),
            None => {
                warn!("register message missing batch_id");
                return;
            }
        };

        let pending = Arc::new(Mutex::new(HashMap::new()));
        self.links.lock().insert(batch_id.clone(), WorkerLink { identity: identity.clone(), pending });
        info!(%batch_id, "worker registered");

        let ack = serde_json::to_vec(&RegisterAck::registered()).unwrap_or_default();
        if self.outbox_tx.send(Outbound::Payload { identity, payload: ack }).is_err() {
            error!(%batch_id, "router task gone, could not send register ack");
        }
    }

    /// Owns the SUB socket exclusively: every event frame pair received is
    /// parsed and forwarded onto the event fan-in channel the Event Router
    /// consumes.
    async fn run_sub(self: Arc<Self>, mut sub: SubSocket) {
        loop {
            let message = match sub.recv().await {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "sub socket recv failed, event fan-in is down");
                    return;
                }
            };
            let mut frames = message.into_vec();
            let Some(payload) = frames.pop_back() else {
                warn!("sub received an empty message");
                continue;
            };
            match serde_json::from_slice::<Event>(&payload) {
                Ok(event) => {
                    let _ = self.events_tx.send(event);
                }
                Err(e) => warn!(error = %e, "sub received a non-Event payload"),
            }
        }
    }

    /// A clone of the event fan-in sender, so the Batch Manager can push its
    /// own lifecycle events (BATCH_STARTED/STOPPED/CRASHED) onto the same
    /// channel worker-reported events arrive on.
    pub fn events_sender(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    pub fn is_worker_connected(&self, batch_id: &BatchId) -> bool {
        self.links.lock().contains_key(batch_id)
    }

    /// Poll `is_worker_connected` until it's true or `timeout` elapses
    /// (spec.md §4.5's `wait_for_worker`).
    pub async fn wait_for_worker(&self, batch_id: &BatchId, timeout: Duration, poll_interval: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_worker_connected(batch_id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Send `command` to its addressed batch and wait up to `timeout` for
    /// the correlated response.
    pub async fn send_command(&self, command: Command, timeout: Duration) -> Result<Response, IpcError> {
        let (identity, pending) = {
            let links = self.links.lock();
            let link = links
                .get(&command.batch_id)
                .ok_or_else(|| IpcError::Connection(format!("worker {} not registered", command.batch_id)))?;
            (link.identity.clone(), Arc::clone(&link.pending))
        };

        let request_id = command.request_id.clone();
        let (tx, rx) = oneshot::channel();
        pending.lock().insert(request_id.clone(), tx);

        let payload = serde_json::to_vec(&command).map_err(|e| IpcError::Protocol(e.to_string()))?;
        if self.outbox_tx.send(Outbound::Payload { identity, payload }).is_err() {
            pending.lock().remove(&request_id);
            return Err(IpcError::Connection("router task gone".to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpcError::Connection("worker dropped response channel".to_string())),
            Err(_) => {
                pending.lock().remove(&request_id);
                Err(IpcError::Timeout(timeout))
            }
        }
    }

    /// Drop this batch's registration, if any. Idempotent — safe to call on
    /// a batch that was never registered. The ROUTER/SUB sockets
    /// themselves are never torn down per batch.
    pub fn unregister(&self, batch_id: &BatchId) {
        self.links.lock().remove(batch_id);
    }
}

/// Pull the trailing `:port` off a ZeroMQ-resolved endpoint string (e.g.
/// `tcp://127.0.0.1:5555`), used to learn the OS-assigned port when the
/// config asked for the ephemeral `0`.
fn bound_port(endpoint: &str) -> u16 {
    endpoint.rsplit(':').next().and_then(|p| p.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
