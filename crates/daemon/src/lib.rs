// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! station-daemon: the manager process. Owns the Batch Manager (C8), the
//! daemon side of the IPC fabric (C5), the Sync Engine (C4), the Event
//! Router (C9), the Batch Config Service (C11), and the Service Container
//! (C10) that wires all of them up in a fixed order.

pub mod config_service;
pub mod container;
pub mod control;
pub mod ipc;
pub mod logging;
pub mod manager;
pub mod router;
pub mod spawn;
pub mod sync;

pub use config_service::{
    load_or_default, BatchConfigService, ConfigServiceError, ConfigTable, CreateBatchRequest, SharedConfigTable,
    UpdateBatchRequest,
};
pub use container::{ContainerConfig, ServiceContainer, ServiceContainerError};
pub use control::{
    default_socket_path, ControlClient, ControlClientError, ControlRequest, ControlResponse, ControlServer,
};
pub use ipc::IpcServer;
pub use manager::{BatchManager, BatchManagerStatus, BatchRuntimeStatus};
pub use router::{EventRouter, StatusSnapshot};
pub use spawn::{ProcessSpawner, RealSpawner};
pub use sync::{SyncEngine, SyncTarget};
