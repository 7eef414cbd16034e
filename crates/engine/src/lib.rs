// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! station-engine: the Batch Worker process (C7) and its two collaborators
//! — the CLI Sequence Worker (C6) that owns the sequence subprocess, and
//! the worker-side IPC client (half of C5) that speaks to the manager.

pub mod cli_worker;
pub mod ipc_client;
pub mod worker;

pub use cli_worker::{ChildEventKind, CliSequenceWorker, SpawnSpec};
pub use ipc_client::WorkerIpcClient;
pub use worker::{BatchWorker, WorkerDeps};
