// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across crates.
//!
//! Each enum corresponds to one origin named in the error handling design:
//! manager/config-service errors, IPC errors, backend/token errors, worker
//! errors, store errors, and driver errors. Transport layers (IPC responses,
//! the CLI's exit codes) translate these into their own wire shapes; these
//! enums are the vocabulary they translate from.

use crate::ids::BatchId;
use thiserror::Error;

/// Errors raised by the Batch Manager and Batch Config Service.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("batch already exists: {0}")]
    AlreadyExists(BatchId),

    #[error("batch already running: {0}")]
    AlreadyRunning(BatchId),

    #[error("batch not running: {0}")]
    NotRunning(BatchId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("worker not ready, retry")]
    WorkerNotReady,

    #[error("failed to spawn worker process: {0}")]
    Spawn(String),

    #[error("worker for batch {0} did not register in time")]
    StartTimeout(BatchId),

    #[error(transparent)]
    Ipc(#[from] IpcError),
}

/// Errors raised by the IPC server/client.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("ipc connection error: {0}")]
    Connection(String),

    #[error("ipc timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("ipc protocol error: {0}")]
    Protocol(String),
}

/// Errors raised by the Backend Client (MES HTTP surface).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("WIP not found: {0}")]
    WipNotFound(String),

    /// BR-003: must complete the prior process before starting this one.
    #[error("prerequisite not met for process {process_id}")]
    PrerequisiteNotMet { process_id: i64 },

    /// BR-004: cannot re-PASS an already-passed process.
    #[error("duplicate pass for process {process_id}")]
    DuplicatePass { process_id: i64 },

    #[error("invalid WIP status: {0}")]
    InvalidWipStatus(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// 5xx or connection-level failure. `is_retryable` gates offline-queue
    /// enqueue versus surfacing to the caller as a hard error.
    #[error("backend error ({status:?}): {message}")]
    Backend {
        status: Option<u16>,
        message: String,
        is_retryable: bool,
    },
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Backend { is_retryable: true, .. })
    }
}

/// Errors raised by the Token Manager.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired and refresh failed")]
    TokenExpired,

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),
}

/// Errors raised by the Batch Worker (execution plane).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("sequence already running")]
    SequenceAlreadyRunning,

    #[error("no sequence running")]
    NotRunning,

    #[error("failed to start CLI sequence worker: {0}")]
    CliWorkerStart(String),

    #[error("failed to load sequence: {0}")]
    SequenceLoad(String),

    #[error(transparent)]
    Hardware(#[from] DriverError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error("worker error: {0}")]
    Other(String),
}

/// Errors raised dispatching `MANUAL_CONTROL` to a [`crate`]-level `Driver`.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("hardware integration error: {0}")]
    Integration(String),

    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("driver command failed: {command}: {message}")]
    Command { command: String, message: String },

    #[error("unknown driver command: {0}")]
    UnknownCommand(String),

    #[error("barcode scanner error: {0}")]
    BarcodeScanner(String),
}

/// Errors raised by the Persistent Store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Errors raised loading or validating [`crate::StationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("missing required configuration: {0}")]
    Missing(String),
}
