// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch worker process spawning. Re-expressed from the teacher's
//! effect-indirected agent spawn as a direct self-re-exec: the manager
//! binary re-invokes itself with `--worker <batch_id>`, and the worker
//! process reads `STATION_CONFIG` itself to find its own batch entry and
//! derive the ROUTER/SUB endpoints to connect to (see
//! `station_core::IpcConfig`). Nothing
//! about the batch's configuration crosses the process boundary except the
//! batch id and the config file path already in the environment.
//!
//! Spawning is behind the [`ProcessSpawner`] trait, the same capability-trait
//! shape `station-adapters::driver::Driver` uses, so tests can swap in a
//! spawner that starts a short-lived real process instead of re-exec'ing the
//! test binary itself.

use std::path::{Path, PathBuf};

use tokio::process::{Child, Command};

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, config_path: &Path, batch_id: &str) -> std::io::Result<Child>;
}

/// Production spawner: self-re-exec with `--worker <batch_id>`.
pub struct RealSpawner;

impl ProcessSpawner for RealSpawner {
    fn spawn(&self, config_path: &Path, batch_id: &str) -> std::io::Result<Child> {
        spawn_worker_process(config_path, batch_id)
    }
}

/// Spawn a worker process for `batch_id`, inheriting the manager's
/// environment (including `STATION_CONFIG`, which the worker re-reads) and
/// `RUST_LOG`/`STATION_LOG*`. The child's stdio is inherited so its own
/// `tracing` subscriber output interleaves with the manager's for anyone
/// watching the foreground session; the worker's file-backed logging (see
/// `logging::init_worker_logging`) is the durable record.
pub fn spawn_worker_process(config_path: &Path, batch_id: &str) -> std::io::Result<Child> {
    let exe = std::env::current_exe()?;
    Command::new(exe)
        .arg("--worker")
        .arg(batch_id)
        .env("STATION_CONFIG", config_path)
        .kill_on_drop(false)
        .spawn()
}

/// Test-only spawner that starts a real, short-lived, harmless child
/// process (`sleep`) instead of re-exec'ing the test binary, so
/// `BatchManager` tests can exercise the full start/stop/monitor lifecycle
/// against a real PID without recursively spawning the test harness.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeSpawner {
    pub command: PathBuf,
    pub args: Vec<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeSpawner {
    /// A spawner whose child exits almost immediately, for crash-detection
    /// tests.
    pub fn short_lived() -> Self {
        Self { command: PathBuf::from("/bin/sh"), args: vec!["-c".to_string(), "exit 0".to_string()] }
    }

    /// A spawner whose child sleeps well past any test's lifetime, for
    /// happy-path start/stop tests.
    pub fn long_lived() -> Self {
        Self { command: PathBuf::from("/bin/sh"), args: vec!["-c".to_string(), "sleep 300".to_string()] }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, _config_path: &Path, _batch_id: &str) -> std::io::Result<Child> {
        Command::new(&self.command).args(&self.args).kill_on_drop(true).spawn()
    }
}
