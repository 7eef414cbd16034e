//! Test helpers for behavioral specifications.
//!
//! Drives the real `stationd`/`stationctl` binaries against an isolated,
//! per-test station directory — no library calls, the same black-box
//! posture the teacher's own `tests/specs/prelude.rs` takes toward `oj`/
//! `ojd`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

pub const SPEC_POLL_INTERVAL_MS: u64 = 20;
pub const SPEC_WAIT_MAX_MS: u64 = 5000;

/// Each `Station` binds its own ROUTER/SUB pair; the worker child process
/// re-reads `station.yaml` and must connect to the manager's real port, so
/// unlike the WebSocket listener these can't use the OS-ephemeral `0` —
/// every test gets its own pair from a shared counter instead.
static NEXT_IPC_PORT: AtomicU16 = AtomicU16::new(25_000);

fn reserve_ipc_ports() -> (u16, u16) {
    let router = NEXT_IPC_PORT.fetch_add(2, Ordering::Relaxed);
    (router, router + 1)
}

/// Returns the path to a binary built alongside the test harness itself,
/// mirroring the teacher's llvm-cov-aware, current_exe-relative lookup.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

fn stationd_binary() -> PathBuf {
    binary_path("stationd")
}

fn stationctl_binary() -> PathBuf {
    binary_path("stationctl")
}

/// Poll a condition until it returns true or the timeout elapses.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    let poll_interval = Duration::from_millis(SPEC_POLL_INTERVAL_MS);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

/// Fluent builder for one `stationctl` invocation.
pub struct CliBuilder {
    args: Vec<String>,
    config_path: PathBuf,
}

impl CliBuilder {
    fn new(config_path: PathBuf) -> Self {
        Self { args: Vec::new(), config_path }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    fn command(self) -> Command {
        let mut cmd = Command::new(stationctl_binary());
        cmd.args(&self.args);
        cmd.env("STATION_CONFIG", &self.config_path);
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn passes(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("stationctl should run");
        assert!(
            output.status.success(),
            "expected stationctl to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    pub fn fails(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("stationctl should run");
        assert!(
            !output.status.success(),
            "expected stationctl to fail, but it passed\nstdout: {}",
            String::from_utf8_lossy(&output.stdout)
        );
        RunAssert { output }
    }

    /// Run without asserting on the exit code, for callers that need to
    /// inspect both success and failure shapes themselves.
    pub fn run(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("stationctl should run");
        RunAssert { output }
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(expected), "stdout does not contain '{expected}'\nstdout: {stdout}");
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(expected), "stderr does not contain '{expected}'\nstderr: {stderr}");
        self
    }
}

/// A temporary station directory with its own config file, data dir, IPC
/// socket dir and (not yet running) daemon.
pub struct Station {
    dir: tempfile::TempDir,
    daemon: Option<Child>,
}

impl Station {
    /// Lay out an empty station: `station.yaml` naming isolated `data/`,
    /// `sequences/` and IPC socket directories, no backend URL configured
    /// (so no Sync Engine, no outbound HTTP in these tests).
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::create_dir_all(dir.path().join("sequences")).unwrap();
        let (router_port, sub_port) = reserve_ipc_ports();

        let yaml = format!(
            r#"
station:
  id: test-station
  name: Test Station
server:
  host: 127.0.0.1
  port: 0
paths:
  data_dir: {data_dir}
  sequences_dir: {sequences_dir}
ipc:
  router_port: {router_port}
  sub_port: {sub_port}
batches: []
"#,
            data_dir = dir.path().join("data").display(),
            sequences_dir = dir.path().join("sequences").display(),
        );
        std::fs::write(dir.path().join("station.yaml"), yaml).unwrap();

        Self { dir, daemon: None }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("station.yaml")
    }

    /// Drop a `manifest.yaml`-only sequence package under `sequences/<name>`,
    /// enough for a batch to resolve a hardware-less manifest. The CLI
    /// Sequence Worker subprocess itself is never exercised by these specs
    /// (it is the out-of-scope Python black box, spec.md §1); this is only
    /// so `SequenceManifest::load` succeeds where a test needs it to.
    pub fn install_sequence(&self, name: &str) {
        let pkg_dir = self.dir.path().join("sequences").join(name);
        std::fs::create_dir_all(&pkg_dir).unwrap();
        let manifest = format!(
            r#"
name: {name}
version: "1.0.0"
entry_point:
  module: "sequences.{name}.main"
  class_name: Sequence
steps: []
hardware: {{}}
parameters: {{}}
"#
        );
        std::fs::write(pkg_dir.join("manifest.yaml"), manifest).unwrap();
    }

    /// Run `stationctl` against this station's config.
    pub fn ctl(&self) -> CliBuilder {
        CliBuilder::new(self.config_path())
    }

    /// Start `stationd` as a real background process. Waits for the
    /// control socket to appear before returning so subsequent `ctl()`
    /// calls don't race the listener bind.
    pub fn start_daemon(&mut self) {
        assert!(self.daemon.is_none(), "daemon already started for this station");
        let child = Command::new(stationd_binary())
            .env("STATION_CONFIG", self.config_path())
            .env_remove("RUST_LOG")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("stationd should spawn");
        self.daemon = Some(child);

        let socket_path = self.dir.path().join("data").join("control.sock");
        let up = wait_for(SPEC_WAIT_MAX_MS, || socket_path.exists());
        assert!(up, "control socket never appeared at {}", socket_path.display());
    }

    /// PID of the running daemon process, for external `kill -9` in crash
    /// recovery specs.
    pub fn daemon_pid(&self) -> u32 {
        self.daemon.as_ref().expect("daemon not started").id()
    }

    /// SIGKILL the daemon itself (not a batch worker), simulating a
    /// manager-process crash.
    pub fn kill_daemon(&mut self) {
        if let Some(mut child) = self.daemon.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        if let Some(mut child) = self.daemon.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
