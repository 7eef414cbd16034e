// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI Sequence Worker (C6): spawns a sequence package's entry module as a
//! child process and parses its newline-delimited JSON event stream.
//!
//! The child's stdout/stderr pipes are blocking, so each is read on a
//! dedicated OS thread (mirroring `station_adapters::barcode::spawn_scan_loop`)
//! and forwarded onto an async channel the Batch Worker drains. `execution_id`
//! is deliberately absent from [`ChildEventKind`]: the Batch Worker is the
//! sole owner of that identity (spec.md §3 Ownership) and stamps it onto the
//! wire event when relaying, rather than trusting one parsed from child JSON.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use station_core::WorkerError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One step in the STEP_START/STEP_COMPLETE... table (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEventKind {
    StepStart { step: String, index: u32, total: u32, step_names: Option<Vec<String>> },
    StepComplete { step: String, index: u32, pass: bool, duration_ms: u64, payload: Value },
    Measurement { name: String, value: Value, unit: Option<String>, extras: Value },
    Log { level: String, message: String },
    Error { code: String, message: String, step: Option<String> },
    Status { status: String, progress: f64, current_step: Option<String> },
    InputRequest {
        id: String,
        prompt: String,
        input_type: String,
        options: Option<Vec<Value>>,
        default: Option<Value>,
        timeout_secs: Option<u64>,
    },
    SequenceComplete { overall_pass: bool, duration_ms: u64, result: Value, steps: Vec<Value> },
}

/// Raw shape of one JSON line from the child's stdout before it is
/// dispatched into a typed [`ChildEventKind`].
#[derive(Debug, serde::Deserialize)]
struct RawChildMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

fn field_str(data: &Value, key: &str) -> String {
    data.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn field_u32(data: &Value, key: &str) -> u32 {
    data.get(key).and_then(Value::as_u64).unwrap_or(0) as u32
}

fn field_u64(data: &Value, key: &str) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn field_bool(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn field_f64(data: &Value, key: &str) -> f64 {
    data.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn field_opt_str(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

impl RawChildMessage {
    fn into_event(self) -> Option<ChildEventKind> {
        let data = self.data;
        Some(match self.kind.as_str() {
            "step_start" => ChildEventKind::StepStart {
                step: field_str(&data, "step"),
                index: field_u32(&data, "index"),
                total: field_u32(&data, "total"),
                step_names: data
                    .get("step_names")
                    .and_then(Value::as_array)
                    .map(|v| v.iter().filter_map(|s| s.as_str().map(str::to_string)).collect()),
            },
            "step_complete" => ChildEventKind::StepComplete {
                step: field_str(&data, "step"),
                index: field_u32(&data, "index"),
                pass: field_bool(&data, "passed"),
                duration_ms: field_u64(&data, "duration"),
                payload: data.get("payload").cloned().unwrap_or(Value::Null),
            },
            "measurement" => ChildEventKind::Measurement {
                name: field_str(&data, "name"),
                value: data.get("value").cloned().unwrap_or(Value::Null),
                unit: field_opt_str(&data, "unit"),
                extras: data.get("extras").cloned().unwrap_or(Value::Null),
            },
            "log" => ChildEventKind::Log { level: field_str(&data, "level"), message: field_str(&data, "message") },
            "error" => ChildEventKind::Error {
                code: field_str(&data, "code"),
                message: field_str(&data, "message"),
                step: field_opt_str(&data, "step"),
            },
            "status" => ChildEventKind::Status {
                status: field_str(&data, "status"),
                progress: field_f64(&data, "progress"),
                current_step: field_opt_str(&data, "current_step"),
            },
            "input_request" => ChildEventKind::InputRequest {
                id: field_str(&data, "id"),
                prompt: field_str(&data, "prompt"),
                input_type: field_str(&data, "input_type"),
                options: data.get("options").and_then(Value::as_array).cloned(),
                default: data.get("default").cloned(),
                timeout_secs: data.get("timeout_secs").and_then(Value::as_u64),
            },
            "sequence_complete" => ChildEventKind::SequenceComplete {
                overall_pass: field_bool(&data, "overall_pass"),
                duration_ms: field_u64(&data, "duration"),
                result: data.get("result").cloned().unwrap_or(Value::Null),
                steps: data.get("steps").and_then(Value::as_array).cloned().unwrap_or_default(),
            },
            _ => return None,
        })
    }
}

/// What to spawn and how to configure it (spec.md §4.6 "Spawn").
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub sequence_package: String,
    pub sequences_dir: std::path::PathBuf,
    /// `{hardware, parameters, sequence: {name, version}, station_id}`,
    /// passed as the `--config` JSON argument.
    pub config: Value,
}

impl SpawnSpec {
    fn argv(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            format!("sequences.{}.main", self.sequence_package),
            "--start".to_string(),
            "--config".to_string(),
            self.config.to_string(),
        ]
    }
}

/// A running (or just-exited) sequence subprocess and its reader threads.
pub struct CliSequenceWorker {
    child: Child,
    stdin: std::process::ChildStdin,
    stdout_thread: Option<std::thread::JoinHandle<()>>,
    stderr_thread: Option<std::thread::JoinHandle<()>>,
    events_rx: Option<mpsc::UnboundedReceiver<ChildEventKind>>,
}

impl CliSequenceWorker {
    /// Spawn the sequence subprocess. Environment forces UTF-8 I/O; CWD is
    /// the sequences directory's parent (spec.md §6).
    pub fn spawn(spec: &SpawnSpec) -> Result<Self, WorkerError> {
        let parent_dir = spec.sequences_dir.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| spec.sequences_dir.clone());

        let mut command = Command::new("python");
        command.args(spec.argv()).current_dir(&parent_dir).env("PYTHONIOENCODING", "utf-8").env("LANG", "C.UTF-8");

        Self::spawn_command(command)
    }

    /// Spawn from a caller-built [`Command`] (stdio is always overridden to
    /// piped). Exposed so tests can exercise the reader/stop/wait machinery
    /// against a plain shell script instead of a real sequence subprocess.
    pub fn spawn_command(mut command: Command) -> Result<Self, WorkerError> {
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| WorkerError::CliWorkerStart(e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| WorkerError::CliWorkerStart("no stdin pipe".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| WorkerError::CliWorkerStart("no stdout pipe".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| WorkerError::CliWorkerStart("no stderr pipe".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();

        let stdout_tx = tx.clone();
        let stdout_thread = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let event = parse_stdout_line(&line);
                if stdout_tx.send(event).is_err() {
                    break;
                }
            }
        });

        let stderr_thread = std::thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let event = ChildEventKind::Log { level: "warning".to_string(), message: format!("[stderr] {line}") };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            stdout_thread: Some(stdout_thread),
            stderr_thread: Some(stderr_thread),
            events_rx: Some(rx),
        })
    }

    /// Takes the event receiver; callable once. The Batch Worker drains
    /// this on its own task until it closes (signaling child EOF).
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ChildEventKind>> {
        self.events_rx.take()
    }

    /// Write `{"type":"input_response","data":{"id":...,"value":...}}`.
    pub fn send_input(&mut self, request_id: &str, value: Value) -> Result<(), WorkerError> {
        let line = serde_json::json!({
            "type": "input_response",
            "data": {"id": request_id, "value": value},
        });
        self.write_line(&line)
    }

    fn write_line(&mut self, value: &Value) -> Result<(), WorkerError> {
        let mut line = value.to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).map_err(|e| WorkerError::Other(format!("stdin write failed: {e}")))?;
        self.stdin.flush().map_err(|e| WorkerError::Other(format!("stdin flush failed: {e}")))
    }

    /// Stop semantics (spec.md §4.6): stop message -> 5s -> SIGTERM -> 3s
    /// -> SIGKILL. Blocking; callers wrap in `spawn_blocking`.
    pub fn stop_blocking(&mut self) -> Result<(), WorkerError> {
        let _ = self.write_line(&serde_json::json!({"type": "command", "action": "stop"}));

        if wait_with_timeout(&mut self.child, Duration::from_secs(5)) {
            return Ok(());
        }

        let pid = Pid::from_raw(self.child.id() as i32);
        let _ = signal::kill(pid, Signal::SIGTERM);
        if wait_with_timeout(&mut self.child, Duration::from_secs(3)) {
            return Ok(());
        }

        let _ = signal::kill(pid, Signal::SIGKILL);
        self.child.wait().map_err(|e| WorkerError::Other(format!("failed to reap child after SIGKILL: {e}")))?;
        Ok(())
    }

    /// Joins the reader threads, waits for the child, and — if it exited
    /// non-zero without ever emitting `sequence_complete` — synthesizes one
    /// with `overall_pass=false` (I8). Blocking; callers wrap in
    /// `spawn_blocking`.
    pub fn wait_blocking(mut self, saw_sequence_complete: bool) -> Result<Option<ChildEventKind>, WorkerError> {
        if let Some(t) = self.stdout_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.stderr_thread.take() {
            let _ = t.join();
        }
        let status = self.child.wait().map_err(|e| WorkerError::Other(format!("failed to wait for child: {e}")))?;

        if saw_sequence_complete || status.success() {
            return Ok(None);
        }

        let code = status.code().unwrap_or(-1);
        Ok(Some(ChildEventKind::SequenceComplete {
            overall_pass: false,
            duration_ms: 0,
            result: serde_json::json!({"error": format!("subprocess exited with code {code}")}),
            steps: Vec::new(),
        }))
    }

    /// Underlying OS process id, for diagnostics/logging.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

fn parse_stdout_line(line: &str) -> ChildEventKind {
    match serde_json::from_str::<RawChildMessage>(line).ok().and_then(RawChildMessage::into_event) {
        Some(event) => event,
        None => ChildEventKind::Log { level: "debug".to_string(), message: line.to_string() },
    }
}

/// Polls `try_wait` until the child exits or `timeout` elapses.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {
                if std::time::Instant::now() >= deadline {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
#[path = "cli_worker_tests.rs"]
mod tests;
