// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Batch Worker's in-memory composite state: lifecycle phase, the
//! run-status of whatever execution is current, sequence metadata, the
//! current execution snapshot (if any), the last completed run, and the
//! backend connectivity state.

use crate::execution::StepResult;
use crate::ids::ExecutionId;

/// Batch Worker process lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Initializing,
    Ready,
    Running,
    Stopping,
    Stopped,
    Error,
}

crate::simple_display! {
    WorkerPhase {
        Initializing => "initializing",
        Ready => "ready",
        Running => "running",
        Stopping => "stopping",
        Stopped => "stopped",
        Error => "error",
    }
}

/// Run-status of the current (or most recently completed) execution.
/// Distinct from the persisted [`crate::ExecutionStatus`], which records
/// only the terminal outcome of a single finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Completed,
    Error,
}

crate::simple_display! {
    RunStatus {
        Idle => "idle",
        Starting => "starting",
        Running => "running",
        Stopping => "stopping",
        Completed => "completed",
        Error => "error",
    }
}

/// Parsed sequence manifest metadata, snapshotted into worker state at load.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SequenceMetadata {
    pub name: String,
    pub version: String,
    /// Step names in declaration order, used to prepopulate status snapshots
    /// and to display steps the execution never reached as "skipped".
    pub step_names: Vec<String>,
    pub parameter_defaults: serde_json::Value,
    pub hardware_requirements: Vec<String>,
}

/// Snapshot of an in-flight execution. Present only while `run_status` is
/// one of `{starting, running, stopping}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CurrentExecution {
    pub execution_id: ExecutionId,
    /// Epoch milliseconds.
    pub started_at: u64,
    pub current_step: Option<String>,
    pub step_index: u32,
    pub total_steps: u32,
    pub step_results: Vec<StepResult>,
    pub mes: Option<crate::execution::MesContext>,
    /// Full manifest step-names snapshot, so the UI can render steps the
    /// execution never reached as skipped.
    pub step_names: Vec<String>,
}

impl CurrentExecution {
    /// `progress = step_index / total_steps` whenever `total_steps > 0`,
    /// else `0.0`.
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            0.0
        } else {
            self.step_index as f64 / self.total_steps as f64
        }
    }

    /// `step_index <= total_steps` invariant check.
    pub fn step_index_in_range(&self) -> bool {
        self.step_index <= self.total_steps
    }

    /// If the execution carries MES context with a WIP id, it must also
    /// carry a process id and operator id (the tuple enables MES
    /// integration) — enforced at construction time by callers, checked
    /// here for tests and assertions.
    pub fn mes_tuple_complete(&self) -> bool {
        match &self.mes {
            None => true,
            Some(mes) => !mes.wip_id.is_empty() && mes.process_id != 0 && !mes.operator_id.is_empty(),
        }
    }
}

/// Preserved state of the most recently completed execution, for display
/// after the worker (or the execution) has returned to idle — survives
/// worker process restart via the store (see I3).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LastRunState {
    pub execution_id: ExecutionId,
    pub pass: bool,
    pub steps: Vec<StepResult>,
    /// Epoch milliseconds.
    pub completed_at: u64,
}

/// Backend connectivity as observed by this worker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BackendState {
    pub online: bool,
    pub station_id: String,
    pub process_session_id: Option<String>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self { online: true, station_id: String::new(), process_session_id: None }
    }
}

/// Composite worker state. Exactly one of `current_execution`/`last_run` is
/// considered "active" at a time; the transition between them happens only
/// through `complete_execution`/`cancel_execution` (see `station-engine`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkerState {
    pub phase: WorkerPhase,
    pub run_status: RunStatus,
    pub sequence: Option<SequenceMetadata>,
    pub current_execution: Option<CurrentExecution>,
    pub last_run: Option<LastRunState>,
    pub backend: BackendState,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            phase: WorkerPhase::Initializing,
            run_status: RunStatus::Idle,
            sequence: None,
            current_execution: None,
            last_run: None,
            backend: BackendState::default(),
        }
    }

    /// Replace the current execution with its completed form as the last
    /// run, and return the worker to idle. The two fields are never both
    /// populated.
    pub fn complete_execution(&mut self, pass: bool, completed_at: u64) {
        if let Some(exec) = self.current_execution.take() {
            self.last_run = Some(LastRunState {
                execution_id: exec.execution_id,
                pass,
                steps: exec.step_results,
                completed_at,
            });
        }
        self.run_status = RunStatus::Idle;
    }

    /// Discard the current execution without recording a last-run (used by
    /// STOP_SEQUENCE, which must not overwrite the previous last-run display).
    pub fn cancel_execution(&mut self) {
        self.current_execution = None;
        self.run_status = RunStatus::Idle;
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "worker_state_tests.rs"]
mod tests;
