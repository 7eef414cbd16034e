// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable execution results — the rows written to the per-batch store once
//! an execution reaches a terminal state.

use crate::ids::{BatchId, ExecutionId};

/// Terminal or in-flight status of a persisted execution row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

crate::simple_display! {
    ExecutionStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
    }
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// Status of one step within an execution, shared by the in-memory
/// `CurrentExecution` snapshot and the persisted step rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResultStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

crate::simple_display! {
    StepResultStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
    }
}

/// One step's outcome, used both for the live `CurrentExecution.step_results`
/// list and (as `StepResultStatus`) for persisted child rows.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepResultStatus,
    pub duration_ms: Option<u64>,
    pub payload: Option<serde_json::Value>,
}

impl StepResult {
    pub fn pending(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: StepResultStatus::Pending, duration_ms: None, payload: None }
    }

    pub fn pass(&self) -> Option<bool> {
        match self.status {
            StepResultStatus::Completed => Some(true),
            StepResultStatus::Failed => Some(false),
            _ => None,
        }
    }
}

/// MES context carried by an execution: the 착공/완공 tuple that must be
/// complete before a start-process call is attempted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MesContext {
    pub wip_id: String,
    pub wip_int_id: Option<i64>,
    pub process_id: i64,
    pub operator_id: String,
    /// Epoch milliseconds the process-session was opened.
    pub process_start_time: u64,
}

/// A single row in `execution_results`, with its ordered `step_results`
/// children (FK on-cascade). `status = running` implies `completed_at`
/// is `None`; every terminal status implies `completed_at.is_some()`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub batch_id: BatchId,
    pub sequence_name: String,
    pub sequence_version: String,
    pub status: ExecutionStatus,
    pub overall_pass: Option<bool>,
    pub started_at: u64,
    pub completed_at: Option<u64>,
    pub duration_ms: Option<u64>,
    pub parameters: serde_json::Value,
    pub steps: Vec<StepResultRow>,
    /// Epoch milliseconds of the last successful sync to the backend, if any.
    pub synced_at: Option<u64>,
}

impl ExecutionResult {
    /// `status=running` has `completed_at IS NULL`; every terminal status
    /// implies a set `completed_at`. Returns `false` if this invariant is
    /// violated.
    pub fn completed_at_consistent(&self) -> bool {
        match self.status {
            ExecutionStatus::Running => self.completed_at.is_none(),
            _ => self.completed_at.is_some(),
        }
    }
}

/// Persisted child row of an [`ExecutionResult`], one per step, ordered by
/// `step_order` ascending.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepResultRow {
    pub step_order: u32,
    pub name: String,
    pub status: StepResultStatus,
    pub pass: Option<bool>,
    pub duration_ms: Option<u64>,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
}

crate::builder! {
    pub struct ExecutionResultBuilder => ExecutionResult {
        into {
            sequence_name: String = "mock_success",
            sequence_version: String = "1.0.0",
        }
        set {
            execution_id: ExecutionId = ExecutionId::new(),
            batch_id: BatchId = BatchId::new("batch_1"),
            status: ExecutionStatus = ExecutionStatus::Running,
            overall_pass: Option<bool> = None,
            started_at: u64 = 0,
            completed_at: Option<u64> = None,
            duration_ms: Option<u64> = None,
            parameters: serde_json::Value = serde_json::Value::Null,
            steps: Vec<StepResultRow> = Vec::new(),
            synced_at: Option<u64> = None,
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
