// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entry — persisted alongside executions, and the shape of the LOG
//! IPC event's `data` payload.

use crate::ids::{BatchId, ExecutionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

crate::simple_display! {
    LogLevel {
        Debug => "debug",
        Info => "info",
        Warning => "warning",
        Error => "error",
    }
}

/// One log line, monotonically numbered per station.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub batch_id: BatchId,
    pub execution_id: Option<ExecutionId>,
    pub level: LogLevel,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

crate::builder! {
    pub struct LogEntryBuilder => LogEntry {
        into {
            message: String = "log message",
        }
        set {
            id: i64 = 0,
            batch_id: BatchId = BatchId::new("batch_1"),
            level: LogLevel = LogLevel::Info,
            timestamp: u64 = 0,
        }
        option {
            execution_id: ExecutionId = None,
        }
    }
}

#[cfg(test)]
#[path = "log_entry_tests.rs"]
mod tests;
