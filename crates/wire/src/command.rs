// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands travel manager -> worker: `{type, batch_id, params, request_id}`.

use station_core::BatchId;

/// The fixed command vocabulary (§4.5, §6). `MANUAL_CONTROL` dispatches to
/// a `Driver`'s fixed `Command` variants (see `station-adapters::driver`) —
/// this `CommandType` is the IPC envelope's discriminant, not the driver
/// command itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    StartSequence,
    StopSequence,
    GetStatus,
    ManualControl,
    Shutdown,
    Ping,
}

station_core::simple_display! {
    CommandType {
        StartSequence => "START_SEQUENCE",
        StopSequence => "STOP_SEQUENCE",
        GetStatus => "GET_STATUS",
        ManualControl => "MANUAL_CONTROL",
        Shutdown => "SHUTDOWN",
        Ping => "PING",
    }
}

/// One command envelope sent from the manager's ROUTER-equivalent
/// connection to a specific worker's identity.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub batch_id: BatchId,
    #[serde(default)]
    pub params: serde_json::Value,
    pub request_id: String,
}

impl Command {
    pub fn new(command_type: CommandType, batch_id: BatchId, request_id: impl Into<String>) -> Self {
        Self { command_type, batch_id, params: serde_json::Value::Null, request_id: request_id.into() }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
