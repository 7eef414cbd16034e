// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events travel worker -> manager (fan-in), then manager -> WebSocket
//! subscribers (fan-out, camelCase re-keyed — see `station-daemon::router`).
//! Envelope: `{type, batch_id, data, timestamp}`.

use station_core::{BatchId, ExecutionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    StepStart,
    StepComplete,
    SequenceComplete,
    Log,
    Error,
    StatusUpdate,
    Pong,
    BarcodeScanned,
    WipProcessComplete,
    InputRequest,
}

station_core::simple_display! {
    EventType {
        StepStart => "STEP_START",
        StepComplete => "STEP_COMPLETE",
        SequenceComplete => "SEQUENCE_COMPLETE",
        Log => "LOG",
        Error => "ERROR",
        StatusUpdate => "STATUS_UPDATE",
        Pong => "PONG",
        BarcodeScanned => "BARCODE_SCANNED",
        WipProcessComplete => "WIP_PROCESS_COMPLETE",
        InputRequest => "INPUT_REQUEST",
    }
}

/// Generic event envelope. `data`'s shape is determined by `event_type`;
/// see the `*Data` structs below for the recognized shapes, constructed via
/// the `Event::step_start` etc. helpers so producers cannot typo a field.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub batch_id: BatchId,
    pub data: serde_json::Value,
    /// ISO-8601 timestamp, matching the child sequence protocol's format.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepStartData {
    pub step: String,
    pub index: u32,
    pub total: u32,
    pub execution_id: ExecutionId,
    /// Included only on the first step of an execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepCompleteData {
    pub step: String,
    pub index: u32,
    pub duration_ms: u64,
    pub pass: bool,
    pub result: serde_json::Value,
    pub execution_id: ExecutionId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SequenceCompleteData {
    pub execution_id: ExecutionId,
    pub overall_pass: bool,
    pub duration_ms: u64,
    pub result: serde_json::Value,
    pub steps: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogData {
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusUpdateData {
    pub status: String,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BarcodeScannedData {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WipProcessCompleteData {
    pub wip_id: String,
    pub can_convert: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputRequestData {
    pub id: String,
    pub prompt: String,
    pub input_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub execution_id: ExecutionId,
}

impl Event {
    fn new(event_type: EventType, batch_id: BatchId, data: serde_json::Value, timestamp: impl Into<String>) -> Self {
        Self { event_type, batch_id, data, timestamp: timestamp.into() }
    }

    pub fn step_start(batch_id: BatchId, data: StepStartData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::StepStart, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn step_complete(batch_id: BatchId, data: StepCompleteData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::StepComplete, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn sequence_complete(batch_id: BatchId, data: SequenceCompleteData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::SequenceComplete, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn log(batch_id: BatchId, data: LogData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::Log, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn error(batch_id: BatchId, data: ErrorData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::Error, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn status_update(batch_id: BatchId, data: StatusUpdateData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::StatusUpdate, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn pong(batch_id: BatchId, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::Pong, batch_id, serde_json::json!({"pong": true}), timestamp)
    }

    pub fn barcode_scanned(batch_id: BatchId, data: BarcodeScannedData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::BarcodeScanned, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn wip_process_complete(batch_id: BatchId, data: WipProcessCompleteData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::WipProcessComplete, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }

    pub fn input_request(batch_id: BatchId, data: InputRequestData, timestamp: impl Into<String>) -> Self {
        Self::new(EventType::InputRequest, batch_id, serde_json::to_value(data).unwrap_or(serde_json::Value::Null), timestamp)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
