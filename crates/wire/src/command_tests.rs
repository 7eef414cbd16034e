// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use station_core::BatchId;

#[test]
fn command_type_serializes_to_screaming_snake_case() {
    let json = serde_json::to_string(&CommandType::StartSequence).expect("serialize");
    assert_eq!(json, "\"START_SEQUENCE\"");
}

#[test]
fn command_type_display_matches_wire_vocabulary() {
    assert_eq!(CommandType::ManualControl.to_string(), "MANUAL_CONTROL");
}

#[test]
fn command_round_trips_through_json() {
    let cmd = Command::new(CommandType::GetStatus, BatchId::new("batch_1"), "req-1")
        .with_params(json!({"foo": "bar"}));
    let encoded = serde_json::to_string(&cmd).expect("encode");
    let decoded: Command = serde_json::from_str(&encoded).expect("decode");
    assert_eq!(decoded, cmd);
}

#[test]
fn command_field_names_match_wire_contract() {
    let cmd = Command::new(CommandType::Ping, BatchId::new("batch_1"), "req-1");
    let value = serde_json::to_value(&cmd).expect("encode");
    assert!(value.get("type").is_some());
    assert!(value.get("batch_id").is_some());
    assert!(value.get("request_id").is_some());
}
