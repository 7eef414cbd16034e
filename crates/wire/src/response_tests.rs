// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn ok_response_omits_error_field() {
    let resp = Response::ok("req-1", json!({"pong": true}));
    let value = serde_json::to_value(&resp).expect("encode");
    assert!(value.get("error").is_none());
    assert!(resp.is_ok());
}

#[test]
fn error_response_omits_data_field() {
    let resp = Response::error("req-1", "not running");
    let value = serde_json::to_value(&resp).expect("encode");
    assert!(value.get("data").is_none());
    assert!(!resp.is_ok());
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&ResponseStatus::Ok).expect("encode"), "\"ok\"");
    assert_eq!(serde_json::to_string(&ResponseStatus::Error).expect("encode"), "\"error\"");
}
