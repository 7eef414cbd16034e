// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use station_core::FakeClock;

fn client() -> BackendClient<FakeClock> {
    BackendClient::new(BackendConfig::default()).expect("build client")
}

fn client_with_url(url: &str) -> BackendClient<FakeClock> {
    let mut config = BackendConfig::default();
    config.url = Some(url.to_string());
    BackendClient::new(config).expect("build client")
}

#[test]
fn parse_error_body_prefers_backend_error_code_shape() {
    let parsed = parse_error_body(&json!({"error_code": "PREREQUISITE_NOT_MET", "message": "prior process incomplete"}));
    assert_eq!(parsed.code.as_deref(), Some("PREREQUISITE_NOT_MET"));
    assert_eq!(parsed.message, "prior process incomplete");
}

#[test]
fn parse_error_body_falls_back_to_legacy_error_key() {
    let parsed = parse_error_body(&json!({"error": "DUPLICATE_PASS", "message": "already passed"}));
    assert_eq!(parsed.code.as_deref(), Some("DUPLICATE_PASS"));
}

#[test]
fn parse_error_body_falls_back_to_fastapi_detail() {
    let parsed = parse_error_body(&json!({"detail": "validation failed"}));
    assert_eq!(parsed.code, None);
    assert_eq!(parsed.message, "validation failed");
}

#[test]
fn parse_error_body_handles_dict_detail() {
    let parsed = parse_error_body(&json!({"detail": {"field": "wip_id", "issue": "missing"}}));
    assert!(parsed.message.contains("wip_id"));
}

#[test]
fn raise_backend_error_marks_5xx_as_retryable() {
    let err = raise_backend_error_parts(503, ParsedError { code: None, message: "down".into() }, "start_process");
    match err {
        BackendError::Backend { is_retryable, .. } => assert!(is_retryable),
        other => panic!("unexpected error variant: {other:?}"),
    }
}

#[test]
fn raise_backend_error_marks_4xx_as_not_retryable() {
    let err = raise_backend_error_parts(400, ParsedError { code: None, message: "bad request".into() }, "start_process");
    match err {
        BackendError::Backend { is_retryable, .. } => assert!(!is_retryable),
        other => panic!("unexpected error variant: {other:?}"),
    }
}

#[tokio::test]
async fn calls_without_configured_url_fail_fast() {
    let client = client();
    let result = client.health_check().await;
    assert!(!result);

    let err = client.lookup_wip("WIP-001", None).await.unwrap_err();
    assert!(matches!(err, BackendError::Backend { status: None, .. }));
}

#[tokio::test]
async fn wip_lookup_cache_short_circuits_a_second_call() {
    let client = client_with_url("http://127.0.0.1:1");
    client.wip_cache.write().insert("WIP-001".to_string(), 42);

    let result = client.lookup_wip("WIP-001", None).await.expect("cached lookup");
    assert_eq!(result.wip_int_id, 42);
    assert_eq!(result.status, "cached");
}

#[tokio::test]
async fn close_session_leaves_state_untouched_on_connection_failure() {
    let client = client_with_url("http://127.0.0.1:1");
    client.wip_cache.write().insert("WIP-001".to_string(), 42);
    *client.open_session.write() = Some(7);

    let result = client.close_session(7, SessionStatus::Cancelled).await;
    assert!(result.is_err());
    assert_eq!(client.wip_cache.read().len(), 1);
    assert_eq!(*client.open_session.read(), Some(7));
}
