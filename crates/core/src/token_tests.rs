// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn not_expired_before_buffer_window() {
    let token = TokenInfo::builder().expires_at(10_000).build();
    assert!(!token.is_expired(1_000, 500));
}

#[test]
fn expired_once_within_buffer_window() {
    let token = TokenInfo::builder().expires_at(10_000).build();
    assert!(token.is_expired(9_600, 500));
}

#[test]
fn expired_past_expiry() {
    let token = TokenInfo::builder().expires_at(10_000).build();
    assert!(token.is_expired(10_001, 0));
}

#[test]
fn builder_defaults_have_no_station_api_key() {
    let token = TokenInfo::builder().build();
    assert_eq!(token.station_api_key, None);
}

#[test]
fn builder_sets_station_api_key() {
    let token = TokenInfo::builder().station_api_key("key-123").build();
    assert_eq!(token.station_api_key.as_deref(), Some("key-123"));
}
