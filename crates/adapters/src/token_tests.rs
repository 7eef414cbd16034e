// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use station_core::FakeClock;
use std::sync::atomic::{AtomicUsize, Ordering};

fn manager() -> TokenManager<FakeClock> {
    TokenManager::new(FakeClock::new())
}

#[tokio::test]
async fn handle_401_without_callback_returns_false() {
    let mgr = manager();
    mgr.set_tokens("a".into(), "r".into(), Some(1_800), "1".into(), "op".into(), None);
    assert!(!mgr.handle_401_error().await);
}

#[tokio::test]
async fn handle_401_without_tokens_returns_false() {
    let mgr = manager();
    mgr.set_refresh_callback(|_refresh_token| async move {
        Ok(RefreshedTokens {
            access_token: "new".into(),
            refresh_token: "new-r".into(),
            expires_in_secs: Some(1_800),
            station_api_key: None,
        })
    });
    assert!(!mgr.handle_401_error().await);
}

#[tokio::test]
async fn successful_refresh_replaces_access_token() {
    let mgr = manager();
    mgr.set_tokens("old".into(), "refresh-1".into(), Some(60), "1".into(), "op".into(), None);
    mgr.set_refresh_callback(|refresh_token| async move {
        assert_eq!(refresh_token, "refresh-1");
        Ok(RefreshedTokens {
            access_token: "new-access".into(),
            refresh_token: "refresh-2".into(),
            expires_in_secs: Some(1_800),
            station_api_key: Some("key-123".into()),
        })
    });

    assert!(mgr.handle_401_error().await);
    assert_eq!(mgr.get_access_token().as_deref(), Some("new-access"));
    assert_eq!(mgr.get_refresh_token().as_deref(), Some("refresh-2"));
    assert_eq!(mgr.get_station_api_key().as_deref(), Some("key-123"));
}

#[tokio::test]
async fn cooldown_suppresses_rapid_refresh_attempts() {
    let mgr = manager();
    mgr.set_tokens("a".into(), "r".into(), Some(60), "1".into(), "op".into(), None);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    mgr.set_refresh_callback(move |_| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(RefreshedTokens {
                access_token: "new".into(),
                refresh_token: "new-r".into(),
                expires_in_secs: Some(60),
                station_api_key: None,
            })
        }
    });

    assert!(mgr.handle_401_error().await);
    assert!(!mgr.handle_401_error().await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn waiter_behind_an_in_flight_refresh_observes_the_new_token() {
    let mgr = manager();
    mgr.set_tokens("old".into(), "refresh-1".into(), Some(60), "1".into(), "op".into(), None);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    mgr.set_refresh_callback(move |_| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(RefreshedTokens {
                access_token: "new-access".into(),
                refresh_token: "refresh-2".into(),
                expires_in_secs: Some(1_800),
                station_api_key: None,
            })
        }
    });

    let first = mgr.handle_401_error();
    let second = async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        mgr.handle_401_error().await
    };
    let (first_ok, second_ok) = tokio::join!(first, second);

    assert!(first_ok, "the in-flight refresh should succeed");
    assert!(second_ok, "a waiter behind a refresh that just succeeded should observe the new token");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "the waiter must not trigger a second refresh");
    assert_eq!(mgr.get_access_token().as_deref(), Some("new-access"));
}

#[tokio::test]
async fn failed_refresh_leaves_existing_token_untouched() {
    let mgr = manager();
    mgr.set_tokens("a".into(), "r".into(), Some(60), "1".into(), "op".into(), None);
    mgr.set_refresh_callback(|_| async move { Err("connection reset".to_string()) });

    assert!(!mgr.handle_401_error().await);
    assert_eq!(mgr.get_access_token().as_deref(), Some("a"));
}

#[tokio::test]
async fn token_update_callback_fires_on_success() {
    let mgr = manager();
    mgr.set_tokens("a".into(), "r".into(), Some(60), "1".into(), "op".into(), None);
    mgr.set_refresh_callback(|_| async move {
        Ok(RefreshedTokens {
            access_token: "new".into(),
            refresh_token: "new-r".into(),
            expires_in_secs: Some(60),
            station_api_key: None,
        })
    });
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();
    mgr.set_token_update_callback(move |info| {
        *seen_clone.lock() = Some(info.access_token.clone());
    });

    assert!(mgr.handle_401_error().await);
    assert_eq!(seen.lock().clone().as_deref(), Some("new"));
}
