// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token Manager (C2): holds a single [`TokenInfo`] at a time and exposes
//! the sole reactive refresh entry point, `handle_401_error`. Refresh is
//! never proactive — callers never pre-validate expiry against the clock;
//! the backend is the only authority on token validity.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use station_core::{Clock, TokenInfo};

/// Cooldown between refresh attempts, checked inside the refresh lock so
/// spacing is exact even under concurrent callers.
pub const REFRESH_COOLDOWN_MS: u64 = 5_000;

pub type RefreshResult = Result<RefreshedTokens, String>;
type RefreshFuture = Pin<Box<dyn Future<Output = RefreshResult> + Send>>;
type RefreshCallback = Arc<dyn Fn(String) -> RefreshFuture + Send + Sync>;
pub type TokenUpdateCallback = Arc<dyn Fn(&TokenInfo) + Send + Sync>;

/// What a refresh callback hands back on success.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: Option<u64>,
    pub station_api_key: Option<String>,
}

struct Inner<C: Clock> {
    clock: C,
    token: Mutex<Option<TokenInfo>>,
    last_refresh_attempt_ms: Mutex<Option<u64>>,
    refresh_callback: Mutex<Option<RefreshCallback>>,
    token_update_callback: Mutex<Option<TokenUpdateCallback>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

/// Reactive-only JWT lifecycle manager. Cheaply cloneable; all state is
/// behind `Arc`.
#[derive(Clone)]
pub struct TokenManager<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> TokenManager<C> {
    pub fn new(clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                token: Mutex::new(None),
                last_refresh_attempt_ms: Mutex::new(None),
                refresh_callback: Mutex::new(None),
                token_update_callback: Mutex::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Bound to the Backend Client's `refresh_access_token` in production.
    pub fn set_refresh_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RefreshResult> + Send + 'static,
    {
        *self.inner.refresh_callback.lock() = Some(Arc::new(move |token| Box::pin(callback(token))));
    }

    /// Lets the REST/session layer persist a refreshed access token.
    pub fn set_token_update_callback<F>(&self, callback: F)
    where
        F: Fn(&TokenInfo) + Send + Sync + 'static,
    {
        *self.inner.token_update_callback.lock() = Some(Arc::new(callback));
    }

    /// Replace current tokens; resets the refresh cooldown.
    pub fn set_tokens(
        &self,
        access_token: String,
        refresh_token: String,
        expires_in_secs: Option<u64>,
        user_id: String,
        username: String,
        station_api_key: Option<String>,
    ) {
        let expires_at = expires_in_secs
            .map(|secs| self.inner.clock.epoch_ms() + secs * 1_000)
            .unwrap_or(0);
        *self.inner.token.lock() =
            Some(TokenInfo { access_token, refresh_token, expires_at, user_id, username, station_api_key });
        *self.inner.last_refresh_attempt_ms.lock() = None;
    }

    pub fn clear_tokens(&self) {
        *self.inner.token.lock() = None;
        *self.inner.last_refresh_attempt_ms.lock() = None;
    }

    pub fn get_access_token(&self) -> Option<String> {
        self.inner.token.lock().as_ref().map(|t| t.access_token.clone())
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        self.inner.token.lock().as_ref().map(|t| t.refresh_token.clone())
    }

    pub fn get_station_api_key(&self) -> Option<String> {
        self.inner.token.lock().as_ref().and_then(|t| t.station_api_key.clone())
    }

    pub fn token_info(&self) -> Option<TokenInfo> {
        self.inner.token.lock().clone()
    }

    pub fn has_valid_tokens(&self) -> bool {
        self.inner.token.lock().as_ref().is_some_and(|t| !t.access_token.is_empty())
    }

    /// For UI hints only; the backend decides actual validity.
    pub fn is_token_expired(&self, buffer_ms: u64) -> bool {
        match self.inner.token.lock().as_ref() {
            Some(t) => t.is_expired(self.inner.clock.epoch_ms(), buffer_ms),
            None => true,
        }
    }

    /// The only refresh entry point. Called by the Backend Client's
    /// `with_auth` policy when a JWT call receives HTTP 401.
    ///
    /// Single-flight: concurrent callers serialize on `refresh_lock`; the
    /// cooldown check happens inside the lock so spacing is exact, and a
    /// caller that arrives while a refresh is in flight waits for it and
    /// then observes the new token rather than issuing a second refresh.
    pub async fn handle_401_error(&self) -> bool {
        let access_token_before = self.inner.token.lock().as_ref().map(|t| t.access_token.clone());

        let _guard = self.inner.refresh_lock.lock().await;

        let access_token_after_wait = self.inner.token.lock().as_ref().map(|t| t.access_token.clone());
        if access_token_after_wait != access_token_before {
            tracing::debug!("token already refreshed by an in-flight waiter, skipping cooldown gate");
            return true;
        }

        let now = self.inner.clock.epoch_ms();
        if let Some(last) = *self.inner.last_refresh_attempt_ms.lock() {
            if now.saturating_sub(last) < REFRESH_COOLDOWN_MS {
                tracing::warn!(elapsed_ms = now.saturating_sub(last), "refresh cooldown active");
                return false;
            }
        }
        *self.inner.last_refresh_attempt_ms.lock() = Some(now);

        let refresh_token = match self.inner.token.lock().as_ref().map(|t| t.refresh_token.clone()) {
            Some(token) => token,
            None => {
                tracing::warn!("no token info available for refresh");
                return false;
            }
        };

        let callback = match self.inner.refresh_callback.lock().clone() {
            Some(cb) => cb,
            None => {
                tracing::warn!("no refresh callback configured");
                return false;
            }
        };

        tracing::info!("refreshing access token");
        let result = match callback(refresh_token.clone()).await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                tracing::error!(error = %err, "token refresh failed");
                return false;
            }
        };

        let expires_at =
            result.expires_in_secs.map(|secs| self.inner.clock.epoch_ms() + secs * 1_000).unwrap_or(0);

        let updated = {
            let mut guard = self.inner.token.lock();
            let Some(info) = guard.as_mut() else {
                return false;
            };
            info.access_token = result.access_token;
            info.refresh_token = if result.refresh_token.is_empty() { refresh_token } else { result.refresh_token };
            info.expires_at = expires_at;
            if let Some(key) = result.station_api_key {
                info.station_api_key = Some(key);
            }
            info.clone()
        };

        tracing::info!(expires_at, "token refreshed successfully");
        if let Some(cb) = self.inner.token_update_callback.lock().clone() {
            cb(&updated);
        }
        true
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
