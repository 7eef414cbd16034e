// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token info held by the Token Manager.

/// Snapshot of the current authentication state against the MES backend.
///
/// `is_expired` is informational only — refresh is reactive, driven by a
/// 401 response from the backend, never by comparing against `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expires_at: u64,
    pub user_id: String,
    pub username: String,
    /// Dynamic station key issued at login; falls back to a static config
    /// key when absent (see `BackendConfig::api_key`).
    pub station_api_key: Option<String>,
}

impl TokenInfo {
    /// Informational expiry check against `now_epoch_ms`, with `buffer_ms`
    /// of slack subtracted from `expires_at`. The backend is authoritative;
    /// callers must not skip a call based on this returning `true`.
    pub fn is_expired(&self, now_epoch_ms: u64, buffer_ms: u64) -> bool {
        now_epoch_ms + buffer_ms >= self.expires_at
    }
}

crate::builder! {
    pub struct TokenInfoBuilder => TokenInfo {
        into {
            access_token: String = "access-token",
            refresh_token: String = "refresh-token",
            user_id: String = "user-1",
            username: String = "operator",
        }
        set {
            expires_at: u64 = 0,
        }
        option {
            station_api_key: String = None,
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
