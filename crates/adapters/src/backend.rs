// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend Client (C3): typed async HTTP client against the MES backend.
//! Two authentication modes coexist — `API_KEY` for service-level calls,
//! `JWT` (with reactive 401-triggered refresh) for operator-tracked calls —
//! mirrored from the original's `AuthMode`/`with_auth` decorator as an
//! explicit policy enum plus a small retry wrapper instead of a decorator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use station_core::{BackendConfig, BackendError, Clock};

use crate::token::{RefreshResult, RefreshedTokens, TokenManager};

/// Which header a call authenticates with (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `X-API-Key`: dynamic station key issued at login, falling back to
    /// the static config key. Never retries.
    ApiKey,
    /// `Authorization: Bearer`, refreshed reactively on 401. Retries once.
    Jwt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WipLookupResult {
    pub wip_int_id: i64,
    pub wip_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessStartRequest {
    pub process_id: i64,
    pub operator_id: Option<i64>,
    pub equipment_id: Option<String>,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessCompleteRequest {
    pub result: String,
    pub measurements: Value,
    pub defect_codes: Vec<String>,
    pub duration_ms: Option<u64>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SerialConvertRequest {
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Cancelled,
}

impl SessionStatus {
    fn as_query(self) -> &'static str {
        match self {
            SessionStatus::Closed => "CLOSED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Typed async HTTP client for the MES backend. Cheaply cloneable; shares
/// the underlying `reqwest::Client` and the Token Manager handle.
#[derive(Clone)]
pub struct BackendClient<C: Clock> {
    config: BackendConfig,
    http: Client,
    token_manager: Option<TokenManager<C>>,
    /// WIP string -> int id cache, cleared on `close_session` (spec.md
    /// §4.16 "WIP scan-to-int-id caching").
    wip_cache: Arc<RwLock<HashMap<String, i64>>>,
    open_session: Arc<RwLock<Option<i64>>>,
}

impl<C: Clock> BackendClient<C> {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: true })?;
        Ok(Self {
            config,
            http,
            token_manager: None,
            wip_cache: Arc::new(RwLock::new(HashMap::new())),
            open_session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn with_token_manager(mut self, token_manager: TokenManager<C>) -> Self {
        self.token_manager = Some(token_manager);
        self
    }

    /// Wires the Token Manager's refresh callback to this client's own
    /// `refresh_access_token` call, closing the loop the original expressed
    /// as `set_refresh_callback(self._refresh_token_callback)`.
    pub fn install_refresh_callback(&self) {
        let Some(token_manager) = self.token_manager.clone() else { return };
        let client = self.clone();
        token_manager.set_refresh_callback(move |refresh_token| {
            let client = client.clone();
            async move { client.refresh_access_token(&refresh_token).await }
        });
    }

    fn base_url(&self) -> Result<&str, BackendError> {
        self.config.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| BackendError::Backend {
            status: None,
            message: "backend url not configured".into(),
            is_retryable: false,
        })
    }

    fn api_key_header(&self) -> Option<String> {
        if let Some(tm) = &self.token_manager {
            if let Some(key) = tm.get_station_api_key() {
                return Some(key);
            }
        }
        self.config.api_key.clone()
    }

    fn jwt_header(&self) -> Option<String> {
        self.token_manager.as_ref().and_then(|tm| tm.get_access_token())
    }

    async fn send_with_auth(
        &self,
        mode: AuthMode,
        build: impl Fn(&Client) -> reqwest::RequestBuilder,
    ) -> Result<Response, BackendError> {
        let max_retries = if mode == AuthMode::Jwt { 1 } else { 0 };
        let mut attempt = 0;
        loop {
            let mut req = build(&self.http);
            req = match mode {
                AuthMode::ApiKey => match self.api_key_header() {
                    Some(key) => req.header("X-API-Key", key),
                    None => req,
                },
                AuthMode::Jwt => match self.jwt_header() {
                    Some(token) => req.bearer_auth(token),
                    None => req,
                },
            };

            let response = req.send().await.map_err(connection_error)?;

            if response.status() == StatusCode::UNAUTHORIZED && mode == AuthMode::Jwt && attempt < max_retries {
                attempt += 1;
                tracing::info!(attempt, "401 received, attempting token refresh");
                let refreshed = match &self.token_manager {
                    Some(tm) => tm.handle_401_error().await,
                    None => false,
                };
                if refreshed {
                    continue;
                }
                return Err(BackendError::Token(station_core::TokenError::TokenExpired));
            }

            return Ok(response);
        }
    }

    pub async fn health_check(&self) -> bool {
        let Ok(base) = self.base_url() else { return false };
        let url = format!("{}/health", base.trim_end_matches('/'));
        match self.http.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                tracing::debug!(error = %err, "health check failed");
                false
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str, station_id: Option<&str>) -> Result<LoginResponse, BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/auth/login/json", base.trim_end_matches('/'));
        let station_id = station_id.or(self.config.station_id.as_deref());
        let payload = serde_json::json!({
            "username": username,
            "password": password,
            "station_id": station_id,
        });
        let response = self.http.post(url).json(&payload).send().await.map_err(connection_error)?;
        if response.status().is_success() {
            response
                .json::<LoginResponse>()
                .await
                .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: false })
        } else {
            Err(raise_backend_error(response.status().as_u16(), body_error(response).await, "login"))
        }
    }

    pub async fn refresh_access_token(&self, refresh_token: &str) -> RefreshResult {
        let base = self.base_url().map_err(|e| e.to_string())?;
        let url = format!("{}/api/v1/auth/refresh", base.trim_end_matches('/'));
        let payload = serde_json::json!({
            "refresh_token": refresh_token,
            "station_id": self.config.station_id,
        });
        let response = self.http.post(url).json(&payload).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("refresh failed: HTTP {}", response.status()));
        }
        let body: RefreshResponseBody = response.json().await.map_err(|e| e.to_string())?;
        Ok(RefreshedTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token.unwrap_or_default(),
            expires_in_secs: body.expires_in,
            station_api_key: body.station_api_key,
        })
    }

    /// WIP lookup by string id, consulting the session cache before
    /// issuing `/scan` (spec.md §4.16).
    pub async fn lookup_wip(&self, wip_id: &str, process_id: Option<i64>) -> Result<WipLookupResult, BackendError> {
        if let Some(&cached) = self.wip_cache.read().get(wip_id) {
            return Ok(WipLookupResult { wip_int_id: cached, wip_id: wip_id.to_string(), status: "cached".into() });
        }

        let base = self.base_url()?;
        let url = format!("{}/api/v1/wip-items/{}/scan", base.trim_end_matches('/'), wip_id);
        let response = self
            .send_with_auth(AuthMode::Jwt, |http| {
                let mut req = http.post(&url);
                if let Some(pid) = process_id {
                    req = req.query(&[("process_id", pid)]);
                }
                req
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: WipScanResponse = response
                    .json()
                    .await
                    .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: false })?;
                self.wip_cache.write().insert(wip_id.to_string(), body.id);
                Ok(WipLookupResult { wip_int_id: body.id, wip_id: wip_id.to_string(), status: body.status })
            }
            StatusCode::NOT_FOUND => Err(BackendError::WipNotFound(wip_id.to_string())),
            status => Err(raise_backend_error(status.as_u16(), body_error(response).await, "lookup_wip")),
        }
    }

    /// 착공.
    pub async fn start_process(&self, wip_int_id: i64, request: &ProcessStartRequest) -> Result<Value, BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/wip-items/{}/start-process", base.trim_end_matches('/'), wip_int_id);
        let response = self.send_with_auth(AuthMode::Jwt, |http| http.post(&url).json(request)).await?;
        self.handle_process_response(response, request.process_id, "start_process").await
    }

    /// 완공.
    pub async fn complete_process(
        &self,
        wip_int_id: i64,
        process_id: i64,
        operator_id: i64,
        request: &ProcessCompleteRequest,
    ) -> Result<Value, BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/wip-items/{}/complete-process", base.trim_end_matches('/'), wip_int_id);
        let response = self
            .send_with_auth(AuthMode::Jwt, |http| {
                http.post(&url).query(&[("process_id", process_id), ("operator_id", operator_id)]).json(request)
            })
            .await?;
        self.handle_process_response(response, process_id, "complete_process").await
    }

    pub async fn convert_to_serial(&self, wip_int_id: i64, request: &SerialConvertRequest) -> Result<Value, BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/wip-items/{}/convert-to-serial", base.trim_end_matches('/'), wip_int_id);
        let response = self.send_with_auth(AuthMode::Jwt, |http| http.post(&url).json(request)).await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => response
                .json()
                .await
                .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: false }),
            StatusCode::NOT_FOUND => Err(BackendError::WipNotFound(wip_int_id.to_string())),
            status => Err(raise_backend_error(status.as_u16(), body_error(response).await, "convert_to_serial")),
        }
    }

    /// Opens (or reuses) the process session for
    /// `(station_id, batch_id, process_id)`, caching the returned id.
    pub async fn open_session(
        &self,
        station_id: &str,
        batch_id: &str,
        process_id: i64,
        slot_id: u8,
        sequence_name: &str,
        sequence_version: &str,
    ) -> Result<i64, BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/process-headers/open", base.trim_end_matches('/'));
        let payload = serde_json::json!({
            "station_id": station_id,
            "batch_id": batch_id,
            "process_id": process_id,
            "slot_id": slot_id,
            "sequence_name": sequence_name,
            "sequence_version": sequence_version,
        });
        let response = self.send_with_auth(AuthMode::ApiKey, |http| http.post(&url).json(&payload)).await?;
        if !response.status().is_success() {
            return Err(raise_backend_error(response.status().as_u16(), body_error(response).await, "open_session"));
        }
        let body: OpenSessionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: false })?;
        *self.open_session.write() = Some(body.id);
        Ok(body.id)
    }

    /// Idempotent on the backend; callers invoke unconditionally on every
    /// cleanup path regardless of whether a session is open.
    pub async fn close_session(&self, session_id: i64, status: SessionStatus) -> Result<(), BackendError> {
        let base = self.base_url()?;
        let url = format!(
            "{}/api/v1/process-headers/{}/close?status={}",
            base.trim_end_matches('/'),
            session_id,
            status.as_query()
        );
        let response = self.send_with_auth(AuthMode::ApiKey, |http| http.post(&url)).await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(raise_backend_error(response.status().as_u16(), body_error(response).await, "close_session"));
        }
        *self.open_session.write() = None;
        self.wip_cache.write().clear();
        Ok(())
    }

    pub async fn pull_sequence(&self, name: &str) -> Result<Value, BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/sequences/{}/pull", base.trim_end_matches('/'), name);
        let response = self.send_with_auth(AuthMode::ApiKey, |http| http.post(&url)).await?;
        if !response.status().is_success() {
            return Err(raise_backend_error(response.status().as_u16(), body_error(response).await, "pull_sequence"));
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: false })
    }

    pub async fn register_station(&self, station_id: &str, name: &str) -> Result<(), BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/stations/register", base.trim_end_matches('/'));
        let payload = serde_json::json!({"station_id": station_id, "name": name});
        let response = self.send_with_auth(AuthMode::ApiKey, |http| http.post(&url).json(&payload)).await?;
        if !response.status().is_success() {
            return Err(raise_backend_error(response.status().as_u16(), body_error(response).await, "register_station"));
        }
        Ok(())
    }

    /// `404` means the station isn't registered; the Sync Engine's
    /// heartbeat loop re-registers on that signal.
    pub async fn heartbeat(&self, station_id: &str) -> Result<(), BackendError> {
        let base = self.base_url()?;
        let url = format!("{}/api/v1/stations/{}/heartbeat", base.trim_end_matches('/'), station_id);
        let response = self.send_with_auth(AuthMode::ApiKey, |http| http.post(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::Backend {
                status: Some(404),
                message: "station not registered".into(),
                is_retryable: false,
            });
        }
        if !response.status().is_success() {
            return Err(raise_backend_error(response.status().as_u16(), body_error(response).await, "heartbeat"));
        }
        Ok(())
    }

    async fn handle_process_response(&self, response: Response, process_id: i64, operation: &str) -> Result<Value, BackendError> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => response
                .json()
                .await
                .map_err(|e| BackendError::Backend { status: None, message: e.to_string(), is_retryable: false }),
            StatusCode::NOT_FOUND => Err(BackendError::WipNotFound(process_id.to_string())),
            status => {
                let status_code = status.as_u16();
                let err = body_error(response).await;
                match err.code.as_deref() {
                    Some("PREREQUISITE_NOT_MET") => Err(BackendError::PrerequisiteNotMet { process_id }),
                    Some("DUPLICATE_PASS") => Err(BackendError::DuplicatePass { process_id }),
                    Some("INVALID_WIP_STATUS") => Err(BackendError::InvalidWipStatus(err.message)),
                    _ => Err(raise_backend_error_parts(status_code, err, operation)),
                }
            }
        }
    }
}

fn connection_error(err: reqwest::Error) -> BackendError {
    BackendError::Backend { status: None, message: err.to_string(), is_retryable: true }
}

struct ParsedError {
    code: Option<String>,
    message: String,
}

async fn body_error(response: Response) -> ParsedError {
    match response.json::<Value>().await {
        Ok(body) => parse_error_body(&body),
        Err(_) => ParsedError { code: None, message: "backend error".to_string() },
    }
}

/// Tries Backend's `{error_code, message}` shape, the legacy `{error,
/// message}` shape, and FastAPI's `{detail}` shape, in that order.
fn parse_error_body(body: &Value) -> ParsedError {
    let code = body.get("error_code").or_else(|| body.get("error")).and_then(Value::as_str).map(str::to_string);
    let message = body
        .get("message")
        .or_else(|| body.get("detail"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "backend error".to_string());
    ParsedError { code, message }
}

fn raise_backend_error(status: u16, err: ParsedError, operation: &str) -> BackendError {
    raise_backend_error_parts(status, err, operation)
}

fn raise_backend_error_parts(status: u16, err: ParsedError, operation: &str) -> BackendError {
    let is_retryable = status >= 500;
    BackendError::Backend {
        status: Some(status),
        message: format!("{operation}: {}", err.message),
        is_retryable,
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub station_api_key: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RefreshResponseBody {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    station_api_key: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct WipScanResponse {
    id: i64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct OpenSessionResponse {
    id: i64,
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
