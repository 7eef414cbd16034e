// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Responses travel worker -> manager, correlated to a `Command` by
//! `request_id`: `{status, request_id, data, error}`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(request_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self { status: ResponseStatus::Ok, request_id: request_id.into(), data: Some(data), error: None }
    }

    pub fn error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self { status: ResponseStatus::Error, request_id: request_id.into(), data: None, error: Some(error.into()) }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
