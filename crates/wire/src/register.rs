// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration handshake: a freshly spawned worker announces its batch id
//! on its first connection; the manager learns the connection's identity
//! and acknowledges within a 5s deadline (§4.5, §4.8 step 4).

use station_core::BatchId;
use std::time::Duration;

/// Deadline for the manager to acknowledge a `Register` message.
pub const REGISTER_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Register {
    #[serde(rename = "type")]
    pub message_type: RegisterMessageType,
    pub batch_id: BatchId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegisterMessageType {
    Register,
}

impl Register {
    pub fn new(batch_id: BatchId) -> Self {
        Self { message_type: RegisterMessageType::Register, batch_id }
    }
}

/// `{"status":"ok","message":"registered"}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisterAck {
    pub status: String,
    pub message: String,
}

impl RegisterAck {
    pub fn registered() -> Self {
        Self { status: "ok".to_string(), message: "registered".to_string() }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
#[path = "register_tests.rs"]
mod tests;
