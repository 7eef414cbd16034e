// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync queue item — the durable FIFO of backend operations deferred while
//! offline, drained by the Sync Engine.

use crate::ids::BatchId;

/// Maximum retry attempts before an item is left for operator inspection
/// rather than retried automatically.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntityType {
    WipProcess,
    Execution,
}

crate::simple_display! {
    SyncEntityType {
        WipProcess => "wip_process",
        Execution => "execution",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    StartProcess,
    CompleteProcess,
    ConvertToSerial,
    Create,
    Update,
}

crate::simple_display! {
    SyncAction {
        StartProcess => "start_process",
        CompleteProcess => "complete_process",
        ConvertToSerial => "convert_to_serial",
        Create => "create",
        Update => "update",
    }
}

/// One durable unit of deferred backend work.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncQueueItem {
    pub id: i64,
    pub batch_id: BatchId,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub action: SyncAction,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Epoch milliseconds.
    pub created_at: u64,
}

impl SyncQueueItem {
    /// An item is eligible for another delivery attempt while its retry
    /// count has not reached [`MAX_RETRIES`].
    pub fn is_pending(&self) -> bool {
        self.retry_count < MAX_RETRIES
    }

    /// Items older than `ttl_ms` with `retry_count >= MAX_RETRIES` are
    /// garbage-collected by the Sync Engine's cleanup pass.
    pub fn is_stale(&self, now_epoch_ms: u64, ttl_ms: u64) -> bool {
        !self.is_pending() && now_epoch_ms.saturating_sub(self.created_at) >= ttl_ms
    }
}

crate::builder! {
    pub struct SyncQueueItemBuilder => SyncQueueItem {
        into {
            entity_id: String = "wip-1",
        }
        set {
            id: i64 = 0,
            batch_id: BatchId = BatchId::new("batch_1"),
            entity_type: SyncEntityType = SyncEntityType::WipProcess,
            action: SyncAction = SyncAction::StartProcess,
            payload: serde_json::Value = serde_json::Value::Null,
            retry_count: u32 = 0,
            created_at: u64 = 0,
        }
        option {
            last_error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "sync_queue_tests.rs"]
mod tests;
