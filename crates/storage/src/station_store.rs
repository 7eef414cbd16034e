// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Station-wide embedded store (`data/station.db`): the durable
//! `batch_configs` cache backing the Batch Config Service (C11), and the
//! station registry used by the Sync Engine's heartbeat/re-register path.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Row, SqlitePool};
use station_core::{BarcodeScannerConfig, BatchConfig, BatchId, SlotId, StoreError};

use crate::schema::STATION_SCHEMA;

#[derive(Clone)]
pub struct StationStore {
    pool: SqlitePool,
}

impl StationStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(STATION_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        sqlx::query(STATION_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self { pool })
    }

    // ---- batch configs ----------------------------------------------------

    pub async fn create_batch_config(&self, cfg: &BatchConfig) -> Result<(), StoreError> {
        let existing = self.get_batch_config(&cfg.id).await;
        if existing.is_ok() {
            return Err(StoreError::AlreadyExists(format!("batch {}", cfg.id)));
        }
        self.upsert_batch_config(cfg).await
    }

    pub async fn update_batch_config(&self, cfg: &BatchConfig) -> Result<(), StoreError> {
        self.get_batch_config(&cfg.id).await?;
        self.upsert_batch_config(cfg).await
    }

    async fn upsert_batch_config(&self, cfg: &BatchConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO batch_configs
                (id, name, sequence_package, slot_id, auto_start, hardware, parameters,
                 process_id, header_id, config, barcode_scanner)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 sequence_package = excluded.sequence_package,
                 slot_id = excluded.slot_id,
                 auto_start = excluded.auto_start,
                 hardware = excluded.hardware,
                 parameters = excluded.parameters,
                 process_id = excluded.process_id,
                 header_id = excluded.header_id,
                 config = excluded.config,
                 barcode_scanner = excluded.barcode_scanner"#,
        )
        .bind(cfg.id.as_str())
        .bind(&cfg.name)
        .bind(&cfg.sequence_package)
        .bind(cfg.slot_id.get() as i64)
        .bind(cfg.auto_start as i64)
        .bind(serde_json::to_string(&cfg.hardware).unwrap_or_default())
        .bind(serde_json::to_string(&cfg.parameters).unwrap_or_default())
        .bind(cfg.process_id)
        .bind(&cfg.header_id)
        .bind(serde_json::to_string(&cfg.config).unwrap_or_default())
        .bind(cfg.barcode_scanner.as_ref().and_then(|b| serde_json::to_string(b).ok()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_batch_config(&self, id: &BatchId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM batch_configs WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("batch {id}")));
        }
        Ok(())
    }

    pub async fn get_batch_config(&self, id: &BatchId) -> Result<BatchConfig, StoreError> {
        let row = sqlx::query_as::<_, BatchConfigRow>(
            r#"SELECT id, name, sequence_package, slot_id, auto_start, hardware, parameters,
                      process_id, header_id, config, barcode_scanner
               FROM batch_configs WHERE id = ?"#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))?;
        row.try_into()
    }

    pub async fn list_batch_configs(&self) -> Result<Vec<BatchConfig>, StoreError> {
        let rows = sqlx::query_as::<_, BatchConfigRow>(
            r#"SELECT id, name, sequence_package, slot_id, auto_start, hardware, parameters,
                      process_id, header_id, config, barcode_scanner
               FROM batch_configs ORDER BY slot_id ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// All slot ids currently in use, for the Batch Config Service's
    /// lowest-unused-slot allocator (I1).
    pub async fn used_slots(&self) -> Result<Vec<SlotId>, StoreError> {
        let rows = sqlx::query("SELECT slot_id FROM batch_configs")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let n: i64 = r.get("slot_id");
                SlotId::new(n as u8).map_err(|e| StoreError::Database(e.to_string()))
            })
            .collect()
    }

    // ---- station registry ---------------------------------------------------

    pub async fn register_station(&self, id: &str, name: &str, registered_at: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO stations (id, name, registered_at) VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET name = excluded.name, registered_at = excluded.registered_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(registered_at as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn station_registered_at(&self, id: &str) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT registered_at FROM stations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.and_then(|r| r.get::<Option<i64>, _>("registered_at")).map(|v| v as u64))
    }
}

#[derive(FromRow)]
struct BatchConfigRow {
    id: String,
    name: String,
    sequence_package: String,
    slot_id: i64,
    auto_start: i64,
    hardware: String,
    parameters: String,
    process_id: Option<i64>,
    header_id: Option<String>,
    config: String,
    barcode_scanner: Option<String>,
}

impl TryFrom<BatchConfigRow> for BatchConfig {
    type Error = StoreError;

    fn try_from(row: BatchConfigRow) -> Result<Self, StoreError> {
        Ok(BatchConfig {
            id: BatchId::new(row.id),
            name: row.name,
            sequence_package: row.sequence_package,
            slot_id: SlotId::new(row.slot_id as u8).map_err(|e| StoreError::Database(e.to_string()))?,
            auto_start: row.auto_start != 0,
            hardware: parse_map(&row.hardware),
            parameters: parse_map(&row.parameters),
            process_id: row.process_id,
            header_id: row.header_id,
            config: parse_map(&row.config),
            barcode_scanner: row
                .barcode_scanner
                .and_then(|s| serde_json::from_str::<BarcodeScannerConfig>(&s).ok()),
        })
    }
}

fn parse_map(s: &str) -> BTreeMap<String, Value> {
    serde_json::from_str(s).unwrap_or_default()
}

#[cfg(test)]
#[path = "station_store_tests.rs"]
mod tests;
