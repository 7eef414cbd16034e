// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded schema DDL, run idempotently (`CREATE TABLE IF NOT EXISTS`) at
//! store open time rather than via a separate migration runner — there is
//! exactly one schema version per store kind in this system.

pub const BATCH_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS execution_results (
    execution_id    TEXT PRIMARY KEY,
    batch_id        TEXT NOT NULL,
    sequence_name   TEXT NOT NULL,
    sequence_version TEXT NOT NULL,
    status          TEXT NOT NULL,
    overall_pass    INTEGER,
    started_at      INTEGER NOT NULL,
    completed_at    INTEGER,
    duration_ms     INTEGER,
    parameters      TEXT NOT NULL DEFAULT '{}',
    synced_at       INTEGER
);

CREATE TABLE IF NOT EXISTS step_results (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id    TEXT NOT NULL REFERENCES execution_results(execution_id) ON DELETE CASCADE,
    step_order      INTEGER NOT NULL,
    name            TEXT NOT NULL,
    status          TEXT NOT NULL,
    pass            INTEGER,
    duration_ms     INTEGER,
    payload         TEXT,
    error           TEXT
);
CREATE INDEX IF NOT EXISTS idx_step_results_execution ON step_results(execution_id);

CREATE TABLE IF NOT EXISTS sync_queue (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id        TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    entity_id       TEXT NOT NULL,
    action          TEXT NOT NULL,
    payload         TEXT NOT NULL,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    created_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at);

CREATE TABLE IF NOT EXISTS log_entries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id        TEXT NOT NULL,
    execution_id    TEXT,
    level           TEXT NOT NULL,
    message         TEXT NOT NULL,
    timestamp       INTEGER NOT NULL
);
"#;

pub const STATION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS batch_configs (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    sequence_package TEXT NOT NULL,
    slot_id         INTEGER NOT NULL,
    auto_start      INTEGER NOT NULL DEFAULT 0,
    hardware        TEXT NOT NULL DEFAULT '{}',
    parameters      TEXT NOT NULL DEFAULT '{}',
    process_id      INTEGER,
    header_id       TEXT,
    config          TEXT NOT NULL DEFAULT '{}',
    barcode_scanner TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_batch_configs_slot ON batch_configs(slot_id);

CREATE TABLE IF NOT EXISTS stations (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    registered_at   INTEGER
);
"#;
