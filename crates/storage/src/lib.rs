// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! station-storage: the embedded relational stores (C1).
//!
//! One SQLite file per batch (`batch_<id>.db`, executions/steps/logs/sync
//! queue) plus one station-wide file (`station.db`, the durable
//! batch-config cache and station registry). Each file opens with
//! write-ahead journaling and foreign-key enforcement; one connection per
//! file, one logical writer at a time, readers may overlap.

pub mod batch_store;
pub mod schema;
pub mod station_store;
pub mod stats;

pub use batch_store::BatchStore;
pub use station_store::StationStore;
pub use stats::{percentile, PeriodBucket, StatsSummary};
