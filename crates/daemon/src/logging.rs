// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured logging setup (spec.md §4.12). The manager process
//! initializes one global subscriber at startup; each batch worker process
//! initializes its own, writing to a rolling file under `logs/` so a
//! worker's logs survive independently of the manager's.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over `STATION_LOG`; both default to `info`.
fn filter_directive() -> String {
    std::env::var("RUST_LOG").or_else(|_| std::env::var("STATION_LOG")).unwrap_or_else(|_| "info".to_string())
}

fn wants_json() -> bool {
    std::env::var("STATION_LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false)
}

/// Initialize the manager process's global subscriber.
pub fn init_manager_logging() {
    let filter = EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if wants_json() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Initialize a batch worker process's subscriber: non-blocking, daily
/// rotation, writing to `logs_dir/batch_<id>.log`. The returned guard must
/// be held for the worker process's lifetime — dropping it stops the
/// flush thread.
pub fn init_worker_logging(logs_dir: &Path, batch_id: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let _ = std::fs::create_dir_all(logs_dir);
    let appender = tracing_appender::rolling::daily(logs_dir, format!("batch_{batch_id}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false);
    if wants_json() {
        builder.json().init();
    } else {
        builder.init();
    }
    guard
}
