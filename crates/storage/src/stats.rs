// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Statistics aggregation over a batch's executions: by-batch, by-period
//! (day/week/month bucket label), and by-step percentiles. Always read from
//! [`crate::BatchStore`] — worker in-memory counters reset on worker
//! restart and are never authoritative (spec.md §4.8).

use chrono::Datelike;
use station_core::ExecutionResult;

/// Bucket width for the by-period aggregation. The label format mirrors
/// what a `strftime`-style date formatter would produce, computed here in
/// plain Rust rather than in SQL so the bucketing logic has one home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodBucket {
    Daily,
    Weekly,
    Monthly,
}

impl PeriodBucket {
    /// Bucket label for an epoch-millisecond timestamp, e.g. `2026-07-27`
    /// (daily), `2026-W30` (weekly, ISO week), `2026-07` (monthly).
    pub fn label(self, epoch_ms: u64) -> String {
        let datetime = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(epoch_ms as i64)
            .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap_or_default());
        match self {
            PeriodBucket::Daily => datetime.format("%Y-%m-%d").to_string(),
            PeriodBucket::Weekly => {
                let iso = datetime.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            PeriodBucket::Monthly => datetime.format("%Y-%m").to_string(),
        }
    }
}

/// Aggregate pass/fail/duration summary for a set of executions.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatsSummary {
    pub count: usize,
    pub pass_count: usize,
    pub pass_rate: f64,
    pub avg_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p90_duration_ms: f64,
    pub p99_duration_ms: f64,
}

impl StatsSummary {
    pub fn from_executions(executions: &[ExecutionResult]) -> Self {
        let count = executions.len();
        let pass_count = executions.iter().filter(|e| e.overall_pass == Some(true)).count();
        let mut durations: Vec<f64> =
            executions.iter().filter_map(|e| e.duration_ms).map(|d| d as f64).collect();
        durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        Self {
            count,
            pass_count,
            pass_rate: if count == 0 { 0.0 } else { pass_count as f64 / count as f64 },
            avg_duration_ms,
            p50_duration_ms: percentile(&durations, 0.50),
            p90_duration_ms: percentile(&durations, 0.90),
            p99_duration_ms: percentile(&durations, 0.99),
        }
    }

    /// Group executions into period buckets and summarize each bucket.
    pub fn by_period(executions: &[ExecutionResult], bucket: PeriodBucket) -> Vec<(String, StatsSummary)> {
        let mut groups: std::collections::BTreeMap<String, Vec<ExecutionResult>> = Default::default();
        for exec in executions {
            groups.entry(bucket.label(exec.started_at)).or_default().push(exec.clone());
        }
        groups.into_iter().map(|(label, execs)| (label, StatsSummary::from_executions(&execs))).collect()
    }
}

/// Percentile over an already-sorted ascending slice, via nearest-rank
/// interpolation. `p` in `[0.0, 1.0]`. Empty input yields `0.0`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let p = p.clamp(0.0, 1.0);
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * weight
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
