//! I1 (slot uniqueness): creating and deleting batches through
//! `stationctl` never leaves the manager's slot assignments duplicated or
//! out of `1..=12`, and the allocator refuses a 13th batch.

use crate::prelude::*;

#[test]
fn slots_allocate_lowest_unused_and_reject_when_exhausted() {
    let mut station = Station::empty();
    station.install_sequence("mock_success");
    station.start_daemon();

    for n in 1..=12 {
        let batch_id = format!("batch_{n}");
        station
            .ctl()
            .args(&["batch", "create", &batch_id, &format!("Batch {n}"), "mock_success"])
            .passes()
            .stdout_has(&format!("in slot {n}"));
    }

    // The 13th batch has nowhere to go.
    station.ctl().args(&["batch", "create", "batch_13", "Batch 13", "mock_success"]).fails();

    // Freeing a slot makes it available again for the next create, and it
    // is always the lowest free one.
    station.ctl().args(&["batch", "delete", "batch_3"]).passes();
    station
        .ctl()
        .args(&["batch", "create", "batch_new", "Batch New", "mock_success"])
        .passes()
        .stdout_has("in slot 3");

    // Every configured batch still has a distinct slot id in 1..=12.
    let listing = station.ctl().args(&["config", "list", "--format", "json"]).passes().stdout();
    let configs: Vec<serde_json::Value> = serde_json::from_str(&listing).expect("json array");
    assert_eq!(configs.len(), 12);
    let mut slots: Vec<u64> = configs.iter().map(|c| c["slot_id"].as_u64().expect("slot_id")).collect();
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), 12, "slot ids must be unique");
    assert!(slots.iter().all(|&s| (1..=12).contains(&s)));
}
