//! Daemon + Batch Manager lifecycle specs.
//!
//! Drives `stationd` (manager) and `stationctl` as real OS processes
//! against an isolated station directory, exercising the control socket
//! end to end. The sequence subprocess itself is the out-of-scope Python
//! black box (spec.md §1) and is never exercised here; a batch whose
//! sequence package has no installed manifest is used instead as a fast,
//! deterministic way to observe the worker-registers-then-exits path the
//! monitor loop (spec.md §4.8, scenario 5) is built to catch.

use crate::prelude::*;

#[test]
fn batch_with_valid_manifest_stays_running_until_stopped() {
    let mut station = Station::empty();
    station.install_sequence("mock_success");
    station.start_daemon();

    station
        .ctl()
        .args(&["batch", "create", "batch_1", "Batch One", "mock_success"])
        .passes()
        .stdout_has("created batch batch_1 in slot 1");

    station.ctl().args(&["config", "list"]).passes().stdout_has("batch_1");

    station.ctl().args(&["batch", "start", "batch_1"]).passes().stdout_has("batch started");

    // With a resolvable manifest the worker registers, has nothing to
    // execute (no START_SEQUENCE sent), and simply waits on its command
    // loop — status should read "running" and stay there.
    let running = wait_for(SPEC_WAIT_MAX_MS, || {
        station.ctl().args(&["batch", "status", "batch_1"]).passes().stdout().contains("status:          running")
    });
    assert!(running, "batch should reach running status with a valid manifest");

    std::thread::sleep(std::time::Duration::from_millis(300));
    station
        .ctl()
        .args(&["batch", "status", "batch_1"])
        .passes()
        .stdout_has("status:          running");

    station.ctl().args(&["batch", "stop", "batch_1"]).passes().stdout_has("batch stopped");
    station.ctl().args(&["batch", "status", "batch_1"]).passes().stdout_has("status:          stopped");

    // Stopping an already-stopped batch surfaces NotRunning.
    station.ctl().args(&["batch", "stop", "batch_1"]).fails();
}

#[test]
fn batch_with_unresolvable_sequence_crashes_and_is_detected_by_monitor_loop() {
    let mut station = Station::empty();
    // Deliberately no `install_sequence` call: "missing" never resolves to
    // a manifest, so the worker process registers over IPC and then exits
    // non-zero out of `SequenceManifest::load`.
    station.start_daemon();

    station.ctl().args(&["batch", "create", "batch_crash", "Crashy", "missing"]).passes();
    station.ctl().args(&["batch", "start", "batch_crash"]).passes();

    let crashed = wait_for(SPEC_WAIT_MAX_MS, || {
        station
            .ctl()
            .args(&["batch", "status", "batch_crash"])
            .passes()
            .stdout()
            .contains("status:          stopped")
    });
    assert!(crashed, "monitor loop should detect the dead worker and report the batch as stopped");
}

#[test]
fn batch_create_rejects_duplicate_id() {
    let mut station = Station::empty();
    station.install_sequence("mock_success");
    station.start_daemon();

    station.ctl().args(&["batch", "create", "dup", "Dup", "mock_success"]).passes();
    station
        .ctl()
        .args(&["batch", "create", "dup", "Dup Again", "mock_success"])
        .fails()
        .stderr_has("already exists");
}

#[test]
fn batch_start_unknown_batch_is_rejected() {
    let mut station = Station::empty();
    station.start_daemon();

    station.ctl().args(&["batch", "start", "does-not-exist"]).fails();
}

#[test]
fn batch_delete_rejected_while_running_then_succeeds_after_stop() {
    let mut station = Station::empty();
    station.install_sequence("mock_success");
    station.start_daemon();

    station.ctl().args(&["batch", "create", "batch_del", "Del", "mock_success"]).passes();
    station.ctl().args(&["batch", "start", "batch_del"]).passes();

    station.ctl().args(&["batch", "delete", "batch_del"]).fails().stderr_has("running");

    station.ctl().args(&["batch", "stop", "batch_del"]).passes();
    station.ctl().args(&["batch", "delete", "batch_del"]).passes();
    station.ctl().args(&["config", "list"]).passes().stdout_has("No batches configured.");
}

/// Killing the daemon process itself and restarting it against the same
/// station directory must not lose batch configuration (it's durable
/// YAML), and the fresh manager must come back up with no stale runtime
/// state to reconcile.
#[test]
fn daemon_restart_preserves_batch_config() {
    let mut station = Station::empty();
    station.install_sequence("mock_success");
    station.start_daemon();

    station.ctl().args(&["batch", "create", "batch_r", "Restart Me", "mock_success"]).passes();
    station.kill_daemon();

    station.start_daemon();
    station.ctl().args(&["config", "list"]).passes().stdout_has("batch_r");
    station
        .ctl()
        .args(&["batch", "status", "batch_r"])
        .passes()
        .stdout_has("status:          stopped");
}
