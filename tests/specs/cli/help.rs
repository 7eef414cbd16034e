//! `stationctl` smoke tests that don't need a running daemon at all.

use crate::prelude::*;

#[test]
fn top_level_help_lists_batch_and_config_subcommands() {
    let station = Station::empty();
    station.ctl().args(&["--help"]).passes().stdout_has("batch").stdout_has("config");
}

#[test]
fn batch_help_lists_lifecycle_subcommands() {
    let station = Station::empty();
    station
        .ctl()
        .args(&["batch", "--help"])
        .passes()
        .stdout_has("start")
        .stdout_has("stop")
        .stdout_has("restart")
        .stdout_has("status");
}

#[test]
fn reports_daemon_not_running_distinctly_from_an_application_error() {
    let station = Station::empty();
    // No daemon started: the control socket does not exist.
    let result = station.ctl().args(&["batch", "list"]).run();
    assert_eq!(result.stdout(), "");
    let stderr = result.stderr();
    assert!(stderr.contains("not running"), "stderr: {stderr}");
}
