//! Behavioral specifications for the station control service, driven
//! end-to-end against the real `stationd`/`stationctl` binaries.

mod prelude;

mod cli {
    mod help;
}

mod config {
    mod slots;
}

mod daemon {
    mod lifecycle;
}
