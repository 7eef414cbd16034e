// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Barcode scanner driver boundary. Only the trait and the thread-bridging
//! plumbing live here; a concrete serial-port implementation is a physical
//! driver and stays out of scope (spec.md §1 Non-goals), same as
//! [`crate::driver::Driver`].

use station_core::DriverError;
use tokio::sync::mpsc;

/// Blocking line source for a barcode scanner device. Implementations wrap
/// whatever serial/HID transport the real hardware uses; this crate only
/// defines the boundary a worker spawns onto a dedicated OS thread (the
/// read call blocks, so it can never run on the async runtime).
pub trait BarcodeScanner: Send + 'static {
    /// Block until one scan line is available, or the device errors.
    fn read_line(&mut self) -> Result<String, DriverError>;
}

impl BarcodeScanner for Box<dyn BarcodeScanner> {
    fn read_line(&mut self) -> Result<String, DriverError> {
        (**self).read_line()
    }
}

/// Spawn a scanner's blocking read loop on a dedicated thread, forwarding
/// each scanned value until the channel's receiver is dropped or the
/// scanner errors. Mirrors the CLI Sequence Worker's own
/// dedicated-thread-for-a-blocking-pipe idiom (spec.md §4.6).
pub fn spawn_scan_loop(mut scanner: impl BarcodeScanner) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        match scanner.read_line() {
            Ok(value) => {
                if tx.send(value).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "barcode scanner read failed, stopping scan loop");
                break;
            }
        }
    });
    rx
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// Scanner double replaying a fixed sequence of scan values, then
    /// erroring to end the loop deterministically.
    pub struct FakeScanner {
        values: VecDeque<String>,
    }

    impl FakeScanner {
        pub fn new(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self { values: values.into_iter().map(Into::into).collect() }
        }
    }

    impl BarcodeScanner for FakeScanner {
        fn read_line(&mut self) -> Result<String, DriverError> {
            self.values.pop_front().ok_or_else(|| DriverError::BarcodeScanner("no more scans".into()))
        }
    }
}

#[cfg(test)]
#[path = "barcode_tests.rs"]
mod tests;
