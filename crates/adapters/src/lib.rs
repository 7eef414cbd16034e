// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-system adapters: the MES Backend Client and Token Manager
//! (HTTP), and the hardware boundary (`Driver`, barcode scanner) that a
//! Batch Worker dispatches `MANUAL_CONTROL` commands and scan events
//! through.

pub mod backend;
pub mod barcode;
pub mod driver;
pub mod token;

pub use backend::{
    AuthMode, BackendClient, LoginResponse, ProcessCompleteRequest, ProcessStartRequest, SerialConvertRequest,
    SessionStatus, WipLookupResult,
};
pub use barcode::{BarcodeScanner, spawn_scan_loop};
pub use driver::{Command, CommandSchema, Driver};
pub use token::{RefreshResult, RefreshedTokens, TokenManager, TokenUpdateCallback, REFRESH_COOLDOWN_MS};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    pub use crate::barcode::test_support::FakeScanner;
    pub use crate::driver::test_support::FakeDriver;
}
