// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardware driver boundary. The original dispatches `MANUAL_CONTROL`
//! commands by reflecting over a live driver instance's methods; this core
//! fixes that surface as a `Driver` capability trait plus a `Command`
//! tagged union enumerating the operations a driver can support, so an
//! unknown command is a typed `UnknownCommand` error instead of an
//! `AttributeError`.

use async_trait::async_trait;
use serde_json::Value;
use station_core::DriverError;

/// A named, JSON-parameterized operation dispatched by `MANUAL_CONTROL`.
/// Mirrors the original's "named method + kwargs" shape without the
/// reflection: the driver advertises which commands it accepts via
/// [`Driver::commands`] and validates the name itself in [`Driver::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub params: Value,
}

impl Command {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self { name: name.into(), params }
    }
}

/// Description of one command a driver supports, for discovery by a future
/// REST/CLI caller — the fixed-schema replacement for the original's
/// runtime method introspection (spec.md §9 REDESIGN FLAGS).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CommandSchema {
    pub name: String,
    pub params_schema: Value,
}

/// Capability boundary for a piece of test-station hardware. Implementors
/// are the physical/simulated device adapters; this crate defines only the
/// trait and a few test doubles (`test-support`), never a concrete
/// instrument driver.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable identifier matching the `hardware` key in `BatchConfig`.
    fn device_id(&self) -> &str;

    /// Commands this driver accepts, for discovery.
    fn commands(&self) -> Vec<CommandSchema>;

    /// Dispatch a named command. Implementations validate `command.name`
    /// against their own command set and return `UnknownCommand` rather
    /// than panicking on an unrecognized name.
    async fn dispatch(&self, command: Command) -> Result<Value, DriverError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// In-memory driver double recording dispatched commands and replaying
    /// canned responses, for worker/manager tests that exercise
    /// `MANUAL_CONTROL` without real hardware.
    pub struct FakeDriver {
        device_id: String,
        known_commands: Vec<String>,
        calls: Arc<Mutex<Vec<Command>>>,
        response: Value,
    }

    impl FakeDriver {
        pub fn new(device_id: impl Into<String>, known_commands: &[&str]) -> Self {
            Self {
                device_id: device_id.into(),
                known_commands: known_commands.iter().map(|s| s.to_string()).collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
                response: Value::Null,
            }
        }

        pub fn with_response(mut self, response: Value) -> Self {
            self.response = response;
            self
        }

        pub fn calls(&self) -> Vec<Command> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn device_id(&self) -> &str {
            &self.device_id
        }

        fn commands(&self) -> Vec<CommandSchema> {
            self.known_commands
                .iter()
                .map(|name| CommandSchema { name: name.clone(), params_schema: Value::Null })
                .collect()
        }

        async fn dispatch(&self, command: Command) -> Result<Value, DriverError> {
            if !self.known_commands.contains(&command.name) {
                return Err(DriverError::UnknownCommand(command.name));
            }
            self.calls.lock().push(command);
            Ok(self.response.clone())
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
