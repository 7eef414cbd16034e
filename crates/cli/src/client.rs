// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin wrapper over [`station_daemon::ControlClient`] that resolves the
//! running manager's control socket the same way the manager itself
//! resolves its data directory — from `STATION_CONFIG`'s `paths.data_dir`
//! (or `./station.yaml` by default) — so `stationctl` never needs its own
//! copy of that convention.

use std::path::PathBuf;

use station_core::ConfigError;
use station_daemon::{default_socket_path, ControlClient, ControlClientError, ControlRequest, ControlResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Control(#[from] ControlClientError),
}

impl ClientError {
    /// True when the control socket could not be reached at all, as
    /// opposed to the daemon answering with an application-level error.
    pub fn is_not_running(&self) -> bool {
        matches!(self, ClientError::Control(ControlClientError::Connect(_, _)))
    }
}

pub struct StationClient {
    inner: ControlClient,
}

impl StationClient {
    /// Resolve the control socket path from the station config at
    /// `STATION_CONFIG` (default `./station.yaml`) and connect on first
    /// call — `ControlClient` itself is a thin, stateless wrapper that
    /// opens one connection per call.
    pub fn connect() -> Result<Self, ClientError> {
        let config_path = std::env::var("STATION_CONFIG").unwrap_or_else(|_| "./station.yaml".to_string());
        let station_config = station_daemon::load_or_default(std::path::Path::new(&config_path), "station", "Station")?;
        let socket_path: PathBuf = default_socket_path(std::path::Path::new(&station_config.paths.data_dir));
        Ok(Self { inner: ControlClient::new(socket_path) })
    }

    pub async fn call(&self, request: ControlRequest) -> Result<ControlResponse, ClientError> {
        Ok(self.inner.call(request).await?)
    }
}
