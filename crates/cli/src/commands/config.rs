// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stationctl config` — batch configuration CRUD against the Batch
//! Config Service, via the admin control socket.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use station_core::BatchId;
use station_daemon::{ControlRequest, ControlResponse, UpdateBatchRequest};

use crate::client::StationClient;
use crate::output::{format_or_json, handle_list, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// List every batch's stored configuration.
    List,
    /// Rename a batch.
    SetName {
        batch_id: String,
        name: String,
    },
    /// Toggle whether a batch starts automatically with the manager.
    SetAutoStart {
        batch_id: String,
        #[arg(value_parser = clap::value_parser!(bool))]
        auto_start: bool,
    },
}

pub async fn run(command: ConfigCommand, format: OutputFormat) -> Result<()> {
    let client = StationClient::connect()?;
    match command {
        ConfigCommand::List => list(&client, format).await,
        ConfigCommand::SetName { batch_id, name } => {
            let request = UpdateBatchRequest { name: Some(name), ..Default::default() };
            update(&client, batch_id, request, format).await
        }
        ConfigCommand::SetAutoStart { batch_id, auto_start } => {
            let request = UpdateBatchRequest { auto_start: Some(auto_start), ..Default::default() };
            update(&client, batch_id, request, format).await
        }
    }
}

async fn list(client: &StationClient, format: OutputFormat) -> Result<()> {
    match client.call(ControlRequest::ListConfigs).await? {
        ControlResponse::Configs(configs) => handle_list(format, &configs, "No batches configured.", |configs| {
            for config in configs {
                println!("{:<20} slot={:<3} auto_start={}", config.id, config.slot_id, config.auto_start);
            }
        }),
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

async fn update(client: &StationClient, batch_id: String, request: UpdateBatchRequest, format: OutputFormat) -> Result<()> {
    match client.call(ControlRequest::UpdateBatch { batch_id: BatchId::new(batch_id), request }).await? {
        ControlResponse::Config(config) => format_or_json(format, &config, || {
            println!("updated batch {}", config.id);
        }),
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: ControlResponse) -> anyhow::Error {
    anyhow!("unexpected response from station daemon: {response:?}")
}
