// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stationctl batch` — lifecycle control and status/stats queries against
//! a running manager's Batch Manager, via the admin control socket.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use station_core::BatchId;
use station_daemon::{ControlRequest, ControlResponse, CreateBatchRequest};

use crate::client::StationClient;
use crate::output::{format_or_json, handle_list, OutputFormat};

#[derive(Subcommand)]
pub enum BatchCommand {
    /// List every configured batch and its current runtime status.
    List,
    /// Show one batch's current runtime status.
    Status {
        batch_id: String,
    },
    /// Start a configured, stopped batch.
    Start {
        batch_id: String,
    },
    /// Stop a running batch.
    Stop {
        batch_id: String,
    },
    /// Stop then start a batch.
    Restart {
        batch_id: String,
    },
    /// Show recent execution statistics for a batch.
    Stats {
        batch_id: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Create a new batch configuration.
    Create {
        batch_id: String,
        name: String,
        sequence_package: String,
        #[arg(long)]
        auto_start: bool,
    },
    /// Remove a batch's configuration. Fails if the batch is running.
    Delete {
        batch_id: String,
    },
}

pub async fn run(command: BatchCommand, format: OutputFormat) -> Result<()> {
    let client = StationClient::connect()?;
    match command {
        BatchCommand::List => list(&client, format).await,
        BatchCommand::Status { batch_id } => status(&client, batch_id, format).await,
        BatchCommand::Start { batch_id } => {
            ok_or_error(client.call(ControlRequest::StartBatch { batch_id: BatchId::new(batch_id) }).await?)?;
            println!("batch started");
            Ok(())
        }
        BatchCommand::Stop { batch_id } => {
            ok_or_error(client.call(ControlRequest::StopBatch { batch_id: BatchId::new(batch_id) }).await?)?;
            println!("batch stopped");
            Ok(())
        }
        BatchCommand::Restart { batch_id } => {
            ok_or_error(client.call(ControlRequest::RestartBatch { batch_id: BatchId::new(batch_id) }).await?)?;
            println!("batch restarted");
            Ok(())
        }
        BatchCommand::Stats { batch_id, limit } => stats(&client, batch_id, limit, format).await,
        BatchCommand::Create { batch_id, name, sequence_package, auto_start } => {
            create(&client, batch_id, name, sequence_package, auto_start, format).await
        }
        BatchCommand::Delete { batch_id } => {
            ok_or_error(client.call(ControlRequest::DeleteBatch { batch_id: BatchId::new(batch_id) }).await?)?;
            println!("batch deleted");
            Ok(())
        }
    }
}

async fn list(client: &StationClient, format: OutputFormat) -> Result<()> {
    match client.call(ControlRequest::ListBatches).await? {
        ControlResponse::Statuses(statuses) => {
            let mut rows: Vec<_> = statuses.into_iter().collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            handle_list(format, &rows, "No batches configured.", |rows| {
                for (id, status) in rows {
                    println!("{id:<20} {:<10} slot={}", status.status, status.slot_id);
                }
            })
        }
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

async fn status(client: &StationClient, batch_id: String, format: OutputFormat) -> Result<()> {
    match client.call(ControlRequest::GetStatus { batch_id: BatchId::new(batch_id) }).await? {
        ControlResponse::Status(status) => format_or_json(format, &status, || {
            println!("status:          {}", status.status);
            println!("sequence:        {}", status.sequence_package);
            println!("slot:            {}", status.slot_id);
            println!("pid:             {}", status.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()));
        }),
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

async fn stats(client: &StationClient, batch_id: String, limit: i64, format: OutputFormat) -> Result<()> {
    match client.call(ControlRequest::GetStats { batch_id: BatchId::new(batch_id), limit }).await? {
        ControlResponse::Stats(stats) => format_or_json(format, &stats, || {
            println!("{stats:#?}");
        }),
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

async fn create(
    client: &StationClient,
    batch_id: String,
    name: String,
    sequence_package: String,
    auto_start: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut request = CreateBatchRequest::new(batch_id, name, sequence_package);
    request.auto_start = auto_start;
    match client.call(ControlRequest::CreateBatch(request)).await? {
        ControlResponse::Config(config) => format_or_json(format, &config, || {
            println!("created batch {} in slot {}", config.id, config.slot_id);
        }),
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

fn ok_or_error(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Ok => Ok(()),
        ControlResponse::Error(message) => Err(anyhow!(message)),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: ControlResponse) -> anyhow::Error {
    anyhow!("unexpected response from station daemon: {response:?}")
}
