// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stationctl`: the operator control plane for a running station control
//! service, driving it over the admin control socket instead of the
//! out-of-scope REST surface.

mod cli;
mod client;
mod commands;
mod output;

use clap::Parser;
use client::ClientError;

/// Station daemon unreachable — distinct from an application-level error
/// the daemon itself reported, so scripts can tell "not running" apart
/// from "request rejected".
const EXIT_NOT_RUNNING: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    if let Err(e) = run(cli).await {
        if let Some(client_error) = e.downcast_ref::<ClientError>() {
            if client_error.is_not_running() {
                eprintln!("station daemon is not running (no response on the control socket)");
                std::process::exit(EXIT_NOT_RUNNING);
            }
        }
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: cli::Cli) -> anyhow::Result<()> {
    match cli.command {
        cli::Command::Batch(command) => commands::batch::run(command, cli.format).await,
        cli::Command::Config(command) => commands::config::run(command, cli.format).await,
    }
}
