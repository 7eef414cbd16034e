// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `stationctl`'s argument grammar. One subcommand family per admin
//! surface the Service Container exposes over the control socket: batch
//! lifecycle and batch configuration.

use clap::{Parser, Subcommand};

use crate::commands::{batch::BatchCommand, config::ConfigCommand};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "stationctl", version, about = "Operator control plane for a running station control service")]
pub struct Cli {
    /// Output format for commands that print data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect and control running batches.
    #[command(subcommand)]
    Batch(BatchCommand),

    /// Create, update, and remove batch configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}
