// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod search;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// ContentGuard search CLI
#[derive(Parser, Debug)]
#[command(name = "contentguard-search")]
#[command(version)]
#[command(about = "Multi-engine search for content protection", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one search across the configured engines
    Search(search::SearchArgs),

    /// List providers with quota usage
    Providers(search::ProvidersArgs),

    /// Print the effective configuration with secrets masked
    Config(search::ConfigArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search(args) => search::run_search(args).await,
        Commands::Providers(args) => search::list_providers(args),
        Commands::Config(args) => search::show_config(args),
    }
}
