//! Racecourse CLI
//!
//! Command-line front-end for the Race betting contract.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ethers::types::Address;
use racecourse_adapter::{RaceAdapter, RacecourseConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "racecourse")]
#[command(about = "Client for the Race betting contract")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "racecourse.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the contract state as JSON
    State,

    /// Print contract events until Ctrl-C
    Watch,

    /// Bet on a horse
    PlaceBet {
        /// Horse index
        #[arg(long)]
        horse: u64,

        /// Amount in wei (decimal)
        #[arg(long)]
        amount: String,

        /// Sending account; defaults to the node's first account
        #[arg(long)]
        account: Option<String>,
    },

    /// Mark an account ready to race
    Ready {
        /// Sending account; defaults to the node's first account
        #[arg(long)]
        account: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --debug
    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = RacecourseConfig::from_file_with_env_overrides(&args.config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    info!("📋 Configuration loaded from: {:?}", args.config);

    let mut adapter = RaceAdapter::connect(
        &config,
        |event| println!("📨 {}", event),
        |status| println!("{}", status),
    )
    .await
    .map_err(|e| {
        error!("🔥 Failed to connect: {}", e);
        e
    })?;

    match args.command {
        Command::State => {
            let state = adapter.get_state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Watch => {
            info!("👀 Watching contract {:?}", adapter.contract_address());
            tokio::signal::ctrl_c().await?;
            info!("📡 Received shutdown signal");
        }
        Command::PlaceBet {
            horse,
            amount,
            account,
        } => {
            let account = resolve_account(&adapter, account).await?;
            let handle = adapter.place_bet(horse, &amount, account).await?;
            println!("{}", handle);
        }
        Command::Ready { account } => {
            let account = resolve_account(&adapter, account).await?;
            let handle = adapter.player_ready_to_race(account).await?;
            println!("{}", handle);
        }
    }

    adapter.stop_watching();
    Ok(())
}

async fn resolve_account(adapter: &RaceAdapter, account: Option<String>) -> anyhow::Result<Address> {
    match account {
        Some(account) => account
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid account address: {}", account)),
        None => adapter
            .accounts()
            .await?
            .first()
            .copied()
            .context("Node has no accounts; pass --account"),
    }
}
