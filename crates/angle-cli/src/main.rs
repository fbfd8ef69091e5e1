//! Angle CLI - follow auctions, bid and manage listings from the terminal.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::bid::run_bid;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::images::run_images;
use crate::commands::listing::run_listing;
use crate::commands::orders::run_orders;
use crate::commands::payments::run_payments;
use crate::commands::wallet::run_wallet;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "angle=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Watch {
            item,
            lobby_items,
            json,
        } => run_watch(profile, item.as_deref(), &lobby_items, json).await?,
        Commands::Bid { item, amount, http } => run_bid(profile, &item, &amount, http).await?,
        Commands::Images { command } => run_images(command, profile).await?,
        Commands::Listing { command } => run_listing(command, profile).await?,
        Commands::Wallet { command } => run_wallet(command, profile).await?,
        Commands::Orders { command } => run_orders(command, profile).await?,
        Commands::Payments { command } => run_payments(command, profile).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
