use angle_core::query::{Mutation, QueryClient, QueryKey};
use angle_core::rpc::{RpcClient, Wallet, WalletTransaction};

use crate::cli::WalletCommands;
use crate::commands::common::{open_session, parse_amount};
use crate::error::CliError;

pub fn wallet_key() -> QueryKey {
    QueryKey::new(["wallet"])
}

pub async fn run_wallet(
    command: WalletCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(global_profile).await?;
    let rpc = RpcClient::new(session);
    let queries = QueryClient::default();

    match command {
        WalletCommands::Balance { json } => {
            let wallet = fetch_wallet(&queries, &rpc).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*wallet)?);
            } else {
                println!("{}", format_balance(&wallet));
            }
        }
        WalletCommands::Deposit { amount } => {
            let amount = parse_amount(&amount)?;
            let transaction = queries
                .mutate(
                    Mutation::new()
                        .invalidates(wallet_key())
                        .on_error(|error| tracing::warn!(%error, "Deposit failed")),
                    rpc.deposit_to_wallet(amount),
                )
                .await?;
            print_transaction(&transaction);
        }
        WalletCommands::Withdraw { amount } => {
            let amount = parse_amount(&amount)?;
            let transaction = queries
                .mutate(
                    Mutation::new()
                        .invalidates(wallet_key())
                        .on_error(|error| tracing::warn!(%error, "Withdrawal failed")),
                    rpc.withdraw_from_wallet(amount),
                )
                .await?;
            print_transaction(&transaction);
            let wallet = fetch_wallet(&queries, &rpc).await?;
            println!("{}", format_balance(&wallet));
        }
    }
    Ok(())
}

async fn fetch_wallet(
    queries: &QueryClient,
    rpc: &RpcClient,
) -> Result<std::sync::Arc<Wallet>, CliError> {
    Ok(queries.fetch(wallet_key(), || rpc.get_wallet()).await?)
}

pub fn format_balance(wallet: &Wallet) -> String {
    match &wallet.currency {
        Some(currency) => format!("Balance: {} {currency}", wallet.balance),
        None => format!("Balance: {}", wallet.balance),
    }
}

fn print_transaction(transaction: &WalletTransaction) {
    println!(
        "{}  {}  {}",
        transaction.reference, transaction.amount, transaction.status
    );
    if let Some(url) = &transaction.authorization_url {
        println!("Complete the payment at {url}");
        println!(
            "Then run `angle payments verify {}`",
            transaction.reference
        );
    }
}
