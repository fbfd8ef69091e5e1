use angle_core::rpc::RpcClient;

use crate::cli::PaymentCommands;
use crate::commands::common::open_session;
use crate::commands::wallet::format_balance;
use crate::error::CliError;

pub async fn run_payments(
    command: PaymentCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        PaymentCommands::Verify { reference } => {
            let reference = reference.trim();
            if reference.is_empty() {
                return Err(CliError::Core(angle_core::Error::InvalidInput(
                    "payment reference must not be empty".to_string(),
                )));
            }
            let session = open_session(global_profile).await?;
            let verification = RpcClient::new(session).verify_payment(reference).await?;
            println!("{}  {}", verification.reference, verification.status);
            if let Some(wallet) = &verification.wallet {
                println!("{}", format_balance(wallet));
            }
            Ok(())
        }
    }
}
