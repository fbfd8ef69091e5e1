use angle_core::rpc::{OrderId, RpcClient};

use crate::cli::OrderCommands;
use crate::commands::common::{open_session, parse_id};
use crate::error::CliError;

pub async fn run_orders(
    command: OrderCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        OrderCommands::Confirm { order } => {
            let order_id: OrderId = parse_id("order", &order)?;
            let session = open_session(global_profile).await?;
            let order = RpcClient::new(session).confirm_receipt(order_id).await?;
            println!("{}  {}", order.id, order.status);
            Ok(())
        }
    }
}
