use angle_core::bidding::{BidOutcome, BiddingTopic};
use angle_core::channel::ChannelCallbacks;
use angle_core::rpc::RpcClient;

use crate::commands::common::{format_bid_line, join_bidding, open_session, parse_amount, parse_id};
use crate::error::CliError;

pub async fn run_bid(
    global_profile: Option<&str>,
    item: &str,
    amount: &str,
    over_http: bool,
) -> Result<(), CliError> {
    let item_id = parse_id("item", item)?;
    let amount = parse_amount(amount)?;
    let session = open_session(global_profile).await?;

    if over_http {
        let bid = RpcClient::new(session).make_bid(item_id, amount).await?;
        println!("{}", format_bid_line(&bid));
        return Ok(());
    }

    let channel = join_bidding(
        &session,
        BiddingTopic::Item(item_id),
        ChannelCallbacks::default(),
    )
    .await?;
    match channel.place_bid(amount).await? {
        BidOutcome::Accepted(bid) => {
            println!("{}", format_bid_line(&bid));
            Ok(())
        }
        BidOutcome::Rejected { reason } => Err(CliError::BidRejected(reason)),
    }
}
