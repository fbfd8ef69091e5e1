use std::collections::HashSet;

use angle_core::bidding::{BiddingState, BiddingTopic};
use angle_core::channel::ChannelCallbacks;
use angle_core::models::{BidId, ItemId};
use tokio::sync::mpsc;

use crate::commands::common::{
    format_bid_line, format_state_summary, join_bidding, open_session, parse_id,
};
use crate::error::CliError;

pub async fn run_watch(
    global_profile: Option<&str>,
    item: Option<&str>,
    lobby_items: &[String],
    as_json: bool,
) -> Result<(), CliError> {
    let topic = match item {
        Some(id) => BiddingTopic::Item(parse_id("item", id)?),
        None => BiddingTopic::Lobby,
    };
    let lobby_items = lobby_items
        .iter()
        .map(|id| parse_id::<ItemId>("item", id))
        .collect::<Result<Vec<_>, _>>()?;

    let session = open_session(global_profile).await?;
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<String>();
    let error_tx = closed_tx.clone();
    let callbacks = ChannelCallbacks::default()
        .on_error(move |reason| {
            let _ = error_tx.send(format!("Channel error: {reason}"));
        })
        .on_close(move || {
            let _ = closed_tx.send("Channel closed".to_string());
        });
    let channel = join_bidding(&session, topic, callbacks).await?;
    for item_id in lobby_items {
        channel.watch_item(item_id)?;
    }
    eprintln!("Watching {topic}. Press Ctrl-C to stop.");

    let mut updates = channel.subscribe();
    let mut seen = HashSet::new();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                render_state(&state, &mut seen, as_json)?;
                if state.auction_ended && topic.item_id().is_some() {
                    eprintln!("Auction ended");
                    break;
                }
            }
            Some(message) = closed_rx.recv() => {
                eprintln!("{message}");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Print bids not seen before (oldest first), then the summary line.
pub fn render_state(
    state: &BiddingState,
    seen: &mut HashSet<BidId>,
    as_json: bool,
) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }
    for line in unseen_bid_lines(state, seen) {
        println!("{line}");
    }
    println!("{}", format_state_summary(state));
    Ok(())
}

pub fn unseen_bid_lines(state: &BiddingState, seen: &mut HashSet<BidId>) -> Vec<String> {
    state
        .bids
        .iter()
        .rev()
        .filter(|bid| seen.insert(bid.id))
        .map(format_bid_line)
        .collect()
}
