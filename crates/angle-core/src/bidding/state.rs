//! Bidding events and the reducer that folds them into local state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Bid, BidPatch, ItemSnapshot};

pub const EVENT_NEW_BID: &str = "new_bid";
pub const EVENT_BID_UPDATE: &str = "bid_update";
pub const EVENT_ITEM_STATUS_CHANGED: &str = "item_status_changed";
pub const EVENT_AUCTION_ENDED: &str = "auction_ended";

/// Live auction state for one bidding topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BiddingState {
    /// Newest first.
    pub bids: Vec<Bid>,
    pub item: Option<ItemSnapshot>,
    pub is_placing_bid: bool,
    /// Follows the latest snapshot; an `auction_ended` event sets it too.
    pub auction_ended: bool,
    /// `bid_update` events that referenced a bid this client never saw.
    pub unmatched_updates: u64,
}

/// A server event relevant to bidding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiddingEvent {
    NewBid {
        bid: Bid,
        item: Option<ItemSnapshot>,
    },
    BidUpdate(BidPatch),
    ItemStatusChanged(ItemSnapshot),
    AuctionEnded(ItemSnapshot),
}

#[derive(Deserialize)]
struct NewBidPayload {
    bid: Bid,
    #[serde(default)]
    item: Option<ItemSnapshot>,
}

#[derive(Deserialize)]
struct BidUpdatePayload {
    bid: BidPatch,
}

#[derive(Deserialize)]
struct ItemPayload {
    item: ItemSnapshot,
}

impl BiddingEvent {
    /// Decode a channel event. Events unrelated to bidding yield `None`.
    pub fn parse(event: &str, payload: &Value) -> Result<Option<Self>> {
        let parsed = match event {
            EVENT_NEW_BID => {
                let NewBidPayload { bid, item } = NewBidPayload::deserialize(payload)?;
                Self::NewBid { bid, item }
            }
            EVENT_BID_UPDATE => Self::BidUpdate(BidUpdatePayload::deserialize(payload)?.bid),
            EVENT_ITEM_STATUS_CHANGED => {
                Self::ItemStatusChanged(ItemPayload::deserialize(payload)?.item)
            }
            EVENT_AUCTION_ENDED => Self::AuctionEnded(ItemPayload::deserialize(payload)?.item),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    /// The event was a duplicate or referenced an unknown bid.
    Ignored,
}

impl BiddingState {
    pub fn apply(&mut self, event: BiddingEvent) -> Applied {
        match event {
            BiddingEvent::NewBid { bid, item } => {
                let item_changed = item.is_some_and(|item| self.replace_item(item));
                if self.bids.iter().any(|known| known.id == bid.id) {
                    return if item_changed {
                        Applied::Changed
                    } else {
                        Applied::Ignored
                    };
                }
                self.bids.insert(0, bid);
                Applied::Changed
            }
            BiddingEvent::BidUpdate(patch) => {
                match self.bids.iter_mut().find(|bid| bid.id == patch.id) {
                    Some(bid) => {
                        bid.merge(&patch);
                        Applied::Changed
                    }
                    None => {
                        self.unmatched_updates += 1;
                        Applied::Ignored
                    }
                }
            }
            BiddingEvent::ItemStatusChanged(item) => {
                self.replace_item(item);
                Applied::Changed
            }
            BiddingEvent::AuctionEnded(item) => {
                self.replace_item(item);
                self.auction_ended = true;
                Applied::Changed
            }
        }
    }

    /// Returns whether anything visible changed.
    fn replace_item(&mut self, item: ItemSnapshot) -> bool {
        let ended = item.status.is_finished();
        let changed = self.item.as_ref() != Some(&item) || self.auction_ended != ended;
        self.auction_ended = ended;
        self.item = Some(item);
        changed
    }

    /// Highest known bid.
    pub fn leading_bid(&self) -> Option<&Bid> {
        self.bids.iter().max_by_key(|bid| bid.amount)
    }
}
