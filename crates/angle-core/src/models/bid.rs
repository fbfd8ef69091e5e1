//! Bid model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, ItemId, UserId};

uuid_id!(
    /// Identifier of a bid.
    BidId
);

/// Client-side projection of a bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub amount: Amount,
    pub bidder_id: UserId,
    pub item_id: ItemId,
    pub inserted_at: DateTime<Utc>,
}

/// Partial bid fields carried by a `bid_update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidPatch {
    pub id: BidId,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub bidder_id: Option<UserId>,
    #[serde(default)]
    pub inserted_at: Option<DateTime<Utc>>,
}

impl Bid {
    /// Merge the fields present in `patch` into this bid.
    ///
    /// The id and item are never changed by a patch.
    pub fn merge(&mut self, patch: &BidPatch) {
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(bidder_id) = patch.bidder_id {
            self.bidder_id = bidder_id;
        }
        if let Some(inserted_at) = patch.inserted_at {
            self.inserted_at = inserted_at;
        }
    }
}
