//! Auction item snapshot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Amount;

uuid_id!(
    /// Identifier of an auction item (also used for drafts).
    ItemId
);

uuid_id!(
    /// Identifier of a marketplace user.
    UserId
);

/// Lifecycle status of an auction as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Draft,
    Scheduled,
    Active,
    Ended,
    Sold,
    Cancelled,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl AuctionStatus {
    /// Whether the auction still accepts bids.
    #[must_use]
    pub const fn accepts_bids(self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Ended | Self::Sold | Self::Cancelled)
    }
}

/// Server-side item state as pushed over the bidding channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub current_price: Option<Amount>,
    #[serde(default)]
    pub starting_price: Option<Amount>,
    pub status: AuctionStatus,
    #[serde(default)]
    pub bid_count: u32,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub winner_id: Option<UserId>,
}

impl ItemSnapshot {
    /// Lowest amount a new bid has to beat.
    #[must_use]
    pub fn price_floor(&self) -> Amount {
        self.current_price
            .or(self.starting_price)
            .unwrap_or(Amount::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_falls_back() {
        let status: AuctionStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, AuctionStatus::Unknown);
        assert!(!status.accepts_bids());
    }

    #[test]
    fn snapshot_parses_sparse_payload() {
        let payload = r#"{
            "id": "0190f2a4-6c1e-7a3b-9d1e-3f4a5b6c7d8e",
            "status": "active",
            "current_price": "42.00"
        }"#;
        let item: ItemSnapshot = serde_json::from_str(payload).unwrap();
        assert_eq!(item.status, AuctionStatus::Active);
        assert_eq!(item.price_floor(), Amount::from_cents(4200));
        assert_eq!(item.bid_count, 0);
        assert!(item.winner_id.is_none());
    }

    #[test]
    fn price_floor_prefers_current_price() {
        let item = ItemSnapshot {
            id: ItemId::from_uuid(uuid::Uuid::nil()),
            title: "Lamp".to_string(),
            current_price: None,
            starting_price: Some(Amount::from_cents(500)),
            status: AuctionStatus::Active,
            bid_count: 0,
            end_time: None,
            winner_id: None,
        };
        assert_eq!(item.price_floor(), Amount::from_cents(500));
    }
}
