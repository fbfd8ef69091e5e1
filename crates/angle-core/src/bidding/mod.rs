//! Live bidding over the channel pool.
//!
//! [`BiddingChannel`] subscribes to an item topic (or the lobby), folds the
//! server's bid events into a [`BiddingState`] published through a `watch`
//! channel, and places bids as an acknowledged round-trip.

mod state;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::channel::{Channel, ChannelCallbacks, ChannelPool, ConnectionState};
use crate::error::{Error, Result};
use crate::models::{Amount, Bid, ItemId};
use crate::validation::ValidationError;

pub use state::{
    Applied, BiddingEvent, BiddingState, EVENT_AUCTION_ENDED, EVENT_BID_UPDATE,
    EVENT_ITEM_STATUS_CHANGED, EVENT_NEW_BID,
};

pub const LOBBY_TOPIC: &str = "auction:lobby";

pub const EVENT_PLACE_BID: &str = "place_bid";
pub const EVENT_BID_ACK: &str = "bid_ack";
pub const EVENT_BID_REJECTED: &str = "bid_rejected";
pub const EVENT_JOIN_ITEM: &str = "join_item";
pub const EVENT_LEAVE_ITEM: &str = "leave_item";

/// Topic a bidding channel is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiddingTopic {
    Item(ItemId),
    Lobby,
}

impl BiddingTopic {
    pub const fn item_id(self) -> Option<ItemId> {
        match self {
            Self::Item(item_id) => Some(item_id),
            Self::Lobby => None,
        }
    }
}

impl fmt::Display for BiddingTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(item_id) => write!(f, "item:{item_id}"),
            Self::Lobby => f.write_str(LOBBY_TOPIC),
        }
    }
}

/// Server verdict on a placed bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidOutcome {
    Accepted(Bid),
    Rejected { reason: String },
}

#[derive(Deserialize)]
struct AckPayload {
    client_ref: String,
    #[serde(default)]
    bid: Option<Bid>,
    #[serde(default)]
    reason: Option<String>,
}

type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<BidOutcome>>>>;

fn lock_acks(
    pending: &Mutex<HashMap<String, oneshot::Sender<BidOutcome>>>,
) -> MutexGuard<'_, HashMap<String, oneshot::Sender<BidOutcome>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BiddingChannel {
    topic: BiddingTopic,
    channel: Channel,
    state: Arc<watch::Sender<BiddingState>>,
    pending: PendingAcks,
    ack_timeout: Duration,
}

impl fmt::Debug for BiddingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BiddingChannel")
            .field("topic", &self.topic)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl BiddingChannel {
    /// Subscribe to `topic` through `pool`.
    pub async fn join(
        pool: &ChannelPool,
        topic: BiddingTopic,
        ack_timeout: Duration,
        callbacks: ChannelCallbacks,
    ) -> Result<Self> {
        let channel = pool.join(topic.to_string(), json!({}), callbacks).await?;
        let state = Arc::new(watch::channel(BiddingState::default()).0);
        let pending = PendingAcks::default();

        for event in [
            EVENT_NEW_BID,
            EVENT_BID_UPDATE,
            EVENT_ITEM_STATUS_CHANGED,
            EVENT_AUCTION_ENDED,
        ] {
            let state = Arc::clone(&state);
            let topic_name = topic.to_string();
            channel.on(event, move |payload| {
                apply_event(&state, &topic_name, event, payload);
            });
        }
        for event in [EVENT_BID_ACK, EVENT_BID_REJECTED] {
            let pending = Arc::clone(&pending);
            channel.on(event, move |payload| resolve_ack(&pending, event, payload));
        }

        Ok(Self {
            topic,
            channel,
            state,
            pending,
            ack_timeout,
        })
    }

    pub const fn topic(&self) -> BiddingTopic {
        self.topic
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    /// Wait for the underlying join to settle.
    pub async fn joined(&self, timeout: Duration) -> Result<()> {
        self.channel.joined(timeout).await
    }

    /// Current state snapshot.
    pub fn state(&self) -> BiddingState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<BiddingState> {
        self.state.subscribe()
    }

    /// Place a bid and wait for the server to accept or reject it.
    pub async fn place_bid(&self, amount: Amount) -> Result<BidOutcome> {
        let item_id = self.topic.item_id().ok_or_else(|| {
            Error::InvalidInput("bids can only be placed on an item topic".to_string())
        })?;
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.check_bid(amount)?;

        let client_ref = Uuid::now_v7().to_string();
        let _placing = PlacingGuard::try_start(&self.state, &self.pending, client_ref.clone())?;
        let (ack_tx, ack_rx) = oneshot::channel();
        lock_acks(&self.pending).insert(client_ref.clone(), ack_tx);

        let sent = self.channel.send(
            EVENT_PLACE_BID,
            json!({ "item_id": item_id, "amount": amount, "client_ref": client_ref }),
        );
        if !sent {
            return Err(Error::NotConnected);
        }
        tracing::info!(%item_id, %amount, "Placing bid");

        let outcome = tokio::time::timeout(self.ack_timeout, ack_rx)
            .await
            .map_err(|_| Error::Timeout("bid acknowledgment".to_string()))?
            .map_err(|_| Error::Closed("bidding channel"))?;
        match &outcome {
            BidOutcome::Accepted(bid) => tracing::info!(bid_id = %bid.id, "Bid accepted"),
            BidOutcome::Rejected { reason } => tracing::info!(%reason, "Bid rejected"),
        }
        Ok(outcome)
    }

    fn check_bid(&self, amount: Amount) -> Result<()> {
        let state = self.state.borrow();
        if amount.is_zero() {
            return Err(invalid_amount("must be greater than zero"));
        }
        if state.auction_ended {
            return Err(ValidationError::InvalidField {
                field: "item",
                reason: "is no longer accepting bids".to_string(),
            }
            .into());
        }
        if let Some(item) = &state.item {
            if !item.status.accepts_bids() {
                return Err(ValidationError::InvalidField {
                    field: "item",
                    reason: format!("is not accepting bids ({:?})", item.status),
                }
                .into());
            }
            match (item.current_price, item.starting_price) {
                (Some(current), _) if amount <= current => {
                    return Err(invalid_amount(&format!("must exceed the current price {current}")));
                }
                (None, Some(starting)) if amount < starting => {
                    return Err(invalid_amount(&format!(
                        "must be at least the starting price {starting}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Lobby only: start receiving events for `item_id`.
    pub fn watch_item(&self, item_id: ItemId) -> Result<()> {
        self.lobby_push(EVENT_JOIN_ITEM, item_id)
    }

    /// Lobby only: stop receiving events for `item_id`.
    pub fn unwatch_item(&self, item_id: ItemId) -> Result<()> {
        self.lobby_push(EVENT_LEAVE_ITEM, item_id)
    }

    fn lobby_push(&self, event: &str, item_id: ItemId) -> Result<()> {
        if self.topic != BiddingTopic::Lobby {
            return Err(Error::InvalidInput(format!("{event} is only valid on the lobby")));
        }
        if self.channel.send(event, json!({ "item_id": item_id })) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

fn invalid_amount(reason: &str) -> Error {
    ValidationError::InvalidField {
        field: "amount",
        reason: reason.to_string(),
    }
    .into()
}

fn apply_event(state: &watch::Sender<BiddingState>, topic: &str, event: &str, payload: &Value) {
    let parsed = match BiddingEvent::parse(event, payload) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => return,
        Err(error) => {
            tracing::warn!(topic, event, %error, "Ignoring malformed bidding event");
            return;
        }
    };
    let unmatched_id = match &parsed {
        BiddingEvent::BidUpdate(patch) => Some(patch.id),
        _ => None,
    };

    let mut applied = Applied::Changed;
    state.send_if_modified(|state| {
        applied = state.apply(parsed);
        // Counting a miss still changes the published state.
        applied == Applied::Changed || unmatched_id.is_some()
    });
    if let (Applied::Ignored, Some(bid_id)) = (applied, unmatched_id) {
        tracing::warn!(topic, %bid_id, "bid_update for an unknown bid");
    }
}

fn resolve_ack(
    pending: &Mutex<HashMap<String, oneshot::Sender<BidOutcome>>>,
    event: &str,
    payload: &Value,
) {
    let ack = match AckPayload::deserialize(payload) {
        Ok(ack) => ack,
        Err(error) => {
            tracing::warn!(event, %error, "Ignoring malformed bid acknowledgment");
            return;
        }
    };
    let outcome = match (event, ack.bid) {
        (EVENT_BID_ACK, Some(bid)) => BidOutcome::Accepted(bid),
        (EVENT_BID_ACK, None) => {
            tracing::warn!(client_ref = %ack.client_ref, "bid_ack without a bid");
            return;
        }
        _ => BidOutcome::Rejected {
            reason: ack.reason.unwrap_or_else(|| "rejected".to_string()),
        },
    };

    let waiter = lock_acks(pending).remove(&ack.client_ref);
    match waiter {
        Some(waiter) => {
            let _ = waiter.send(outcome);
        }
        None => tracing::debug!(client_ref = %ack.client_ref, "Acknowledgment for another client"),
    }
}

/// Holds `is_placing_bid` for the duration of one round-trip, including when
/// the caller stops waiting.
struct PlacingGuard<'a> {
    state: &'a watch::Sender<BiddingState>,
    pending: &'a Mutex<HashMap<String, oneshot::Sender<BidOutcome>>>,
    client_ref: String,
}

impl<'a> PlacingGuard<'a> {
    /// Claim the flag, or fail with `Busy` if another bid holds it.
    fn try_start(
        state: &'a watch::Sender<BiddingState>,
        pending: &'a Mutex<HashMap<String, oneshot::Sender<BidOutcome>>>,
        client_ref: String,
    ) -> Result<Self> {
        let mut claimed = false;
        state.send_if_modified(|state| {
            if state.is_placing_bid {
                return false;
            }
            state.is_placing_bid = true;
            claimed = true;
            true
        });
        if !claimed {
            return Err(Error::Busy(
                "a bid is already awaiting acknowledgment".to_string(),
            ));
        }
        Ok(Self {
            state,
            pending,
            client_ref,
        })
    }
}

impl Drop for PlacingGuard<'_> {
    fn drop(&mut self) {
        lock_acks(self.pending).remove(&self.client_ref);
        self.state.send_modify(|state| state.is_placing_bid = false);
    }
}
