//! Typed wrappers for the backend actions used by this client.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::RpcClient;
use crate::error::Result;
use crate::models::{
    uuid_id, Amount, AuctionInfo, AuctionStatus, BasicDetails, Bid, DraftId, Image, ImageOwner,
    ItemId, Logistics,
};

uuid_id!(
    /// Identifier of a purchase order.
    OrderId
);

const BID_FIELDS: &[&str] = &["id", "amount", "bidder_id", "item_id", "inserted_at"];
const DRAFT_FIELDS: &[&str] = &["id", "title", "status"];
const IMAGE_FIELDS: &[&str] = &["id", "position", "variants"];
const WALLET_FIELDS: &[&str] = &["balance", "currency"];

/// Draft item as returned by create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub id: DraftId,
    #[serde(default)]
    pub title: String,
    #[serde(default = "draft_status")]
    pub status: AuctionStatus,
}

const fn draft_status() -> AuctionStatus {
    AuctionStatus::Draft
}

/// Fields persisted by one wizard step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DraftUpdate {
    BasicDetails(BasicDetails),
    AuctionInfo(AuctionInfo),
    Logistics(Logistics),
}

#[derive(Debug, Serialize)]
struct DraftUpdateInput<'a> {
    id: DraftId,
    #[serde(flatten)]
    update: &'a DraftUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedItem {
    pub id: ItemId,
    pub status: AuctionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub balance: Amount,
    #[serde(default)]
    pub currency: Option<String>,
}

/// A wallet movement; deposits carry the access code for the payment widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub reference: String,
    pub amount: Amount,
    pub status: String,
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default)]
    pub authorization_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub reference: String,
    pub status: String,
    #[serde(default)]
    pub wallet: Option<Wallet>,
}

impl RpcClient {
    /// Place a bid over HTTP (used when no live channel is available).
    pub async fn make_bid(&self, item_id: ItemId, amount: Amount) -> Result<Bid> {
        self.run(
            "make_bid",
            &json!({ "item_id": item_id, "amount": amount }),
            BID_FIELDS,
        )
        .await
    }

    pub async fn create_draft_item(&self, details: &BasicDetails) -> Result<DraftItem> {
        self.run("create_draft_item", details, DRAFT_FIELDS).await
    }

    pub async fn update_draft_item(&self, id: DraftId, update: &DraftUpdate) -> Result<DraftItem> {
        self.run(
            "update_draft_item",
            &DraftUpdateInput { id, update },
            DRAFT_FIELDS,
        )
        .await
    }

    pub async fn publish_item(&self, id: DraftId) -> Result<PublishedItem> {
        self.run("publish_item", &json!({ "id": id }), &["id", "status"])
            .await
    }

    /// Confirmed images of an owner, in display order.
    pub async fn list_images(&self, owner: ImageOwner) -> Result<Vec<Image>> {
        let mut images: Vec<Image> = self
            .run(
                "list_images",
                &json!({
                    "owner_type": owner.owner_type(),
                    "owner_id": owner.owner_id(),
                }),
                IMAGE_FIELDS,
            )
            .await?;
        images.sort_by_key(|image| image.position);
        Ok(images)
    }

    pub async fn confirm_receipt(&self, order_id: OrderId) -> Result<Order> {
        self.run(
            "confirm_receipt",
            &json!({ "id": order_id }),
            &["id", "status"],
        )
        .await
    }

    pub async fn get_wallet(&self) -> Result<Wallet> {
        self.run("get_wallet", &json!({}), WALLET_FIELDS).await
    }

    pub async fn deposit_to_wallet(&self, amount: Amount) -> Result<WalletTransaction> {
        self.run(
            "deposit_to_wallet",
            &json!({ "amount": amount }),
            &[
                "reference",
                "amount",
                "status",
                "access_code",
                "authorization_url",
            ],
        )
        .await
    }

    pub async fn withdraw_from_wallet(&self, amount: Amount) -> Result<WalletTransaction> {
        self.run(
            "withdraw_from_wallet",
            &json!({ "amount": amount }),
            &["reference", "amount", "status"],
        )
        .await
    }

    /// Server-side verification after the payment widget reports completion.
    pub async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification> {
        self.run(
            "verify_payment",
            &json!({ "reference": reference }),
            &["reference", "status", "wallet"],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::ApiSession;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    #[test]
    fn draft_update_flattens_step_fields() {
        let id: DraftId = "0190f2a4-6c1e-7a3b-9d1e-3f4a5b6c7d8e".parse().unwrap();
        let update = DraftUpdate::Logistics(Logistics {
            delivery_options: vec![crate::models::DeliveryOption::Pickup],
            location: "Accra".to_string(),
            shipping_fee: None,
        });
        let value = serde_json::to_value(DraftUpdateInput {
            id,
            update: &update,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "id": "0190f2a4-6c1e-7a3b-9d1e-3f4a5b6c7d8e",
                "delivery_options": ["pickup"],
                "location": "Accra",
                "shipping_fee": null
            })
        );
    }

    #[test]
    fn order_id_parses_trimmed_uuid() {
        let id: OrderId = " 0190f2a4-6c1e-7a3b-9d1e-3f4a5b6c7d8e ".parse().unwrap();
        assert_eq!(id.to_string(), "0190f2a4-6c1e-7a3b-9d1e-3f4a5b6c7d8e");
        assert!("not-an-order".parse::<OrderId>().is_err());
    }

    #[tokio::test]
    async fn list_images_sorts_by_position() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rpc/run")
            .match_body(Matcher::PartialJson(json!({"action": "list_images"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": true, "data": [
                    {"id": "0190f2a4-6c1e-7a3b-9d1e-000000000002", "position": 1, "variants": {}},
                    {"id": "0190f2a4-6c1e-7a3b-9d1e-000000000001", "position": 0, "variants": {}}
                ]}"#,
            )
            .create_async()
            .await;

        let config = ClientConfig::new(server.url()).unwrap();
        let client = RpcClient::new(ApiSession::new(config, None).unwrap());
        let owner = ImageOwner::Item("0190f2a4-6c1e-7a3b-9d1e-3f4a5b6c7d8e".parse().unwrap());
        let images = client.list_images(owner).await.unwrap();

        assert_eq!(
            images.iter().map(|image| image.position).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[tokio::test]
    async fn deposit_returns_access_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rpc/run")
            .match_body(Matcher::PartialJson(
                json!({"action": "deposit_to_wallet", "input": {"amount": "25.00"}}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": true, "data": {
                    "reference": "dep_1", "amount": "25.00", "status": "pending",
                    "access_code": "ac_123"
                }}"#,
            )
            .create_async()
            .await;

        let config = ClientConfig::new(server.url()).unwrap();
        let client = RpcClient::new(ApiSession::new(config, None).unwrap());
        let transaction = client
            .deposit_to_wallet(Amount::from_cents(2500))
            .await
            .unwrap();

        assert_eq!(transaction.access_code.as_deref(), Some("ac_123"));
        assert_eq!(transaction.amount, Amount::from_cents(2500));
    }
}
