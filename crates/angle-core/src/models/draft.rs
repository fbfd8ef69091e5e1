//! Listing draft model used by the creation wizard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, Image, ItemId};
use crate::validation::ValidationError;

/// Drafts are items that have not been published yet.
pub type DraftId = ItemId;

const TITLE_MAX_CHARS: usize = 120;
const DESCRIPTION_MAX_CHARS: usize = 5_000;

/// Wizard steps in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    BasicDetails = 1,
    AuctionInfo = 2,
    Logistics = 3,
}

impl WizardStep {
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::BasicDetails => Some(Self::AuctionInfo),
            Self::AuctionInfo => Some(Self::Logistics),
            Self::Logistics => None,
        }
    }

    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::BasicDetails => None,
            Self::AuctionInfo => Some(Self::BasicDetails),
            Self::Logistics => Some(Self::AuctionInfo),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    New,
    LikeNew,
    #[default]
    Used,
    Refurbished,
    ForParts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
    Pickup,
    Shipping,
    Meetup,
}

/// Step 1 fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasicDetails {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub condition: ItemCondition,
}

impl BasicDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(ValidationError::InvalidField {
                field: "title",
                reason: format!("must be at most {TITLE_MAX_CHARS} characters"),
            });
        }
        if self.description.chars().count() > DESCRIPTION_MAX_CHARS {
            return Err(ValidationError::InvalidField {
                field: "description",
                reason: format!("must be at most {DESCRIPTION_MAX_CHARS} characters"),
            });
        }
        Ok(())
    }
}

/// Step 2 fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionInfo {
    pub starting_price: Amount,
    #[serde(default)]
    pub reserve_price: Option<Amount>,
    #[serde(default)]
    pub buy_now_price: Option<Amount>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
}

impl AuctionInfo {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.starting_price.is_zero() {
            return Err(ValidationError::InvalidField {
                field: "starting_price",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(reserve) = self.reserve_price {
            if reserve < self.starting_price {
                return Err(ValidationError::InvalidField {
                    field: "reserve_price",
                    reason: "must not be below the starting price".to_string(),
                });
            }
        }
        if let Some(buy_now) = self.buy_now_price {
            let floor = self.reserve_price.unwrap_or(self.starting_price);
            if buy_now <= floor {
                return Err(ValidationError::InvalidField {
                    field: "buy_now_price",
                    reason: "must exceed the starting and reserve prices".to_string(),
                });
            }
        }
        let start = self.start_time.unwrap_or(now);
        if self.end_time <= start {
            return Err(ValidationError::InvalidField {
                field: "end_time",
                reason: "must be after the auction start".to_string(),
            });
        }
        Ok(())
    }
}

/// Step 3 fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Logistics {
    pub delivery_options: Vec<DeliveryOption>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub shipping_fee: Option<Amount>,
}

impl Logistics {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.delivery_options.is_empty() {
            return Err(ValidationError::MissingField("delivery_options"));
        }
        if self.location.trim().is_empty() {
            return Err(ValidationError::MissingField("location"));
        }
        let ships = self.delivery_options.contains(&DeliveryOption::Shipping);
        if !ships && self.shipping_fee.is_some() {
            return Err(ValidationError::InvalidField {
                field: "shipping_fee",
                reason: "only applies when shipping is offered".to_string(),
            });
        }
        Ok(())
    }
}

/// Multi-step listing form state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub step: WizardStep,
    pub draft_id: Option<DraftId>,
    pub basic_details: BasicDetails,
    pub auction_info: Option<AuctionInfo>,
    pub logistics: Logistics,
    pub uploaded_images: Vec<Image>,
    pub published: bool,
}

impl Default for ListingDraft {
    fn default() -> Self {
        Self {
            step: WizardStep::BasicDetails,
            draft_id: None,
            basic_details: BasicDetails::default(),
            auction_info: None,
            logistics: Logistics::default(),
            uploaded_images: Vec::new(),
            published: false,
        }
    }
}
