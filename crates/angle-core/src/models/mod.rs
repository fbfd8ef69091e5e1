//! Data models for Angle

/// Declares a UUID-backed identifier newtype with the usual conversions.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Get the string representation of this ID.
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s.trim())?))
            }
        }
    };
}

pub(crate) use uuid_id;

mod amount;
mod bid;
mod draft;
mod image;
mod item;

pub use amount::Amount;
pub use bid::{Bid, BidId, BidPatch};
pub use draft::{
    AuctionInfo, BasicDetails, DeliveryOption, DraftId, ItemCondition, ListingDraft, Logistics,
    WizardStep,
};
pub use image::{
    positions_are_contiguous, reindex_positions, Image, ImageId, ImageOwner, OwnerType,
    PendingUpload, PendingUploadId,
};
pub use item::{AuctionStatus, ItemId, ItemSnapshot, UserId};
