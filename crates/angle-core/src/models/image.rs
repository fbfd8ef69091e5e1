//! Image and pending upload models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ItemId, UserId};

uuid_id!(
    /// Identifier of a server-confirmed image.
    ImageId
);

uuid_id!(
    /// Client-generated identifier of an in-flight upload.
    PendingUploadId
);

impl PendingUploadId {
    /// Create a new unique pending upload ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }
}

impl Default for PendingUploadId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of entity an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Item,
    UserAvatar,
    StoreLogo,
}

impl OwnerType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::UserAvatar => "user_avatar",
            Self::StoreLogo => "store_logo",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity an image set belongs to; scopes upload and delete authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageOwner {
    Item(ItemId),
    UserAvatar(UserId),
    StoreLogo(UserId),
}

impl ImageOwner {
    #[must_use]
    pub const fn owner_type(self) -> OwnerType {
        match self {
            Self::Item(_) => OwnerType::Item,
            Self::UserAvatar(_) => OwnerType::UserAvatar,
            Self::StoreLogo(_) => OwnerType::StoreLogo,
        }
    }

    #[must_use]
    pub fn owner_id(self) -> String {
        match self {
            Self::Item(id) => id.as_str(),
            Self::UserAvatar(id) | Self::StoreLogo(id) => id.as_str(),
        }
    }

    /// Avatars and store logos hold a single image.
    #[must_use]
    pub const fn is_single_image(self) -> bool {
        !matches!(self, Self::Item(_))
    }
}

impl fmt::Display for ImageOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type(), self.owner_id())
    }
}

/// A server-confirmed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    /// Display order within the owner; position 0 is the cover image.
    #[serde(default)]
    pub position: u32,
    /// Size name (`thumbnail`, `medium`, `large`, ...) to URL.
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
}

impl Image {
    /// URL for a variant, falling back to any available size.
    #[must_use]
    pub fn variant_url(&self, size: &str) -> Option<&str> {
        self.variants
            .get(size)
            .or_else(|| self.variants.values().next())
            .map(String::as_str)
    }
}

/// An upload that has been accepted locally but not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingUpload {
    pub id: PendingUploadId,
    pub file_name: String,
    /// Local preview resource, revoked when the upload settles.
    pub preview_url: String,
    /// Upload progress in percent.
    pub progress: u8,
}

/// Reassign positions so they follow slice order starting at 0.
#[allow(clippy::cast_possible_truncation)]
pub fn reindex_positions(images: &mut [Image]) {
    for (index, image) in images.iter_mut().enumerate() {
        image.position = index as u32;
    }
}

/// Whether positions form the sequence `0..len` in slice order.
pub fn positions_are_contiguous(images: &[Image]) -> bool {
    images
        .iter()
        .enumerate()
        .all(|(index, image)| usize::try_from(image.position).is_ok_and(|pos| pos == index))
}
