//! Image uploads, removal and drag-reorder with optimistic local state.

mod api;
mod manager;
mod preview;
mod reorder;

pub use api::{HttpUploadApi, UploadApi, UploadProgress};
pub use manager::{AddReport, ImageManager, ImageSet, Notice};
pub use preview::PreviewStore;
pub use reorder::{move_image, restore_order};
