use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] angle_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid {kind} ID: {value}")]
    InvalidId { kind: &'static str, value: String },
    #[error("Invalid image owner '{0}'; expected item:<id>, avatar:<id> or logo:<id>")]
    InvalidOwner(String),
    #[error("No image at position {0}")]
    ImageNotFound(usize),
    #[error("{0} of the selected images could not be uploaded")]
    UploadsFailed(usize),
    #[error("Bid rejected: {0}")]
    BidRejected(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "API base URL is not configured. Run `angle config init --api-base-url <url>` or set ANGLE_API_BASE_URL."
    )]
    NotConfigured,
}
