//! Error types for angle-core

use thiserror::Error;

use crate::rpc::RpcFieldError;
use crate::validation::ValidationError;

/// Result type alias using angle-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in angle-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// RPC call answered with `success: false`
    #[error("RPC call failed: {}", render_rpc_errors(.0))]
    Rpc(Vec<RpcFieldError>),

    /// Non-envelope API failure (HTTP status, unexpected body)
    #[error("API error: {0}")]
    Api(String),

    /// Client-side validation failure; the request was never sent
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Channel is not joined
    #[error("Channel is not connected")]
    NotConnected,

    /// Real-time channel failure (join refused, transport lost)
    #[error("Channel error: {0}")]
    Channel(String),

    /// No acknowledgment arrived in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Another conflicting operation is still in flight
    #[error("Busy: {0}")]
    Busy(String),

    /// Listing was already published
    #[error("Listing has already been published")]
    AlreadyPublished,

    /// Background service has shut down
    #[error("Service closed: {0}")]
    Closed(&'static str),
}

fn render_rpc_errors(errors: &[RpcFieldError]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
