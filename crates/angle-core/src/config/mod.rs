//! Client configuration shared by every Angle front end.
//!
//! Provides a unified `ClientConfig` used by the CLI (and any embedding UI)
//! to discover the HTTP API, the real-time socket endpoint and client-side
//! limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::util::{is_http_url, is_ws_url, normalize_text_option};
use crate::validation::{DEFAULT_MAX_IMAGES, DEFAULT_MAX_UPLOAD_BYTES};

const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_BID_ACK_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const SOCKET_PATH: &str = "/socket";

/// Runtime client configuration.
///
/// Only public endpoints and limits live here. The CSRF token is a session
/// value and is obtained at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Socket endpoint; derived from `api_base_url` when absent.
    #[serde(default)]
    pub socket_url: Option<String>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_bid_ack_timeout_ms")]
    pub bid_ack_timeout_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

const fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

const fn default_bid_ack_timeout_ms() -> u64 {
    DEFAULT_BID_ACK_TIMEOUT_MS
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

const fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

const fn default_max_images() -> usize {
    DEFAULT_MAX_IMAGES
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the API base URL.
    pub fn new(api_base_url: impl Into<String>) -> Result<Self> {
        Self {
            api_base_url: api_base_url.into(),
            socket_url: None,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            bid_ack_timeout_ms: DEFAULT_BID_ACK_TIMEOUT_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_images: DEFAULT_MAX_IMAGES,
        }
        .normalized()
    }

    /// Parse a configuration from JSON and normalize it.
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str::<Self>(payload)?.normalized()
    }

    /// Trim values, check URL schemes and bounds.
    pub fn normalized(mut self) -> Result<Self> {
        let api_base_url = normalize_text_option(Some(self.api_base_url))
            .ok_or_else(|| Error::InvalidInput("api_base_url must not be empty".to_string()))?;
        if !is_http_url(&api_base_url) {
            return Err(Error::InvalidInput(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
        self.api_base_url = api_base_url.trim_end_matches('/').to_string();

        self.socket_url = match normalize_text_option(self.socket_url) {
            Some(socket_url) if is_ws_url(&socket_url) => {
                Some(socket_url.trim_end_matches('/').to_string())
            }
            Some(_) => {
                return Err(Error::InvalidInput(
                    "socket_url must include ws:// or wss://".to_string(),
                ))
            }
            None => None,
        };

        if self.heartbeat_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_images == 0 {
            return Err(Error::InvalidInput("max_images must be positive".to_string()));
        }
        Ok(self)
    }

    /// Socket endpoint, derived from the API base when not configured.
    ///
    /// `https://host/app` becomes `wss://host/socket`.
    pub fn resolved_socket_url(&self) -> Result<String> {
        if let Some(socket_url) = &self.socket_url {
            return Ok(socket_url.clone());
        }

        let mut url = Url::parse(&self.api_base_url)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::InvalidInput(format!("cannot derive socket URL from {url}")))?;
        url.set_path(SOCKET_PATH);
        url.set_query(None);
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub const fn bid_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.bid_ack_timeout_ms)
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let config = ClientConfig::new(" https://angle.example.com/ ").unwrap();
        assert_eq!(config.api_base_url, "https://angle.example.com");
        assert_eq!(config.bid_ack_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(ClientConfig::new("").is_err());
        assert!(ClientConfig::new("angle.example.com").is_err());

        let mut config = ClientConfig::new("https://angle.example.com").unwrap();
        config.socket_url = Some("https://angle.example.com/socket".to_string());
        assert!(config.normalized().is_err());
    }

    #[test]
    fn derives_socket_url_from_api_base() {
        let secure = ClientConfig::new("https://angle.example.com/app").unwrap();
        assert_eq!(
            secure.resolved_socket_url().unwrap(),
            "wss://angle.example.com/socket"
        );

        let local = ClientConfig::new("http://localhost:4000").unwrap();
        assert_eq!(
            local.resolved_socket_url().unwrap(),
            "ws://localhost:4000/socket"
        );
    }

    #[test]
    fn explicit_socket_url_wins() {
        let payload = r#"{
            "api_base_url": "https://angle.example.com",
            "socket_url": "wss://rt.angle.example.com/live/"
        }"#;
        let config = ClientConfig::from_json(payload).unwrap();
        assert_eq!(
            config.resolved_socket_url().unwrap(),
            "wss://rt.angle.example.com/live"
        );
        assert_eq!(config.max_images, DEFAULT_MAX_IMAGES);
    }

    #[test]
    fn from_json_rejects_unknown_fields() {
        let payload = r#"{"api_base_url": "https://a.example.com", "unexpected": true}"#;
        let error = ClientConfig::from_json(payload).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }
}
