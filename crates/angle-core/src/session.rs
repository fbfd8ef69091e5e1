//! Authenticated HTTP session shared by the RPC, upload and socket clients.
//!
//! The backend protects mutations with a CSRF token that the server renders
//! into the page as `<meta name="csrf-token" content="...">`, bound to the
//! session cookie. [`ApiSession::bootstrap`] loads the page once, keeps the
//! cookie in a shared jar and remembers the token.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::util::compact_text;

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Clone)]
pub struct ApiSession {
    config: ClientConfig,
    client: reqwest::Client,
    jar: Arc<Jar>,
    csrf_token: Option<String>,
}

impl std::fmt::Debug for ApiSession {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ApiSession")
            .field("api_base_url", &self.config.api_base_url)
            .field(
                "csrf_token",
                &self.csrf_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl ApiSession {
    /// Build a session from configuration and an already known CSRF token.
    pub fn new(config: ClientConfig, csrf_token: Option<String>) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        let csrf_token = crate::util::normalize_text_option(csrf_token);
        Ok(Self {
            config,
            client,
            jar,
            csrf_token,
        })
    }

    /// Load the application page to obtain a session cookie and CSRF token.
    pub async fn bootstrap(config: ClientConfig) -> Result<Self> {
        let mut session = Self::new(config, None)?;
        let response = session
            .client
            .get(&session.config.api_base_url)
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(parse_api_error(status, &body)));
        }

        let html = response.text().await?;
        let token = extract_csrf_token(&html).ok_or_else(|| {
            Error::Api("application page did not include a csrf-token meta tag".to_string())
        })?;
        tracing::debug!("Obtained CSRF token from application page");
        session.csrf_token = Some(token);
        Ok(session)
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Absolute URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base_url,
            path.trim_start_matches('/')
        )
    }

    /// Attach the CSRF header when a token is known.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    /// Session cookies for the API origin, formatted as a `Cookie` header.
    pub fn cookie_header(&self) -> Option<String> {
        let url = Url::parse(&self.config.api_base_url).ok()?;
        let value = self.jar.cookies(&url)?;
        value.to_str().ok().map(ToString::to_string)
    }
}

/// Pull the CSRF token out of a rendered page.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    static META_TAG: OnceLock<Regex> = OnceLock::new();
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();

    let meta_tag = META_TAG.get_or_init(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("Invalid regex"));
    let attribute = ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("Invalid regex")
    });

    meta_tag.find_iter(html).find_map(|tag| {
        let attributes = attribute
            .captures_iter(tag.as_str())
            .filter_map(|captures| {
                let name = captures.get(1)?.as_str().to_ascii_lowercase();
                let value = captures.get(2).or_else(|| captures.get(3))?.as_str();
                Some((name, value))
            })
            .collect::<HashMap<_, _>>();

        if attributes.get("name").copied() != Some("csrf-token") {
            return None;
        }
        attributes
            .get("content")
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Render a non-success HTTP response as a short message.
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_in_either_attribute_order() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="csrf-token" content="abc123">
        </head></html>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("abc123"));

        let reversed = r"<meta content='xyz' name='csrf-token' />";
        assert_eq!(extract_csrf_token(reversed).as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_token_is_none() {
        assert_eq!(extract_csrf_token("<meta name=\"viewport\" content=\"x\">"), None);
        assert_eq!(extract_csrf_token("<meta name=\"csrf-token\" content=\" \">"), None);
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, r#"{"error":"invalid CSRF token"}"#),
            "invalid CSRF token (403)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[test]
    fn debug_redacts_token() {
        let config = ClientConfig::new("https://angle.example.com").unwrap();
        let session = ApiSession::new(config, Some("secret".to_string())).unwrap();
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(
            session.endpoint("/rpc/run"),
            "https://angle.example.com/rpc/run"
        );
    }

    #[tokio::test]
    async fn bootstrap_reads_meta_tag() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_header("set-cookie", "_angle_key=session; Path=/")
            .with_body(r#"<meta name="csrf-token" content="tok-1">"#)
            .create_async()
            .await;

        let config = ClientConfig::new(server.url()).unwrap();
        let session = ApiSession::bootstrap(config).await.unwrap();

        page.assert_async().await;
        assert_eq!(session.csrf_token(), Some("tok-1"));
        assert_eq!(session.cookie_header().as_deref(), Some("_angle_key=session"));
    }
}
