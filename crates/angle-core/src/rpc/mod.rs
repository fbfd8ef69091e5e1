//! Typed RPC client for the backend action endpoint.
//!
//! Every call posts `{action, input, fields}` to `/rpc/run` with the CSRF
//! header and unwraps the `{success, data}` / `{success, errors}` envelope.

mod actions;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::{parse_api_error, ApiSession};

pub use actions::{
    DraftItem, DraftUpdate, Order, OrderId, PaymentVerification, PublishedItem, Wallet,
    WalletTransaction,
};

const RPC_PATH: &str = "/rpc/run";

/// One error entry of a failed RPC envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFieldError {
    pub message: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl fmt::Display for RpcFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, I: Serialize> {
    action: &'a str,
    input: &'a I,
    fields: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<RpcFieldError>,
}

impl RpcEnvelope {
    fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if !self.success {
            return Err(Error::Rpc(self.errors));
        }
        let data = self.data.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(data)?)
    }
}

/// HTTP client for typed RPC actions.
#[derive(Debug, Clone)]
pub struct RpcClient {
    session: ApiSession,
}

impl RpcClient {
    pub const fn new(session: ApiSession) -> Self {
        Self { session }
    }

    pub const fn session(&self) -> &ApiSession {
        &self.session
    }

    /// Run an action and decode its `data` into `T`.
    pub async fn run<I, T>(&self, action: &str, input: &I, fields: &[&str]) -> Result<T>
    where
        I: Serialize + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!(action, "Running RPC action");
        let request = self
            .session
            .client()
            .post(self.session.endpoint(RPC_PATH))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&RpcRequest {
                action,
                input,
                fields,
            });
        let response = self.session.authorize(request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        // Failed envelopes may come back with 4xx statuses; prefer the envelope.
        match serde_json::from_str::<RpcEnvelope>(&body) {
            Ok(envelope) => {
                let result = envelope.into_result();
                if let Err(error) = &result {
                    tracing::warn!(action, error = %error, "RPC action failed");
                }
                result
            }
            Err(_) if !status.is_success() => Err(Error::Api(parse_api_error(status, &body))),
            Err(error) => Err(Error::Serialization(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    fn client_for(server: &mockito::ServerGuard) -> RpcClient {
        let config = ClientConfig::new(server.url()).unwrap();
        RpcClient::new(ApiSession::new(config, Some("tok".to_string())).unwrap())
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Echo {
        value: u32,
    }

    #[tokio::test]
    async fn run_unwraps_success_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rpc/run")
            .match_header("x-csrf-token", "tok")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "action": "echo",
                "input": {"value": 7},
                "fields": ["value"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "data": {"value": 7}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let echo: Echo = client
            .run("echo", &serde_json::json!({"value": 7}), &["value"])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(echo, Echo { value: 7 });
    }

    #[tokio::test]
    async fn run_surfaces_envelope_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rpc/run")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": false, "errors": [{"message": "is too low", "field": "amount"}]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let error = client
            .run::<_, Echo>("make_bid", &serde_json::json!({}), &[])
            .await
            .unwrap_err();

        match error {
            Error::Rpc(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].to_string(), "amount: is too low");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_maps_non_envelope_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rpc/run")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = client_for(&server);
        let error = client
            .run::<_, Echo>("echo", &serde_json::json!({}), &[])
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Api(message) if message == "boom (500)"));
    }

    #[test]
    fn success_without_data_decodes_unit() {
        let envelope: RpcEnvelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        let unit: Result<()> = envelope.into_result();
        assert!(unit.is_ok());
    }
}
