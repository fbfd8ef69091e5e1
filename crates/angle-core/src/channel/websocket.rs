use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::protocol::{Frame, PROTOCOL_VERSION};
use super::{Connector, Wire};
use crate::error::{Error, Result};
use crate::session::ApiSession;

const WIRE_BUFFER: usize = 64;

/// WebSocket transport authenticated with the session's CSRF token and
/// cookie.
#[derive(Clone)]
pub struct WebSocketConnector {
    url: String,
    cookie: Option<String>,
}

impl std::fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL carries the CSRF token.
        f.debug_struct("WebSocketConnector")
            .field("cookie", &self.cookie.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl WebSocketConnector {
    pub fn from_session(session: &ApiSession) -> Result<Self> {
        let socket_url = session.config().resolved_socket_url()?;
        let url = websocket_url(&socket_url, session.csrf_token())?;
        Ok(Self {
            url,
            cookie: session.cookie_header(),
        })
    }
}

/// `<socket>/websocket?vsn=2.0.0&_csrf_token=...`
fn websocket_url(socket_url: &str, csrf_token: Option<&str>) -> Result<String> {
    let mut url = Url::parse(socket_url)?;
    let path = format!("{}/websocket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("vsn", PROTOCOL_VERSION);
        if let Some(token) = csrf_token {
            query.append_pair("_csrf_token", token);
        }
    }
    Ok(url.into())
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> impl Future<Output = Result<Wire>> + Send {
        let url = self.url.clone();
        let cookie = self.cookie.clone();
        async move {
            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|error| Error::Channel(error.to_string()))?;
            if let Some(cookie) = cookie {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(|error| Error::Channel(format!("invalid cookie header: {error}")))?;
                request.headers_mut().insert(COOKIE, value);
            }

            let (stream, _) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|error| Error::Channel(format!("socket connect failed: {error}")))?;
            tracing::debug!("WebSocket handshake complete");

            let (mut sink, mut source) = stream.split();
            let (outgoing, mut outgoing_rx) = mpsc::channel::<Frame>(WIRE_BUFFER);
            let (incoming_tx, incoming) = mpsc::channel::<Frame>(WIRE_BUFFER);

            tokio::spawn(async move {
                while let Some(frame) = outgoing_rx.recv().await {
                    let text = match frame.encode() {
                        Ok(text) => text,
                        Err(error) => {
                            tracing::warn!(%error, "Failed to encode socket frame");
                            continue;
                        }
                    };
                    if let Err(error) = sink.send(Message::Text(text)).await {
                        tracing::warn!(%error, "Socket write failed");
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                while let Some(message) = source.next().await {
                    match message {
                        Ok(Message::Text(text)) => match Frame::decode(&text) {
                            Ok(frame) => {
                                if incoming_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::warn!(%error, "Ignoring malformed socket frame");
                            }
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(error) => {
                            tracing::warn!(%error, "Socket read failed");
                            break;
                        }
                    }
                }
                tracing::debug!("Socket reader stopped");
            });

            Ok(Wire { outgoing, incoming })
        }
    }
}
