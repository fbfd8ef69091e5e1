//! Real-time topic subscriptions over one shared socket.
//!
//! A [`ChannelPool`] is created once at startup and handed to every consumer.
//! It owns the transport connection, joins each topic at most once on the
//! wire and reference-counts local subscribers. Consumers get a [`Channel`]
//! which leaves its topic when dropped.

mod pool;
pub mod protocol;
mod subscription;
mod websocket;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

pub use pool::{ChannelPool, PoolStats};
pub use protocol::Frame;
pub use subscription::{Channel, Unsubscribe};
pub use websocket::WebSocketConnector;

/// Join state of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Joined,
    Closed,
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Joined => "joined",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(label)
    }
}

/// Both directions of an established transport connection.
///
/// The connection is considered lost once `incoming` yields `None`.
pub struct Wire {
    pub outgoing: mpsc::Sender<Frame>,
    pub incoming: mpsc::Receiver<Frame>,
}

/// Opens transport connections for the pool.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<Wire>> + Send;
}

/// Topic lifecycle and message events fanned out to subscribers.
#[derive(Debug, Clone)]
pub(crate) enum TopicEvent {
    Joined,
    JoinFailed(String),
    Errored(String),
    Closed,
    Message { event: String, payload: Value },
}

type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Lifecycle hooks for one subscription.
#[derive(Clone, Default)]
pub struct ChannelCallbacks {
    on_join: Option<LifecycleCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<LifecycleCallback>,
}

impl ChannelCallbacks {
    #[must_use]
    pub fn on_join(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_join = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }

    fn joined(&self) {
        if let Some(callback) = &self.on_join {
            callback();
        }
    }

    fn errored(&self, reason: &str) {
        if let Some(callback) = &self.on_error {
            callback(reason);
        }
    }

    fn closed(&self) {
        if let Some(callback) = &self.on_close {
            callback();
        }
    }
}
