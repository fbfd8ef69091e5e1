//! In-memory transport for channel tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::protocol::{Frame, EVENT_HEARTBEAT, EVENT_JOIN, EVENT_REPLY};
use super::{Connector, Wire};
use crate::error::{Error, Result};

const FRAME_WAIT: Duration = Duration::from_secs(5);

/// Hands out prepared wires in order, then refuses connections.
#[derive(Clone, Default)]
pub(crate) struct MemoryConnector {
    wires: Arc<Mutex<VecDeque<Wire>>>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub(crate) fn new(wires: Vec<Wire>) -> Self {
        Self {
            wires: Arc::new(Mutex::new(wires.into())),
            connects: Arc::default(),
        }
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> impl Future<Output = Result<Wire>> + Send {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let wire = self.wires.lock().unwrap().pop_front();
        async move { wire.ok_or_else(|| Error::Channel("connection refused".to_string())) }
    }
}

/// Server side of a [`memory_wire`].
pub(crate) struct ServerEnd {
    from_client: mpsc::Receiver<Frame>,
    to_client: mpsc::Sender<Frame>,
}

pub(crate) fn memory_wire() -> (Wire, ServerEnd) {
    let (client_tx, from_client) = mpsc::channel(64);
    let (to_client, client_rx) = mpsc::channel(64);
    (
        Wire {
            outgoing: client_tx,
            incoming: client_rx,
        },
        ServerEnd {
            from_client,
            to_client,
        },
    )
}

impl ServerEnd {
    /// Next frame from the client, heartbeats included.
    pub(crate) async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(FRAME_WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client hung up")
    }

    /// Next non-heartbeat frame, which must carry `event`.
    pub(crate) async fn expect(&mut self, event: &str) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.event == EVENT_HEARTBEAT {
                continue;
            }
            assert_eq!(frame.event, event, "unexpected frame {frame:?}");
            return frame;
        }
    }

    /// Assert the client sends nothing but heartbeats for a short while.
    pub(crate) async fn assert_silent(&mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(100);
        loop {
            match tokio::time::timeout_at(deadline, self.from_client.recv()).await {
                Err(_) | Ok(None) => return,
                Ok(Some(frame)) if frame.event == EVENT_HEARTBEAT => {}
                Ok(Some(frame)) => panic!("unexpected frame {frame:?}"),
            }
        }
    }

    /// Stop accepting client frames while still able to send.
    pub(crate) fn stop_reading(&mut self) {
        self.from_client.close();
    }

    pub(crate) async fn send(&self, frame: Frame) {
        self.to_client.send(frame).await.expect("client hung up");
    }

    pub(crate) async fn reply_ok(&self, request: &Frame, response: Value) {
        self.reply(request, json!({"status": "ok", "response": response}))
            .await;
    }

    pub(crate) async fn reply_error(&self, request: &Frame, reason: &str) {
        self.reply(
            request,
            json!({"status": "error", "response": {"reason": reason}}),
        )
        .await;
    }

    async fn reply(&self, request: &Frame, payload: Value) {
        self.send(Frame::new(
            request.join_ref.clone(),
            request.msg_ref.clone(),
            request.topic.clone(),
            EVENT_REPLY,
            payload,
        ))
        .await;
    }

    /// Broadcast a server event on `topic`.
    pub(crate) async fn push(&self, topic: &str, event: &str, payload: Value) {
        self.send(Frame::new(None, None, topic, event, payload)).await;
    }

    /// Expect a join for `topic` and acknowledge it.
    pub(crate) async fn accept_join(&mut self, topic: &str) -> Frame {
        let join = self.expect(EVENT_JOIN).await;
        assert_eq!(join.topic, topic);
        self.reply_ok(&join, json!({})).await;
        join
    }
}
