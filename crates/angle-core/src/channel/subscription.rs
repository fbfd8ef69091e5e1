use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::pool::{ChannelPool, JoinGrant, SubscriberId};
use super::{ChannelCallbacks, ConnectionState, TopicEvent};
use crate::error::{Error, Result};

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    by_event: HashMap<String, Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    fn insert(&mut self, event: &str, listener: Listener) -> u64 {
        self.next_id += 1;
        self.by_event
            .entry(event.to_string())
            .or_default()
            .push((self.next_id, listener));
        self.next_id
    }

    fn remove(&mut self, event: &str, id: u64) -> bool {
        let Some(listeners) = self.by_event.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.by_event.remove(event);
        }
        removed
    }

    fn matching(&self, event: &str) -> Vec<Listener> {
        self.by_event
            .get(event)
            .map(|listeners| listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }
}

fn lock(registry: &Mutex<ListenerRegistry>) -> MutexGuard<'_, ListenerRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One consumer's subscription to a topic.
///
/// Dropping the channel removes its listeners and releases its share of the
/// topic; the pool leaves the topic on the wire once no subscriber remains.
pub struct Channel {
    topic: String,
    subscriber: SubscriberId,
    pool: ChannelPool,
    state: watch::Receiver<ConnectionState>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    dispatcher: JoinHandle<()>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.topic)
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl Channel {
    pub(crate) fn new(
        topic: String,
        grant: JoinGrant,
        pool: ChannelPool,
        callbacks: ChannelCallbacks,
    ) -> Self {
        let listeners = Arc::new(Mutex::new(ListenerRegistry::default()));
        let dispatcher = tokio::spawn(dispatch(
            topic.clone(),
            grant.events,
            Arc::clone(&listeners),
            callbacks,
            grant.initial_state,
        ));
        Self {
            topic,
            subscriber: grant.subscriber,
            pool,
            state: grant.state,
            listeners,
            dispatcher,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Joined
    }

    /// Watch the join state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Push an event to the server. Returns `false` and drops the event when
    /// the topic is not joined.
    pub fn send(&self, event: impl Into<String>, payload: Value) -> bool {
        let event = event.into();
        if !self.is_connected() {
            tracing::debug!(topic = %self.topic, %event, "Channel not joined; dropping event");
            return false;
        }
        self.pool.push(&self.topic, event, payload)
    }

    /// Register `callback` for a named server event.
    pub fn on(
        &self,
        event: impl Into<String>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let event = event.into();
        let id = lock(&self.listeners).insert(&event, Arc::new(callback));
        Unsubscribe {
            registry: Arc::downgrade(&self.listeners),
            event,
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Wait until the join settles. Errors when the join is rejected, the
    /// topic closes first, or `timeout` elapses.
    pub async fn joined(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.clone();
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|state| *state != ConnectionState::Connecting),
        )
        .await
        .map_err(|_| Error::Timeout(format!("joining {}", self.topic)))?
        .map(|state| *state)
        .map_err(|_| Error::Closed("channel pool"))?;

        match settled {
            ConnectionState::Joined => Ok(()),
            ConnectionState::Errored => Err(Error::Channel(format!(
                "join of {} was rejected",
                self.topic
            ))),
            ConnectionState::Closed | ConnectionState::Connecting => {
                Err(Error::Channel(format!("{} closed before joining", self.topic)))
            }
        }
    }

    /// Leave the topic now. Equivalent to dropping the channel.
    pub fn leave(self) {
        drop(self);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.dispatcher.abort();
        lock(&self.listeners).by_event.clear();
        self.pool.leave(&self.topic, self.subscriber);
    }
}

/// Handle returned by [`Channel::on`]. Calling [`Unsubscribe::unsubscribe`]
/// more than once is harmless.
#[derive(Debug)]
pub struct Unsubscribe {
    registry: Weak<Mutex<ListenerRegistry>>,
    event: String,
    id: u64,
}

impl Unsubscribe {
    /// Remove the listener. Returns whether it was still registered.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = lock(&registry).remove(&self.event, self.id);
        removed
    }
}

async fn dispatch(
    topic: String,
    mut events: broadcast::Receiver<TopicEvent>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    callbacks: ChannelCallbacks,
    initial_state: ConnectionState,
) {
    if initial_state == ConnectionState::Joined {
        callbacks.joined();
    }

    loop {
        match events.recv().await {
            Ok(TopicEvent::Joined) => callbacks.joined(),
            Ok(TopicEvent::JoinFailed(reason) | TopicEvent::Errored(reason)) => {
                callbacks.errored(&reason);
            }
            Ok(TopicEvent::Closed) => callbacks.closed(),
            Ok(TopicEvent::Message { event, payload }) => {
                // Snapshot first so callbacks may (un)register listeners.
                let matching = lock(&listeners).matching(&event);
                for listener in matching {
                    listener(&payload);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%topic, skipped, "Channel subscriber fell behind; events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
