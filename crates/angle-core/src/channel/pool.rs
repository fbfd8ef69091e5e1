//! Process-wide socket owner.
//!
//! The pool runs as a single actor task. It connects lazily on the first join,
//! joins every topic at most once on the wire and keeps a subscriber count per
//! topic so the `phx_leave` only goes out when the last consumer is gone.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::protocol::{
    Frame, EVENT_CLOSE, EVENT_ERROR, EVENT_HEARTBEAT, EVENT_JOIN, EVENT_LEAVE, EVENT_REPLY,
    PHOENIX_TOPIC,
};
use super::{Channel, ChannelCallbacks, ConnectionState, Connector, TopicEvent, Wire};
use crate::error::{Error, Result};

const TOPIC_EVENT_CAPACITY: usize = 256;

pub(crate) type SubscriberId = u64;

/// Everything a new subscriber needs, captured inside the actor so no topic
/// event can slip between the grant and the first `recv`.
pub(crate) struct JoinGrant {
    pub subscriber: SubscriberId,
    pub events: broadcast::Receiver<TopicEvent>,
    pub state: watch::Receiver<ConnectionState>,
    pub initial_state: ConnectionState,
}

enum PoolCommand {
    Join {
        topic: String,
        params: Value,
        reply: oneshot::Sender<JoinGrant>,
    },
    Leave {
        topic: String,
        subscriber: SubscriberId,
    },
    Push {
        topic: String,
        event: String,
        payload: Value,
    },
    Stats {
        reply: oneshot::Sender<PoolStats>,
    },
}

/// Snapshot of the pool for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub connected: bool,
    /// Local subscriber count per joined topic.
    pub topics: BTreeMap<String, usize>,
}

/// Handle to the channel pool actor. Cheap to clone; the actor stops once
/// every handle and every [`Channel`] is dropped.
#[derive(Debug, Clone)]
pub struct ChannelPool {
    commands: mpsc::UnboundedSender<PoolCommand>,
}

impl std::fmt::Debug for PoolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Join { topic, .. } => write!(f, "Join({topic})"),
            Self::Leave { topic, subscriber } => write!(f, "Leave({topic}, {subscriber})"),
            Self::Push { topic, event, .. } => write!(f, "Push({topic}, {event})"),
            Self::Stats { .. } => f.write_str("Stats"),
        }
    }
}

impl ChannelPool {
    /// Start the pool actor on the current tokio runtime.
    pub fn spawn<C: Connector>(connector: C, heartbeat_interval: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let actor = PoolActor::new(connector, heartbeat_interval);
        tokio::spawn(actor.run(receiver));
        Self { commands }
    }

    /// Subscribe to `topic`. The returned channel starts out `Connecting`;
    /// the outcome of the join is reported through `callbacks` and
    /// [`Channel::joined`].
    pub async fn join(
        &self,
        topic: impl Into<String>,
        params: Value,
        callbacks: ChannelCallbacks,
    ) -> Result<Channel> {
        let topic = topic.into();
        let (reply, grant) = oneshot::channel();
        self.commands
            .send(PoolCommand::Join {
                topic: topic.clone(),
                params,
                reply,
            })
            .map_err(|_| Error::Closed("channel pool"))?;
        let grant = grant.await.map_err(|_| Error::Closed("channel pool"))?;
        Ok(Channel::new(topic, grant, self.clone(), callbacks))
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        let (reply, stats) = oneshot::channel();
        self.commands
            .send(PoolCommand::Stats { reply })
            .map_err(|_| Error::Closed("channel pool"))?;
        stats.await.map_err(|_| Error::Closed("channel pool"))
    }

    pub(crate) fn push(&self, topic: &str, event: String, payload: Value) -> bool {
        self.commands
            .send(PoolCommand::Push {
                topic: topic.to_string(),
                event,
                payload,
            })
            .is_ok()
    }

    pub(crate) fn leave(&self, topic: &str, subscriber: SubscriberId) {
        let command = PoolCommand::Leave {
            topic: topic.to_string(),
            subscriber,
        };
        if self.commands.send(command).is_err() {
            tracing::debug!(topic, "Channel pool already stopped; nothing to leave");
        }
    }
}

struct TopicEntry {
    join_ref: Option<String>,
    params: Value,
    subscribers: HashSet<SubscriberId>,
    events: broadcast::Sender<TopicEvent>,
    state: watch::Sender<ConnectionState>,
}

impl TopicEntry {
    fn new(params: Value) -> Self {
        let (events, _) = broadcast::channel(TOPIC_EVENT_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            join_ref: None,
            params,
            subscribers: HashSet::new(),
            events,
            state,
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn grant(&self, subscriber: SubscriberId) -> JoinGrant {
        JoinGrant {
            subscriber,
            events: self.events.subscribe(),
            state: self.state.subscribe(),
            initial_state: self.current_state(),
        }
    }

    fn transition(&self, state: ConnectionState, event: TopicEvent) {
        self.state.send_replace(state);
        // No receivers just means nobody is listening yet.
        let _ = self.events.send(event);
    }
}

struct PoolActor<C> {
    connector: C,
    heartbeat_interval: Duration,
    wire: Option<Wire>,
    topics: HashMap<String, TopicEntry>,
    /// Outstanding `phx_join` refs and the topic each belongs to.
    pending_joins: HashMap<String, String>,
    pending_heartbeat: Option<String>,
    next_ref: u64,
    next_subscriber: SubscriberId,
}

impl<C: Connector> PoolActor<C> {
    fn new(connector: C, heartbeat_interval: Duration) -> Self {
        Self {
            connector,
            heartbeat_interval,
            wire: None,
            topics: HashMap::new(),
            pending_joins: HashMap::new(),
            pending_heartbeat: None,
            next_ref: 0,
            next_subscriber: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PoolCommand>) {
        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                frame = recv_frame(&mut self.wire) => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => self.disconnected("connection lost"),
                },
                _ = heartbeat.tick(), if self.wire.is_some() => self.heartbeat().await,
            }
        }
        tracing::debug!("Channel pool stopped");
    }

    async fn handle_command(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::Join {
                topic,
                params,
                reply,
            } => self.join(topic, params, reply).await,
            PoolCommand::Leave { topic, subscriber } => self.leave(&topic, subscriber).await,
            PoolCommand::Push {
                topic,
                event,
                payload,
            } => self.push(topic, event, payload).await,
            PoolCommand::Stats { reply } => {
                let stats = PoolStats {
                    connected: self.wire.is_some(),
                    topics: self
                        .topics
                        .iter()
                        .map(|(topic, entry)| (topic.clone(), entry.subscribers.len()))
                        .collect(),
                };
                let _ = reply.send(stats);
            }
        }
    }

    async fn join(&mut self, topic: String, params: Value, reply: oneshot::Sender<JoinGrant>) {
        self.next_subscriber += 1;
        let subscriber = self.next_subscriber;

        let needs_wire_join = match self.topics.get_mut(&topic) {
            Some(entry) => {
                entry.subscribers.insert(subscriber);
                // A closed or errored topic is joined again on behalf of the
                // new subscriber; a live one is shared as is.
                let rejoin = matches!(
                    entry.current_state(),
                    ConnectionState::Closed | ConnectionState::Errored
                );
                if rejoin {
                    entry.params = params;
                    entry.join_ref = None;
                    entry.state.send_replace(ConnectionState::Connecting);
                }
                if reply.send(entry.grant(subscriber)).is_err() {
                    self.leave(&topic, subscriber).await;
                    return;
                }
                rejoin
            }
            None => {
                let mut entry = TopicEntry::new(params);
                entry.subscribers.insert(subscriber);
                if reply.send(entry.grant(subscriber)).is_err() {
                    return;
                }
                self.topics.insert(topic.clone(), entry);
                true
            }
        };

        if needs_wire_join {
            self.join_on_wire(&topic).await;
        }
    }

    async fn join_on_wire(&mut self, topic: &str) {
        if let Err(error) = self.ensure_connected().await {
            let reason = error.to_string();
            tracing::warn!(topic, error = %reason, "Failed to open channel socket");
            if let Some(entry) = self.topics.get(topic) {
                entry.transition(ConnectionState::Errored, TopicEvent::JoinFailed(reason));
            }
            return;
        }

        let join_ref = self.make_ref();
        let Some(entry) = self.topics.get_mut(topic) else {
            return;
        };
        entry.join_ref = Some(join_ref.clone());
        entry.state.send_replace(ConnectionState::Connecting);
        let frame = Frame::new(
            Some(join_ref.clone()),
            Some(join_ref.clone()),
            topic,
            EVENT_JOIN,
            entry.params.clone(),
        );
        self.pending_joins.insert(join_ref, topic.to_string());
        tracing::info!(topic, "Joining channel");
        self.send_frame(frame).await;
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if let Some(wire) = &self.wire {
            if !wire.outgoing.is_closed() {
                return Ok(());
            }
            // Writer gone but reader still open.
            self.disconnected("socket writer stopped");
        }
        let wire = self.connector.connect().await?;
        tracing::info!("Channel socket connected");
        self.wire = Some(wire);
        self.pending_heartbeat = None;
        Ok(())
    }

    async fn leave(&mut self, topic: &str, subscriber: SubscriberId) {
        let Some(entry) = self.topics.get_mut(topic) else {
            return;
        };
        if !entry.subscribers.remove(&subscriber) || !entry.subscribers.is_empty() {
            return;
        }
        let Some(entry) = self.topics.remove(topic) else {
            return;
        };

        let was_live = matches!(
            entry.current_state(),
            ConnectionState::Joined | ConnectionState::Connecting
        );
        entry.state.send_replace(ConnectionState::Closed);
        self.pending_joins.retain(|_, pending| pending != topic);

        if let (true, Some(join_ref)) = (was_live && self.wire.is_some(), entry.join_ref) {
            let msg_ref = self.make_ref();
            tracing::info!(topic, "Leaving channel");
            self.send_frame(Frame::new(
                Some(join_ref),
                Some(msg_ref),
                topic,
                EVENT_LEAVE,
                json!({}),
            ))
            .await;
        }
    }

    async fn push(&mut self, topic: String, event: String, payload: Value) {
        let join_ref = match self.topics.get(&topic) {
            Some(entry) if entry.current_state() == ConnectionState::Joined => {
                entry.join_ref.clone()
            }
            _ => {
                tracing::debug!(%topic, %event, "Dropping push for a topic that is not joined");
                return;
            }
        };
        let msg_ref = self.make_ref();
        tracing::debug!(%topic, %event, "Pushing channel event");
        self.send_frame(Frame::new(join_ref, Some(msg_ref), topic, event, payload))
            .await;
    }

    async fn heartbeat(&mut self) {
        if self.pending_heartbeat.is_some() {
            self.disconnected("heartbeat timed out");
            return;
        }
        let msg_ref = self.make_ref();
        self.pending_heartbeat = Some(msg_ref.clone());
        self.send_frame(Frame::new(
            None,
            Some(msg_ref),
            PHOENIX_TOPIC,
            EVENT_HEARTBEAT,
            json!({}),
        ))
        .await;
    }

    fn handle_frame(&mut self, frame: Frame) {
        if frame.topic == PHOENIX_TOPIC {
            if frame.event == EVENT_REPLY
                && frame.msg_ref.is_some()
                && frame.msg_ref == self.pending_heartbeat
            {
                self.pending_heartbeat = None;
            }
            return;
        }

        match frame.event.as_str() {
            EVENT_REPLY => self.handle_reply(frame),
            EVENT_CLOSE => self.topic_closed(&frame),
            EVENT_ERROR => self.topic_errored(&frame),
            _ => match self.topics.get(&frame.topic) {
                Some(entry) => {
                    let _ = entry.events.send(TopicEvent::Message {
                        event: frame.event,
                        payload: frame.payload,
                    });
                }
                None => {
                    tracing::debug!(topic = %frame.topic, event = %frame.event, "Dropping frame for unknown topic");
                }
            },
        }
    }

    fn handle_reply(&mut self, frame: Frame) {
        let join_topic = frame
            .msg_ref
            .as_ref()
            .and_then(|msg_ref| self.pending_joins.remove(msg_ref));

        let Some(entry) = self.topics.get(&frame.topic) else {
            return;
        };
        let is_current_join =
            join_topic.is_some() && entry.join_ref.is_some() && entry.join_ref == frame.msg_ref;
        if !is_current_join {
            let _ = entry.events.send(TopicEvent::Message {
                event: frame.event.clone(),
                payload: frame.payload.clone(),
            });
            return;
        }

        let Some(reply) = frame.reply() else {
            return;
        };
        if reply.ok {
            tracing::info!(topic = %frame.topic, "Joined channel");
            entry.transition(ConnectionState::Joined, TopicEvent::Joined);
        } else {
            let reason = reply.reason();
            tracing::warn!(topic = %frame.topic, %reason, "Channel join rejected");
            entry.transition(ConnectionState::Errored, TopicEvent::JoinFailed(reason));
        }
    }

    fn topic_closed(&self, frame: &Frame) {
        let Some(entry) = self.topics.get(&frame.topic) else {
            return;
        };
        if frame.join_ref.is_some() && frame.join_ref != entry.join_ref {
            tracing::debug!(topic = %frame.topic, "Ignoring close for a previous join");
            return;
        }
        tracing::info!(topic = %frame.topic, "Channel closed by server");
        entry.transition(ConnectionState::Closed, TopicEvent::Closed);
    }

    fn topic_errored(&self, frame: &Frame) {
        let Some(entry) = self.topics.get(&frame.topic) else {
            return;
        };
        if frame.join_ref.is_some() && frame.join_ref != entry.join_ref {
            return;
        }
        tracing::warn!(topic = %frame.topic, "Channel errored");
        entry.transition(
            ConnectionState::Errored,
            TopicEvent::Errored("channel crashed on the server".to_string()),
        );
    }

    fn disconnected(&mut self, reason: &str) {
        if self.wire.take().is_none() {
            return;
        }
        tracing::warn!(reason, "Channel socket disconnected");
        self.pending_heartbeat = None;
        self.pending_joins.clear();
        for entry in self.topics.values_mut() {
            // Only joins sent on the lost socket are affected.
            let joined_on_wire = entry.join_ref.take().is_some();
            if joined_on_wire
                && matches!(
                    entry.current_state(),
                    ConnectionState::Joined | ConnectionState::Connecting
                )
            {
                entry.transition(ConnectionState::Closed, TopicEvent::Closed);
            }
        }
    }

    async fn send_frame(&mut self, frame: Frame) {
        let Some(wire) = &self.wire else {
            tracing::debug!(topic = %frame.topic, event = %frame.event, "No socket; dropping frame");
            return;
        };
        if wire.outgoing.send(frame).await.is_err() {
            self.disconnected("socket writer stopped");
        }
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }
}

async fn recv_frame(wire: &mut Option<Wire>) -> Option<Frame> {
    match wire {
        Some(wire) => wire.incoming.recv().await,
        None => std::future::pending().await,
    }
}
