// service/hub.rs
use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::dtos::eventdtos::ServerEvent;

/// Events queued per connection before new ones are dropped.
pub const OUTBOUND_BUFFER: usize = 64;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Room(Uuid),
    /// A user's personal channel, joined by every connection they hold.
    User(Uuid),
}

#[derive(Debug, Default)]
struct HubState {
    connections: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    subscribers: HashMap<Topic, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<Topic>>,
    /// The two participants of every room that has live subscribers.
    participants: HashMap<Uuid, [Uuid; 2]>,
}

impl HubState {
    fn add(&mut self, connection_id: ConnectionId, topic: Topic) -> bool {
        if !self.connections.contains_key(&connection_id) {
            return false;
        }
        self.subscribers.entry(topic).or_default().insert(connection_id);
        self.memberships.entry(connection_id).or_default().insert(topic);
        true
    }

    fn remove_all(&mut self, connection_id: ConnectionId) {
        let Some(topics) = self.memberships.remove(&connection_id) else {
            return;
        };
        for topic in topics {
            if let Some(subscribers) = self.subscribers.get_mut(&topic) {
                subscribers.remove(&connection_id);
                if subscribers.is_empty() {
                    self.subscribers.remove(&topic);
                    if let Topic::Room(room_id) = topic {
                        self.participants.remove(&room_id);
                    }
                }
            }
        }
    }
}

/// In-process pub/sub between the chat service and live connections.
///
/// The hub knows nothing about sockets: each connection is an outbound queue
/// that the transport adapter drains.
#[derive(Debug, Default)]
pub struct Hub {
    state: RwLock<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let connection_id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.state.write().await.connections.insert(connection_id, tx);
        tracing::debug!(%connection_id, "connection registered");
        (connection_id, rx)
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        state.remove_all(connection_id);
        state.connections.remove(&connection_id);
        tracing::debug!(%connection_id, "connection removed");
    }

    /// Returns false when the connection is unknown.
    pub async fn subscribe(&self, connection_id: ConnectionId, topic: Topic) -> bool {
        self.state.write().await.add(connection_id, topic)
    }

    pub async fn unsubscribe_all(&self, connection_id: ConnectionId) {
        self.state.write().await.remove_all(connection_id);
    }

    /// Subscribes every current subscriber of `from` to `to`.
    pub async fn attach(&self, from: Topic, to: Topic) {
        let mut state = self.state.write().await;
        let members: Vec<ConnectionId> = state
            .subscribers
            .get(&from)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for connection_id in members {
            state.add(connection_id, to);
        }
    }

    /// Remembers who may talk in a room while anyone is subscribed to it.
    pub async fn track_room(&self, room_id: Uuid, participants: [Uuid; 2]) {
        let mut state = self.state.write().await;
        if state.subscribers.contains_key(&Topic::Room(room_id)) {
            state.participants.insert(room_id, participants);
        }
    }

    /// The other participant of a tracked room, or `None` when the room is
    /// not tracked or `user_id` is not in it.
    pub async fn counterpart(&self, room_id: Uuid, user_id: Uuid) -> Option<Uuid> {
        let state = self.state.read().await;
        match state.participants.get(&room_id)? {
            [a, b] if *a == user_id => Some(*b),
            [a, b] if *b == user_id => Some(*a),
            _ => None,
        }
    }

    pub async fn is_subscribed(&self, connection_id: ConnectionId, topic: Topic) -> bool {
        self.state
            .read()
            .await
            .memberships
            .get(&connection_id)
            .is_some_and(|topics| topics.contains(&topic))
    }

    /// Fans `event` out to the topic. Returns how many queues accepted it.
    pub async fn publish(&self, topic: Topic, event: ServerEvent) -> usize {
        let state = self.state.read().await;
        let Some(subscribers) = state.subscribers.get(&topic) else {
            return 0;
        };

        subscribers
            .iter()
            .filter_map(|connection_id| {
                state
                    .connections
                    .get(connection_id)
                    .map(|tx| (connection_id, tx))
            })
            .filter(|(connection_id, tx)| enqueue(**connection_id, tx, event.clone()))
            .count()
    }

    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let state = self.state.read().await;
        match state.connections.get(&connection_id) {
            Some(tx) => enqueue(connection_id, tx, event),
            None => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

fn enqueue(connection_id: ConnectionId, tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(
                %connection_id,
                event = event.name(),
                "outbound queue full, dropping event"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
