use axum::extract::ws::Message;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod message_types;

pub type ConnectionId = Uuid;

/// Routing key for a broadcast group of live connections.
///
/// Modeled as a closed union instead of a formatted string so a conversation
/// id can never collide with a user inbox id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversation(Uuid),
    UserInbox(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Conversation(id) => write!(f, "conversation:{id}"),
            Topic::UserInbox(id) => write!(f, "user:{id}"),
        }
    }
}

/// Presence transition derived from registry changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Online(Uuid),
    Offline(Uuid),
}

struct ConnectionEntry {
    sender: UnboundedSender<Message>,
    user_id: Option<Uuid>,
    topics: HashSet<Topic>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    // user -> connections currently registered for that user
    users: HashMap<Uuid, HashSet<ConnectionId>>,
    topics: HashMap<Topic, HashSet<ConnectionId>>,
}

/// Maps authenticated user identities to live transport connections and
/// groups connections by topic.
///
/// This is the only mutable shared state in the process; durable state lives
/// in Postgres. Delivery through `publish` is at-most-once and best-effort:
/// the call returns no receipt, and a disconnected recipient simply never
/// sees the event. If this service is ever scaled past one process, this
/// registry is the boundary that must be backed by a shared pub/sub layer.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new transport connection. The connection has no user identity
    /// until it registers.
    pub async fn connect(&self) -> (ConnectionId, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        let id = Uuid::new_v4();
        let mut guard = self.inner.write().await;
        guard.connections.insert(
            id,
            ConnectionEntry {
                sender: tx,
                user_id: None,
                topics: HashSet::new(),
            },
        );
        (id, rx)
    }

    /// Bind a connection to a user identity and join its personal inbox room.
    ///
    /// Re-registration collapses to the newest connection: any prior
    /// connection registered for the user loses its binding (it stays
    /// connected and keeps its conversation rooms, but leaves the inbox).
    /// Unknown connection ids are a no-op.
    pub async fn register(&self, connection_id: ConnectionId, user_id: Uuid) -> Option<PresenceChange> {
        let mut guard = self.inner.write().await;
        if !guard.connections.contains_key(&connection_id) {
            return None;
        }

        let was_online = guard
            .users
            .get(&user_id)
            .is_some_and(|set| !set.is_empty());

        // Evict prior registrations for this user
        let evicted: Vec<ConnectionId> = guard
            .users
            .remove(&user_id)
            .map(|set| set.into_iter().filter(|id| *id != connection_id).collect())
            .unwrap_or_default();
        for old_id in evicted {
            if let Some(entry) = guard.connections.get_mut(&old_id) {
                entry.user_id = None;
                entry.topics.remove(&Topic::UserInbox(user_id));
            }
            if let Some(subs) = guard.topics.get_mut(&Topic::UserInbox(user_id)) {
                subs.remove(&old_id);
            }
        }

        guard.users.insert(user_id, HashSet::from([connection_id]));
        if let Some(entry) = guard.connections.get_mut(&connection_id) {
            entry.user_id = Some(user_id);
            entry.topics.insert(Topic::UserInbox(user_id));
        }
        guard
            .topics
            .entry(Topic::UserInbox(user_id))
            .or_default()
            .insert(connection_id);

        if was_online {
            None
        } else {
            Some(PresenceChange::Online(user_id))
        }
    }

    /// Remove a connection entirely. Removing an unknown connection id is a
    /// no-op. Returns the offline transition if this was the user's last
    /// registered connection.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Option<PresenceChange> {
        let mut guard = self.inner.write().await;
        let entry = guard.connections.remove(&connection_id)?;

        for topic in &entry.topics {
            if let Some(subs) = guard.topics.get_mut(topic) {
                subs.remove(&connection_id);
                if subs.is_empty() {
                    guard.topics.remove(topic);
                }
            }
        }

        let user_id = entry.user_id?;
        let set = guard.users.get_mut(&user_id)?;
        set.remove(&connection_id);
        if set.is_empty() {
            guard.users.remove(&user_id);
            Some(PresenceChange::Offline(user_id))
        } else {
            None
        }
    }

    pub async fn join(&self, connection_id: ConnectionId, topic: Topic) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.connections.get_mut(&connection_id) {
            entry.topics.insert(topic);
            guard.topics.entry(topic).or_default().insert(connection_id);
        }
    }

    pub async fn leave(&self, connection_id: ConnectionId, topic: Topic) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.connections.get_mut(&connection_id) {
            entry.topics.remove(&topic);
        }
        if let Some(subs) = guard.topics.get_mut(&topic) {
            subs.remove(&connection_id);
            if subs.is_empty() {
                guard.topics.remove(&topic);
            }
        }
    }

    /// Deliver to every connection joined to `topic`. At-most-once; no
    /// delivery receipt. Dead senders are dropped on the way.
    pub async fn publish(&self, topic: Topic, msg: Message) {
        self.publish_filtered(topic, None, msg).await;
    }

    /// Same as `publish`, excluding the publishing connection.
    pub async fn publish_except(&self, topic: Topic, except: ConnectionId, msg: Message) {
        self.publish_filtered(topic, Some(except), msg).await;
    }

    async fn publish_filtered(&self, topic: Topic, except: Option<ConnectionId>, msg: Message) {
        let guard = self.inner.read().await;
        let Some(subs) = guard.topics.get(&topic) else {
            return;
        };
        // Send failures mean the receiver task is gone; the disconnect path
        // cleans the maps, so failures are simply ignored here.
        for id in subs {
            if Some(*id) == except {
                continue;
            }
            if let Some(entry) = guard.connections.get(id) {
                let _ = entry.sender.send(msg.clone());
            }
        }
    }

    /// Global broadcast to every live connection (presence events).
    pub async fn broadcast_all(&self, msg: Message) {
        let guard = self.inner.read().await;
        for entry in guard.connections.values() {
            let _ = entry.sender.send(msg.clone());
        }
    }

    /// Direct delivery to one connection (send-failure surfacing).
    pub async fn send_to(&self, connection_id: ConnectionId, msg: Message) {
        let guard = self.inner.read().await;
        if let Some(entry) = guard.connections.get(&connection_id) {
            let _ = entry.sender.send(msg);
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).is_some_and(|set| !set.is_empty())
    }

    pub async fn sockets_for(&self, user_id: Uuid) -> HashSet<ConnectionId> {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).cloned().unwrap_or_default()
    }

    /// The user identity a connection registered as, if any.
    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let guard = self.inner.read().await;
        guard
            .connections
            .get(&connection_id)
            .and_then(|entry| entry.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Message {
        Message::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_first_registration_goes_online_once() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = registry.connect().await;
        assert_eq!(
            registry.register(c1, user).await,
            Some(PresenceChange::Online(user))
        );
        assert!(registry.is_online(user).await);

        // Re-registration of the same user produces no second transition
        let (c2, _rx2) = registry.connect().await;
        assert_eq!(registry.register(c2, user).await, None);
    }

    #[tokio::test]
    async fn test_reregistration_collapses_to_newest_connection() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = registry.connect().await;
        let (c2, _rx2) = registry.connect().await;
        registry.register(c1, user).await;
        registry.register(c2, user).await;

        let sockets = registry.sockets_for(user).await;
        assert_eq!(sockets, HashSet::from([c2]));
        assert_eq!(registry.user_of(c1).await, None);
        assert_eq!(registry.user_of(c2).await, Some(user));
    }

    #[tokio::test]
    async fn test_last_disconnect_goes_offline() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = registry.connect().await;
        registry.register(c1, user).await;
        assert_eq!(
            registry.disconnect(c1).await,
            Some(PresenceChange::Offline(user))
        );
        assert!(!registry.is_online(user).await);

        // Idempotent removal of an unknown connection
        assert_eq!(registry.disconnect(c1).await, None);
    }

    #[tokio::test]
    async fn test_publish_reaches_only_joined_connections() {
        let registry = ConnectionRegistry::new();
        let topic = Topic::Conversation(Uuid::new_v4());

        let (c1, mut rx1) = registry.connect().await;
        let (_c2, mut rx2) = registry.connect().await;
        registry.join(c1, topic).await;

        registry.publish(topic, text("hello")).await;
        assert_eq!(rx1.recv().await, Some(text("hello")));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_except_skips_publisher() {
        let registry = ConnectionRegistry::new();
        let topic = Topic::Conversation(Uuid::new_v4());

        let (c1, mut rx1) = registry.connect().await;
        let (c2, mut rx2) = registry.connect().await;
        registry.join(c1, topic).await;
        registry.join(c2, topic).await;

        registry.publish_except(topic, c1, text("typing")).await;
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.recv().await, Some(text("typing")));
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let registry = ConnectionRegistry::new();
        let topic = Topic::Conversation(Uuid::new_v4());

        let (c1, mut rx1) = registry.connect().await;
        registry.join(c1, topic).await;
        registry.leave(c1, topic).await;

        registry.publish(topic, text("x")).await;
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_registration_joins_personal_inbox() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (c1, mut rx1) = registry.connect().await;
        registry.register(c1, user).await;

        registry.publish(Topic::UserInbox(user), text("ping")).await;
        assert_eq!(rx1.recv().await, Some(text("ping")));
    }

    #[test]
    fn test_topic_display_is_distinct_per_kind() {
        let id = Uuid::new_v4();
        assert_eq!(Topic::Conversation(id).to_string(), format!("conversation:{id}"));
        assert_eq!(Topic::UserInbox(id).to_string(), format!("user:{id}"));
        assert_ne!(Topic::Conversation(id), Topic::UserInbox(id));
    }
}
