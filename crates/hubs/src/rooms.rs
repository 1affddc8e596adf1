//! The room registry shared by all hubs.

use std::collections::{HashMap, HashSet};

use {
    tokio::sync::{RwLock, mpsc},
    tracing::debug,
    uuid::Uuid,
};

use crate::principal::Principal;

/// A connection registered with a hub: the sending half of its write loop
/// plus the authenticated principal.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub conn_id: Uuid,
    pub principal: Principal,
    sender: mpsc::UnboundedSender<String>,
}

impl Subscriber {
    #[must_use]
    pub fn new(principal: Principal, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            principal,
            sender,
        }
    }

    /// Queue a serialized frame onto this connection's write loop.
    /// Returns false when the write loop is gone.
    #[must_use]
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

#[derive(Default)]
struct Rooms {
    room_subscribers: HashMap<Uuid, HashSet<Uuid>>,
    subscriber_rooms: HashMap<Uuid, Uuid>,
    subscribers: HashMap<Uuid, Subscriber>,
}

/// Membership indexes for one hub. One lock guards membership mutation;
/// sends happen on cloned sender handles outside the lock.
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Rooms>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscriber into a room.
    pub async fn connect(&self, room_id: Uuid, subscriber: Subscriber) {
        let mut inner = self.inner.write().await;
        let conn_id = subscriber.conn_id;
        inner.room_subscribers.entry(room_id).or_default().insert(conn_id);
        inner.subscriber_rooms.insert(conn_id, room_id);
        inner.subscribers.insert(conn_id, subscriber);
        debug!(%room_id, %conn_id, "subscriber connected");
    }

    /// Remove a subscriber from every index. Returns its room when the
    /// subscriber was known, plus whether the room is now empty.
    pub async fn disconnect(&self, conn_id: Uuid) -> Option<(Uuid, Subscriber, bool)> {
        let mut inner = self.inner.write().await;
        let room_id = inner.subscriber_rooms.remove(&conn_id)?;
        let subscriber = inner.subscribers.remove(&conn_id)?;
        let mut empty = false;
        if let Some(members) = inner.room_subscribers.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.room_subscribers.remove(&room_id);
                empty = true;
            }
        }
        debug!(%room_id, %conn_id, empty, "subscriber disconnected");
        Some((room_id, subscriber, empty))
    }

    /// Send a frame to every subscriber in a room. Dead peers are evicted
    /// before this returns; their conn ids are the return value.
    pub async fn broadcast(&self, room_id: Uuid, frame: &str) -> Vec<Uuid> {
        let targets: Vec<Subscriber> = {
            let inner = self.inner.read().await;
            inner
                .room_subscribers
                .get(&room_id)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|id| inner.subscribers.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut dead = Vec::new();
        for subscriber in &targets {
            if !subscriber.send(frame) {
                dead.push(subscriber.conn_id);
            }
        }
        for conn_id in &dead {
            self.disconnect(*conn_id).await;
        }
        dead
    }

    /// Targeted send. A dead peer is evicted; returns whether the send
    /// succeeded.
    pub async fn send_personal(&self, conn_id: Uuid, frame: &str) -> bool {
        let subscriber = {
            let inner = self.inner.read().await;
            inner.subscribers.get(&conn_id).cloned()
        };
        match subscriber {
            Some(subscriber) if subscriber.send(frame) => true,
            Some(_) => {
                self.disconnect(conn_id).await;
                false
            },
            None => false,
        }
    }

    pub async fn participants(&self, room_id: Uuid) -> Vec<Principal> {
        let inner = self.inner.read().await;
        inner
            .room_subscribers
            .get(&room_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| inner.subscribers.get(id))
                    .map(|s| s.principal.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, room_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner.room_subscribers.get(&room_id).map_or(0, HashSet::len)
    }

    pub async fn room_of(&self, conn_id: Uuid) -> Option<Uuid> {
        self.inner.read().await.subscriber_rooms.get(&conn_id).copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn subscriber(name: &str) -> (Subscriber, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let principal = Principal::Agent {
            id: name.to_string(),
            nickname: name.to_string(),
        };
        (Subscriber::new(principal, tx), rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_current_subscribers() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (a, mut rx_a) = subscriber("a");
        let (b, mut rx_b) = subscriber("b");
        registry.connect(room, a).await;
        registry.connect(room, b).await;

        let dead = registry.broadcast(room, "hello").await;
        assert!(dead.is_empty());
        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn dead_peer_is_evicted_during_broadcast() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (a, rx_a) = subscriber("a");
        let (b, mut rx_b) = subscriber("b");
        let dead_id = a.conn_id;
        registry.connect(room, a).await;
        registry.connect(room, b).await;
        drop(rx_a);

        let dead = registry.broadcast(room, "ping").await;
        assert_eq!(dead, vec![dead_id]);
        assert_eq!(registry.connection_count(room).await, 1);
        assert_eq!(rx_b.recv().await.unwrap(), "ping");
    }

    #[tokio::test]
    async fn empty_room_is_removed() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (a, _rx) = subscriber("a");
        let conn_id = a.conn_id;
        registry.connect(room, a).await;

        let (room_id, _, empty) = registry.disconnect(conn_id).await.unwrap();
        assert_eq!(room_id, room);
        assert!(empty);
        assert_eq!(registry.connection_count(room).await, 0);
        // Second disconnect is a no-op.
        assert!(registry.disconnect(conn_id).await.is_none());
    }

    #[tokio::test]
    async fn send_personal_evicts_on_failure() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (a, rx) = subscriber("a");
        let conn_id = a.conn_id;
        registry.connect(room, a).await;
        drop(rx);

        assert!(!registry.send_personal(conn_id, "direct").await);
        assert!(registry.room_of(conn_id).await.is_none());
    }

    #[tokio::test]
    async fn participants_lists_principals() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (a, _rx_a) = subscriber("astra");
        registry.connect(room, a).await;

        let participants = registry.participants(room).await;
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].display_name(), "@astra");
    }
}
