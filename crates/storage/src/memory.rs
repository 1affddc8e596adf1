//! In-memory storage backend.
//!
//! Keys are `{project_id}:{resource_type}:{resource_id}` strings in a
//! concurrent map; per-session queues are bounded FIFOs behind their own
//! lock so enqueue/dequeue serialize per session without blocking the rest
//! of the store.

use std::{collections::VecDeque, sync::Arc};

use {
    async_trait::async_trait,
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::sync::Mutex,
    uuid::Uuid,
};

use crate::{
    backend::StorageBackend,
    error::{Result, StorageError},
    message::Message,
    protocol_def::ProtocolDefinition,
    session::{Session, SessionStatus},
};

const KIND_PROTOCOL: &str = "protocol";
const KIND_SESSION: &str = "session";
const KIND_QUEUE: &str = "queue";

pub struct InMemoryStorage {
    protocols: DashMap<String, ProtocolDefinition>,
    sessions: DashMap<String, Session>,
    // Arc so the map guard drops before the queue lock is awaited.
    queues: DashMap<String, Arc<Mutex<VecDeque<Message>>>>,
    queue_capacity: usize,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_capacity(crate::DEFAULT_QUEUE_CAPACITY)
    }

    #[must_use]
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            protocols: DashMap::new(),
            sessions: DashMap::new(),
            queues: DashMap::new(),
            queue_capacity,
        }
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    fn key(project_id: &str, kind: &str, id: &str) -> String {
        format!("{project_id}:{kind}:{id}")
    }

    fn prefix(project_id: &str, kind: &str) -> String {
        format!("{project_id}:{kind}:")
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get_protocol(
        &self,
        name: &str,
        version: &str,
        project_id: &str,
    ) -> Result<Option<ProtocolDefinition>> {
        let key = Self::key(project_id, KIND_PROTOCOL, &format!("{name}@{version}"));
        Ok(self.protocols.get(&key).map(|entry| entry.clone()))
    }

    async fn save_protocol(&self, protocol: &ProtocolDefinition, project_id: &str) -> Result<()> {
        let key = Self::key(project_id, KIND_PROTOCOL, &protocol.identity());
        match self.protocols.entry(key) {
            Entry::Occupied(_) => Err(StorageError::already_exists(format!(
                "protocol {}",
                protocol.identity()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(protocol.clone());
                Ok(())
            },
        }
    }

    async fn list_protocols(
        &self,
        name: Option<&str>,
        version: Option<&str>,
        project_id: &str,
    ) -> Result<Vec<ProtocolDefinition>> {
        let prefix = Self::prefix(project_id, KIND_PROTOCOL);
        let mut found: Vec<ProtocolDefinition> = self
            .protocols
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().clone())
            .filter(|p| name.is_none_or(|n| p.name == n))
            .filter(|p| version.is_none_or(|v| p.version == v))
            .collect();
        found.sort_by(|a, b| a.identity().cmp(&b.identity()));
        Ok(found)
    }

    async fn delete_protocol(&self, name: &str, version: &str, project_id: &str) -> Result<bool> {
        let key = Self::key(project_id, KIND_PROTOCOL, &format!("{name}@{version}"));
        Ok(self.protocols.remove(&key).is_some())
    }

    async fn get_session(&self, session_id: Uuid, project_id: &str) -> Result<Option<Session>> {
        let key = Self::key(project_id, KIND_SESSION, &session_id.to_string());
        Ok(self.sessions.get(&key).map(|entry| entry.clone()))
    }

    async fn save_session(&self, session: &Session, project_id: &str) -> Result<()> {
        let key = Self::key(project_id, KIND_SESSION, &session.session_id.to_string());
        self.sessions.insert(key, session.clone());
        Ok(())
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        project_id: &str,
    ) -> Result<Vec<Session>> {
        let prefix = Self::prefix(project_id, KIND_SESSION);
        let mut found: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().clone())
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .collect();
        found.sort_by_key(|s| s.connection_time);
        Ok(found)
    }

    async fn delete_session(&self, session_id: Uuid, project_id: &str) -> Result<bool> {
        let key = Self::key(project_id, KIND_SESSION, &session_id.to_string());
        let existed = self.sessions.remove(&key).is_some();
        let queue_key = Self::key(project_id, KIND_QUEUE, &session_id.to_string());
        self.queues.remove(&queue_key);
        Ok(existed)
    }

    async fn enqueue_message(
        &self,
        session_id: Uuid,
        message: Message,
        project_id: &str,
    ) -> Result<usize> {
        let key = Self::key(project_id, KIND_QUEUE, &session_id.to_string());
        let queue = Arc::clone(
            self.queues
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
                .value(),
        );
        let mut queue = queue.lock().await;
        if queue.len() >= self.queue_capacity {
            return Err(StorageError::QueueFull {
                capacity: self.queue_capacity,
            });
        }
        queue.push_back(message);
        Ok(queue.len())
    }

    async fn dequeue_messages(
        &self,
        session_id: Uuid,
        limit: usize,
        project_id: &str,
    ) -> Result<Vec<Message>> {
        let key = Self::key(project_id, KIND_QUEUE, &session_id.to_string());
        let Some(queue) = self.queues.get(&key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(Vec::new());
        };
        let mut queue = queue.lock().await;
        let mut out = Vec::new();
        while out.len() < limit {
            let Some(message) = queue.pop_front() else {
                break;
            };
            if message.is_expired() {
                continue;
            }
            out.push(message);
        }
        Ok(out)
    }

    async fn get_queue_size(&self, session_id: Uuid, project_id: &str) -> Result<usize> {
        let key = Self::key(project_id, KIND_QUEUE, &session_id.to_string());
        let Some(queue) = self.queues.get(&key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(0);
        };
        let queue = queue.lock().await;
        Ok(queue.len())
    }

    async fn clear_queue(&self, session_id: Uuid, project_id: &str) -> Result<usize> {
        let key = Self::key(project_id, KIND_QUEUE, &session_id.to_string());
        let Some(queue) = self.queues.get(&key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(0);
        };
        let mut queue = queue.lock().await;
        let cleared = queue.len();
        queue.clear();
        Ok(cleared)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{
            message::MessageHeaders,
            protocol_def::Capability,
            session::SessionCapabilities,
        },
        serde_json::json,
    };

    fn protocol(name: &str, version: &str) -> ProtocolDefinition {
        ProtocolDefinition::new(name, version, json!({"type": "object"}), vec![
            Capability::PointToPoint,
        ])
        .unwrap()
    }

    fn message(recipient: Uuid, text: &str) -> Message {
        Message::new(
            Uuid::new_v4(),
            Some(recipient),
            "chat_message",
            "1.0.0",
            json!({"text": text}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_protocol_rejects_duplicates() {
        let store = InMemoryStorage::new();
        store.save_protocol(&protocol("chat", "1.0.0"), "p1").await.unwrap();
        let err = store.save_protocol(&protocol("chat", "1.0.0"), "p1").await;
        assert!(matches!(err, Err(StorageError::AlreadyExists { .. })));
        // Same identity under a different project is fine.
        store.save_protocol(&protocol("chat", "1.0.0"), "p2").await.unwrap();
    }

    #[tokio::test]
    async fn project_isolation_for_reads() {
        let store = InMemoryStorage::new();
        store.save_protocol(&protocol("chat", "1.0.0"), "p1").await.unwrap();
        let session = Session::new(SessionCapabilities::default(), "p1");
        store.save_session(&session, "p1").await.unwrap();

        assert!(store.get_protocol("chat", "1.0.0", "p2").await.unwrap().is_none());
        assert!(store.list_protocols(None, None, "p2").await.unwrap().is_empty());
        assert!(store.get_session(session.session_id, "p2").await.unwrap().is_none());
        assert!(store.list_sessions(None, "p2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_protocols_filters() {
        let store = InMemoryStorage::new();
        store.save_protocol(&protocol("chat", "1.0.0"), "p1").await.unwrap();
        store.save_protocol(&protocol("chat", "2.0.0"), "p1").await.unwrap();
        store.save_protocol(&protocol("telemetry", "1.0.0"), "p1").await.unwrap();

        let all = store.list_protocols(None, None, "p1").await.unwrap();
        assert_eq!(all.len(), 3);
        let chats = store.list_protocols(Some("chat"), None, "p1").await.unwrap();
        assert_eq!(chats.len(), 2);
        let v1 = store.list_protocols(None, Some("1.0.0"), "p1").await.unwrap();
        assert_eq!(v1.len(), 2);
        let one = store
            .list_protocols(Some("chat"), Some("2.0.0"), "p1")
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn queue_is_fifo_and_bounded() {
        let store = InMemoryStorage::with_queue_capacity(2);
        let recipient = Uuid::new_v4();

        assert_eq!(
            store.enqueue_message(recipient, message(recipient, "a"), "p1").await.unwrap(),
            1
        );
        assert_eq!(
            store.enqueue_message(recipient, message(recipient, "b"), "p1").await.unwrap(),
            2
        );
        let err = store.enqueue_message(recipient, message(recipient, "c"), "p1").await;
        assert!(matches!(err, Err(StorageError::QueueFull { capacity: 2 })));

        let drained = store.dequeue_messages(recipient, 10, "p1").await.unwrap();
        let texts: Vec<&str> = drained.iter().filter_map(|m| m.payload["text"].as_str()).collect();
        assert_eq!(texts, ["a", "b"]);
        assert_eq!(store.get_queue_size(recipient, "p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_respects_limit() {
        let store = InMemoryStorage::new();
        let recipient = Uuid::new_v4();
        for i in 0..5 {
            store
                .enqueue_message(recipient, message(recipient, &format!("m{i}")), "p1")
                .await
                .unwrap();
        }
        let first = store.dequeue_messages(recipient, 3, "p1").await.unwrap();
        assert_eq!(first.len(), 3);
        let rest = store.dequeue_messages(recipient, 10, "p1").await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].payload["text"], "m3");
    }

    #[tokio::test]
    async fn dequeue_drops_expired_messages() {
        let store = InMemoryStorage::new();
        let recipient = Uuid::new_v4();

        let mut expired = message(recipient, "old");
        expired.headers = Some(MessageHeaders {
            ttl: Some(5),
            ..MessageHeaders::default()
        });
        expired.timestamp = chrono::Utc::now() - chrono::Duration::seconds(30);
        store.enqueue_message(recipient, expired, "p1").await.unwrap();
        store.enqueue_message(recipient, message(recipient, "fresh"), "p1").await.unwrap();

        let drained = store.dequeue_messages(recipient, 10, "p1").await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload["text"], "fresh");
    }

    #[tokio::test]
    async fn queue_isolation_across_projects() {
        let store = InMemoryStorage::new();
        let recipient = Uuid::new_v4();
        store.enqueue_message(recipient, message(recipient, "p1 only"), "p1").await.unwrap();

        assert_eq!(store.get_queue_size(recipient, "p2").await.unwrap(), 0);
        assert!(store.dequeue_messages(recipient, 10, "p2").await.unwrap().is_empty());
        assert_eq!(store.get_queue_size(recipient, "p1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_queue_reports_count() {
        let store = InMemoryStorage::new();
        let recipient = Uuid::new_v4();
        for _ in 0..3 {
            store.enqueue_message(recipient, message(recipient, "x"), "p1").await.unwrap();
        }
        assert_eq!(store.clear_queue(recipient, "p1").await.unwrap(), 3);
        assert_eq!(store.get_queue_size(recipient, "p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_session_drops_queue() {
        let store = InMemoryStorage::new();
        let session = Session::new(SessionCapabilities::default(), "p1");
        store.save_session(&session, "p1").await.unwrap();
        store
            .enqueue_message(session.session_id, message(session.session_id, "x"), "p1")
            .await
            .unwrap();

        assert!(store.delete_session(session.session_id, "p1").await.unwrap());
        assert_eq!(store.get_queue_size(session.session_id, "p1").await.unwrap(), 0);
        assert!(!store.delete_session(session.session_id, "p1").await.unwrap());
    }

    #[tokio::test]
    async fn list_sessions_by_status() {
        let store = InMemoryStorage::new();
        let mut a = Session::new(SessionCapabilities::default(), "p1");
        let b = Session::new(SessionCapabilities::default(), "p1");
        a.status = SessionStatus::Stale;
        store.save_session(&a, "p1").await.unwrap();
        store.save_session(&b, "p1").await.unwrap();

        let stale = store.list_sessions(Some(SessionStatus::Stale), "p1").await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].session_id, a.session_id);
    }
}
