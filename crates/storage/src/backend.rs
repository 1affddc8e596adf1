//! The storage contract every backend must satisfy.

use {async_trait::async_trait, uuid::Uuid};

use crate::{
    error::Result,
    message::Message,
    protocol_def::ProtocolDefinition,
    session::{Session, SessionStatus},
};

/// Project-scoped CRUD over protocols, sessions, and per-session message
/// queues.
///
/// Every operation is scoped to a `project_id`; implementations must never
/// let a read under one project observe keys written under another. All
/// operations are logically atomic with respect to other operations on the
/// same key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch a protocol by name and version, or `None`.
    async fn get_protocol(
        &self,
        name: &str,
        version: &str,
        project_id: &str,
    ) -> Result<Option<ProtocolDefinition>>;

    /// Persist a protocol. Fails with `AlreadyExists` on a duplicate
    /// `(project, name, version)`.
    async fn save_protocol(&self, protocol: &ProtocolDefinition, project_id: &str) -> Result<()>;

    /// List protocols, optionally filtered by name and/or version.
    async fn list_protocols(
        &self,
        name: Option<&str>,
        version: Option<&str>,
        project_id: &str,
    ) -> Result<Vec<ProtocolDefinition>>;

    /// Delete a protocol. Returns `true` if it existed.
    async fn delete_protocol(&self, name: &str, version: &str, project_id: &str) -> Result<bool>;

    async fn get_session(&self, session_id: Uuid, project_id: &str) -> Result<Option<Session>>;

    /// Insert or update a session.
    async fn save_session(&self, session: &Session, project_id: &str) -> Result<()>;

    /// List sessions, optionally filtered by status.
    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        project_id: &str,
    ) -> Result<Vec<Session>>;

    /// Delete a session. Returns `true` if it existed.
    async fn delete_session(&self, session_id: Uuid, project_id: &str) -> Result<bool>;

    /// Append to a session's queue. Fails with `QueueFull` at capacity.
    /// Returns the new queue size.
    async fn enqueue_message(
        &self,
        session_id: Uuid,
        message: Message,
        project_id: &str,
    ) -> Result<usize>;

    /// Remove and return up to `limit` messages, oldest first. Messages whose
    /// TTL has elapsed are dropped, never returned.
    async fn dequeue_messages(
        &self,
        session_id: Uuid,
        limit: usize,
        project_id: &str,
    ) -> Result<Vec<Message>>;

    async fn get_queue_size(&self, session_id: Uuid, project_id: &str) -> Result<usize>;

    /// Drop all queued messages. Returns how many were removed.
    async fn clear_queue(&self, session_id: Uuid, project_id: &str) -> Result<usize>;
}
