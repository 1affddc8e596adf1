//! Observations published by the session manager.
//!
//! Consumers (hubs, the gateway drain loop) subscribe through
//! [`crate::SessionManager::subscribe`]. Delivery is best-effort: a lagging
//! subscriber loses the oldest events, never blocks the manager.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message landed in a session's queue.
    MessageQueued {
        session_id: Uuid,
        project_id: String,
        queue_size: usize,
    },
    /// A queue crossed the warning threshold.
    QueueWarning {
        session_id: Uuid,
        project_id: String,
        queue_size: usize,
        capacity: usize,
    },
    /// The stale sweep marked a session stale.
    BecameStale { session_id: Uuid, project_id: String },
    /// A session was disconnected, by request or by the sweep.
    Disconnected { session_id: Uuid, project_id: String },
    /// A new session took over an existing session id.
    Superseded { session_id: Uuid, project_id: String },
}
