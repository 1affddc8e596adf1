//! The session manager: lifecycle transitions, queue access, and the
//! background liveness sweeps.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    chrono::Utc,
    dashmap::DashMap,
    tokio::sync::{Mutex, broadcast},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use conclave_storage::{Message, Session, SessionCapabilities, SessionStatus, StorageBackend};

use crate::{
    error::{Result, SessionError},
    events::SessionEvent,
};

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub stale_threshold_secs: u64,
    pub disconnect_threshold_secs: u64,
    pub sweep_interval_secs: u64,
    /// Queue capacity, mirrored from the storage backend for warning math.
    pub queue_capacity: usize,
    /// Fraction of capacity at which [`SessionEvent::QueueWarning`] fires.
    pub queue_warning_threshold: f64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 30,
            disconnect_threshold_secs: 60,
            sweep_interval_secs: 10,
            queue_capacity: conclave_storage::DEFAULT_QUEUE_CAPACITY,
            queue_warning_threshold: 0.8,
        }
    }
}

/// Owns session lifecycle within one server process.
///
/// Concurrent heartbeats and enqueues are fine; lifecycle transitions on a
/// single session serialize through a per-id lock.
pub struct SessionManager {
    storage: Arc<dyn StorageBackend>,
    config: SessionManagerConfig,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Projects that have ever held a session here; the sweeps iterate these.
    known_projects: Mutex<HashSet<String>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, config: SessionManagerConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            storage,
            config,
            locks: DashMap::new(),
            known_projects: Mutex::new(HashSet::new()),
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    /// Subscribe to session observations.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a session. Providing the id of an existing session supersedes
    /// it: the old session is disconnected and replaced, its queue carried
    /// over until the disconnect sweep reaps it.
    pub async fn create_session(
        &self,
        capabilities: SessionCapabilities,
        project_id: &str,
        session_id: Option<Uuid>,
    ) -> Result<Session> {
        let session = match session_id {
            Some(id) => Session::with_id(id, capabilities, project_id),
            None => Session::new(capabilities, project_id),
        };

        let lock = self.lock_for(session.session_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.storage.get_session(session.session_id, project_id).await? {
            info!(
                session_id = %session.session_id,
                project_id,
                "session id reused; superseding prior session"
            );
            let mut old = existing;
            old.status = SessionStatus::Disconnected;
            self.storage.save_session(&old, project_id).await?;
            self.emit(SessionEvent::Superseded {
                session_id: session.session_id,
                project_id: project_id.to_string(),
            });
        }

        self.storage.save_session(&session, project_id).await?;
        self.known_projects.lock().await.insert(project_id.to_string());
        debug!(session_id = %session.session_id, project_id, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid, project_id: &str) -> Result<Option<Session>> {
        Ok(self.storage.get_session(session_id, project_id).await?)
    }

    /// Record a heartbeat. A stale session returns to `active`; a
    /// disconnected session stays terminal.
    pub async fn update_heartbeat(
        &self,
        session_id: Uuid,
        project_id: &str,
    ) -> Result<Option<Session>> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.storage.get_session(session_id, project_id).await? else {
            return Ok(None);
        };
        if session.status == SessionStatus::Disconnected {
            debug!(session_id = %session_id, "heartbeat on disconnected session ignored");
            return Ok(Some(session));
        }
        session.last_heartbeat = Utc::now();
        if session.status == SessionStatus::Stale {
            session.status = SessionStatus::Active;
            debug!(session_id = %session_id, "stale session recovered by heartbeat");
        }
        self.storage.save_session(&session, project_id).await?;
        Ok(Some(session))
    }

    pub async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        project_id: &str,
    ) -> Result<Vec<Session>> {
        Ok(self.storage.list_sessions(status, project_id).await?)
    }

    /// Disconnect a session. Its queue is retained for redelivery until the
    /// disconnect threshold fully elapses, then reaped by the sweep.
    pub async fn disconnect_session(&self, session_id: Uuid, project_id: &str) -> Result<bool> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.storage.get_session(session_id, project_id).await? else {
            return Ok(false);
        };
        session.status = SessionStatus::Disconnected;
        self.storage.save_session(&session, project_id).await?;
        self.emit(SessionEvent::Disconnected {
            session_id,
            project_id: project_id.to_string(),
        });
        info!(session_id = %session_id, project_id, "session disconnected");
        Ok(true)
    }

    /// Enqueue a message for a session. Returns the new queue size.
    pub async fn enqueue_message(
        &self,
        session_id: Uuid,
        message: Message,
        project_id: &str,
    ) -> Result<usize> {
        let Some(mut session) = self.storage.get_session(session_id, project_id).await? else {
            return Err(SessionError::NotFound(session_id));
        };

        let queue_size = self
            .storage
            .enqueue_message(session_id, message, project_id)
            .await?;

        session.queue_size = queue_size;
        self.storage.save_session(&session, project_id).await?;

        self.emit(SessionEvent::MessageQueued {
            session_id,
            project_id: project_id.to_string(),
            queue_size,
        });

        let warn_at =
            (self.config.queue_capacity as f64 * self.config.queue_warning_threshold).ceil() as usize;
        if queue_size >= warn_at.max(1) {
            warn!(
                session_id = %session_id,
                project_id,
                queue_size,
                capacity = self.config.queue_capacity,
                "session queue nearing capacity"
            );
            self.emit(SessionEvent::QueueWarning {
                session_id,
                project_id: project_id.to_string(),
                queue_size,
                capacity: self.config.queue_capacity,
            });
        }
        Ok(queue_size)
    }

    /// Dequeue up to `limit` messages, oldest first.
    pub async fn dequeue_messages(
        &self,
        session_id: Uuid,
        limit: usize,
        project_id: &str,
    ) -> Result<Vec<Message>> {
        let messages = self
            .storage
            .dequeue_messages(session_id, limit, project_id)
            .await?;
        if let Some(mut session) = self.storage.get_session(session_id, project_id).await? {
            session.queue_size = self.storage.get_queue_size(session_id, project_id).await?;
            self.storage.save_session(&session, project_id).await?;
        }
        Ok(messages)
    }

    // ── Sweeps ───────────────────────────────────────────────────────────

    /// Mark every active session past the stale threshold as stale.
    /// Returns the transitioned sessions.
    pub async fn check_stale_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        let mut transitioned = Vec::new();
        for session in self.storage.list_sessions(Some(SessionStatus::Active), project_id).await? {
            if !session.is_stale(self.config.stale_threshold_secs) {
                continue;
            }
            let lock = self.lock_for(session.session_id);
            let _guard = lock.lock().await;
            // Re-read under the lock: a heartbeat may have won the race.
            let Some(mut current) = self.storage.get_session(session.session_id, project_id).await?
            else {
                continue;
            };
            if current.status != SessionStatus::Active
                || !current.is_stale(self.config.stale_threshold_secs)
            {
                continue;
            }
            current.status = SessionStatus::Stale;
            self.storage.save_session(&current, project_id).await?;
            self.emit(SessionEvent::BecameStale {
                session_id: current.session_id,
                project_id: project_id.to_string(),
            });
            debug!(session_id = %current.session_id, project_id, "session marked stale");
            transitioned.push(current);
        }
        Ok(transitioned)
    }

    /// Disconnect and reap every session past the disconnect threshold,
    /// dropping its queue. Returns the reaped sessions.
    pub async fn cleanup_expired_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        let mut reaped = Vec::new();
        for session in self.storage.list_sessions(None, project_id).await? {
            if !session.should_disconnect(self.config.disconnect_threshold_secs) {
                continue;
            }
            let lock = self.lock_for(session.session_id);
            let _guard = lock.lock().await;
            let Some(current) = self.storage.get_session(session.session_id, project_id).await?
            else {
                continue;
            };
            if !current.should_disconnect(self.config.disconnect_threshold_secs) {
                continue;
            }
            if current.status != SessionStatus::Disconnected {
                self.emit(SessionEvent::Disconnected {
                    session_id: current.session_id,
                    project_id: project_id.to_string(),
                });
            }
            self.storage.clear_queue(current.session_id, project_id).await?;
            self.storage.delete_session(current.session_id, project_id).await?;
            self.locks.remove(&current.session_id);
            info!(session_id = %current.session_id, project_id, "expired session reaped");
            reaped.push(current);
        }
        Ok(reaped)
    }

    /// One pass of both sweeps over every known project. Errors are logged
    /// and never propagate.
    pub async fn sweep_once(&self) {
        let projects: Vec<String> = self.known_projects.lock().await.iter().cloned().collect();
        for project_id in projects {
            if let Err(e) = self.check_stale_sessions(&project_id).await {
                warn!(project_id, error = %e, "stale sweep failed");
            }
            if let Err(e) = self.cleanup_expired_sessions(&project_id).await {
                warn!(project_id, error = %e, "disconnect sweep failed");
            }
        }
    }

    /// Run the sweeps at the configured interval until cancelled.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("session sweeper stopped");
                    return;
                },
                _ = interval.tick() => self.sweep_once().await,
            }
        }
    }
}

impl SessionManager {
    /// Current queue size as the backend sees it.
    pub async fn queue_size(&self, session_id: Uuid, project_id: &str) -> Result<usize> {
        Ok(self.storage.get_queue_size(session_id, project_id).await?)
    }
}
