//! Shared application state: every core service, constructor-injected and
//! wrapped in `Arc` for use across async tasks.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    tokio::sync::RwLock,
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

use {
    conclave_config::ConclaveConfig,
    conclave_discussion::{CoordinatorConfig, DiscussionCoordinator},
    conclave_hubs::{ChatHub, MeetingHub, StatusHub},
    conclave_projects::{ProjectRegistry, RelationshipManager},
    conclave_registry::ProtocolRegistry,
    conclave_routing::{CrossProjectRouter, MessageRouter},
    conclave_sessions::{CapabilityNegotiator, SessionManager, SessionManagerConfig},
    conclave_storage::{InMemoryStorage, StorageBackend},
};

pub struct AppState {
    pub config: ConclaveConfig,
    pub storage: Arc<dyn StorageBackend>,
    pub projects: Arc<ProjectRegistry>,
    pub relationships: Arc<RelationshipManager>,
    pub protocols: Arc<ProtocolRegistry>,
    pub sessions: Arc<SessionManager>,
    pub router: Arc<MessageRouter>,
    pub cross_router: Arc<CrossProjectRouter>,
    pub negotiator: CapabilityNegotiator,
    pub meeting_hub: Arc<MeetingHub>,
    pub chat_hub: Arc<ChatHub>,
    pub status_hub: Arc<StatusHub>,
    pub throttle: crate::throttle::RequestThrottle,
    coordinators: RwLock<HashMap<Uuid, Arc<DiscussionCoordinator>>>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Assemble the full service graph over the in-memory backend.
    #[must_use]
    pub fn new(config: ConclaveConfig) -> Arc<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::with_queue_capacity(
            config.sessions.queue_capacity,
        ));
        Self::with_storage(config, storage)
    }

    /// Assemble over an injected storage backend.
    #[must_use]
    pub fn with_storage(config: ConclaveConfig, storage: Arc<dyn StorageBackend>) -> Arc<Self> {
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&storage),
            SessionManagerConfig {
                stale_threshold_secs: config.sessions.stale_threshold_secs,
                disconnect_threshold_secs: config.sessions.disconnect_threshold_secs,
                sweep_interval_secs: config.sessions.sweep_interval_secs,
                queue_capacity: config.sessions.queue_capacity,
                queue_warning_threshold: config.sessions.queue_warning_threshold,
            },
        ));
        let projects = Arc::new(ProjectRegistry::new());
        let relationships = Arc::new(RelationshipManager::new());
        let protocols = Arc::new(ProtocolRegistry::new(Arc::clone(&storage)));
        let router = Arc::new(MessageRouter::new(Arc::clone(&sessions), Arc::clone(&projects)));
        let cross_router = Arc::new(CrossProjectRouter::new(
            Arc::clone(&router),
            Arc::clone(&relationships),
        ));

        Arc::new(Self {
            storage,
            projects,
            relationships,
            protocols,
            sessions,
            router,
            cross_router,
            negotiator: CapabilityNegotiator::new(),
            meeting_hub: Arc::new(MeetingHub::new()),
            chat_hub: Arc::new(ChatHub::new()),
            status_hub: Arc::new(StatusHub::new()),
            throttle: crate::throttle::RequestThrottle::new(config.rate_limit.requests_per_minute),
            coordinators: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            config,
        })
    }

    /// The discussion coordinator for a meeting, created on first use.
    pub async fn coordinator(&self, meeting_id: Uuid) -> Arc<DiscussionCoordinator> {
        if let Some(existing) = self.coordinators.read().await.get(&meeting_id) {
            return Arc::clone(existing);
        }
        let mut table = self.coordinators.write().await;
        Arc::clone(table.entry(meeting_id).or_insert_with(|| {
            Arc::new(DiscussionCoordinator::new(
                meeting_id,
                Arc::clone(&self.meeting_hub),
                CoordinatorConfig {
                    timeout: Duration::from_secs(self.config.discussion.timeout_secs),
                    consensus_threshold: self.config.discussion.consensus_threshold,
                },
            ))
        }))
    }

    /// Drop a meeting's coordinator once its discussion completed.
    pub async fn remove_coordinator(&self, meeting_id: Uuid) {
        self.coordinators.write().await.remove(&meeting_id);
    }

    /// Launch the background session sweeper and the session→status event
    /// bridge. Idempotent per state instance is not required; call once at
    /// startup.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        tokio::spawn(
            Arc::clone(&self.sessions).run_sweeper(self.shutdown.child_token()),
        );
        tokio::spawn(crate::events::run_event_bridge(
            Arc::clone(self),
            self.shutdown.child_token(),
        ));
    }

    /// Cancel background tasks; they stop within one sweep interval.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
