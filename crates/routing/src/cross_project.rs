//! Cross-project sends: mutual-consent gating plus a sliding-window rate
//! limit per (pair, direction).

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    tokio::sync::Mutex,
    tracing::{info, warn},
    uuid::Uuid,
};

use {
    conclave_projects::RelationshipManager,
    conclave_storage::{DeliveryResult, Message},
};

use crate::{
    error::{Result, RoutingError},
    router::MessageRouter,
};

const WINDOW: Duration = Duration::from_secs(60);

/// Routes messages between projects that hold an active relationship.
pub struct CrossProjectRouter {
    router: Arc<MessageRouter>,
    relationships: Arc<RelationshipManager>,
    /// (from_project, to_project) → send timestamps within the window.
    windows: Mutex<std::collections::HashMap<(String, String), VecDeque<Instant>>>,
}

impl CrossProjectRouter {
    #[must_use]
    pub fn new(router: Arc<MessageRouter>, relationships: Arc<RelationshipManager>) -> Self {
        Self {
            router,
            relationships,
            windows: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Send from a session in `sender_project` to a session in
    /// `recipient_project`.
    ///
    /// Fails `Forbidden` without an active relationship permitting the
    /// message's protocol in this direction, and `RateLimited` past the
    /// direction's per-minute cap. Router-level failures (recipient missing,
    /// protocol mismatch, queue full) come back inside the
    /// [`DeliveryResult`].
    pub async fn send_cross_project(
        &self,
        sender_id: Uuid,
        sender_project: &str,
        recipient_id: Uuid,
        recipient_project: &str,
        message: Message,
    ) -> Result<DeliveryResult> {
        let Some(relationship) = self
            .relationships
            .get_relationship(sender_project, recipient_project)
            .await
        else {
            warn!(
                sender_project,
                recipient_project, "cross-project send without relationship"
            );
            return Err(RoutingError::Forbidden(format!(
                "no relationship between '{sender_project}' and '{recipient_project}'"
            )));
        };

        if !relationship.is_active() {
            return Err(RoutingError::Forbidden(format!(
                "relationship between '{sender_project}' and '{recipient_project}' is not active"
            )));
        }

        if !relationship.can_send(sender_project, &message.protocol_name) {
            return Err(RoutingError::Forbidden(format!(
                "protocol '{}' not permitted from '{sender_project}' to '{recipient_project}'",
                message.protocol_name
            )));
        }

        let limit = relationship.rate_limit_from(sender_project);
        if limit > 0 {
            self.check_rate(sender_project, recipient_project, limit).await?;
        }

        let sender = match self.sessions_lookup(sender_id, sender_project).await {
            Some(sender) => sender,
            None => {
                return Ok(DeliveryResult::failure(format!(
                    "Sender session {sender_id} not found in project '{sender_project}'"
                )));
            },
        };

        info!(
            sender_project,
            recipient_project,
            protocol = %message.protocol_name,
            "cross-project delivery authorized"
        );
        Ok(self
            .router
            .deliver(&sender, recipient_id, recipient_project, message)
            .await)
    }

    async fn sessions_lookup(
        &self,
        session_id: Uuid,
        project_id: &str,
    ) -> Option<conclave_storage::Session> {
        self.router.sessions().get_session(session_id, project_id).await.ok().flatten()
    }

    /// Sliding one-minute counter per direction.
    async fn check_rate(&self, from: &str, to: &str, limit: u32) -> Result<()> {
        let key = (from.to_string(), to.to_string());
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key).or_default();
        while window.front().is_some_and(|t| now.duration_since(*t) > WINDOW) {
            window.pop_front();
        }
        if window.len() >= limit as usize {
            return Err(RoutingError::RateLimited { limit });
        }
        window.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        conclave_projects::{CrossProjectPermission, ProjectRegistry},
        conclave_sessions::{SessionManager, SessionManagerConfig},
        conclave_storage::{InMemoryStorage, SessionCapabilities, StorageBackend},
        serde_json::json,
    };

    struct Fixture {
        sessions: Arc<SessionManager>,
        relationships: Arc<RelationshipManager>,
        cross: CrossProjectRouter,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&storage) as Arc<dyn StorageBackend>,
            SessionManagerConfig::default(),
        ));
        let projects = Arc::new(ProjectRegistry::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&sessions), projects));
        let relationships = Arc::new(RelationshipManager::new());
        let cross = CrossProjectRouter::new(router, Arc::clone(&relationships));
        Fixture {
            sessions,
            relationships,
            cross,
        }
    }

    fn caps() -> SessionCapabilities {
        SessionCapabilities::new(
            [("status_update".to_string(), vec!["1.0.0".to_string()])],
            [],
        )
    }

    fn message(sender: Uuid, recipient: Uuid) -> Message {
        Message::new(
            sender,
            Some(recipient),
            "status_update",
            "1.0.0",
            json!({"state": "ok"}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn no_relationship_is_forbidden() {
        let fx = fixture();
        let a = fx.sessions.create_session(caps(), "p1", None).await.unwrap();
        let b = fx.sessions.create_session(caps(), "p2", None).await.unwrap();

        let err = fx
            .cross
            .send_cross_project(a.session_id, "p1", b.session_id, "p2", message(a.session_id, b.session_id))
            .await;
        assert!(matches!(err, Err(RoutingError::Forbidden(_))));
    }

    #[tokio::test]
    async fn pending_relationship_is_forbidden() {
        let fx = fixture();
        let a = fx.sessions.create_session(caps(), "p1", None).await.unwrap();
        let b = fx.sessions.create_session(caps(), "p2", None).await.unwrap();
        fx.relationships.create_relationship("p1", "p2", None, None).await.unwrap();

        let err = fx
            .cross
            .send_cross_project(a.session_id, "p1", b.session_id, "p2", message(a.session_id, b.session_id))
            .await;
        assert!(matches!(err, Err(RoutingError::Forbidden(_))));
    }

    #[tokio::test]
    async fn active_relationship_delivers() {
        let fx = fixture();
        let a = fx.sessions.create_session(caps(), "p1", None).await.unwrap();
        let b = fx.sessions.create_session(caps(), "p2", None).await.unwrap();
        fx.relationships.create_relationship("p1", "p2", None, None).await.unwrap();
        fx.relationships.activate("p1", "p2", "p1").await.unwrap();

        let result = fx
            .cross
            .send_cross_project(a.session_id, "p1", b.session_id, "p2", message(a.session_id, b.session_id))
            .await
            .unwrap();
        assert!(result.success);

        let inbox = fx.sessions.dequeue_messages(b.session_id, 10, "p2").await.unwrap();
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test]
    async fn protocol_whitelist_blocks_directionally() {
        let fx = fixture();
        let a = fx.sessions.create_session(caps(), "p1", None).await.unwrap();
        let b = fx.sessions.create_session(caps(), "p2", None).await.unwrap();
        fx.relationships
            .create_relationship(
                "p1",
                "p2",
                Some(CrossProjectPermission {
                    allowed_protocols: vec!["telemetry".into()],
                    messages_per_minute: 0,
                }),
                None,
            )
            .await
            .unwrap();
        fx.relationships.activate("p1", "p2", "p1").await.unwrap();

        // p1 → p2 is whitelisted to telemetry only.
        let err = fx
            .cross
            .send_cross_project(a.session_id, "p1", b.session_id, "p2", message(a.session_id, b.session_id))
            .await;
        assert!(matches!(err, Err(RoutingError::Forbidden(_))));

        // p2 → p1 has no whitelist.
        let ok = fx
            .cross
            .send_cross_project(b.session_id, "p2", a.session_id, "p1", message(b.session_id, a.session_id))
            .await
            .unwrap();
        assert!(ok.success);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_direction() {
        let fx = fixture();
        let a = fx.sessions.create_session(caps(), "p1", None).await.unwrap();
        let b = fx.sessions.create_session(caps(), "p2", None).await.unwrap();
        fx.relationships
            .create_relationship(
                "p1",
                "p2",
                Some(CrossProjectPermission {
                    allowed_protocols: vec![],
                    messages_per_minute: 2,
                }),
                None,
            )
            .await
            .unwrap();
        fx.relationships.activate("p1", "p2", "p1").await.unwrap();

        for _ in 0..2 {
            fx.cross
                .send_cross_project(a.session_id, "p1", b.session_id, "p2", message(a.session_id, b.session_id))
                .await
                .unwrap();
        }
        let err = fx
            .cross
            .send_cross_project(a.session_id, "p1", b.session_id, "p2", message(a.session_id, b.session_id))
            .await;
        assert!(matches!(err, Err(RoutingError::RateLimited { limit: 2 })));

        // The reverse direction is unlimited.
        let ok = fx
            .cross
            .send_cross_project(b.session_id, "p2", a.session_id, "p1", message(b.session_id, a.session_id))
            .await
            .unwrap();
        assert!(ok.success);
    }

    #[tokio::test]
    async fn unknown_sender_fails_inside_result() {
        let fx = fixture();
        let b = fx.sessions.create_session(caps(), "p2", None).await.unwrap();
        fx.relationships.create_relationship("p1", "p2", None, None).await.unwrap();
        fx.relationships.activate("p1", "p2", "p1").await.unwrap();

        let ghost = Uuid::new_v4();
        let result = fx
            .cross
            .send_cross_project(ghost, "p1", b.session_id, "p2", message(ghost, b.session_id))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
