//! Point-to-point and broadcast delivery.

use std::{collections::VecDeque, sync::Arc};

use {
    chrono::{DateTime, Utc},
    conclave_common::time,
    serde::{Deserialize, Serialize},
    tokio::sync::Mutex,
    tracing::{info, warn},
    uuid::Uuid,
};

use {
    conclave_projects::ProjectRegistry,
    conclave_protocol::DLQ_MAX_RECORDS,
    conclave_sessions::{SessionError, SessionManager},
    conclave_storage::{
        BroadcastRecipients, BroadcastResult, DeliveryResult, Message, Session, SessionStatus,
    },
};

/// A message that could not be delivered or queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message: Message,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub project_id: String,
}

/// Router for inter-session message delivery.
///
/// Verifies sender and recipient within the request's project, gates on
/// protocol compatibility, queues for offline recipients, and dead-letters
/// messages that hit a full queue.
pub struct MessageRouter {
    sessions: Arc<SessionManager>,
    projects: Arc<ProjectRegistry>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, projects: Arc<ProjectRegistry>) -> Self {
        Self {
            sessions,
            projects,
            dead_letters: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Send a point-to-point message within one project.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        message: Message,
        project_id: &str,
    ) -> DeliveryResult {
        let sender = match self.sessions.get_session(sender_id, project_id).await {
            Ok(Some(sender)) => sender,
            Ok(None) => {
                return DeliveryResult::failure(format!("Sender session {sender_id} not found"));
            },
            Err(e) => return DeliveryResult::failure(e.to_string()),
        };
        if sender.project_id != project_id {
            return DeliveryResult::failure(format!(
                "Sender session {sender_id} not in project '{project_id}'"
            ));
        }

        self.deliver(&sender, recipient_id, project_id, message).await
    }

    /// Deliver to a recipient in `recipient_project`, on behalf of an
    /// already-verified sender. The cross-project router calls this directly
    /// after its permission checks.
    pub(crate) async fn deliver(
        &self,
        sender: &Session,
        recipient_id: Uuid,
        recipient_project: &str,
        message: Message,
    ) -> DeliveryResult {
        let recipient = match self.sessions.get_session(recipient_id, recipient_project).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                return DeliveryResult::failure(format!(
                    "Recipient session {recipient_id} not found in project '{recipient_project}'"
                ));
            },
            Err(e) => return DeliveryResult::failure(e.to_string()),
        };
        if recipient.project_id != recipient_project {
            return DeliveryResult::failure(format!(
                "Cross-project messaging not allowed: {} -> {}",
                sender.project_id, recipient.project_id
            ));
        }

        let common = sender.find_common_protocols(&recipient);
        if !common.contains_key(&message.protocol_name) {
            return DeliveryResult::failure(format!(
                "Protocol mismatch: no common version for '{}'",
                message.protocol_name
            ));
        }

        let message_id = message.message_id;
        let offline = recipient.status == SessionStatus::Disconnected;

        match self
            .sessions
            .enqueue_message(recipient_id, message.clone(), recipient_project)
            .await
        {
            Ok(queue_size) if offline => {
                info!(
                    message_id = %message_id,
                    sender_id = %sender.session_id,
                    recipient_id = %recipient_id,
                    project_id = recipient_project,
                    queue_size,
                    "message queued for offline session"
                );
                self.projects.record_message(recipient_project).await;
                DeliveryResult {
                    success: true,
                    queued: true,
                    queue_size: Some(queue_size),
                    message_id: Some(message_id),
                    ..DeliveryResult::default()
                }
            },
            Ok(_) => {
                info!(
                    message_id = %message_id,
                    sender_id = %sender.session_id,
                    recipient_id = %recipient_id,
                    protocol = %message.protocol_name,
                    project_id = recipient_project,
                    "message delivered"
                );
                self.projects.record_message(recipient_project).await;
                DeliveryResult {
                    success: true,
                    delivered_at: Some(time::now()),
                    message_id: Some(message_id),
                    ..DeliveryResult::default()
                }
            },
            Err(SessionError::QueueFull { .. }) => {
                self.push_dead_letter(DeadLetter {
                    message,
                    failed_at: time::now(),
                    reason: "queue_full".into(),
                    sender_id: sender.session_id,
                    recipient_id,
                    project_id: recipient_project.to_string(),
                })
                .await;
                DeliveryResult {
                    success: false,
                    error_reason: Some("Queue full".into()),
                    message_id: Some(message_id),
                    ..DeliveryResult::default()
                }
            },
            Err(e) => DeliveryResult {
                success: false,
                error_reason: Some(e.to_string()),
                message_id: Some(message_id),
                ..DeliveryResult::default()
            },
        }
    }

    /// Broadcast to every compatible active session in the project.
    ///
    /// All recipients receive the same `message_id`; per-recipient delivery
    /// is independent, a broadcast is not atomic.
    pub async fn broadcast_message(
        &self,
        sender_id: Uuid,
        message: Message,
        capability_filter: Option<&[String]>,
        project_id: &str,
    ) -> BroadcastResult {
        let sender = match self.sessions.get_session(sender_id, project_id).await {
            Ok(Some(sender)) => sender,
            Ok(None) | Err(_) => {
                return BroadcastResult {
                    success: false,
                    reason: Some(format!(
                        "Sender session {sender_id} not found in project '{project_id}'"
                    )),
                    ..BroadcastResult::default()
                };
            },
        };

        let all = match self
            .sessions
            .list_sessions(Some(SessionStatus::Active), project_id)
            .await
        {
            Ok(all) => all,
            Err(e) => {
                return BroadcastResult {
                    success: false,
                    reason: Some(e.to_string()),
                    ..BroadcastResult::default()
                };
            },
        };

        let mut recipients: Vec<Session> =
            all.into_iter().filter(|s| s.session_id != sender_id).collect();

        if recipients.is_empty() {
            return BroadcastResult {
                success: true,
                reason: Some("No other active sessions in project".into()),
                recipients: BroadcastRecipients {
                    skipped: vec![sender_id],
                    ..BroadcastRecipients::default()
                },
                ..BroadcastResult::default()
            };
        }

        if let Some(required) = capability_filter {
            recipients.retain(|session| {
                required
                    .iter()
                    .all(|feature| session.capabilities.supported_features.contains(feature))
            });
        }

        let (compatible, incompatible): (Vec<Session>, Vec<Session>) =
            recipients.into_iter().partition(|recipient| {
                sender
                    .find_common_protocols(recipient)
                    .contains_key(&message.protocol_name)
            });

        if compatible.is_empty() {
            let mut skipped: Vec<Uuid> = incompatible.iter().map(|s| s.session_id).collect();
            skipped.push(sender_id);
            return BroadcastResult {
                success: true,
                reason: Some("No compatible recipients".into()),
                recipients: BroadcastRecipients {
                    skipped,
                    ..BroadcastRecipients::default()
                },
                ..BroadcastResult::default()
            };
        }

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for recipient in &compatible {
            let copy = message.for_recipient(recipient.session_id);
            let result = self
                .deliver(&sender, recipient.session_id, project_id, copy)
                .await;
            if result.success {
                delivered.push(recipient.session_id);
            } else {
                failed.push(recipient.session_id);
            }
        }

        let mut skipped: Vec<Uuid> = incompatible.iter().map(|s| s.session_id).collect();
        skipped.push(sender_id);

        info!(
            sender_id = %sender_id,
            message_id = %message.message_id,
            project_id,
            delivered = delivered.len(),
            failed = failed.len(),
            skipped = skipped.len(),
            "broadcast completed"
        );

        BroadcastResult {
            success: true,
            delivery_count: delivered.len(),
            recipients: BroadcastRecipients {
                delivered,
                failed,
                skipped,
            },
            reason: None,
        }
    }

    // ── Dead-letter queue ────────────────────────────────────────────────

    async fn push_dead_letter(&self, letter: DeadLetter) {
        let mut dlq = self.dead_letters.lock().await;
        if dlq.len() >= DLQ_MAX_RECORDS {
            dlq.pop_front();
            warn!("dead-letter queue full; evicting oldest record");
        }
        warn!(
            message_id = %letter.message.message_id,
            recipient_id = %letter.recipient_id,
            reason = %letter.reason,
            "message dead-lettered"
        );
        dlq.push_back(letter);
    }

    pub async fn dead_letter_queue(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.iter().cloned().collect()
    }

    /// Drop all dead letters, returning how many there were.
    pub async fn clear_dead_letter_queue(&self) -> usize {
        let mut dlq = self.dead_letters.lock().await;
        let count = dlq.len();
        dlq.clear();
        count
    }
}
