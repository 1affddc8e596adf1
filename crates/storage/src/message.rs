//! Messages routed between sessions, and routing result types.

use std::collections::BTreeMap;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Optional routing headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(default)]
    pub priority: Priority,
    /// Time-to-live in seconds.
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

/// A message in flight between two sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    /// `None` marks a broadcast.
    pub recipient_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub protocol_name: String,
    pub protocol_version: String,
    pub payload: serde_json::Value,
    pub headers: Option<MessageHeaders>,
}

impl Message {
    /// Build a message, rejecting empty payloads.
    pub fn new(
        sender_id: Uuid,
        recipient_id: Option<Uuid>,
        protocol_name: impl Into<String>,
        protocol_version: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Self> {
        if payload.is_null() || payload.as_object().is_some_and(serde_json::Map::is_empty) {
            return Err(StorageError::InvalidInput("payload cannot be empty".into()));
        }
        Ok(Self {
            message_id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            timestamp: Utc::now(),
            protocol_name: protocol_name.into(),
            protocol_version: protocol_version.into(),
            payload,
            headers: None,
        })
    }

    #[must_use]
    pub fn with_headers(mut self, headers: MessageHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id.is_none()
    }

    /// True once `now - timestamp` exceeds the TTL header.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(ttl) = self.headers.as_ref().and_then(|h| h.ttl) else {
            return false;
        };
        conclave_common::time::seconds_since(self.timestamp) > ttl
    }

    /// Copy addressed to one broadcast recipient. The `message_id` is shared
    /// across all recipients of a broadcast, so receivers performing
    /// duplicate detection will see the same id more than once.
    #[must_use]
    pub fn for_recipient(&self, recipient_id: Uuid) -> Self {
        let mut copy = self.clone();
        copy.recipient_id = Some(recipient_id);
        copy
    }
}

// ── Result types ─────────────────────────────────────────────────────────────

/// Outcome of a point-to-point delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_reason: Option<String>,
    pub queued: bool,
    pub queue_size: Option<usize>,
    pub message_id: Option<Uuid>,
}

impl DeliveryResult {
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastRecipients {
    pub delivered: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub success: bool,
    pub delivery_count: usize,
    pub recipients: BroadcastRecipients,
    pub reason: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn empty_payload_rejected() {
        let err = Message::new(Uuid::new_v4(), None, "chat", "1.0.0", json!({}));
        assert!(matches!(err, Err(StorageError::InvalidInput(_))));
        let err = Message::new(Uuid::new_v4(), None, "chat", "1.0.0", serde_json::Value::Null);
        assert!(err.is_err());
    }

    #[test]
    fn broadcast_has_no_recipient() {
        let msg = Message::new(Uuid::new_v4(), None, "chat", "1.0.0", json!({"text": "hi"})).unwrap();
        assert!(msg.is_broadcast());
        let addressed = msg.for_recipient(Uuid::new_v4());
        assert!(!addressed.is_broadcast());
        assert_eq!(addressed.message_id, msg.message_id);
    }

    #[test]
    fn ttl_expiry() {
        let mut msg =
            Message::new(Uuid::new_v4(), None, "chat", "1.0.0", json!({"text": "hi"})).unwrap();
        msg.headers = Some(MessageHeaders {
            ttl: Some(10),
            ..MessageHeaders::default()
        });
        assert!(!msg.is_expired());
        msg.timestamp = Utc::now() - chrono::Duration::seconds(11);
        assert!(msg.is_expired());
    }

    #[test]
    fn no_ttl_never_expires() {
        let mut msg =
            Message::new(Uuid::new_v4(), None, "chat", "1.0.0", json!({"text": "hi"})).unwrap();
        msg.timestamp = Utc::now() - chrono::Duration::days(30);
        assert!(!msg.is_expired());
    }
}
