//! Hub WebSocket protocol definitions.
//!
//! All hub communication uses JSON text frames over WebSocket. Meeting and
//! status frames carry a `type` discriminator with flat fields; chat frames
//! carry an `event` discriminator with a `data` payload.

use serde::{Deserialize, Serialize};

pub mod api_key;
pub mod events;

pub use api_key::{ApiKeyDigest, KEY_PREFIX_LEN, generate_api_key, parse_key_prefix, sha256_hex};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB

/// Seconds without a heartbeat before a session is marked stale.
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 30;
/// Seconds without a heartbeat before a session is disconnected.
pub const DEFAULT_DISCONNECT_THRESHOLD_SECS: u64 = 60;
/// Interval between background session sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Fraction of queue capacity that triggers a warning observation.
pub const DEFAULT_QUEUE_WARNING_THRESHOLD: f64 = 0.8;
/// Records kept in the dead-letter queue before the oldest is evicted.
pub const DLQ_MAX_RECORDS: usize = 1024;

pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.75;
pub const DEFAULT_DISCUSSION_TIMEOUT_SECS: u64 = 300;

// ── Close codes ──────────────────────────────────────────────────────────────

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Policy violation: auth failure or malformed room id.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

// ── Meeting frames ───────────────────────────────────────────────────────────

/// Client → server frames accepted on a meeting socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeetingClientFrame {
    /// A participant relays an opinion request to the room.
    OpinionRequest {
        #[serde(default)]
        agent_id: Option<String>,
        question: String,
        #[serde(default)]
        context: serde_json::Value,
    },
    /// An agent answers the current opinion request.
    Opinion {
        #[serde(default)]
        agent_id: Option<String>,
        opinion: String,
        #[serde(default)]
        in_reply_to: Option<String>,
    },
    ConsensusRequest {
        proposal: String,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default)]
        deadline: Option<String>,
    },
    ConsensusVote {
        #[serde(default)]
        agent_id: Option<String>,
        vote: String,
        #[serde(default)]
        rationale: Option<String>,
    },
}

// ── Chat frames ──────────────────────────────────────────────────────────────

/// Client → server frames accepted on a chat socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChatClientFrame {
    #[serde(rename = "chat.message")]
    Message {
        content: String,
        #[serde(default = "default_message_type")]
        message_type: String,
        #[serde(default)]
        metadata: Option<serde_json::Value>,
    },
    #[serde(rename = "chat.typing")]
    Typing {
        #[serde(default)]
        is_typing: bool,
    },
}

fn default_message_type() -> String {
    "text".into()
}

// ── Status frames ────────────────────────────────────────────────────────────

/// Client → server frames accepted on the status socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusClientFrame {
    Ping,
    Subscribe {
        #[serde(default)]
        topics: Vec<String>,
    },
}

/// Serialize an error frame for unknown or malformed client input.
#[must_use]
pub fn error_frame(message: impl AsRef<str>) -> String {
    serde_json::json!({ "type": "error", "message": message.as_ref() }).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn meeting_opinion_round_trip() {
        let raw = r#"{"type":"opinion","agent_id":"astra","opinion":"ship it"}"#;
        let frame: MeetingClientFrame = serde_json::from_str(raw).unwrap();
        match frame {
            MeetingClientFrame::Opinion {
                agent_id, opinion, ..
            } => {
                assert_eq!(agent_id.as_deref(), Some("astra"));
                assert_eq!(opinion, "ship it");
            },
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn chat_typing_frame() {
        let raw = r#"{"event":"chat.typing","data":{"is_typing":true}}"#;
        let frame: ChatClientFrame = serde_json::from_str(raw).unwrap();
        assert!(matches!(frame, ChatClientFrame::Typing { is_typing: true }));
    }

    #[test]
    fn chat_message_defaults_to_text() {
        let raw = r#"{"event":"chat.message","data":{"content":"hello"}}"#;
        let frame: ChatClientFrame = serde_json::from_str(raw).unwrap();
        match frame {
            ChatClientFrame::Message { message_type, .. } => assert_eq!(message_type, "text"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"dance","moves":3}"#;
        assert!(serde_json::from_str::<MeetingClientFrame>(raw).is_err());
        assert!(serde_json::from_str::<StatusClientFrame>(raw).is_err());
    }

    #[test]
    fn error_frame_shape() {
        let frame: serde_json::Value = serde_json::from_str(&error_frame("bad")).unwrap();
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], "bad");
    }
}
