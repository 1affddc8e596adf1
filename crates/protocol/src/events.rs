//! Server-push event kind names, grouped per hub.

/// Events emitted on meeting sockets.
pub mod meeting {
    pub const OPINION_REQUEST: &str = "opinion_request";
    pub const OPINION: &str = "opinion";
    pub const CONSENSUS_REQUEST: &str = "consensus_request";
    pub const CONSENSUS_VOTE: &str = "consensus_vote";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const ERROR: &str = "error";
    pub const DISCUSSION_COMPLETED: &str = "discussion_completed";
}

/// Events emitted on chat sockets.
pub mod chat {
    pub const CONNECTED: &str = "chat.connected";
    pub const MESSAGE: &str = "chat.message";
    pub const TYPING: &str = "chat.typing";
    pub const PARTICIPANT_JOINED: &str = "chat.participant_joined";
    pub const PARTICIPANT_LEFT: &str = "chat.participant_left";
    pub const ERROR: &str = "error";
}

/// Events emitted on the global status socket.
pub mod status {
    pub const CONNECTED: &str = "connected";
    pub const PONG: &str = "pong";
    pub const SUBSCRIBED: &str = "subscribed";
    pub const AGENT_STATUS_CHANGE: &str = "agent_status_change";
    pub const NEW_COMMUNICATION: &str = "new_communication";
    pub const MEETING_EVENT: &str = "meeting_event";
    pub const AGENT_REGISTERED: &str = "agent_registered";
    pub const AGENT_UNREGISTERED: &str = "agent_unregistered";
}
