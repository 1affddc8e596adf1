//! Meeting hub: fan-out for discussion rooms.

use {serde_json::json, uuid::Uuid};

use conclave_protocol::events::meeting;

use crate::{
    principal::Principal,
    rooms::{RoomRegistry, Subscriber},
};

/// WebSocket connection registry per meeting.
#[derive(Default)]
pub struct MeetingHub {
    rooms: RoomRegistry,
}

impl MeetingHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and greet it with a `join` frame.
    pub async fn connect(&self, meeting_id: Uuid, subscriber: Subscriber) -> Uuid {
        let conn_id = subscriber.conn_id;
        let name = subscriber.principal.display_name();
        self.rooms.connect(meeting_id, subscriber).await;
        let greeting = json!({
            "type": meeting::JOIN,
            "meeting_id": meeting_id.to_string(),
            "message": format!("Connected to meeting as {name}"),
            "participant": name,
        });
        self.rooms.send_personal(conn_id, &greeting.to_string()).await;
        conn_id
    }

    /// Remove a connection and tell the room it left.
    pub async fn disconnect(&self, conn_id: Uuid) {
        if let Some((meeting_id, subscriber, _)) = self.rooms.disconnect(conn_id).await {
            let name = subscriber.principal.display_name();
            let leave = json!({
                "type": meeting::LEAVE,
                "message": format!("{name} has left the meeting"),
                "participant": name,
            });
            self.rooms.broadcast(meeting_id, &leave.to_string()).await;
        }
    }

    /// Fan an event out to every subscriber in the meeting.
    pub async fn broadcast(&self, meeting_id: Uuid, event: &serde_json::Value) {
        self.rooms.broadcast(meeting_id, &event.to_string()).await;
    }

    pub async fn send_personal(&self, conn_id: Uuid, event: &serde_json::Value) -> bool {
        self.rooms.send_personal(conn_id, &event.to_string()).await
    }

    pub async fn send_error(&self, conn_id: Uuid, message: &str) {
        let frame = json!({ "type": meeting::ERROR, "message": message });
        self.rooms.send_personal(conn_id, &frame.to_string()).await;
    }

    pub async fn participants(&self, meeting_id: Uuid) -> Vec<Principal> {
        self.rooms.participants(meeting_id).await
    }

    pub async fn connection_count(&self, meeting_id: Uuid) -> usize {
        self.rooms.connection_count(meeting_id).await
    }
}
