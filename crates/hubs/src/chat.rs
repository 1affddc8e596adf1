//! Chat hub: room fan-out plus typing indicators.

use std::collections::HashMap;

use {serde_json::json, tokio::sync::Mutex, uuid::Uuid};

use conclave_protocol::events::chat;

use crate::{
    principal::Principal,
    rooms::{RoomRegistry, Subscriber},
};

/// WebSocket connection registry per chat room.
#[derive(Default)]
pub struct ChatHub {
    rooms: RoomRegistry,
    /// room → sender id → currently typing.
    typing: Mutex<HashMap<Uuid, HashMap<String, bool>>>,
}

impl ChatHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, greet it, and announce the join to the room.
    pub async fn connect(&self, room_id: Uuid, subscriber: Subscriber) -> Uuid {
        let conn_id = subscriber.conn_id;
        let principal = subscriber.principal.clone();
        self.rooms.connect(room_id, subscriber).await;

        let greeting = json!({
            "event": chat::CONNECTED,
            "room_id": room_id.to_string(),
            "data": { "participant": principal.display_name() },
        });
        self.rooms.send_personal(conn_id, &greeting.to_string()).await;

        if let Some(id) = principal.id() {
            self.broadcast_participant_event(room_id, chat::PARTICIPANT_JOINED, id, &principal)
                .await;
        }
        conn_id
    }

    /// Remove a connection; announce the leave and purge typing state when
    /// the room empties.
    pub async fn disconnect(&self, conn_id: Uuid) {
        if let Some((room_id, subscriber, empty)) = self.rooms.disconnect(conn_id).await {
            if empty {
                self.typing.lock().await.remove(&room_id);
            } else if let Some(id) = subscriber.principal.id() {
                self.broadcast_participant_event(
                    room_id,
                    chat::PARTICIPANT_LEFT,
                    id,
                    &subscriber.principal,
                )
                .await;
            }
        }
    }

    async fn broadcast_participant_event(
        &self,
        room_id: Uuid,
        event: &str,
        participant_id: &str,
        principal: &Principal,
    ) {
        let kind = match principal {
            Principal::User { .. } => "user",
            Principal::Agent { .. } => "agent",
            Principal::Guest => "guest",
        };
        let frame = json!({
            "event": event,
            "room_id": room_id.to_string(),
            "data": { "id": participant_id, "type": kind },
        });
        self.rooms.broadcast(room_id, &frame.to_string()).await;
    }

    /// Fan a chat message out to the room. The shared `message_id` lets
    /// receivers thread edits and receipts.
    #[allow(clippy::too_many_arguments)]
    pub async fn broadcast_message(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        sender_type: &str,
        sender_id: &str,
        content: &str,
        message_type: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let frame = json!({
            "event": chat::MESSAGE,
            "room_id": room_id.to_string(),
            "data": {
                "id": message_id.to_string(),
                "sender_type": sender_type,
                "sender_id": sender_id,
                "content": content,
                "message_type": message_type,
                "metadata": metadata,
            },
        });
        self.rooms.broadcast(room_id, &frame.to_string()).await;
    }

    /// Record and fan out a typing indicator.
    pub async fn broadcast_typing(
        &self,
        room_id: Uuid,
        sender_id: &str,
        sender_type: &str,
        is_typing: bool,
    ) {
        self.typing
            .lock()
            .await
            .entry(room_id)
            .or_default()
            .insert(sender_id.to_string(), is_typing);

        let frame = json!({
            "event": chat::TYPING,
            "room_id": room_id.to_string(),
            "data": {
                "sender_id": sender_id,
                "sender_type": sender_type,
                "is_typing": is_typing,
            },
        });
        self.rooms.broadcast(room_id, &frame.to_string()).await;
    }

    pub async fn typing_indicators(&self, room_id: Uuid) -> HashMap<String, bool> {
        self.typing.lock().await.get(&room_id).cloned().unwrap_or_default()
    }

    pub async fn send_personal(&self, conn_id: Uuid, event: &serde_json::Value) -> bool {
        self.rooms.send_personal(conn_id, &event.to_string()).await
    }

    pub async fn send_error(&self, conn_id: Uuid, message: &str) {
        let frame = json!({ "event": chat::ERROR, "data": { "message": message } });
        self.rooms.send_personal(conn_id, &frame.to_string()).await;
    }

    pub async fn participants(&self, room_id: Uuid) -> Vec<Principal> {
        self.rooms.participants(room_id).await
    }

    pub async fn connection_count(&self, room_id: Uuid) -> usize {
        self.rooms.connection_count(room_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, tokio::sync::mpsc};

    fn user(name: &str) -> (Subscriber, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Subscriber::new(
                Principal::User {
                    id: format!("{name}-id"),
                    username: name.into(),
                },
                tx,
            ),
            rx,
        )
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn join_emits_participant_event() {
        let hub = ChatHub::new();
        let room = Uuid::new_v4();
        let (a, mut rx_a) = user("ada");
        hub.connect(room, a).await;

        assert_eq!(next(&mut rx_a).await["event"], "chat.connected");
        assert_eq!(next(&mut rx_a).await["event"], "chat.participant_joined");

        let (b, mut rx_b) = user("brin");
        hub.connect(room, b).await;
        next(&mut rx_b).await; // greeting
        // Existing member sees the join.
        let joined = next(&mut rx_a).await;
        assert_eq!(joined["event"], "chat.participant_joined");
        assert_eq!(joined["data"]["id"], "brin-id");
    }

    #[tokio::test]
    async fn typing_state_tracked_and_purged() {
        let hub = ChatHub::new();
        let room = Uuid::new_v4();
        let (a, mut rx_a) = user("ada");
        let conn = hub.connect(room, a).await;
        next(&mut rx_a).await;
        next(&mut rx_a).await;

        hub.broadcast_typing(room, "ada-id", "user", true).await;
        let indicators = hub.typing_indicators(room).await;
        assert_eq!(indicators.get("ada-id"), Some(&true));
        let frame = next(&mut rx_a).await;
        assert_eq!(frame["event"], "chat.typing");
        assert_eq!(frame["data"]["is_typing"], true);

        // Last participant leaving purges the room's typing state.
        hub.disconnect(conn).await;
        assert!(hub.typing_indicators(room).await.is_empty());
    }

    #[tokio::test]
    async fn message_fanout_carries_metadata() {
        let hub = ChatHub::new();
        let room = Uuid::new_v4();
        let (a, mut rx_a) = user("ada");
        hub.connect(room, a).await;
        next(&mut rx_a).await;
        next(&mut rx_a).await;

        let message_id = Uuid::new_v4();
        hub.broadcast_message(
            room,
            message_id,
            "agent",
            "astra",
            "hello room",
            "text",
            Some(serde_json::json!({"lang": "en"})),
        )
        .await;

        let frame = next(&mut rx_a).await;
        assert_eq!(frame["event"], "chat.message");
        assert_eq!(frame["data"]["id"], message_id.to_string());
        assert_eq!(frame["data"]["content"], "hello room");
        assert_eq!(frame["data"]["metadata"]["lang"], "en");
    }

    #[tokio::test]
    async fn leave_notifies_remaining_members() {
        let hub = ChatHub::new();
        let room = Uuid::new_v4();
        let (a, mut rx_a) = user("ada");
        let (b, mut rx_b) = user("brin");
        let a_conn = hub.connect(room, a).await;
        hub.connect(room, b).await;
        // Drain setup frames.
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        hub.disconnect(a_conn).await;
        let frame = next(&mut rx_b).await;
        assert_eq!(frame["event"], "chat.participant_left");
        assert_eq!(frame["data"]["id"], "ada-id");
    }
}
