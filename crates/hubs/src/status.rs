//! Status hub: one global room for the server-wide event stream.

use {conclave_common::time, serde_json::json, uuid::Uuid};

use conclave_protocol::events::status;

use crate::rooms::{RoomRegistry, Subscriber};

/// The single room every status subscriber joins.
const GLOBAL_ROOM: Uuid = Uuid::nil();

/// WebSocket broadcast bus for the global status/event stream.
///
/// Unlike the meeting and chat hubs, unauthenticated subscribers are
/// accepted and labeled `Guest`.
#[derive(Default)]
pub struct StatusHub {
    rooms: RoomRegistry,
}

impl StatusHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and send the `connected` greeting.
    pub async fn connect(&self, subscriber: Subscriber) -> Uuid {
        let conn_id = subscriber.conn_id;
        let name = subscriber.principal.display_name();
        self.rooms.connect(GLOBAL_ROOM, subscriber).await;
        let greeting = json!({
            "type": status::CONNECTED,
            "message": format!("Status board WebSocket connected as {name}"),
            "participant": name,
            "timestamp": time::now().to_rfc3339(),
        });
        self.rooms.send_personal(conn_id, &greeting.to_string()).await;
        conn_id
    }

    pub async fn disconnect(&self, conn_id: Uuid) {
        self.rooms.disconnect(conn_id).await;
    }

    /// Push an event to every status subscriber.
    pub async fn broadcast(&self, event_type: &str, data: serde_json::Value) {
        let frame = json!({
            "type": event_type,
            "data": data,
            "timestamp": time::now().to_rfc3339(),
        });
        self.rooms.broadcast(GLOBAL_ROOM, &frame.to_string()).await;
    }

    pub async fn agent_status_change(&self, agent_id: &str, new_status: &str) {
        self.broadcast(
            status::AGENT_STATUS_CHANGE,
            json!({ "agent_id": agent_id, "status": new_status }),
        )
        .await;
    }

    pub async fn new_communication(&self, summary: serde_json::Value) {
        self.broadcast(status::NEW_COMMUNICATION, summary).await;
    }

    pub async fn meeting_event(&self, meeting_id: Uuid, event: &str) {
        self.broadcast(
            status::MEETING_EVENT,
            json!({ "meeting_id": meeting_id.to_string(), "event": event }),
        )
        .await;
    }

    pub async fn agent_registered(&self, agent_id: &str) {
        self.broadcast(status::AGENT_REGISTERED, json!({ "agent_id": agent_id })).await;
    }

    pub async fn agent_unregistered(&self, agent_id: &str) {
        self.broadcast(status::AGENT_UNREGISTERED, json!({ "agent_id": agent_id })).await;
    }

    /// Answer a client `ping`.
    pub async fn pong(&self, conn_id: Uuid) {
        let frame = json!({ "type": status::PONG, "timestamp": time::now().to_rfc3339() });
        self.rooms.send_personal(conn_id, &frame.to_string()).await;
    }

    /// Acknowledge a client `subscribe`.
    pub async fn subscribed(&self, conn_id: Uuid, topics: &[String]) {
        let frame = json!({ "type": status::SUBSCRIBED, "topics": topics });
        self.rooms.send_personal(conn_id, &frame.to_string()).await;
    }

    pub async fn subscriber_count(&self) -> usize {
        self.rooms.connection_count(GLOBAL_ROOM).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::principal::Principal,
        tokio::sync::mpsc,
    };

    fn guest() -> (Subscriber, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Subscriber::new(Principal::Guest, tx), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn guests_are_greeted() {
        let hub = StatusHub::new();
        let (sub, mut rx) = guest();
        hub.connect(sub).await;

        let frame = next(&mut rx).await;
        assert_eq!(frame["type"], "connected");
        assert_eq!(frame["participant"], "Guest");
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let hub = StatusHub::new();
        let (a, mut rx_a) = guest();
        let (b, mut rx_b) = guest();
        hub.connect(a).await;
        hub.connect(b).await;
        next(&mut rx_a).await;
        next(&mut rx_b).await;

        hub.agent_status_change("astra", "busy").await;
        for rx in [&mut rx_a, &mut rx_b] {
            let frame = next(rx).await;
            assert_eq!(frame["type"], "agent_status_change");
            assert_eq!(frame["data"]["agent_id"], "astra");
        }
    }

    #[tokio::test]
    async fn ping_pong_and_subscribe() {
        let hub = StatusHub::new();
        let (sub, mut rx) = guest();
        let conn = hub.connect(sub).await;
        next(&mut rx).await;

        hub.pong(conn).await;
        assert_eq!(next(&mut rx).await["type"], "pong");

        hub.subscribed(conn, &["meetings".to_string()]).await;
        let frame = next(&mut rx).await;
        assert_eq!(frame["type"], "subscribed");
        assert_eq!(frame["topics"][0], "meetings");
    }
}
