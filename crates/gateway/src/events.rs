//! Bridges session-manager observations onto the status hub.

use std::sync::Arc;

use {
    serde_json::json,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use conclave_sessions::SessionEvent;

use crate::state::AppState;

/// Forward session events to status subscribers until shutdown.
///
/// A lagged receiver drops the oldest events and keeps going; the stream is
/// advisory, queue state remains authoritative in storage.
pub async fn run_event_bridge(state: Arc<AppState>, shutdown: CancellationToken) {
    let mut events = state.sessions.subscribe();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("event bridge stopped");
                return;
            },
            event = events.recv() => match event {
                Ok(event) => forward(&state, event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event bridge lagged");
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

async fn forward(state: &AppState, event: SessionEvent) {
    match event {
        SessionEvent::MessageQueued {
            session_id,
            project_id,
            queue_size,
        } => {
            state
                .status_hub
                .new_communication(json!({
                    "session_id": session_id.to_string(),
                    "project_id": project_id,
                    "queue_size": queue_size,
                }))
                .await;
        },
        SessionEvent::BecameStale { session_id, .. } => {
            state
                .status_hub
                .agent_status_change(&session_id.to_string(), "stale")
                .await;
        },
        SessionEvent::Disconnected { session_id, .. } => {
            state
                .status_hub
                .agent_status_change(&session_id.to_string(), "disconnected")
                .await;
        },
        SessionEvent::Superseded { session_id, .. } => {
            state
                .status_hub
                .agent_status_change(&session_id.to_string(), "superseded")
                .await;
        },
        SessionEvent::QueueWarning {
            session_id,
            queue_size,
            capacity,
            ..
        } => {
            // Already logged by the manager; surfaced here for dashboards.
            state
                .status_hub
                .new_communication(json!({
                    "session_id": session_id.to_string(),
                    "queue_size": queue_size,
                    "capacity": capacity,
                    "warning": "queue_high_water",
                }))
                .await;
        },
    }
}
