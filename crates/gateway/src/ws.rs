//! WebSocket endpoints: `/ws/meetings/{id}`, `/ws/chat/{id}`, `/ws/status`.
//!
//! Each connection runs a write loop fed by an unbounded channel (the hub
//! holds the sending half) and a read loop that dispatches client frames.
//! Authentication failures and malformed room ids close with policy
//! violation (1008).

use std::sync::Arc;

use {
    axum::{
        extract::{
            Path, Query, State, WebSocketUpgrade,
            ws::{CloseFrame, Message, WebSocket},
        },
        response::Response,
    },
    futures::{SinkExt, stream::StreamExt},
    serde::Deserialize,
    serde_json::json,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {
    conclave_hubs::{Principal, Subscriber},
    conclave_protocol::{
        CLOSE_POLICY_VIOLATION, ChatClientFrame, MAX_PAYLOAD_BYTES, MeetingClientFrame,
        StatusClientFrame, error_frame,
        events::meeting,
    },
};

use crate::{auth, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// ── Endpoints ────────────────────────────────────────────────────────────────

pub async fn meeting_ws(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_meeting(socket, state, meeting_id, query.token))
}

pub async fn chat_ws(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_chat(socket, state, room_id, query.token))
}

pub async fn status_ws(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_status(socket, state, query.token))
}

// ── Connection setup ─────────────────────────────────────────────────────────

async fn close_policy_violation(mut socket: WebSocket, reason: &'static str) {
    warn!(reason, "ws: closing with policy violation");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.into(),
        })))
        .await;
}

/// Authenticate a hub connection. `required` distinguishes meeting/chat
/// (must authenticate) from status (guests welcome).
async fn principal_for(
    state: &AppState,
    token: Option<&str>,
    required: bool,
) -> Option<Principal> {
    match token {
        Some(token) => match auth::authenticate_token(state, token).await {
            Some(principal) => Some(principal),
            None if required => None,
            None => Some(Principal::Guest),
        },
        None if required => None,
        None => Some(Principal::Guest),
    }
}

struct Connection {
    write_handle: tokio::task::JoinHandle<()>,
    tx: mpsc::UnboundedSender<String>,
    rx_socket: futures::stream::SplitStream<WebSocket>,
}

/// Split the socket and start the write loop.
fn start_write_loop(socket: WebSocket) -> Connection {
    let (mut ws_tx, rx_socket) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!("ws: write loop closed");
                break;
            }
        }
    });
    Connection {
        write_handle,
        tx,
        rx_socket,
    }
}

/// Pull the next text frame, enforcing the payload cap. `None` ends the
/// connection.
async fn next_text(
    rx: &mut futures::stream::SplitStream<WebSocket>,
    tx: &mpsc::UnboundedSender<String>,
) -> Option<String> {
    loop {
        let message = rx.next().await?;
        match message {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_PAYLOAD_BYTES {
                    warn!(size = text.len(), "ws: payload too large");
                    let _ = tx.send(error_frame("payload too large"));
                    continue;
                }
                return Some(text.to_string());
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "ws: read error");
                return None;
            },
        }
    }
}

// ── Meeting ──────────────────────────────────────────────────────────────────

async fn handle_meeting(
    socket: WebSocket,
    state: Arc<AppState>,
    meeting_id: String,
    token: Option<String>,
) {
    let Ok(meeting_id) = meeting_id.parse::<Uuid>() else {
        return close_policy_violation(socket, "invalid meeting id").await;
    };
    let Some(principal) = principal_for(&state, token.as_deref(), true).await else {
        return close_policy_violation(socket, "authentication required").await;
    };

    let mut conn = start_write_loop(socket);
    let subscriber = Subscriber::new(principal.clone(), conn.tx.clone());
    let conn_id = state.meeting_hub.connect(meeting_id, subscriber).await;
    info!(%meeting_id, %conn_id, participant = %principal.display_name(), "ws: meeting connection open");

    while let Some(text) = next_text(&mut conn.rx_socket, &conn.tx).await {
        let frame: MeetingClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "ws: unknown meeting frame");
                let _ = conn.tx.send(error_frame(format!("unknown event: {e}")));
                continue;
            },
        };
        dispatch_meeting_frame(&state, meeting_id, &principal, frame).await;
    }

    state.meeting_hub.disconnect(conn_id).await;
    conn.write_handle.abort();
    info!(%meeting_id, %conn_id, "ws: meeting connection closed");
}

async fn dispatch_meeting_frame(
    state: &Arc<AppState>,
    meeting_id: Uuid,
    principal: &Principal,
    frame: MeetingClientFrame,
) {
    let fallback_id = principal
        .id()
        .map_or_else(|| principal.display_name(), str::to_string);

    match frame {
        MeetingClientFrame::Opinion {
            agent_id,
            opinion,
            in_reply_to,
        } => {
            let agent_id = agent_id.unwrap_or(fallback_id);
            let coordinator = state.coordinator(meeting_id).await;
            coordinator.submit_opinion(&agent_id, &opinion).await;
            state
                .meeting_hub
                .broadcast(
                    meeting_id,
                    &json!({
                        "type": meeting::OPINION,
                        "agent_id": agent_id,
                        "opinion": opinion,
                        "in_reply_to": in_reply_to,
                    }),
                )
                .await;
        },
        MeetingClientFrame::ConsensusVote {
            agent_id,
            vote,
            rationale,
        } => {
            let agent_id = agent_id.unwrap_or(fallback_id);
            let coordinator = state.coordinator(meeting_id).await;
            coordinator.submit_vote(&agent_id, &vote).await;
            state
                .meeting_hub
                .broadcast(
                    meeting_id,
                    &json!({
                        "type": meeting::CONSENSUS_VOTE,
                        "agent_id": agent_id,
                        "vote": vote,
                        "rationale": rationale.unwrap_or_default(),
                    }),
                )
                .await;
        },
        MeetingClientFrame::OpinionRequest {
            agent_id,
            question,
            context,
        } => {
            state
                .meeting_hub
                .broadcast(
                    meeting_id,
                    &json!({
                        "type": meeting::OPINION_REQUEST,
                        "agent_id": agent_id.unwrap_or(fallback_id),
                        "question": question,
                        "context": context,
                    }),
                )
                .await;
        },
        MeetingClientFrame::ConsensusRequest {
            proposal,
            options,
            deadline,
        } => {
            state
                .meeting_hub
                .broadcast(
                    meeting_id,
                    &json!({
                        "type": meeting::CONSENSUS_REQUEST,
                        "proposal": proposal,
                        "options": options,
                        "deadline": deadline,
                        "requested_by": principal.display_name(),
                    }),
                )
                .await;
        },
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────────

async fn handle_chat(
    socket: WebSocket,
    state: Arc<AppState>,
    room_id: String,
    token: Option<String>,
) {
    let Ok(room_id) = room_id.parse::<Uuid>() else {
        return close_policy_violation(socket, "invalid room id").await;
    };
    let Some(principal) = principal_for(&state, token.as_deref(), true).await else {
        return close_policy_violation(socket, "authentication required").await;
    };

    let mut conn = start_write_loop(socket);
    let subscriber = Subscriber::new(principal.clone(), conn.tx.clone());
    let conn_id = state.chat_hub.connect(room_id, subscriber).await;
    info!(%room_id, %conn_id, participant = %principal.display_name(), "ws: chat connection open");

    let sender_type = match &principal {
        Principal::User { .. } => "user",
        Principal::Agent { .. } => "agent",
        Principal::Guest => "guest",
    };
    let sender_id = principal
        .id()
        .map_or_else(|| principal.display_name(), str::to_string);

    while let Some(text) = next_text(&mut conn.rx_socket, &conn.tx).await {
        let frame: ChatClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "ws: unknown chat frame");
                let _ = conn.tx.send(
                    json!({ "event": "error", "data": { "message": format!("Unknown event: {e}") } })
                        .to_string(),
                );
                continue;
            },
        };
        match frame {
            ChatClientFrame::Message {
                content,
                message_type,
                metadata,
            } => {
                if content.is_empty() {
                    let _ = conn.tx.send(
                        json!({ "event": "error", "data": { "message": "message content required" } })
                            .to_string(),
                    );
                    continue;
                }
                state
                    .chat_hub
                    .broadcast_message(
                        room_id,
                        Uuid::new_v4(),
                        sender_type,
                        &sender_id,
                        &content,
                        &message_type,
                        metadata,
                    )
                    .await;
            },
            ChatClientFrame::Typing { is_typing } => {
                state
                    .chat_hub
                    .broadcast_typing(room_id, &sender_id, sender_type, is_typing)
                    .await;
            },
        }
    }

    state.chat_hub.disconnect(conn_id).await;
    conn.write_handle.abort();
    info!(%room_id, %conn_id, "ws: chat connection closed");
}

// ── Status ───────────────────────────────────────────────────────────────────

async fn handle_status(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    // Unauthenticated connections are accepted and labeled Guest.
    let Some(principal) = principal_for(&state, token.as_deref(), false).await else {
        return close_policy_violation(socket, "authentication required").await;
    };

    let mut conn = start_write_loop(socket);
    let subscriber = Subscriber::new(principal.clone(), conn.tx.clone());
    let conn_id = state.status_hub.connect(subscriber).await;
    info!(%conn_id, participant = %principal.display_name(), "ws: status connection open");

    while let Some(text) = next_text(&mut conn.rx_socket, &conn.tx).await {
        let frame: StatusClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "ws: unknown status frame");
                let _ = conn.tx.send(error_frame(format!("unknown event: {e}")));
                continue;
            },
        };
        match frame {
            StatusClientFrame::Ping => state.status_hub.pong(conn_id).await,
            StatusClientFrame::Subscribe { topics } => {
                state.status_hub.subscribed(conn_id, &topics).await;
            },
        }
    }

    state.status_hub.disconnect(conn_id).await;
    conn.write_handle.abort();
    info!(%conn_id, "ws: status connection closed");
}
