//! Per-project request throttling.
//!
//! A fixed window keyed by the identified project (or the client address
//! when no project context exists, as on WebSocket upgrades). The limit
//! comes from `rate_limit.requests_per_minute`; 0 disables throttling.

use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    axum::{
        Json,
        extract::{Request, State},
        http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    dashmap::{DashMap, mapref::entry::Entry},
    tracing::warn,
};

use crate::{identify::ProjectContext, state::AppState};

const WINDOW: Duration = Duration::from_secs(60);
const CLEANUP_EVERY_REQUESTS: u64 = 512;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: Instant,
    count: u32,
}

enum ThrottleDecision {
    Allowed,
    Denied { retry_after: Duration },
}

/// Fixed-window counters per throttle key.
pub struct RequestThrottle {
    requests_per_minute: u32,
    buckets: Arc<DashMap<String, WindowState>>,
    requests_seen: AtomicU64,
}

impl RequestThrottle {
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            buckets: Arc::new(DashMap::new()),
            requests_seen: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.requests_per_minute == 0
    }

    fn check(&self, key: &str) -> ThrottleDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> ThrottleDecision {
        let decision = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let elapsed = now.duration_since(state.started_at);
                if elapsed >= WINDOW {
                    state.started_at = now;
                    state.count = 1;
                    ThrottleDecision::Allowed
                } else if state.count < self.requests_per_minute {
                    state.count += 1;
                    ThrottleDecision::Allowed
                } else {
                    ThrottleDecision::Denied {
                        retry_after: WINDOW.saturating_sub(elapsed),
                    }
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(WindowState {
                    started_at: now,
                    count: 1,
                });
                ThrottleDecision::Allowed
            },
        };

        self.cleanup_if_needed(now);
        decision
    }

    fn cleanup_if_needed(&self, now: Instant) {
        let seen = self.requests_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % CLEANUP_EVERY_REQUESTS != 0 {
            return;
        }
        let stale_after = WINDOW.saturating_mul(3);
        self.buckets
            .retain(|_, state| now.duration_since(state.started_at) <= stale_after);
    }
}

pub async fn throttle_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.throttle.disabled() {
        return next.run(request).await;
    }
    let path = request.uri().path();
    if crate::identify::PUBLIC_PATHS.contains(&path) {
        return next.run(request).await;
    }

    let key = throttle_key(&request);
    match state.throttle.check(&key) {
        ThrottleDecision::Allowed => next.run(request).await,
        ThrottleDecision::Denied { retry_after } => {
            warn!(key, "request throttled");
            rate_limited_response(retry_after)
        },
    }
}

/// Identified project when the identification middleware ran, otherwise the
/// forwarded client address.
fn throttle_key(request: &Request) -> String {
    if let Some(ctx) = request.extensions().get::<ProjectContext>() {
        return format!("project:{}", ctx.project_id);
    }
    match forwarded_ip(request.headers()) {
        Some(ip) => format!("addr:{ip}"),
        None => "addr:direct".to_string(),
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    if let Some(xff) = xff
        && let Some(ip) = xff.split(',').find_map(|candidate| parse_ip(candidate.trim()))
    {
        return Some(ip);
    }

    let xri = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    if let Some(xri) = xri
        && let Some(ip) = parse_ip(xri.trim())
    {
        return Some(ip);
    }
    None
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    if value.is_empty() {
        return None;
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    None
}

fn rate_limited_response(retry_after: Duration) -> Response {
    let retry_after_secs = retry_after.as_secs().max(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "too many requests",
            "retry_after_seconds": retry_after_secs,
        })),
    )
        .into_response();
    if let Ok(value) = retry_after_secs.to_string().parse() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, value);
    }
    response
}
