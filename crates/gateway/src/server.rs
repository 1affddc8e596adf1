//! Router assembly and the serve loop.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router, middleware,
        routing::get,
    },
    http::{HeaderValue, Method},
    serde_json::json,
    tower_http::{
        cors::{AllowOrigin, Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{identify, state::AppState, throttle, ws};

/// Build the axum application over the shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws/meetings/{meeting_id}", get(ws::meeting_ws))
        .route("/ws/chat/{room_id}", get(ws::chat_ws))
        .route("/ws/status", get(ws::status_ws))
        // Innermost first: the throttle keys off the project context the
        // identification layer inserts.
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            throttle::throttle_gate,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            identify::identify_project,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.config.cors.allowed_origins;
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "conclave",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind and serve until the state's shutdown token fires.
///
/// With `ssl.enabled`, certificates load from the configured PEM paths.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()?;
    let router = build_router(Arc::clone(&state));
    let shutdown = state.shutdown_token();

    state.spawn_background_tasks();

    let handle = axum_server::Handle::new();
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
        });
    }

    if state.config.ssl.enabled {
        let (cert, key) = match (&state.config.ssl.cert_path, &state.config.ssl.key_path) {
            (Some(cert), Some(key)) => (cert.clone(), key.clone()),
            _ => anyhow::bail!("ssl.enabled requires cert_path and key_path"),
        };
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
        info!(%addr, "serving with TLS");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
    } else {
        info!(%addr, "serving");
        axum_server::bind(addr)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
    }
    Ok(())
}
