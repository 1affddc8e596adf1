//! The server assembly: wires storage, registries, router, hubs, and the
//! discussion coordinators behind an axum application, and exposes the
//! WebSocket endpoints plus the project identification middleware that an
//! external HTTP adapter mounts in front of the REST surface.

pub mod auth;
pub mod error;
pub mod events;
pub mod identify;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod throttle;
pub mod ws;

pub use {
    error::GatewayError,
    identify::ProjectContext,
    server::{build_router, serve},
    state::AppState,
};
