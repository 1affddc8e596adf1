//! Session lifecycle: creation, heartbeats, liveness sweeps, per-session
//! queues, and capability negotiation between sessions.

pub mod error;
pub mod events;
pub mod manager;
pub mod negotiate;

pub use {
    error::{Result, SessionError},
    events::SessionEvent,
    manager::{SessionManager, SessionManagerConfig},
    negotiate::{
        CapabilityNegotiator, CompatibilityMatrix, NegotiationResult, PairCompatibility,
        ProtocolRequirement, UnsupportedFeatures,
    },
};
