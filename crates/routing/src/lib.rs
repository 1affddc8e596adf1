//! Message routing between sessions: point-to-point, broadcast, dead-letter
//! handling, and the cross-project gate.

pub mod cross_project;
pub mod error;
pub mod router;

pub use {
    cross_project::CrossProjectRouter,
    error::{Result, RoutingError},
    router::{DeadLetter, MessageRouter},
};
