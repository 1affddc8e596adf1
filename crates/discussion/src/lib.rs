//! Sequential discussion coordination for agent meetings.
//!
//! One coordinator drives one meeting: round-robin opinion collection,
//! consensus voting with a time budget, and decision recording. State lives
//! in memory on the coordinator; external actors interact only through
//! meeting-hub events and the `submit_*` correlators.

pub mod coordinator;
pub mod error;
pub mod state;

pub use {
    coordinator::{CoordinatorConfig, Decision, DiscussionCoordinator},
    error::{DiscussionError, Result},
    state::{ABSTAIN, DiscussionPhase, DiscussionState, MeetingStatus, NO_RESPONSE, NO_VOTE},
};
