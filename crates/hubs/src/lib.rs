//! Real-time fan-out hubs.
//!
//! Each hub is an in-process registry mapping rooms to current subscribers.
//! A subscriber is the sending half of a connection's write loop; a failed
//! send means the peer is gone and evicts the subscriber synchronously.
//! Nothing here persists beyond connection lifetime.

pub mod chat;
pub mod meeting;
pub mod principal;
pub mod rooms;
pub mod status;

pub use {
    chat::ChatHub,
    meeting::MeetingHub,
    principal::Principal,
    rooms::{RoomRegistry, Subscriber},
    status::StatusHub,
};
