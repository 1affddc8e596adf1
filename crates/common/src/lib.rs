//! Small shared utilities used across the conclave crates.
//!
//! Error types live with the crates that raise them; what belongs here is
//! only what several crates genuinely share.

pub mod time;
