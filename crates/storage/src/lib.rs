//! Project-namespaced storage: domain models, the [`StorageBackend`]
//! contract, and the in-memory reference implementation.
//!
//! Logical keys follow `{project_id}:{resource_type}:{resource_id}`; a read
//! under one project can never observe keys written under another.

pub mod backend;
pub mod error;
pub mod memory;
pub mod message;
pub mod protocol_def;
pub mod session;

pub use {
    backend::StorageBackend,
    error::{Result, StorageError},
    memory::InMemoryStorage,
    message::{
        BroadcastRecipients, BroadcastResult, DeliveryResult, Message, MessageHeaders, Priority,
    },
    protocol_def::{Capability, ProtocolDefinition, ProtocolMetadata},
    session::{Session, SessionCapabilities, SessionStatus},
};

/// The implicit project used when a caller supplies no identification.
pub const DEFAULT_PROJECT: &str = "default";

/// Per-session queue capacity used when a project does not configure one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
