//! Project registry and cross-project relationships.
//!
//! Projects are the isolation namespaces of the server: every session,
//! protocol, and queue belongs to exactly one. The registry owns project
//! metadata, quota configuration, API keys, and rolling statistics; the
//! relationship manager tracks mutual-consent links that authorize
//! cross-project message flow.

pub mod error;
pub mod model;
pub mod registry;
pub mod relationship;

pub use {
    error::{ProjectError, Result},
    model::{
        ApiKey, CreatedKey, CreatedProject, ProjectConfig, ProjectDefinition, ProjectInfo,
        ProjectMetadata, ProjectStatistics, ProjectStatus,
    },
    registry::ProjectRegistry,
    relationship::{
        CrossProjectConfig, CrossProjectPermission, RelationshipManager, RelationshipStatus,
    },
};
