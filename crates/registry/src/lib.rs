//! Protocol registry: schema-validated message types per project.
//!
//! Registration runs a fixed pipeline (meta-schema validation, naming
//! rules, duplicate check) and payload validation compiles the stored
//! Draft-07 schema on demand. A protocol can only be deleted once no
//! session declares it in its capabilities.

pub mod error;
pub mod validation;

pub use {
    error::{RegistryError, Result},
    validation::{ProtocolValidationError, ValidationResult},
};

use std::sync::Arc;

use {tracing::info, uuid::Uuid};

use conclave_storage::{ProtocolDefinition, StorageBackend};

pub struct ProtocolRegistry {
    storage: Arc<dyn StorageBackend>,
}

impl ProtocolRegistry {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Register a protocol for a project.
    ///
    /// Name, version, and capability validation already happened in
    /// [`ProtocolDefinition::new`]; this adds Draft-07 meta-schema validation
    /// and the project-scoped duplicate check.
    pub async fn register(&self, protocol: &ProtocolDefinition, project_id: &str) -> Result<()> {
        if let Err(e) = jsonschema::meta::validate(&protocol.message_schema) {
            return Err(RegistryError::InvalidSchema(e.to_string()));
        }
        self.storage.save_protocol(protocol, project_id).await?;
        info!(
            project_id,
            protocol = %protocol.identity(),
            "protocol registered"
        );
        Ok(())
    }

    pub async fn get(
        &self,
        name: &str,
        version: &str,
        project_id: &str,
    ) -> Result<Option<ProtocolDefinition>> {
        Ok(self.storage.get_protocol(name, version, project_id).await?)
    }

    /// Discover protocols, filtered by name, version, and/or tags.
    ///
    /// Tag filtering requires every requested tag to be present in the
    /// protocol's metadata.
    pub async fn discover(
        &self,
        name: Option<&str>,
        version: Option<&str>,
        tags: Option<&[String]>,
        project_id: &str,
    ) -> Result<Vec<ProtocolDefinition>> {
        let mut found = self.storage.list_protocols(name, version, project_id).await?;
        if let Some(wanted) = tags.filter(|t| !t.is_empty()) {
            found.retain(|protocol| {
                protocol.metadata.as_ref().is_some_and(|meta| {
                    wanted.iter().all(|tag| meta.tags.iter().any(|t| t == tag))
                })
            });
        }
        Ok(found)
    }

    /// Validate a payload against a registered protocol's schema.
    pub async fn validate(
        &self,
        payload: &serde_json::Value,
        protocol_name: &str,
        version: &str,
        project_id: &str,
    ) -> Result<ValidationResult> {
        let protocol = self
            .storage
            .get_protocol(protocol_name, version, project_id)
            .await?
            .ok_or_else(|| {
                RegistryError::NotFound(format!("protocol {protocol_name}@{version}"))
            })?;
        validation::validate_payload(&protocol.message_schema, payload)
    }

    /// Session ids that declare `name@version` in their capabilities.
    pub async fn check_active_references(
        &self,
        name: &str,
        version: &str,
        project_id: &str,
    ) -> Result<Vec<Uuid>> {
        let sessions = self.storage.list_sessions(None, project_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.supports_protocol(name, version))
            .map(|s| s.session_id)
            .collect())
    }

    /// Delete a protocol. Refused while any session references it.
    pub async fn delete(&self, name: &str, version: &str, project_id: &str) -> Result<()> {
        let references = self.check_active_references(name, version, project_id).await?;
        if !references.is_empty() {
            return Err(RegistryError::ActiveReferences {
                protocol: format!("{name}@{version}"),
                count: references.len(),
            });
        }
        if !self.storage.delete_protocol(name, version, project_id).await? {
            return Err(RegistryError::NotFound(format!("protocol {name}@{version}")));
        }
        info!(project_id, protocol = %format!("{name}@{version}"), "protocol deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        conclave_storage::{
            Capability, InMemoryStorage, ProtocolMetadata, Session, SessionCapabilities,
        },
        serde_json::json,
    };

    fn registry() -> ProtocolRegistry {
        ProtocolRegistry::new(Arc::new(InMemoryStorage::new()))
    }

    fn chat_protocol() -> ProtocolDefinition {
        ProtocolDefinition::new(
            "chat_message",
            "1.0.0",
            json!({
                "type": "object",
                "required": ["text"],
                "properties": {"text": {"type": "string"}}
            }),
            vec![Capability::PointToPoint],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn register_and_duplicate() {
        let registry = registry();
        registry.register(&chat_protocol(), "p1").await.unwrap();
        let err = registry.register(&chat_protocol(), "p1").await;
        assert!(matches!(err, Err(RegistryError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn register_rejects_invalid_meta_schema() {
        let registry = registry();
        let bad = ProtocolDefinition::new(
            "chat_message",
            "1.0.0",
            json!({"type": 12, "properties": "nope"}),
            vec![],
        )
        .unwrap();
        let err = registry.register(&bad, "p1").await;
        assert!(matches!(err, Err(RegistryError::InvalidSchema(_))));
    }

    #[tokio::test]
    async fn validate_payload_reports_structured_errors() {
        let registry = registry();
        registry.register(&chat_protocol(), "p1").await.unwrap();

        let ok = registry
            .validate(&json!({"text": "hi"}), "chat_message", "1.0.0", "p1")
            .await
            .unwrap();
        assert!(ok.valid);
        assert!(ok.errors.is_empty());

        let bad = registry
            .validate(&json!({"text": 42}), "chat_message", "1.0.0", "p1")
            .await
            .unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.errors.len(), 1);
        assert_eq!(bad.errors[0].path, "/text");
        assert_eq!(bad.errors[0].constraint, "type");
    }

    #[tokio::test]
    async fn validate_unknown_protocol_is_not_found() {
        let registry = registry();
        let err = registry
            .validate(&json!({"x": 1}), "ghost", "1.0.0", "p1")
            .await;
        assert!(matches!(err, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn discover_by_tags() {
        let registry = registry();
        let tagged = chat_protocol().with_metadata(ProtocolMetadata {
            author: None,
            description: None,
            tags: vec!["chat".into(), "v1".into()],
        });
        registry.register(&tagged, "p1").await.unwrap();
        let plain = ProtocolDefinition::new("telemetry", "1.0.0", json!({"type": "object"}), vec![
            Capability::Broadcast,
        ])
        .unwrap();
        registry.register(&plain, "p1").await.unwrap();

        let hits = registry
            .discover(None, None, Some(&["chat".to_string()]), "p1")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "chat_message");

        let misses = registry
            .discover(None, None, Some(&["chat".to_string(), "v2".to_string()]), "p1")
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn delete_gated_on_references() {
        let storage = Arc::new(InMemoryStorage::new());
        let registry = ProtocolRegistry::new(Arc::clone(&storage) as Arc<dyn StorageBackend>);
        registry.register(&chat_protocol(), "p1").await.unwrap();

        let session = Session::new(
            SessionCapabilities::new(
                [("chat_message".to_string(), vec!["1.0.0".to_string()])],
                [],
            ),
            "p1",
        );
        storage.save_session(&session, "p1").await.unwrap();

        let err = registry.delete("chat_message", "1.0.0", "p1").await;
        assert!(matches!(err, Err(RegistryError::ActiveReferences { count: 1, .. })));

        storage.delete_session(session.session_id, "p1").await.unwrap();
        registry.delete("chat_message", "1.0.0", "p1").await.unwrap();
        assert!(
            registry
                .get("chat_message", "1.0.0", "p1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_missing_protocol_is_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.delete("ghost", "1.0.0", "p1").await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
