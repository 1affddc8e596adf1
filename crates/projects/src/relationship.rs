//! Cross-project relationships: mutual-consent links authorizing message
//! flow between two namespaces.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tokio::sync::RwLock,
    tracing::info,
};

use std::collections::HashMap;

use crate::error::{ProjectError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[default]
    Pending,
    Active,
    Suspended,
    Revoked,
}

/// Direction-specific permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossProjectPermission {
    /// Protocol whitelist; empty means any protocol.
    #[serde(default)]
    pub allowed_protocols: Vec<String>,
    /// Messages per minute; 0 means unlimited.
    #[serde(default)]
    pub messages_per_minute: u32,
}

/// One relationship between two distinct projects. A pair relates at most
/// one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossProjectConfig {
    pub project_a: String,
    pub project_b: String,
    pub status: RelationshipStatus,
    pub initiator: Option<String>,
    pub established_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub permissions_a_to_b: CrossProjectPermission,
    pub permissions_b_to_a: CrossProjectPermission,
}

impl CrossProjectConfig {
    fn new(project_a: &str, project_b: &str) -> Self {
        let now = Utc::now();
        Self {
            project_a: project_a.to_string(),
            project_b: project_b.to_string(),
            status: RelationshipStatus::Pending,
            initiator: None,
            established_at: now,
            last_modified: now,
            permissions_a_to_b: CrossProjectPermission::default(),
            permissions_b_to_a: CrossProjectPermission::default(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }

    fn permissions_from(&self, from_project: &str) -> Option<&CrossProjectPermission> {
        if from_project == self.project_a {
            Some(&self.permissions_a_to_b)
        } else if from_project == self.project_b {
            Some(&self.permissions_b_to_a)
        } else {
            None
        }
    }

    /// Whether `from_project` may send `protocol_name` across this
    /// relationship. Requires active status and a whitelist match.
    #[must_use]
    pub fn can_send(&self, from_project: &str, protocol_name: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(perms) = self.permissions_from(from_project) else {
            return false;
        };
        perms.allowed_protocols.is_empty()
            || perms.allowed_protocols.iter().any(|p| p == protocol_name)
    }

    /// Per-minute cap for `from_project`; 0 means unlimited.
    #[must_use]
    pub fn rate_limit_from(&self, from_project: &str) -> u32 {
        self.permissions_from(from_project)
            .map_or(0, |perms| perms.messages_per_minute)
    }
}

/// Table of relationships keyed by the sorted project pair.
pub struct RelationshipManager {
    relationships: RwLock<HashMap<(String, String), CrossProjectConfig>>,
}

impl Default for RelationshipManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationshipManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            relationships: RwLock::new(HashMap::new()),
        }
    }

    fn pair_key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub async fn create_relationship(
        &self,
        project_a: &str,
        project_b: &str,
        permissions_a_to_b: Option<CrossProjectPermission>,
        permissions_b_to_a: Option<CrossProjectPermission>,
    ) -> Result<CrossProjectConfig> {
        if project_a == project_b {
            return Err(ProjectError::InvalidInput(
                "cannot relate a project to itself".into(),
            ));
        }
        let key = Self::pair_key(project_a, project_b);
        let mut table = self.relationships.write().await;
        if table.contains_key(&key) {
            return Err(ProjectError::AlreadyExists(format!(
                "relationship {project_a} <-> {project_b}"
            )));
        }
        let mut config = CrossProjectConfig::new(project_a, project_b);
        if let Some(perms) = permissions_a_to_b {
            config.permissions_a_to_b = perms;
        }
        if let Some(perms) = permissions_b_to_a {
            config.permissions_b_to_a = perms;
        }
        table.insert(key, config.clone());
        info!(project_a, project_b, "cross-project relationship created");
        Ok(config)
    }

    pub async fn get_relationship(
        &self,
        project_a: &str,
        project_b: &str,
    ) -> Option<CrossProjectConfig> {
        let key = Self::pair_key(project_a, project_b);
        self.relationships.read().await.get(&key).cloned()
    }

    pub async fn activate(&self, project_a: &str, project_b: &str, initiator: &str) -> Result<()> {
        self.transition(project_a, project_b, RelationshipStatus::Active, Some(initiator))
            .await
    }

    pub async fn suspend(&self, project_a: &str, project_b: &str) -> Result<()> {
        self.transition(project_a, project_b, RelationshipStatus::Suspended, None)
            .await
    }

    pub async fn revoke(&self, project_a: &str, project_b: &str) -> Result<()> {
        self.transition(project_a, project_b, RelationshipStatus::Revoked, None)
            .await
    }

    async fn transition(
        &self,
        project_a: &str,
        project_b: &str,
        status: RelationshipStatus,
        initiator: Option<&str>,
    ) -> Result<()> {
        let key = Self::pair_key(project_a, project_b);
        let mut table = self.relationships.write().await;
        let config = table.get_mut(&key).ok_or_else(|| {
            ProjectError::NotFound(format!("relationship {project_a} <-> {project_b}"))
        })?;
        config.status = status;
        config.last_modified = Utc::now();
        if let Some(initiator) = initiator
            && config.initiator.is_none()
        {
            config.initiator = Some(initiator.to_string());
        }
        info!(project_a, project_b, ?status, "relationship transition");
        Ok(())
    }

    pub async fn list_relationships(&self, project_id: &str) -> Vec<CrossProjectConfig> {
        self.relationships
            .read()
            .await
            .values()
            .filter(|c| c.project_a == project_id || c.project_b == project_id)
            .cloned()
            .collect()
    }

    pub async fn delete_relationship(&self, project_a: &str, project_b: &str) -> bool {
        let key = Self::pair_key(project_a, project_b);
        self.relationships.write().await.remove(&key).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_is_unordered() {
        let manager = RelationshipManager::new();
        manager
            .create_relationship("p1", "p2", None, None)
            .await
            .unwrap();
        assert!(manager.get_relationship("p2", "p1").await.is_some());
        assert!(matches!(
            manager.create_relationship("p2", "p1", None, None).await,
            Err(ProjectError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn self_relationship_rejected() {
        let manager = RelationshipManager::new();
        assert!(manager.create_relationship("p1", "p1", None, None).await.is_err());
    }

    #[tokio::test]
    async fn pending_relationship_blocks_sends() {
        let manager = RelationshipManager::new();
        let config = manager
            .create_relationship("p1", "p2", None, None)
            .await
            .unwrap();
        assert!(!config.can_send("p1", "chat_message"));

        manager.activate("p1", "p2", "p1").await.unwrap();
        let config = manager.get_relationship("p1", "p2").await.unwrap();
        assert!(config.can_send("p1", "chat_message"));
        assert_eq!(config.initiator.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn whitelist_is_directional() {
        let manager = RelationshipManager::new();
        manager
            .create_relationship(
                "p1",
                "p2",
                Some(CrossProjectPermission {
                    allowed_protocols: vec!["status_update".into()],
                    messages_per_minute: 0,
                }),
                None,
            )
            .await
            .unwrap();
        manager.activate("p1", "p2", "p2").await.unwrap();
        let config = manager.get_relationship("p1", "p2").await.unwrap();

        assert!(config.can_send("p1", "status_update"));
        assert!(!config.can_send("p1", "chat_message"));
        // The b→a direction has no whitelist: anything goes.
        assert!(config.can_send("p2", "chat_message"));
        // Strangers never pass.
        assert!(!config.can_send("p3", "status_update"));
    }

    #[tokio::test]
    async fn suspend_and_revoke_block_traffic() {
        let manager = RelationshipManager::new();
        manager.create_relationship("p1", "p2", None, None).await.unwrap();
        manager.activate("p1", "p2", "p1").await.unwrap();

        manager.suspend("p1", "p2").await.unwrap();
        assert!(!manager.get_relationship("p1", "p2").await.unwrap().can_send("p1", "x"));

        manager.revoke("p1", "p2").await.unwrap();
        assert_eq!(
            manager.get_relationship("p1", "p2").await.unwrap().status,
            RelationshipStatus::Revoked
        );
    }

    #[tokio::test]
    async fn list_and_delete() {
        let manager = RelationshipManager::new();
        manager.create_relationship("p1", "p2", None, None).await.unwrap();
        manager.create_relationship("p1", "p3", None, None).await.unwrap();

        assert_eq!(manager.list_relationships("p1").await.len(), 2);
        assert_eq!(manager.list_relationships("p2").await.len(), 1);

        assert!(manager.delete_relationship("p3", "p1").await);
        assert!(!manager.delete_relationship("p3", "p1").await);
        assert_eq!(manager.list_relationships("p1").await.len(), 1);
    }
}
