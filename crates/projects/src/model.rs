//! Project entities: definitions, API keys, quotas, and statistics.

use std::sync::LazyLock;

use {
    chrono::{DateTime, Utc},
    conclave_protocol::api_key::ApiKeyDigest,
    regex::Regex,
    serde::{Deserialize, Serialize},
};

use crate::error::{ProjectError, Result};

static SLUG: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-z][a-z0-9_]*[a-z0-9]$").unwrap()
});

/// Slugs that cannot be claimed by user-created projects. `default` is
/// created by the system itself on first reference.
pub const RESERVED_SLUGS: &[&str] = &["default", "system", "admin", "root"];

/// Validate a user-supplied project slug.
pub fn validate_slug(slug: &str) -> Result<()> {
    if !SLUG.is_match(slug) {
        return Err(ProjectError::InvalidInput(format!(
            "project id '{slug}' must be a lowercase alphanumeric+underscore slug"
        )));
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(ProjectError::ReservedName(slug.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Suspended,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Per-project quotas and visibility settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub max_sessions: usize,
    pub max_protocols: usize,
    pub max_message_queue_size: usize,
    pub allow_cross_project: bool,
    /// Whether this project appears in unfiltered discovery listings.
    pub discoverable: bool,
    /// Protocol names shared read-only with related projects.
    pub shared_protocols: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_protocols: 50,
            max_message_queue_size: 100,
            allow_cross_project: false,
            discoverable: true,
            shared_protocols: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub session_count: usize,
    pub message_count: u64,
    pub protocol_count: usize,
    pub last_activity: DateTime<Utc>,
}

impl Default for ProjectStatistics {
    fn default() -> Self {
        Self {
            session_count: 0,
            message_count: 0,
            protocol_count: 0,
            last_activity: Utc::now(),
        }
    }
}

/// A stored API key. Only the SHA-256 hash and a short display prefix are
/// retained; plaintext exists solely in the [`CreatedKey`] returned at
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_id: String,
    pub hash: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ApiKey {
    #[must_use]
    pub fn from_digest(key_id: impl Into<String>, digest: ApiKeyDigest) -> Self {
        Self {
            key_id: key_id.into(),
            hash: digest.hash,
            prefix: digest.prefix,
            created_at: Utc::now(),
            expires_at: None,
            is_active: true,
        }
    }

    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// A freshly issued key: the only place plaintext ever appears.
#[derive(Debug, Clone)]
pub struct CreatedKey {
    pub key_id: String,
    pub plaintext: String,
}

/// Complete project state held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub project_id: String,
    pub metadata: ProjectMetadata,
    pub api_keys: Vec<ApiKey>,
    pub config: ProjectConfig,
    pub statistics: ProjectStatistics,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl ProjectDefinition {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }

    #[must_use]
    pub fn has_active_api_key(&self) -> bool {
        let now = Utc::now();
        self.api_keys.iter().any(|key| key.is_usable(now))
    }

    /// Active, unexpired keys.
    #[must_use]
    pub fn usable_api_keys(&self) -> Vec<&ApiKey> {
        let now = Utc::now();
        self.api_keys.iter().filter(|key| key.is_usable(now)).collect()
    }

    pub(crate) fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

/// Result of `create_project`: the definition plus the one-time plaintext of
/// the generated default key.
#[derive(Debug, Clone)]
pub struct CreatedProject {
    pub definition: ProjectDefinition,
    pub default_key: CreatedKey,
}

/// Public discovery view: metadata and a safe config subset, never API keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub metadata: ProjectMetadata,
    pub allow_cross_project: bool,
    pub discoverable: bool,
    pub shared_protocols: Vec<String>,
    pub statistics: ProjectStatistics,
    pub status: ProjectStatus,
}

impl From<&ProjectDefinition> for ProjectInfo {
    fn from(definition: &ProjectDefinition) -> Self {
        Self {
            project_id: definition.project_id.clone(),
            metadata: definition.metadata.clone(),
            allow_cross_project: definition.config.allow_cross_project,
            discoverable: definition.config.discoverable,
            shared_protocols: definition.config.shared_protocols.clone(),
            statistics: definition.statistics.clone(),
            status: definition.status,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(validate_slug("team_alpha").is_ok());
        assert!(validate_slug("p1").is_ok());
        assert!(validate_slug("Alpha").is_err());
        assert!(validate_slug("_leading").is_err());
        assert!(validate_slug("trailing_").is_err());
        assert!(validate_slug("a").is_err());
    }

    #[test]
    fn reserved_slugs_rejected() {
        for slug in ["default", "system", "admin", "root"] {
            assert!(
                matches!(validate_slug(slug), Err(ProjectError::ReservedName(_))),
                "{slug} should be reserved"
            );
        }
    }

    #[test]
    fn expired_key_is_unusable() {
        let digest = ApiKeyDigest {
            hash: "h".into(),
            prefix: "p".into(),
        };
        let mut key = ApiKey::from_digest("default", digest);
        assert!(key.is_usable(Utc::now()));
        key.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!key.is_usable(Utc::now()));
        key.expires_at = None;
        key.is_active = false;
        assert!(!key.is_usable(Utc::now()));
    }

    #[test]
    fn info_omits_api_keys() {
        let json = serde_json::to_value(ProjectInfo {
            project_id: "p1".into(),
            metadata: ProjectMetadata::default(),
            allow_cross_project: false,
            discoverable: true,
            shared_protocols: vec![],
            statistics: ProjectStatistics::default(),
            status: ProjectStatus::Active,
        })
        .unwrap();
        assert!(json.get("api_keys").is_none());
    }
}
