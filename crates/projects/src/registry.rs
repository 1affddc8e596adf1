//! The project table and its lifecycle operations.

use {
    chrono::{Duration, Utc},
    dashmap::{DashMap, mapref::entry::Entry},
    tracing::{debug, info, warn},
};

use conclave_protocol::api_key::{generate_api_key, sha256_hex};

use crate::{
    error::{ProjectError, Result},
    model::{
        ApiKey, CreatedKey, CreatedProject, ProjectConfig, ProjectDefinition, ProjectInfo,
        ProjectMetadata, ProjectStatistics, ProjectStatus, validate_slug,
    },
};

/// The system-created namespace that always exists after first reference.
pub const DEFAULT_PROJECT: &str = "default";

/// In-memory table of project definitions keyed by slug.
///
/// Mutations lock a single entry; reads iterate shards freely, so statistics
/// updates and lookups on different projects never contend.
pub struct ProjectRegistry {
    projects: DashMap<String, ProjectDefinition>,
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            projects: DashMap::new(),
        }
    }

    /// Create a project, generating its `default` API key.
    ///
    /// The plaintext key is in the returned [`CreatedProject`] and nowhere
    /// else; it cannot be retrieved again.
    pub async fn create_project(
        &self,
        project_id: &str,
        name: &str,
        description: Option<&str>,
        config: Option<ProjectConfig>,
        tags: Vec<String>,
        owner: Option<String>,
    ) -> Result<CreatedProject> {
        validate_slug(project_id)?;

        let (plaintext, digest) = generate_api_key(project_id, "default");
        let now = Utc::now();
        let definition = ProjectDefinition {
            project_id: project_id.to_string(),
            metadata: ProjectMetadata {
                name: name.to_string(),
                description: description.unwrap_or_default().to_string(),
                tags,
                owner,
            },
            api_keys: vec![ApiKey::from_digest("default", digest)],
            config: config.unwrap_or_default(),
            statistics: ProjectStatistics::default(),
            status: ProjectStatus::Active,
            created_at: now,
            last_modified: now,
        };

        match self.projects.entry(project_id.to_string()) {
            Entry::Occupied(_) => Err(ProjectError::AlreadyExists(project_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(definition.clone());
                info!(project_id, "project created");
                Ok(CreatedProject {
                    definition,
                    default_key: CreatedKey {
                        key_id: "default".into(),
                        plaintext,
                    },
                })
            },
        }
    }

    /// Create the `default` project if it does not exist yet. Its generated
    /// key plaintext is discarded; the default namespace is reachable through
    /// the identification fallback, not through a key.
    pub async fn ensure_default(&self) {
        if let Entry::Vacant(slot) = self.projects.entry(DEFAULT_PROJECT.to_string()) {
            let (_, digest) = generate_api_key(DEFAULT_PROJECT, "default");
            let now = Utc::now();
            slot.insert(ProjectDefinition {
                project_id: DEFAULT_PROJECT.to_string(),
                metadata: ProjectMetadata {
                    name: "Default Project".into(),
                    description: "System-created default namespace".into(),
                    tags: Vec::new(),
                    owner: None,
                },
                api_keys: vec![ApiKey::from_digest("default", digest)],
                config: ProjectConfig::default(),
                statistics: ProjectStatistics::default(),
                status: ProjectStatus::Active,
                created_at: now,
                last_modified: now,
            });
            debug!("default project created");
        }
    }

    pub async fn get_project(&self, project_id: &str) -> Option<ProjectDefinition> {
        if project_id == DEFAULT_PROJECT {
            self.ensure_default().await;
        }
        self.projects.get(project_id).map(|entry| entry.clone())
    }

    /// Discovery listing.
    ///
    /// Excludes non-active projects unless `include_inactive`; hides
    /// non-discoverable projects from unfiltered listings. `name_filter` is a
    /// case-insensitive substring match on the metadata name.
    pub async fn list_projects(
        &self,
        include_inactive: bool,
        name_filter: Option<&str>,
    ) -> Vec<ProjectInfo> {
        let needle = name_filter.map(str::to_lowercase);
        let mut found: Vec<ProjectInfo> = self
            .projects
            .iter()
            .filter(|entry| include_inactive || entry.is_active())
            .filter(|entry| match &needle {
                Some(n) => entry.metadata.name.to_lowercase().contains(n),
                None => entry.config.discoverable,
            })
            .map(|entry| ProjectInfo::from(entry.value()))
            .collect();
        found.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        found
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        tags: Option<Vec<String>>,
        config: Option<ProjectConfig>,
    ) -> Result<ProjectDefinition> {
        let mut entry = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))?;
        if let Some(name) = name {
            entry.metadata.name = name.to_string();
        }
        if let Some(description) = description {
            entry.metadata.description = description.to_string();
        }
        if let Some(tags) = tags {
            entry.metadata.tags = tags;
        }
        if let Some(config) = config {
            entry.config = config;
        }
        entry.touch();
        Ok(entry.clone())
    }

    pub async fn archive_project(&self, project_id: &str) -> Result<()> {
        self.set_status(project_id, ProjectStatus::Archived)
    }

    pub async fn suspend_project(&self, project_id: &str) -> Result<()> {
        self.set_status(project_id, ProjectStatus::Suspended)
    }

    /// Bring an archived or suspended project back to `active`.
    pub async fn restore_project(&self, project_id: &str) -> Result<()> {
        let mut entry = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))?;
        if entry.status == ProjectStatus::Deleted {
            return Err(ProjectError::NotFound(project_id.to_string()));
        }
        entry.status = ProjectStatus::Active;
        entry.touch();
        Ok(())
    }

    /// Mark a project deleted. Refuses while sessions are active.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let mut entry = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))?;
        let active = entry.statistics.session_count;
        if active > 0 {
            return Err(ProjectError::HasActiveSessions {
                id: project_id.to_string(),
                count: active,
            });
        }
        entry.status = ProjectStatus::Deleted;
        entry.touch();
        info!(project_id, "project deleted");
        Ok(())
    }

    fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        let mut entry = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))?;
        entry.status = status;
        entry.touch();
        Ok(())
    }

    /// Resolve a plaintext API key to `(project_id, key_id)`.
    ///
    /// Project slugs may contain underscores, so the owning project is found
    /// by longest `{project_id}_` prefix match before hash comparison.
    pub async fn validate_api_key(&self, plaintext: &str) -> Result<Option<(String, String)>> {
        if plaintext.splitn(3, '_').count() < 3 {
            return Err(ProjectError::InvalidKeyFormat);
        }

        let mut owner: Option<String> = None;
        for entry in self.projects.iter() {
            let prefix = format!("{}_", entry.key());
            if plaintext.starts_with(&prefix)
                && owner.as_ref().is_none_or(|cur| cur.len() < entry.key().len())
            {
                owner = Some(entry.key().clone());
            }
        }
        let Some(project_id) = owner else {
            return Ok(None);
        };
        let Some(project) = self.projects.get(&project_id) else {
            return Ok(None);
        };
        if !project.is_active() {
            return Ok(None);
        }

        let hash = sha256_hex(plaintext);
        let now = Utc::now();
        for key in &project.api_keys {
            if key.is_usable(now) && key.hash == hash {
                return Ok(Some((project_id.clone(), key.key_id.clone())));
            }
        }
        Ok(None)
    }

    /// Issue replacement keys.
    ///
    /// Rotates the named key, or every active key when `key_id` is `None`.
    /// Old keys expire immediately at grace 0, otherwise after the grace
    /// period. Returned plaintexts appear only here.
    pub async fn rotate_api_keys(
        &self,
        project_id: &str,
        key_id: Option<&str>,
        grace_period_secs: u64,
    ) -> Result<Vec<CreatedKey>> {
        let mut entry = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))?;

        let now = Utc::now();
        let targets: Vec<String> = entry
            .api_keys
            .iter()
            .filter(|key| key.is_usable(now))
            .filter(|key| key_id.is_none_or(|wanted| key.key_id == wanted))
            .map(|key| key.key_id.clone())
            .collect();
        if targets.is_empty() {
            return Err(ProjectError::InvalidInput(format!(
                "no active key matching '{}'",
                key_id.unwrap_or("*")
            )));
        }

        for key in &mut entry.api_keys {
            if targets.contains(&key.key_id) {
                if grace_period_secs == 0 {
                    key.is_active = false;
                } else {
                    key.expires_at = Some(now + Duration::seconds(grace_period_secs as i64));
                }
            }
        }

        let mut created = Vec::with_capacity(targets.len());
        for key_id in targets {
            let (plaintext, digest) = generate_api_key(project_id, &key_id);
            entry.api_keys.push(ApiKey::from_digest(&key_id, digest));
            created.push(CreatedKey { key_id, plaintext });
        }
        entry.touch();
        info!(project_id, rotated = created.len(), "api keys rotated");
        Ok(created)
    }

    // ── Statistics ───────────────────────────────────────────────────────

    pub async fn record_message(&self, project_id: &str) {
        if let Some(mut entry) = self.projects.get_mut(project_id) {
            entry.statistics.message_count += 1;
            entry.statistics.last_activity = Utc::now();
        }
    }

    pub async fn adjust_session_count(&self, project_id: &str, delta: i64) {
        if let Some(mut entry) = self.projects.get_mut(project_id) {
            let current = entry.statistics.session_count as i64;
            let next = (current + delta).max(0);
            if current + delta < 0 {
                warn!(project_id, "session count underflow clamped");
            }
            entry.statistics.session_count = next as usize;
            entry.statistics.last_activity = Utc::now();
        }
    }

    pub async fn adjust_protocol_count(&self, project_id: &str, delta: i64) {
        if let Some(mut entry) = self.projects.get_mut(project_id) {
            let current = entry.statistics.protocol_count as i64;
            entry.statistics.protocol_count = (current + delta).max(0) as usize;
            entry.statistics.last_activity = Utc::now();
        }
    }
}
