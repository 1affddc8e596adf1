//! Registered message protocols: a versioned name, a JSON Schema, and the
//! communication patterns the protocol supports.

use std::sync::LazyLock;

use {
    chrono::{DateTime, Utc},
    regex::Regex,
    serde::{Deserialize, Serialize},
};

use crate::error::{Result, StorageError};

static SNAKE_CASE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-z][a-z0-9_]*[a-z0-9]$").unwrap()
});

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").unwrap()
});

/// Communication patterns a protocol may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PointToPoint,
    Broadcast,
    RequestResponse,
    Streaming,
}

impl Capability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PointToPoint => "point_to_point",
            Self::Broadcast => "broadcast",
            Self::RequestResponse => "request_response",
            Self::Streaming => "streaming",
        }
    }
}

impl std::str::FromStr for Capability {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "point_to_point" => Ok(Self::PointToPoint),
            "broadcast" => Ok(Self::Broadcast),
            "request_response" => Ok(Self::RequestResponse),
            "streaming" => Ok(Self::Streaming),
            other => Err(StorageError::InvalidInput(format!(
                "invalid capability '{other}'; must be one of: broadcast, point_to_point, request_response, streaming"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Complete protocol definition. Identity is `(project, name, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    /// snake_case identifier.
    pub name: String,
    /// `MAJOR.MINOR.PATCH`.
    pub version: String,
    /// Draft-07 JSON Schema applied to message payloads.
    pub message_schema: serde_json::Value,
    pub capabilities: Vec<Capability>,
    pub metadata: Option<ProtocolMetadata>,
    pub registered_at: DateTime<Utc>,
}

impl ProtocolDefinition {
    /// Build a definition, validating the name and version patterns.
    ///
    /// Schema meta-validation happens at registration, where errors can be
    /// reported structurally.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        message_schema: serde_json::Value,
        capabilities: Vec<Capability>,
    ) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        if !SNAKE_CASE.is_match(&name) {
            return Err(StorageError::InvalidInput(format!(
                "protocol name '{name}' must be snake_case"
            )));
        }
        if !SEMVER.is_match(&version) {
            return Err(StorageError::InvalidInput(format!(
                "protocol version '{version}' must be MAJOR.MINOR.PATCH"
            )));
        }
        let mut capabilities = capabilities;
        capabilities.sort_unstable();
        capabilities.dedup();
        Ok(Self {
            name,
            version,
            message_schema,
            capabilities,
            metadata: None,
            registered_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: ProtocolMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// `name@version`, the display identity within a project.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn valid_definition() {
        let def = ProtocolDefinition::new(
            "chat_message",
            "1.0.0",
            json!({"type": "object"}),
            vec![Capability::PointToPoint, Capability::PointToPoint],
        )
        .unwrap();
        assert_eq!(def.identity(), "chat_message@1.0.0");
        // duplicates are collapsed
        assert_eq!(def.capabilities.len(), 1);
    }

    #[test]
    fn rejects_bad_name() {
        for name in ["CamelCase", "1starts_with_digit", "trailing_", "-dash"] {
            let err = ProtocolDefinition::new(name, "1.0.0", json!({}), vec![]);
            assert!(err.is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn rejects_bad_version() {
        for version in ["1.0", "v1.0.0", "1.0.0-beta", ""] {
            let err = ProtocolDefinition::new("chat", version, json!({}), vec![]);
            assert!(err.is_err(), "{version} should be rejected");
        }
    }

    #[test]
    fn capability_parse() {
        assert_eq!(
            "streaming".parse::<Capability>().unwrap(),
            Capability::Streaming
        );
        assert!("telepathy".parse::<Capability>().is_err());
    }
}
