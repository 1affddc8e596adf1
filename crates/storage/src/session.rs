//! Session state for connected clients.

use std::collections::{BTreeMap, BTreeSet};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::DEFAULT_PROJECT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stale,
    Disconnected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Capabilities declared by a session during its handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCapabilities {
    /// Protocol name → supported versions.
    #[serde(default)]
    pub supported_protocols: BTreeMap<String, Vec<String>>,
    /// Feature names such as `point_to_point` or `encryption`.
    #[serde(default)]
    pub supported_features: BTreeSet<String>,
}

impl SessionCapabilities {
    #[must_use]
    pub fn new(
        protocols: impl IntoIterator<Item = (String, Vec<String>)>,
        features: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            supported_protocols: protocols.into_iter().collect(),
            supported_features: features.into_iter().collect(),
        }
    }
}

/// Complete session state for a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub project_id: String,
    pub connection_time: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: SessionStatus,
    pub capabilities: SessionCapabilities,
    pub queue_size: usize,
}

impl Session {
    #[must_use]
    pub fn new(capabilities: SessionCapabilities, project_id: &str) -> Self {
        Self::with_id(Uuid::new_v4(), capabilities, project_id)
    }

    #[must_use]
    pub fn with_id(session_id: Uuid, capabilities: SessionCapabilities, project_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            project_id: project_id.to_string(),
            connection_time: now,
            last_heartbeat: now,
            status: SessionStatus::Active,
            capabilities,
            queue_size: 0,
        }
    }

    /// Seconds elapsed since the last heartbeat, saturating at zero.
    #[must_use]
    pub fn heartbeat_age_secs(&self) -> u64 {
        conclave_common::time::seconds_since(self.last_heartbeat)
    }

    #[must_use]
    pub fn is_stale(&self, stale_threshold_secs: u64) -> bool {
        self.heartbeat_age_secs() >= stale_threshold_secs
    }

    #[must_use]
    pub fn should_disconnect(&self, disconnect_threshold_secs: u64) -> bool {
        self.heartbeat_age_secs() >= disconnect_threshold_secs
    }

    #[must_use]
    pub fn supports_protocol(&self, name: &str, version: &str) -> bool {
        self.capabilities
            .supported_protocols
            .get(name)
            .is_some_and(|versions| versions.iter().any(|v| v == version))
    }

    /// Common protocols with the other session, each mapped to the first
    /// version of the sorted intersection.
    #[must_use]
    pub fn find_common_protocols(&self, other: &Session) -> BTreeMap<String, String> {
        let mut common = BTreeMap::new();
        for (name, mine) in &self.capabilities.supported_protocols {
            let Some(theirs) = other.capabilities.supported_protocols.get(name) else {
                continue;
            };
            if let Some(version) = lowest_common_version(mine, theirs) {
                common.insert(name.clone(), version);
            }
        }
        common
    }

    /// Features declared by both sessions.
    #[must_use]
    pub fn common_features(&self, other: &Session) -> BTreeSet<String> {
        self.capabilities
            .supported_features
            .intersection(&other.capabilities.supported_features)
            .cloned()
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionCapabilities::default(), DEFAULT_PROJECT)
    }
}

/// First element of the lexicographically sorted version intersection.
fn lowest_common_version(a: &[String], b: &[String]) -> Option<String> {
    let theirs: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let mut shared: Vec<&str> = a
        .iter()
        .map(String::as_str)
        .filter(|v| theirs.contains(v))
        .collect();
    shared.sort_unstable();
    shared.first().map(|v| (*v).to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn caps(protocols: &[(&str, &[&str])], features: &[&str]) -> SessionCapabilities {
        SessionCapabilities::new(
            protocols
                .iter()
                .map(|(n, vs)| ((*n).into(), vs.iter().map(|v| (*v).into()).collect())),
            features.iter().map(|f| (*f).into()),
        )
    }

    #[test]
    fn new_session_is_active() {
        let session = Session::new(caps(&[("chat", &["1.0.0"])], &[]), "p1");
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.project_id, "p1");
        assert_eq!(session.queue_size, 0);
    }

    #[test]
    fn supports_protocol_checks_exact_version() {
        let session = Session::new(caps(&[("chat", &["1.0.0", "1.1.0"])], &[]), "p1");
        assert!(session.supports_protocol("chat", "1.1.0"));
        assert!(!session.supports_protocol("chat", "2.0.0"));
        assert!(!session.supports_protocol("telemetry", "1.0.0"));
    }

    #[test]
    fn common_protocols_take_sorted_first() {
        let a = Session::new(caps(&[("chat", &["1.0.0", "1.2.0", "2.0.0"])], &[]), "p1");
        let b = Session::new(caps(&[("chat", &["2.0.0", "1.2.0"])], &[]), "p1");
        let common = a.find_common_protocols(&b);
        assert_eq!(common.get("chat").map(String::as_str), Some("1.2.0"));
    }

    #[test]
    fn no_common_version_yields_no_entry() {
        let a = Session::new(caps(&[("chat", &["1.0.0"])], &[]), "p1");
        let b = Session::new(caps(&[("chat", &["2.0.0"])], &[]), "p1");
        assert!(a.find_common_protocols(&b).is_empty());
    }

    #[test]
    fn feature_intersection() {
        let a = Session::new(caps(&[], &["point_to_point", "broadcast"]), "p1");
        let b = Session::new(caps(&[], &["broadcast", "encryption"]), "p1");
        let shared = a.common_features(&b);
        assert_eq!(shared.len(), 1);
        assert!(shared.contains("broadcast"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Disconnected).unwrap();
        assert_eq!(json, r#""disconnected""#);
    }
}
