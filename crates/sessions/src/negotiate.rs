//! Capability negotiation between sessions.
//!
//! Stateless: every answer is a pure function of the two sessions' declared
//! capabilities. Version selection takes the first element of the sorted
//! intersection; swap `lowest_common_version` in `session.rs` for a semver
//! policy when one lands.

use std::collections::{BTreeMap, BTreeSet};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
    uuid::Uuid,
};

use conclave_storage::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRequirement {
    pub name: String,
    pub version: String,
}

/// Features each side lacks relative to the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedFeatures {
    pub session_a: Vec<String>,
    pub session_b: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResult {
    pub compatible: bool,
    /// Protocol name → negotiated common version.
    pub supported_protocols: BTreeMap<String, String>,
    pub feature_intersections: BTreeSet<String>,
    pub unsupported_features: UnsupportedFeatures,
    pub incompatibilities: Vec<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCompatibility {
    pub session_a_id: Uuid,
    pub session_b_id: Uuid,
    pub compatible: bool,
    pub common_protocols: BTreeMap<String, String>,
    pub common_features: BTreeSet<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    pub session_ids: Vec<Uuid>,
    /// One entry per `i < j` pair, in row-major order.
    pub pairs: Vec<PairCompatibility>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityNegotiator;

impl CapabilityNegotiator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Negotiate protocols and features between two sessions.
    #[must_use]
    pub fn negotiate(
        &self,
        session_a: &Session,
        session_b: &Session,
        required_protocols: Option<&[ProtocolRequirement]>,
    ) -> NegotiationResult {
        let common_protocols = session_a.find_common_protocols(session_b);

        let mut incompatibilities = Vec::new();
        let mut suggestion = None;

        if let Some(required) = required_protocols {
            for requirement in required {
                if common_protocols.contains_key(&requirement.name) {
                    continue;
                }
                let a_versions = session_a
                    .capabilities
                    .supported_protocols
                    .get(&requirement.name)
                    .cloned()
                    .unwrap_or_default();
                let b_versions = session_b
                    .capabilities
                    .supported_protocols
                    .get(&requirement.name)
                    .cloned()
                    .unwrap_or_default();

                incompatibilities.push(format!(
                    "Protocol '{}' version '{}' not supported by both sessions. \
                     Session A: {a_versions:?}, Session B: {b_versions:?}",
                    requirement.name, requirement.version,
                ));

                if let Some(first) = b_versions.first() {
                    suggestion = Some(format!(
                        "Session A should add support for {} {} or Session B should upgrade to {} {}",
                        requirement.name, first, requirement.name, requirement.version,
                    ));
                }
            }
        }

        let features_a = &session_a.capabilities.supported_features;
        let features_b = &session_b.capabilities.supported_features;
        let feature_intersections: BTreeSet<String> =
            features_a.intersection(features_b).cloned().collect();
        let unsupported_features = UnsupportedFeatures {
            session_a: features_b.difference(features_a).cloned().collect(),
            session_b: features_a.difference(features_b).cloned().collect(),
        };

        let compatible = incompatibilities.is_empty()
            && (required_protocols.is_none() || !common_protocols.is_empty());

        debug!(
            session_a = %session_a.session_id,
            session_b = %session_b.session_id,
            compatible,
            common = common_protocols.len(),
            "negotiation complete"
        );

        NegotiationResult {
            compatible,
            supported_protocols: common_protocols,
            feature_intersections,
            unsupported_features,
            incompatibilities,
            suggestion,
        }
    }

    /// Whether a single session supports a protocol version.
    #[must_use]
    pub fn check_compatibility(&self, session: &Session, name: &str, version: &str) -> bool {
        session.supports_protocol(name, version)
    }

    /// Pairwise compatibility for all `i < j` pairs.
    #[must_use]
    pub fn compatibility_matrix(&self, sessions: &[Session]) -> CompatibilityMatrix {
        let mut matrix = CompatibilityMatrix {
            session_ids: sessions.iter().map(|s| s.session_id).collect(),
            pairs: Vec::new(),
        };

        for (i, session_a) in sessions.iter().enumerate() {
            for session_b in sessions.iter().skip(i + 1) {
                let common_protocols = session_a.find_common_protocols(session_b);
                let common_features = session_a.common_features(session_b);
                let compatible = !common_protocols.is_empty();
                matrix.pairs.push(PairCompatibility {
                    session_a_id: session_a.session_id,
                    session_b_id: session_b.session_id,
                    compatible,
                    common_protocols,
                    common_features,
                    reason: (!compatible).then(|| "No common protocols".to_string()),
                });
            }
        }
        matrix
    }
}
