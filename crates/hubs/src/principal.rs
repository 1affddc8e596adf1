use serde::{Deserialize, Serialize};

/// Who is on the other end of a hub connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User { id: String, username: String },
    Agent { id: String, nickname: String },
    Guest,
}

impl Principal {
    /// Display name used in join/leave and greeting frames.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::User { username, .. } => format!("@{username}"),
            Self::Agent { nickname, .. } => format!("@{nickname}"),
            Self::Guest => "Guest".to_string(),
        }
    }

    /// Stable identity used to correlate opinions and votes.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::User { id, .. } | Self::Agent { id, .. } => Some(id),
            Self::Guest => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Guest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        let user = Principal::User {
            id: "u1".into(),
            username: "ada".into(),
        };
        let agent = Principal::Agent {
            id: "a1".into(),
            nickname: "astra".into(),
        };
        assert_eq!(user.display_name(), "@ada");
        assert_eq!(agent.display_name(), "@astra");
        assert_eq!(Principal::Guest.display_name(), "Guest");
        assert!(!Principal::Guest.is_authenticated());
    }
}
