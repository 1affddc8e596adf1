//! Bearer-token authentication for hub connections.
//!
//! JWT user validation is tried first, then agent API-key validation
//! through the project registry. Meeting and chat sockets require an
//! authenticated principal; the status socket accepts anyone and labels
//! the unauthenticated `Guest`.

use {
    jsonwebtoken::{Algorithm, DecodingKey, Validation},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use conclave_hubs::Principal;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id.
    pub sub: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Expiry, seconds since epoch.
    pub exp: u64,
}

/// Resolve a bearer token to a principal, or `None` when nothing matches.
pub async fn authenticate_token(state: &AppState, token: &str) -> Option<Principal> {
    if let Some(user) = validate_jwt(state, token) {
        return Some(user);
    }
    validate_agent_key(state, token).await
}

fn validate_jwt(state: &AppState, token: &str) -> Option<Principal> {
    let secret = state.config.jwt.secret.as_deref()?;
    let algorithm: Algorithm = state.config.jwt.algorithm.parse().unwrap_or(Algorithm::HS256);
    let decoded = jsonwebtoken::decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(algorithm),
    )
    .ok()?;

    let claims = decoded.claims;
    debug!(user_id = %claims.sub, "hub connection authenticated as user");
    Some(Principal::User {
        username: claims.username.clone().unwrap_or_else(|| claims.sub.clone()),
        id: claims.sub,
    })
}

async fn validate_agent_key(state: &AppState, token: &str) -> Option<Principal> {
    let (project_id, key_id) = state.projects.validate_api_key(token).await.ok()??;
    debug!(project_id, key_id, "hub connection authenticated as agent");
    Some(Principal::Agent {
        id: format!("{project_id}/{key_id}"),
        nickname: format!("{project_id}-{key_id}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        conclave_config::ConclaveConfig,
        jsonwebtoken::{EncodingKey, Header},
        std::sync::Arc,
    };

    use crate::state::AppState;

    fn state_with_secret(secret: &str) -> Arc<AppState> {
        let mut config = ConclaveConfig::default();
        config.jwt.secret = Some(secret.to_string());
        AppState::new(config)
    }

    fn token(secret: &str, sub: &str, username: Option<&str>, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs).max(0) as u64;
        let claims = UserClaims {
            sub: sub.to_string(),
            username: username.map(str::to_string),
            exp,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_jwt_yields_user() {
        let state = state_with_secret("sekrit");
        let token = token("sekrit", "u1", Some("ada"), 3600);

        let principal = authenticate_token(&state, &token).await.unwrap();
        assert_eq!(principal.display_name(), "@ada");
    }

    #[tokio::test]
    async fn expired_jwt_is_rejected() {
        let state = state_with_secret("sekrit");
        let token = token("sekrit", "u1", None, -3600);
        assert!(authenticate_token(&state, &token).await.is_none());
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let state = state_with_secret("sekrit");
        let token = token("other", "u1", None, 3600);
        assert!(authenticate_token(&state, &token).await.is_none());
    }

    #[tokio::test]
    async fn agent_api_key_yields_agent() {
        let state = state_with_secret("sekrit");
        let created = state
            .projects
            .create_project("team_alpha", "Team Alpha", None, None, vec![], None)
            .await
            .unwrap();

        let principal = authenticate_token(&state, &created.default_key.plaintext)
            .await
            .unwrap();
        assert!(matches!(principal, Principal::Agent { .. }));
        assert!(principal.is_authenticated());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let state = state_with_secret("sekrit");
        assert!(authenticate_token(&state, "not-a-token").await.is_none());
    }
}
