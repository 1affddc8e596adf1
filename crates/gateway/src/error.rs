//! Domain-error to HTTP status mapping for the external adapter.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    thiserror::Error,
    tracing::error,
};

use {
    conclave_discussion::DiscussionError, conclave_projects::ProjectError,
    conclave_registry::RegistryError, conclave_routing::RoutingError,
    conclave_sessions::SessionError, conclave_storage::StorageError,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    QueueFull(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    InvalidPhase(String),
    #[error("internal error")]
    Internal(String),
}

impl GatewayError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::InvalidPhase(_) => StatusCode::CONFLICT,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // The opaque id lets operators correlate the log line with the
            // response a client reports.
            let reference = uuid::Uuid::new_v4();
            if let Self::Internal(detail) = &self {
                error!(%reference, detail, "internal error");
            }
            return (
                status,
                Json(json!({ "error": "internal error", "reference": reference.to_string() })),
            )
                .into_response();
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ProjectError> for GatewayError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound(_) => Self::NotFound(err.to_string()),
            ProjectError::AlreadyExists(_) => Self::AlreadyExists(err.to_string()),
            ProjectError::ReservedName(_) | ProjectError::InvalidInput(_) => {
                Self::InvalidInput(err.to_string())
            },
            ProjectError::HasActiveSessions { .. } => Self::AlreadyExists(err.to_string()),
            ProjectError::InvalidKeyFormat => Self::InvalidInput(err.to_string()),
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::AlreadyExists(_) => Self::AlreadyExists(err.to_string()),
            RegistryError::InvalidSchema(_) => Self::InvalidInput(err.to_string()),
            RegistryError::ActiveReferences { .. } => Self::AlreadyExists(err.to_string()),
            RegistryError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => Self::NotFound(err.to_string()),
            SessionError::QueueFull { .. } => Self::QueueFull(err.to_string()),
            SessionError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<RoutingError> for GatewayError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Forbidden(_) => Self::Forbidden(err.to_string()),
            RoutingError::RateLimited { .. } => Self::RateLimited(err.to_string()),
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::AlreadyExists { .. } => Self::AlreadyExists(err.to_string()),
            StorageError::QueueFull { .. } => Self::QueueFull(err.to_string()),
            StorageError::InvalidInput(_) => Self::InvalidInput(err.to_string()),
        }
    }
}

impl From<DiscussionError> for GatewayError {
    fn from(err: DiscussionError) -> Self {
        match err {
            DiscussionError::InvalidPhase { .. } => Self::InvalidPhase(err.to_string()),
            DiscussionError::NoParticipants => Self::InvalidInput(err.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn status_code_table() {
        let cases = [
            (GatewayError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (GatewayError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (GatewayError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (GatewayError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (GatewayError::QueueFull("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (GatewayError::RateLimited("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (GatewayError::InvalidPhase("x".into()), StatusCode::CONFLICT),
            (GatewayError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn domain_errors_map_to_kinds() {
        let err: GatewayError = RoutingError::RateLimited { limit: 5 }.into();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err: GatewayError = SessionError::QueueFull { capacity: 1 }.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: GatewayError = ProjectError::ReservedName("admin".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: GatewayError = DiscussionError::NoParticipants.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
