use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project '{0}' not found")]
    NotFound(String),

    #[error("project '{0}' already exists")]
    AlreadyExists(String),

    #[error("project id '{0}' is reserved")]
    ReservedName(String),

    #[error("project '{id}' has {count} active sessions")]
    HasActiveSessions { id: String, count: usize },

    #[error("invalid API key format")]
    InvalidKeyFormat,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ProjectError>;
