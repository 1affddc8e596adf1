use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    #[error("queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[must_use]
    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
