use {conclave_storage::StorageError, thiserror::Error};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("invalid JSON Schema: {0}")]
    InvalidSchema(String),

    #[error("{protocol} is referenced by {count} active sessions")]
    ActiveReferences { protocol: String, count: usize },

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { resource } => Self::NotFound(resource),
            StorageError::AlreadyExists { resource } => Self::AlreadyExists(resource),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
