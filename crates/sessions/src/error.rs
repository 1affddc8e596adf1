use {conclave_storage::StorageError, thiserror::Error, uuid::Uuid};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QueueFull { capacity } => Self::QueueFull { capacity },
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
