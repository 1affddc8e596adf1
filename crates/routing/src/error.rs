use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    /// Cross-project send without an authorizing relationship.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Cross-project per-minute cap exceeded.
    #[error("rate limited: {limit} messages per minute")]
    RateLimited { limit: u32 },
}

pub type Result<T> = std::result::Result<T, RoutingError>;
