use {thiserror::Error, crate::state::DiscussionPhase};

#[derive(Debug, Error)]
pub enum DiscussionError {
    #[error("cannot {operation} in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: DiscussionPhase,
    },

    #[error("meeting has no participants")]
    NoParticipants,
}

pub type Result<T> = std::result::Result<T, DiscussionError>;
