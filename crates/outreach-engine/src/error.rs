use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] outreach_db::DbError),

    #[error(transparent)]
    Messaging(#[from] outreach_messaging::MessagingError),

    #[error(transparent)]
    Lm(#[from] outreach_lm::LmError),

    #[error("sequence {sequence_id} has no resolvable owning user (missing business profile)")]
    UnresolvedOwner { sequence_id: String },

    #[error("user {user_id} has no messaging account on record")]
    MissingMessagingAccount { user_id: String },

    #[error("outbound message rate limit not yet elapsed: {0}")]
    RateLimited(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Db(e) => e.code(),
            EngineError::Messaging(e) => e.code(),
            EngineError::Lm(e) => e.code(),
            EngineError::UnresolvedOwner { .. } => "UNRESOLVED_OWNER",
            EngineError::MissingMessagingAccount { .. } => "MISSING_MESSAGING_ACCOUNT",
            EngineError::RateLimited(_) => "RATE_LIMITED",
        }
    }

    /// Whether a tick should log and move on rather than fail the enrollment
    /// it was working on.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Messaging(e) => e.is_transient(),
            EngineError::RateLimited(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
