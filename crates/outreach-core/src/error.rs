use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Messaging provider error: {0}")]
    MessagingProvider(String),

    #[error("Messaging provider rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("LLM response could not be parsed: {0}")]
    LlmParse(String),

    #[error("Automation gate closed: {0}")]
    GateClosed(String),

    #[error("Enrollment not found: {id}")]
    EnrollmentNotFound { id: String },

    #[error("Lead not found: {id}")]
    LeadNotFound { id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short classification string, logged and stored on `InvitationLog` rows
    /// and surfaced to the (out-of-core) HTTP wrapper as a coarse reason.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::Database(_) => "DATABASE_ERROR",
            CoreError::MessagingProvider(_) => "MESSAGING_PROVIDER_ERROR",
            CoreError::RateLimited { .. } => "MESSAGING_PROVIDER_RATE_LIMITED",
            CoreError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            CoreError::LlmParse(_) => "LLM_PARSE_ERROR",
            CoreError::GateClosed(_) => "AUTOMATION_GATE_CLOSED",
            CoreError::EnrollmentNotFound { .. } => "ENROLLMENT_NOT_FOUND",
            CoreError::LeadNotFound { .. } => "LEAD_NOT_FOUND",
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors the scheduler should treat as transient: logged, the
    /// tick advances without state change, and the work retries next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::MessagingProvider(_) | CoreError::RateLimited { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
