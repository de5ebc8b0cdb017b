use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {status} — {message}")]
    SendFailed { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("could not extract provider id from profile url: {0}")]
    InvalidProfileUrl(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl MessagingError {
    pub fn code(&self) -> &'static str {
        match self {
            MessagingError::ConnectionFailed(_) => "CONNECTION_FAILED",
            MessagingError::SendFailed { .. } => "SEND_FAILED",
            MessagingError::RateLimited { .. } => "RATE_LIMITED",
            MessagingError::InvalidProfileUrl(_) => "INVALID_PROFILE_URL",
            MessagingError::Transport(_) => "TRANSPORT_ERROR",
            MessagingError::Parse(_) => "PARSE_ERROR",
        }
    }

    /// Whether a caller should treat this as retryable noise rather than a
    /// fatal condition for the enrollment driving the call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MessagingError::RateLimited { .. }
                | MessagingError::Transport(_)
                | MessagingError::SendFailed { status: 500..=599, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MessagingError>;
