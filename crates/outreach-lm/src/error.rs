use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmError {
    #[error("provider api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response did not contain valid JSON: {0}")]
    Parse(String),
}

impl LmError {
    pub fn code(&self) -> &'static str {
        match self {
            LmError::Api { .. } => "LM_API_ERROR",
            LmError::RateLimited { .. } => "LM_RATE_LIMITED",
            LmError::Transport(_) => "LM_TRANSPORT_ERROR",
            LmError::Parse(_) => "LM_PARSE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LmError>;
