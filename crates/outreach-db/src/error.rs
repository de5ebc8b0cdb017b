use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lead already enrolled in another active sequence: lead={lead_id}")]
    AlreadyActivelyEnrolled { lead_id: String },

    #[error("Row not found: {0}")]
    NotFound(String),
}

impl DbError {
    pub fn code(&self) -> &'static str {
        match self {
            DbError::Sqlite(_) => "DATABASE_ERROR",
            DbError::Serialization(_) => "SERIALIZATION_ERROR",
            DbError::AlreadyActivelyEnrolled { .. } => "ALREADY_ENROLLED",
            DbError::NotFound(_) => "NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
