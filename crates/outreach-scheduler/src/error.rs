use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] outreach_db::DbError),

    #[error(transparent)]
    Engine(#[from] outreach_engine::EngineError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
