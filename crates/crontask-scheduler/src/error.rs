use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed or missing input. Nothing was mutated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No task with the given ID exists in the store.
    #[error("Task not found: {id}")]
    TaskNotFound { id: i64 },

    /// The cron expression was rejected by the clock source.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted JSON column (headers) could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `bootstrap` may run once per process.
    #[error("Registry already bootstrapped")]
    AlreadyBootstrapped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Short error code string sent to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Validation(_) => "VALIDATION_ERROR",
            SchedulerError::TaskNotFound { .. } => "NOT_FOUND",
            SchedulerError::InvalidCron { .. } => "INVALID_CRON",
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::AlreadyBootstrapped => "ALREADY_BOOTSTRAPPED",
            SchedulerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Validation(_)
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::TaskNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
