/// Main application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Lock not acquired: {0}")]
    LockTimeout(String),

    #[error("Persisted data is corrupt: {0}")]
    Integrity(String),

    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    #[error("Invalid input: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the same call and expect a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::Io(_))
    }
}

/// Custom result type for the application
pub type AppResult<T> = Result<T, AppError>;
