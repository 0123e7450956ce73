use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum EpisodeServiceError {
    #[error("episode not found: {0}")]
    NotFound(String),
    #[error("lock contention: {0}")]
    LockTimeout(String),
    #[error("corrupt episode document: {0}")]
    Integrity(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("dependency error: {0}")]
    Dependency(String),
}

impl EpisodeServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::Dependency(_))
    }
}

impl From<AppError> for EpisodeServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => EpisodeServiceError::NotFound(msg),
            AppError::LockTimeout(msg) => EpisodeServiceError::LockTimeout(msg),
            AppError::Integrity(msg) => EpisodeServiceError::Integrity(msg),
            AppError::BadRequest(msg) => EpisodeServiceError::Invalid(msg),
            _ => EpisodeServiceError::Dependency(err.to_string()),
        }
    }
}
