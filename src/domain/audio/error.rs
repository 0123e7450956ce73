#[derive(Debug, thiserror::Error)]
pub enum AudioSyncError {
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("staging error: {0}")]
    Staging(String),
}
