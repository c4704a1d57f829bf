use thiserror::Error;
use uuid::Uuid;

pub type SegmentResult<T> = Result<T, SegmentError>;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed condition: {0}")]
    MalformedCondition(String),

    #[error("Segment not found: {0}")]
    NotFound(Uuid),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SegmentError {
    /// Whether the error was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SegmentError::Validation(_)
                | SegmentError::MalformedCondition(_)
                | SegmentError::NotFound(_)
        )
    }
}
