//! Error types for trainlet

use thiserror::Error;

/// Main error type for trainlet
#[derive(Error, Debug)]
pub enum TrainletError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource store error
    #[error("Store error: {0}")]
    Store(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Training executor error
    #[error("Executor error: {0}")]
    Executor(String),

    /// Visualization backend error
    #[error("Backend error: {0}")]
    Backend(String),

    /// GPU error
    #[error("GPU error: {0}")]
    Gpu(String),

    /// GPU reservation rejected
    #[error("Allocation conflict: {0}")]
    AllocationConflict(String),

    /// Run not found
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Agent not found
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Backing directory missing or unresolvable
    #[error("Directory missing: {0}")]
    DirectoryMissing(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for trainlet operations
pub type TrainletResult<T> = Result<T, TrainletError>;

impl From<serde_json::Error> for TrainletError {
    fn from(err: serde_json::Error) -> Self {
        TrainletError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TrainletError {
    fn from(err: toml::de::Error) -> Self {
        TrainletError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainletError::AllocationConflict("GPU 1 already allocated".to_string());
        assert_eq!(err.to_string(), "Allocation conflict: GPU 1 already allocated");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrainletError = io_err.into();
        assert!(matches!(err, TrainletError::Io(_)));
    }
}
