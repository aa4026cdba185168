//! Error types for the engine.

use thiserror::Error;

/// Convenience alias used across the collaborator traits and the runner.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while executing a job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced job does not exist. Fatal and non-retryable.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// A persistence collaborator failed.
    #[error("storage error: {0}")]
    Store(String),

    /// A non-storage collaborator failed in an unclassified way. Recorded
    /// against the job, then re-thrown so the outer queue can retry or
    /// dead-letter.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// A transient condition reported by a collaborator. Chain advancement
    /// is always suppressed so the outer retry mechanism re-attempts the
    /// same job.
    #[error("transient error, retry later: {0}")]
    Backoff(String),
}

impl EngineError {
    /// Whether this error is in the backoff class. The single
    /// classification point: collaborators decide the class when they
    /// construct the error, never by message inspection upstream.
    pub fn is_backoff(&self) -> bool {
        matches!(self, Self::Backoff(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backoff_variant_is_backoff_class() {
        assert!(EngineError::Backoff("provider throttled".into()).is_backoff());
        assert!(!EngineError::JobNotFound("job-1".into()).is_backoff());
        assert!(!EngineError::Store("write failed".into()).is_backoff());
        assert!(!EngineError::Collaborator("sender crashed".into()).is_backoff());
    }

    #[test]
    fn messages_carry_context() {
        let err = EngineError::JobNotFound("job-42".into());
        assert_eq!(err.to_string(), "job not found: job-42");
    }
}
