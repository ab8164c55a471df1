//! Job manager error types

use thiserror::Error;

use crate::event_store::StoreError;

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

/// Errors returned to callers of the job manager
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(i64),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(JobError::NotFound(7).to_string(), "job not found: 7");

        let err: JobError = StoreError::Poisoned("disk gone".to_string()).into();
        assert!(matches!(err, JobError::Store(_)));
    }
}
