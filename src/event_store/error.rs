//! Error types for the event store

use std::io;

use thiserror::Error;

use crate::codec::{CodecError, CodecKind};

/// Result type for EventStore operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by EventStore operations
///
/// The store never retries; every error goes straight back to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encoding failed before anything was written; no id was consumed
    #[error("could not encode event at batch index {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: CodecError,
    },

    /// One-by-one write failed part way; the first `committed` rows are durable
    #[error("batch interrupted after {committed} committed rows: {source}")]
    BatchInterrupted {
        committed: usize,
        #[source]
        source: io::Error,
    },

    #[error("store was created with codec {stored}, but {requested} was requested")]
    CodecMismatch {
        stored: CodecKind,
        requested: CodecKind,
    },

    #[error("corrupt store header: {0}")]
    CorruptHeader(String),

    /// A failed write could not be rolled back; the log tail is unknown
    #[error("store is unusable after a failed rollback: {0}")]
    Poisoned(String),
}

/// A stored row whose raw text could not be decoded
///
/// Scoped to one row: multi-row reads report it next to the rows that did
/// decode instead of failing as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {id} could not be decoded: {reason}")]
pub struct DataCorruption {
    pub id: i64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_corruption_names_the_row() {
        let c = DataCorruption {
            id: 42,
            reason: "bad zlib".to_string(),
        };
        assert!(c.to_string().contains("event 42"));
    }

    #[test]
    fn test_codec_mismatch_message() {
        let err = StoreError::CodecMismatch {
            stored: CodecKind::Zlib,
            requested: CodecKind::Plain,
        };
        assert_eq!(
            err.to_string(),
            "store was created with codec zlib, but plain was requested"
        );
    }
}
