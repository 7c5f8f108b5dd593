//! Unified error types for framestate.
//!
//! This module provides a clean error type that wraps internal errors
//! and presents a consistent interface to users.

use thiserror::Error;

/// All framestate errors.
///
/// This is the canonical error type of the public API. It hides the
/// internal taxonomy behind a small set of stable categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Operation not permitted now (frame already open on this thread,
    /// write through a read-only frame, suspending a nested frame)
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Write/write conflict at commit; the transaction may be retried
    #[error("conflict: {0}")]
    Conflict(String),

    /// A builder changed under an open cursor
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Invalid key (blank save key)
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A value cannot cross the save/restore boundary
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for framestate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors (conflicts) may succeed when the transaction is run
    /// again in a fresh frame.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

// Convert from internal core errors
impl From<framestate_core::Error> for Error {
    fn from(e: framestate_core::Error) -> Self {
        use framestate_core::Error as CoreError;
        match e {
            CoreError::IllegalState(msg) => Error::IllegalState(msg),
            CoreError::ReadOnlyWrite(frame) => {
                Error::IllegalState(format!("frame {} is read-only", frame))
            }
            e @ CoreError::FrameConflict { .. } => Error::Conflict(e.to_string()),
            e @ CoreError::ConcurrentModification { .. } => {
                Error::ConcurrentModification(e.to_string())
            }
            CoreError::InvalidKey(msg) => Error::InvalidKey(msg),
            e @ CoreError::CannotBeSaved { .. } => Error::Serialization(e.to_string()),
            e @ CoreError::NoRecordFound { .. } => Error::Internal(e.to_string()),
        }
    }
}

// A failed restore keeps only the error; the frame data is dropped and aborts
impl From<framestate_concurrency::RestoreError> for Error {
    fn from(e: framestate_concurrency::RestoreError) -> Self {
        framestate_core::Error::from(e).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
