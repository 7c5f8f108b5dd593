//! Error types shared by all framestate crates
//!
//! The taxonomy mirrors how failures are meant to be handled:
//! - [`Error::IllegalState`]: API misuse (frame already open on this thread,
//!   operating on a closed frame, suspending a nested frame)
//! - [`Error::FrameConflict`]: commit-time write/write conflict; the frame
//!   has been aborted and the caller must retry or give up
//! - [`Error::NoRecordFound`]: a record chain invariant was violated, a bug
//! - [`Error::ConcurrentModification`]: a builder cursor saw the builder
//!   change underneath it

use crate::types::{FrameId, StateId};
use thiserror::Error;

/// Internal error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation is not permitted in the current state
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A write in this frame collides with a write committed by another frame
    #[error("frame {frame} conflicts on {state}: another frame committed a write first")]
    FrameConflict {
        /// Frame whose commit failed
        frame: FrameId,
        /// First state object found in conflict
        state: StateId,
    },

    /// A write was attempted through a read-only frame
    #[error("frame {0} is read-only")]
    ReadOnlyWrite(FrameId),

    /// No record of the state object is visible to the frame
    #[error("no record of {state} is visible in frame {frame}")]
    NoRecordFound {
        /// State object that was read
        state: StateId,
        /// Frame the read was made in
        frame: FrameId,
    },

    /// A cursor observed a structural change it did not make
    #[error("concurrent modification: expected modification count {expected}, found {actual}")]
    ConcurrentModification {
        /// Modification count captured by the cursor
        expected: u64,
        /// Modification count found on the collection
        actual: u64,
    },

    /// A key was rejected (blank save key, unknown key)
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A value offered for saving cannot be saved
    #[error("value of type {type_name} registered under '{key}' cannot be saved")]
    CannotBeSaved {
        /// Key the provider was registered under
        key: String,
        /// Type name of the rejected value
        type_name: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for [`Error::IllegalState`]
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    /// True for failures that may succeed when the transaction is retried
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::FrameConflict { .. })
    }

    /// True for invariant violations that indicate a bug
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NoRecordFound { .. })
    }
}
