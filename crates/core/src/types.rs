//! Identity types
//!
//! - [`FrameId`]: monotonically assigned identity of a frame
//! - [`StateId`]: process-unique identity of a state object

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a frame.
///
/// Frame ids are handed out by a frame registry in strictly increasing
/// order starting at 1. A record stamped with a larger id than a frame's own
/// id was written after that frame was opened.
///
/// Id 0 ([`FrameId::INVALID`]) is never assigned to a frame. Records written
/// by an aborted frame are re-stamped with it so that no frame can ever see
/// them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(u64);

impl FrameId {
    /// Stamp of a discarded record. Visible to no frame.
    pub const INVALID: FrameId = FrameId(0);

    /// First id handed out by a fresh registry.
    pub const FIRST: FrameId = FrameId(1);

    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        FrameId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The id immediately after this one
    pub const fn next(self) -> Self {
        FrameId(self.0 + 1)
    }

    /// True for [`FrameId::INVALID`]
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a state object (one mutable cell and its record chain).
///
/// State ids are unique for the lifetime of the process. The cell itself
/// belongs to the frame registry it was created in: frame ids of different
/// registries overlap, so using a cell with another registry is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u64);

impl StateId {
    /// Allocate a fresh, never-before-seen state id
    pub fn next() -> Self {
        StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "state-{}", self.0)
    }
}
