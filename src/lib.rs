//! # framestate
//!
//! Frame-based transactional state for reactive UI runtimes.
//!
//! Every mutable value lives in a [`StateCell`]. Reads and writes go through
//! a [`Frame`]: a point-in-time view in which writes stay private until the
//! frame commits. Commits are all-or-nothing, and when two frames write the
//! same cell the first to commit wins; the other gets [`Error::Conflict`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use framestate::prelude::*;
//!
//! let rt = FrameRuntime::new();
//! let street = rt.frame(|f| rt.cell(f, "123 Any Street".to_string()))?;
//!
//! // Work in one frame, suspend it, look from another
//! let (_, pending) = rt.suspended(|f| Ok(street.set(f, "456 Any Street".into())?))?;
//! assert_eq!(rt.read(|f| Ok(street.get(f)?))?, "123 Any Street");
//!
//! // Resume and commit
//! rt.restored(pending, |_| Ok(()))?;
//! assert_eq!(rt.read_committed(&street)?, "456 Any Street");
//! ```
//!
//! ## Building blocks
//!
//! - [`FrameRuntime`] - frame registry plus saveable state registry
//! - [`StateCell`] - a transactional value
//! - [`StateList`], [`StateMap`] - framed collections
//! - [`PersistentOrderedSet`], [`PersistentOrderedMap`] - structurally shared
//!   collections with builders and fail-fast cursors
//! - [`SaveableStateRegistry`] - save/restore boundary

#![warn(missing_docs)]

mod error;
mod primitives;
mod runtime;
mod types;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use runtime::{FrameRuntime, FrameRuntimeBuilder};

// Re-export primitives
pub use primitives::{StateList, StateMap};

// Re-export types
pub use types::*;
