//! Convenient imports for framestate.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```ignore
//! use framestate::prelude::*;
//!
//! let rt = FrameRuntime::new();
//! let count = rt.frame(|f| rt.cell(f, 0))?;
//! ```

// Main entry point
pub use crate::runtime::{FrameRuntime, FrameRuntimeBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Framed collections
pub use crate::primitives::{StateList, StateMap};

// Core types
pub use crate::types::{
    Frame, FrameData, FrameId, FrameOptions, RestoreError, StateCell, StateId, Value,
};

// Persistent collections
pub use crate::types::{PersistentOrderedMap, PersistentOrderedSet};
