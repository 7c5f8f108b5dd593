//! Core types for framestate
//!
//! This crate defines the vocabulary shared by every other crate:
//! - [`FrameId`] and [`StateId`]: identities of frames and state objects
//! - [`Error`]: the internal error taxonomy
//! - [`Value`]: the payload model used at the save/restore boundary

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use types::{FrameId, StateId};
pub use value::{Opaque, Value};
