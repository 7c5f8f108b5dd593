//! Frame-based transactional state
//!
//! This crate implements the snapshot layer of framestate:
//! - [`StateCell`]: a mutable value with one record per writing frame
//! - [`Frame`]: an isolated, all-or-nothing view over every cell
//! - [`FrameRegistry`]: open frame bookkeeping and first-committer-wins
//!   conflict detection at commit time
//! - Read and commit observers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod frame;
pub mod id_set;
pub mod observer;
pub mod record;
pub mod registry;

pub use frame::{AbortHook, Frame, FrameData, FrameOptions, RestoreError};
pub use id_set::FrameIdSet;
pub use observer::{CommitObserver, ObserverHandle, ReadObserver};
pub use record::{StateCell, StateObject, StateRef};
pub use registry::{FrameMetrics, FrameRegistry, RegistryConfig};
