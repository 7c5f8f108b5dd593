//! Public types for the framestate API.
//!
//! This module re-exports types from internal crates with a clean public interface.

// Identity and payload types
pub use framestate_core::{FrameId, Opaque, StateId, Value};

// Frames and cells
pub use framestate_concurrency::{
    AbortHook, CommitObserver, Frame, FrameData, FrameMetrics, FrameOptions, FrameRegistry,
    ObserverHandle, ReadObserver, RegistryConfig, RestoreError, StateCell,
};

// Persistent collections
pub use framestate_collections::{
    MapCursor, OrderedMapBuilder, OrderedSetBuilder, PersistentHashMap, PersistentOrderedMap,
    PersistentOrderedSet, SetCursor,
};

// Save and restore
pub use framestate_saveable::{CanBeSaved, RegistrationHandle, SaveableStateRegistry, SavedState};
