//! Persistent collections for framestate
//!
//! Immutable, structurally shared collections. Every edit returns a new
//! value that shares all untouched structure with the original, so many
//! frames can each hold their own version of a set derived from a common
//! ancestor without copying it.
//!
//! - [`PersistentHashMap`]: hash array mapped trie
//! - [`PersistentOrderedMap`]: insertion-ordered map on top of the trie
//! - [`PersistentOrderedSet`]: insertion-ordered set
//! - builders for batched edits, with fail-fast detached cursors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hamt;
pub mod ordered_map;
pub mod ordered_set;

pub use hamt::PersistentHashMap;
pub use ordered_map::{MapCursor, OrderedMapBuilder, PersistentOrderedMap};
pub use ordered_set::{OrderedSetBuilder, PersistentOrderedSet, SetCursor};
