//! Insertion-ordered persistent set
//!
//! A thin layer over [`PersistentOrderedMap`] with unit values. This is the
//! collection frames use to track which state objects they wrote: every
//! frame holds its own value, and frames derived from a common ancestor
//! share everything they did not change.

use crate::ordered_map::{self, MapCursor, OrderedMapBuilder, PersistentOrderedMap};
use framestate_core::Result;
use std::hash::Hash;

/// Immutable set that iterates in insertion order
pub struct PersistentOrderedSet<E> {
    map: PersistentOrderedMap<E, ()>,
}

impl<E: Clone> Clone for PersistentOrderedSet<E> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<E> Default for PersistentOrderedSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PersistentOrderedSet<E> {
    /// The empty set. Every empty set is this one value; it owns no nodes.
    pub const fn new() -> Self {
        Self {
            map: PersistentOrderedMap::new(),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if there are no elements
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// True if both sets share the same trie root
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.map.ptr_eq(&other.map)
    }
}

impl<E: Hash + Eq> PersistentOrderedSet<E> {
    /// True if the element is present
    pub fn contains(&self, element: &E) -> bool {
        self.map.contains_key(element)
    }

    /// First element in insertion order
    pub fn first(&self) -> Option<&E> {
        self.map.first_key()
    }

    /// Last element in insertion order
    pub fn last(&self) -> Option<&E> {
        self.map.last_key()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> Iter<'_, E> {
        Iter {
            inner: self.map.iter(),
        }
    }
}

impl<E: Hash + Eq + Clone> PersistentOrderedSet<E> {
    /// A new set that also contains `element`. Returns a clone of `self`
    /// (sharing its root) if the element is already present.
    pub fn add(&self, element: E) -> Self {
        if self.contains(&element) {
            return self.clone();
        }
        Self {
            map: self.map.insert(element, ()),
        }
    }

    /// A new set without `element`
    pub fn remove(&self, element: &E) -> Self {
        Self {
            map: self.map.remove(element),
        }
    }

    /// A new set holding the elements of `self` followed by the new
    /// elements of `other`
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        let mut builder = self.builder();
        builder.extend(other.iter().cloned());
        builder.build()
    }

    /// Start a batch of edits from this value
    pub fn builder(&self) -> OrderedSetBuilder<E> {
        OrderedSetBuilder {
            inner: self.map.builder(),
        }
    }
}

impl<E: Hash + Eq + Clone> FromIterator<E> for PersistentOrderedSet<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut builder = PersistentOrderedSet::new().builder();
        builder.extend(iter);
        builder.build()
    }
}

impl<E: Hash + Eq> PartialEq for PersistentOrderedSet<E> {
    /// Set equality: same elements regardless of order
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|e| other.contains(e))
    }
}

impl<E: Hash + Eq> Eq for PersistentOrderedSet<E> {}

impl<E: Hash + Eq + std::fmt::Debug> std::fmt::Debug for PersistentOrderedSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, E: Hash + Eq> IntoIterator for &'a PersistentOrderedSet<E> {
    type Item = &'a E;
    type IntoIter = Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Insertion-order iterator over a [`PersistentOrderedSet`]
pub struct Iter<'a, E> {
    inner: ordered_map::Iter<'a, E, ()>,
}

impl<'a, E: Hash + Eq> Iterator for Iter<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(e, _)| e)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<E: Hash + Eq> ExactSizeIterator for Iter<'_, E> {}

/// Transient editor for a [`PersistentOrderedSet`]
pub struct OrderedSetBuilder<E> {
    inner: OrderedMapBuilder<E, ()>,
}

impl<E: Hash + Eq + Clone> Default for OrderedSetBuilder<E> {
    fn default() -> Self {
        PersistentOrderedSet::new().builder()
    }
}

impl<E: Hash + Eq + Clone> OrderedSetBuilder<E> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if there are no elements
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// True if the element is present
    pub fn contains(&self, element: &E) -> bool {
        self.inner.contains_key(element)
    }

    /// Add an element; returns false if it was already present
    pub fn add(&mut self, element: E) -> bool {
        if self.inner.contains_key(&element) {
            return false;
        }
        self.inner.insert(element, ());
        true
    }

    /// Remove an element; returns false if it was absent
    pub fn remove(&mut self, element: &E) -> bool {
        self.inner.remove(element).is_some()
    }

    /// Remove every element
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> Iter<'_, E> {
        Iter {
            inner: self.inner.iter(),
        }
    }

    /// Cursor positioned before the first element
    pub fn cursor(&self) -> SetCursor<E> {
        SetCursor {
            inner: self.inner.cursor(),
        }
    }

    /// Materialize an immutable set
    pub fn build(&self) -> PersistentOrderedSet<E> {
        PersistentOrderedSet {
            map: self.inner.build(),
        }
    }
}

impl<E: Hash + Eq + Clone> Extend<E> for OrderedSetBuilder<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        for e in iter {
            self.add(e);
        }
    }
}

/// Detached cursor over an [`OrderedSetBuilder`]; see [`MapCursor`]
#[derive(Debug, Clone)]
pub struct SetCursor<E> {
    inner: MapCursor<E>,
}

impl<E: Hash + Eq + Clone> SetCursor<E> {
    /// True if another element follows
    pub fn has_next(&self) -> bool {
        self.inner.has_next()
    }

    /// Advance and return the next element
    pub fn next(&mut self, builder: &OrderedSetBuilder<E>) -> Result<Option<E>> {
        Ok(self.inner.next(&builder.inner)?.map(|(e, ())| e))
    }

    /// Remove the element most recently returned by [`SetCursor::next`]
    pub fn remove(&mut self, builder: &mut OrderedSetBuilder<E>) -> Result<()> {
        self.inner.remove(&mut builder.inner)
    }
}
