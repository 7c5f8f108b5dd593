//! Insertion-ordered persistent map
//!
//! A [`PersistentHashMap`] from key to [`Links`] (value plus the keys of the
//! previous and next entries) together with the first and last keys. Adding
//! a key rewrites only the old last entry's links; removing one relinks its
//! two neighbours. Both are path copies in the trie, never a full copy.
//!
//! [`OrderedMapBuilder`] batches edits on a privately owned copy and hands
//! back an immutable value from [`OrderedMapBuilder::build`].

use crate::hamt::PersistentHashMap;
use framestate_core::{Error, Result};
use std::hash::Hash;

/// Value plus neighbour keys of one entry
#[derive(Debug, Clone)]
pub(crate) struct Links<K, V> {
    value: V,
    prev: Option<K>,
    next: Option<K>,
}

/// Immutable map that iterates in insertion order
pub struct PersistentOrderedMap<K, V> {
    map: PersistentHashMap<K, Links<K, V>>,
    first: Option<K>,
    last: Option<K>,
}

impl<K: Clone, V> Clone for PersistentOrderedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            first: self.first.clone(),
            last: self.last.clone(),
        }
    }
}

impl<K, V> Default for PersistentOrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PersistentOrderedMap<K, V> {
    /// The empty map
    pub const fn new() -> Self {
        Self {
            map: PersistentHashMap::new(),
            first: None,
            last: None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// True if both maps share the same trie root
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.map.ptr_eq(&other.map)
    }
}

impl<K: Hash + Eq, V> PersistentOrderedMap<K, V> {
    /// Look up a value
    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|links| &links.value)
    }

    /// True if the key is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// First key in insertion order
    pub fn first_key(&self) -> Option<&K> {
        self.first.as_ref()
    }

    /// Last key in insertion order
    pub fn last_key(&self) -> Option<&K> {
        self.last.as_ref()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            map: &self.map,
            next: self.first.as_ref(),
            remaining: self.len(),
        }
    }

    /// Iterate keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Iterate values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}

impl<K: Hash + Eq + Clone, V: Clone> PersistentOrderedMap<K, V> {
    /// A new map with `key` bound to `value`. An existing key keeps its position.
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut next = self.clone();
        next.insert_mut(key, value);
        next
    }

    /// A new map without `key`
    pub fn remove(&self, key: &K) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }
        let mut next = self.clone();
        next.remove_mut(key);
        next
    }

    /// Start a batch of edits from this value
    pub fn builder(&self) -> OrderedMapBuilder<K, V> {
        OrderedMapBuilder {
            inner: self.clone(),
            mod_count: 0,
        }
    }

    pub(crate) fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(key).map(|links| &mut links.value)
    }

    /// Returns the replaced value, `None` if the key was new
    pub(crate) fn insert_mut(&mut self, key: K, value: V) -> Option<V> {
        if let Some(links) = self.map.get_mut(&key) {
            return Some(std::mem::replace(&mut links.value, value));
        }
        let prev = self.last.take();
        match &prev {
            Some(last) => {
                if let Some(links) = self.map.get_mut(last) {
                    links.next = Some(key.clone());
                }
            }
            None => self.first = Some(key.clone()),
        }
        self.map.insert_mut(
            key.clone(),
            Links {
                value,
                prev,
                next: None,
            },
        );
        self.last = Some(key);
        None
    }

    pub(crate) fn remove_mut(&mut self, key: &K) -> Option<V> {
        let links = self.map.remove_mut(key)?;
        match &links.prev {
            Some(prev) => {
                if let Some(p) = self.map.get_mut(prev) {
                    p.next = links.next.clone();
                }
            }
            None => self.first = links.next.clone(),
        }
        match &links.next {
            Some(next) => {
                if let Some(n) = self.map.get_mut(next) {
                    n.prev = links.prev.clone();
                }
            }
            None => self.last = links.prev.clone(),
        }
        Some(links.value)
    }

    /// Key following `key` in insertion order
    pub(crate) fn next_key(&self, key: &K) -> Option<&K> {
        self.map.get(key).and_then(|links| links.next.as_ref())
    }
}

impl<K: Hash + Eq + Clone, V: Clone> FromIterator<(K, V)> for PersistentOrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PersistentOrderedMap::new();
        for (k, v) in iter {
            map.insert_mut(k, v);
        }
        map
    }
}

impl<K: Hash + Eq + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug
    for PersistentOrderedMap<K, V>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for PersistentOrderedMap<K, V> {
    /// Maps are equal when they hold equal entries in the same order
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

/// Insertion-order iterator over a [`PersistentOrderedMap`]
pub struct Iter<'a, K, V> {
    map: &'a PersistentHashMap<K, Links<K, V>>,
    next: Option<&'a K>,
    remaining: usize,
}

impl<'a, K: Hash + Eq, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.next?;
        let (key, links) = self.map.get_key_value(key)?;
        self.next = links.next.as_ref();
        self.remaining -= 1;
        Some((key, &links.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Hash + Eq, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Transient editor for a [`PersistentOrderedMap`]
///
/// Edits land in place on nodes the builder already owns and copy nodes it
/// still shares with the map it started from. Structural edits (new keys,
/// removals, clear) bump a modification count that [`MapCursor`]s check.
pub struct OrderedMapBuilder<K, V> {
    inner: PersistentOrderedMap<K, V>,
    mod_count: u64,
}

impl<K: Hash + Eq + Clone, V: Clone> Default for OrderedMapBuilder<K, V> {
    fn default() -> Self {
        PersistentOrderedMap::new().builder()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> OrderedMapBuilder<K, V> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Look up a value
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Mutable access to a value. Not a structural edit.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// True if the key is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Insert or replace; returns the replaced value
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let replaced = self.inner.insert_mut(key, value);
        if replaced.is_none() {
            self.mod_count += 1;
        }
        replaced
    }

    /// Remove a key; returns its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.inner.remove_mut(key);
        if removed.is_some() {
            self.mod_count += 1;
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        if !self.inner.is_empty() {
            self.inner = PersistentOrderedMap::new();
            self.mod_count += 1;
        }
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.inner.iter()
    }

    /// Current modification count
    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    /// Cursor positioned before the first entry
    pub fn cursor(&self) -> MapCursor<K> {
        MapCursor {
            expected_mod_count: self.mod_count,
            next: self.inner.first.clone(),
            last_returned: None,
        }
    }

    /// Materialize an immutable map. The builder stays usable; later edits
    /// copy whatever they share with the built value.
    pub fn build(&self) -> PersistentOrderedMap<K, V> {
        self.inner.clone()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Extend<(K, V)> for OrderedMapBuilder<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

/// Detached cursor over an [`OrderedMapBuilder`]
///
/// The cursor does not borrow the builder between steps, so the builder can
/// be edited while a traversal is in progress. Any structural edit not made
/// through [`MapCursor::remove`] makes the next step fail with
/// [`Error::ConcurrentModification`].
#[derive(Debug, Clone)]
pub struct MapCursor<K> {
    expected_mod_count: u64,
    next: Option<K>,
    last_returned: Option<K>,
}

impl<K: Hash + Eq + Clone> MapCursor<K> {
    fn check<V: Clone>(&self, builder: &OrderedMapBuilder<K, V>) -> Result<()> {
        if builder.mod_count != self.expected_mod_count {
            return Err(Error::ConcurrentModification {
                expected: self.expected_mod_count,
                actual: builder.mod_count,
            });
        }
        Ok(())
    }

    /// True if another entry follows
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Advance and return the next entry
    pub fn next<V: Clone>(&mut self, builder: &OrderedMapBuilder<K, V>) -> Result<Option<(K, V)>> {
        self.check(builder)?;
        let Some(key) = self.next.take() else {
            return Ok(None);
        };
        let value = builder.inner.get(&key).cloned().ok_or_else(|| {
            Error::illegal_state("ordered map links point at a missing key")
        })?;
        self.next = builder.inner.next_key(&key).cloned();
        self.last_returned = Some(key.clone());
        Ok(Some((key, value)))
    }

    /// Remove the entry most recently returned by [`MapCursor::next`]
    pub fn remove<V: Clone>(&mut self, builder: &mut OrderedMapBuilder<K, V>) -> Result<V> {
        self.check(builder)?;
        let key = self
            .last_returned
            .take()
            .ok_or_else(|| Error::illegal_state("remove called before next"))?;
        let value = builder
            .remove(&key)
            .ok_or_else(|| Error::illegal_state("cursor entry already removed"))?;
        self.expected_mod_count = builder.mod_count;
        Ok(value)
    }
}
