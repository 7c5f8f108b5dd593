//! Framed map.
//!
//! A `StateMap` keeps its entries in a persistent ordered map. The first
//! write in a frame shares all structure with the committed map, so a frame
//! that changes one entry of a large map copies only the path to that entry.
//! Entries iterate in insertion order; replacing a value keeps its position.

use crate::error::Result;
use framestate_collections::PersistentOrderedMap;
use framestate_concurrency::{Frame, StateCell};
use std::hash::Hash;

/// Map with frame isolation.
pub struct StateMap<K, V> {
    cell: StateCell<PersistentOrderedMap<K, V>>,
}

impl<K, V> Clone for StateMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<K, V> std::fmt::Debug for StateMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMap").field("cell", &self.cell).finish()
    }
}

impl<K, V> StateMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a map in `frame`.
    pub fn new(frame: &mut Frame, entries: impl IntoIterator<Item = (K, V)>) -> Result<Self> {
        let cell = StateCell::new(frame, entries.into_iter().collect())?;
        Ok(Self { cell })
    }

    /// The cell holding the map.
    pub fn cell(&self) -> &StateCell<PersistentOrderedMap<K, V>> {
        &self.cell
    }

    /// Number of entries.
    pub fn len(&self, frame: &Frame) -> Result<usize> {
        Ok(self.cell.with(frame, |map| map.len())?)
    }

    /// True if the map has no entries.
    pub fn is_empty(&self, frame: &Frame) -> Result<bool> {
        Ok(self.cell.with(frame, |map| map.is_empty())?)
    }

    /// Value for `key`.
    pub fn get(&self, frame: &Frame, key: &K) -> Result<Option<V>> {
        Ok(self.cell.with(frame, |map| map.get(key).cloned())?)
    }

    /// True if `key` is present.
    pub fn contains_key(&self, frame: &Frame, key: &K) -> Result<bool> {
        Ok(self.cell.with(frame, |map| map.contains_key(key))?)
    }

    /// Every entry in insertion order.
    pub fn entries(&self, frame: &Frame) -> Result<Vec<(K, V)>> {
        Ok(self.cell.with(frame, |map| {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })?)
    }

    /// Snapshot of the whole map. Cheap: shares structure with the record.
    pub fn snapshot(&self, frame: &Frame) -> Result<PersistentOrderedMap<K, V>> {
        Ok(self.cell.get(frame)?)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, frame: &mut Frame, key: K, value: V) -> Result<Option<V>> {
        Ok(self.cell.update(frame, |map| {
            let previous = map.get(&key).cloned();
            *map = map.insert(key, value);
            previous
        })?)
    }

    /// Remove `key`, returning its value. Does not write if the key is absent.
    pub fn remove(&self, frame: &mut Frame, key: &K) -> Result<Option<V>> {
        if !self.contains_key(frame, key)? {
            return Ok(None);
        }
        Ok(self.cell.update(frame, |map| {
            let previous = map.get(key).cloned();
            *map = map.remove(key);
            previous
        })?)
    }

    /// Remove every entry. Does not write if the map is already empty.
    pub fn clear(&self, frame: &mut Frame) -> Result<()> {
        if self.is_empty(frame)? {
            return Ok(());
        }
        Ok(self.cell.set(frame, PersistentOrderedMap::new())?)
    }
}
