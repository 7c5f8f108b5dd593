//! Persistent hash array mapped trie
//!
//! Every node is reference counted. Mutation goes through [`Arc::make_mut`],
//! which edits a node in place when this map is its only owner and copies it
//! otherwise. The persistent operations (`insert`, `remove`) clone the map
//! handle first, so exactly the nodes on the path from the root to the edited
//! slot are copied and everything else stays shared with the original.
//! A [`PersistentHashMap`] owned by a builder edits in place once its path
//! has been copied.
//!
//! Layout: 32-way branching on successive 5-bit slices of the key's 64-bit
//! hash, starting from the low bits. Two distinct hashes always diverge
//! before the bits run out. Keys whose full hashes are equal share a
//! collision bucket.

use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const BITS: u32 = 5;
const MASK: u64 = (1 << BITS) - 1;

pub(crate) fn hash_of<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

#[inline]
fn bit_for(hash: u64, shift: u32) -> u32 {
    1u32 << ((hash >> shift) & MASK)
}

#[inline]
fn slot_of(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

#[derive(Clone)]
enum Entry<K, V> {
    Leaf(u64, K, V),
    Collision(u64, SmallVec<[(K, V); 2]>),
    Node(Arc<Node<K, V>>),
}

impl<K, V> Entry<K, V> {
    /// Hash shared by every key in a leaf or collision entry
    fn leaf_hash(&self) -> Option<u64> {
        match self {
            Entry::Leaf(h, _, _) | Entry::Collision(h, _) => Some(*h),
            Entry::Node(_) => None,
        }
    }
}

#[derive(Clone)]
struct Node<K, V> {
    bitmap: u32,
    entries: Vec<Entry<K, V>>,
}

impl<K, V> Node<K, V> {
    fn empty() -> Self {
        Node {
            bitmap: 0,
            entries: Vec::new(),
        }
    }

    /// Build the smallest subtree holding two entries with different hashes
    fn pair(shift: u32, h1: u64, e1: Entry<K, V>, h2: u64, e2: Entry<K, V>) -> Self {
        let b1 = bit_for(h1, shift);
        let b2 = bit_for(h2, shift);
        if b1 == b2 {
            let child = Node::pair(shift + BITS, h1, e1, h2, e2);
            Node {
                bitmap: b1,
                entries: vec![Entry::Node(Arc::new(child))],
            }
        } else if b1 < b2 {
            Node {
                bitmap: b1 | b2,
                entries: vec![e1, e2],
            }
        } else {
            Node {
                bitmap: b1 | b2,
                entries: vec![e2, e1],
            }
        }
    }

    fn get<'a>(&'a self, shift: u32, hash: u64, key: &K) -> Option<(&'a K, &'a V)>
    where
        K: Eq,
    {
        let bit = bit_for(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        match &self.entries[slot_of(self.bitmap, bit)] {
            Entry::Leaf(h, k, v) => (*h == hash && k == key).then_some((k, v)),
            Entry::Collision(h, items) if *h == hash => {
                items.iter().find(|(k, _)| k == key).map(|(k, v)| (k, v))
            }
            Entry::Collision(..) => None,
            Entry::Node(child) => child.get(shift + BITS, hash, key),
        }
    }
}

impl<K: Clone + Eq, V: Clone> Node<K, V> {
    fn get_mut(&mut self, shift: u32, hash: u64, key: &K) -> Option<&mut V> {
        let bit = bit_for(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        let slot = slot_of(self.bitmap, bit);
        match &mut self.entries[slot] {
            Entry::Leaf(h, k, v) => (*h == hash && k == key).then_some(v),
            Entry::Collision(h, items) if *h == hash => {
                items.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            Entry::Collision(..) => None,
            Entry::Node(child) => Arc::make_mut(child).get_mut(shift + BITS, hash, key),
        }
    }

    /// Insert or replace; returns the replaced value
    fn insert(&mut self, shift: u32, hash: u64, key: K, value: V) -> Option<V> {
        let bit = bit_for(hash, shift);
        let slot = slot_of(self.bitmap, bit);
        if self.bitmap & bit == 0 {
            self.entries.insert(slot, Entry::Leaf(hash, key, value));
            self.bitmap |= bit;
            return None;
        }
        match &mut self.entries[slot] {
            Entry::Leaf(h, k, v) if *h == hash && *k == key => {
                return Some(std::mem::replace(v, value));
            }
            Entry::Collision(h, items) if *h == hash => {
                if let Some((_, v)) = items.iter_mut().find(|(k, _)| *k == key) {
                    return Some(std::mem::replace(v, value));
                }
                items.push((key, value));
                return None;
            }
            Entry::Node(child) => {
                return Arc::make_mut(child).insert(shift + BITS, hash, key, value);
            }
            _ => {}
        }

        // A leaf or collision bucket with a different key occupies the slot
        let existing = std::mem::replace(&mut self.entries[slot], Entry::Node(Arc::new(Node::empty())));
        let existing_hash = existing.leaf_hash().unwrap_or(hash);
        self.entries[slot] = if existing_hash == hash {
            let mut items = SmallVec::new();
            if let Entry::Leaf(_, k, v) = existing {
                items.push((k, v));
            }
            items.push((key, value));
            Entry::Collision(hash, items)
        } else {
            Entry::Node(Arc::new(Node::pair(
                shift + BITS,
                existing_hash,
                existing,
                hash,
                Entry::Leaf(hash, key, value),
            )))
        };
        None
    }

    /// Remove a key; returns the removed key and value
    fn remove(&mut self, shift: u32, hash: u64, key: &K) -> Option<(K, V)> {
        let bit = bit_for(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        let slot = slot_of(self.bitmap, bit);
        let removed = match &mut self.entries[slot] {
            Entry::Leaf(h, k, _) => {
                if *h != hash || k != key {
                    return None;
                }
                self.bitmap &= !bit;
                match self.entries.remove(slot) {
                    Entry::Leaf(_, k, v) => return Some((k, v)),
                    _ => return None,
                }
            }
            Entry::Collision(h, items) => {
                if *h != hash {
                    return None;
                }
                let pos = items.iter().position(|(k, _)| k == key)?;
                let removed = items.remove(pos);
                if items.len() == 1 {
                    if let Some((k, v)) = items.pop() {
                        self.entries[slot] = Entry::Leaf(hash, k, v);
                    }
                }
                return Some(removed);
            }
            Entry::Node(child) => {
                let child = Arc::make_mut(child);
                let removed = child.remove(shift + BITS, hash, key)?;
                if child.entries.is_empty() {
                    self.entries.remove(slot);
                    self.bitmap &= !bit;
                } else if child.entries.len() == 1 && !matches!(child.entries[0], Entry::Node(_)) {
                    // A lone leaf moves up so lookups stay short
                    if let Some(lifted) = child.entries.pop() {
                        self.entries[slot] = lifted;
                    }
                }
                removed
            }
        };
        Some(removed)
    }
}

/// Immutable, structurally shared hash map
///
/// Cloning is O(1). `insert` and `remove` return a new map and leave `self`
/// untouched; the two maps share every node not on the edited path.
pub struct PersistentHashMap<K, V> {
    root: Option<Arc<Node<K, V>>>,
    len: usize,
}

impl<K, V> Clone for PersistentHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PersistentHashMap<K, V> {
    /// The empty map. It owns no nodes, so every empty map is the same value.
    pub const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if both maps are backed by the same root node
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Iterate entries in hash order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            stack: self
                .root
                .as_ref()
                .map(|root| vec![root.entries.iter()])
                .unwrap_or_default(),
            bucket: [].iter(),
            remaining: self.len,
        }
    }
}

impl<K: Hash + Eq, V> PersistentHashMap<K, V> {
    /// Look up a value
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Look up the stored key and value
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.root.as_ref()?.get(0, hash_of(key), key)
    }

    /// True if the key is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> PersistentHashMap<K, V> {
    /// A new map with `key` bound to `value`
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut next = self.clone();
        next.insert_mut(key, value);
        next
    }

    /// A new map without `key`. Returns a clone of `self` if the key is absent.
    pub fn remove(&self, key: &K) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }
        let mut next = self.clone();
        next.remove_mut(key);
        next
    }

    /// Mutable access to a value, copying shared nodes on the path
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = hash_of(key);
        Arc::make_mut(self.root.as_mut()?).get_mut(0, hash, key)
    }

    /// Insert in place, copying shared nodes on the path
    pub fn insert_mut(&mut self, key: K, value: V) -> Option<V> {
        let hash = hash_of(&key);
        let root = self.root.get_or_insert_with(|| Arc::new(Node::empty()));
        let replaced = Arc::make_mut(root).insert(0, hash, key, value);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Remove in place, copying shared nodes on the path
    pub fn remove_mut(&mut self, key: &K) -> Option<V> {
        let hash = hash_of(key);
        let root = self.root.as_mut()?;
        let (_, value) = Arc::make_mut(root).remove(0, hash, key)?;
        self.len -= 1;
        if self.len == 0 {
            self.root = None;
        }
        Some(value)
    }
}

impl<K: Hash + Eq + Clone, V: Clone> FromIterator<(K, V)> for PersistentHashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PersistentHashMap::new();
        for (k, v) in iter {
            map.insert_mut(k, v);
        }
        map
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for PersistentHashMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over a [`PersistentHashMap`]
pub struct Iter<'a, K, V> {
    stack: Vec<std::slice::Iter<'a, Entry<K, V>>>,
    bucket: std::slice::Iter<'a, (K, V)>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.bucket.next() {
                self.remaining -= 1;
                return Some((k, v));
            }
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(Entry::Leaf(_, k, v)) => {
                    self.remaining -= 1;
                    return Some((k, v));
                }
                Some(Entry::Collision(_, items)) => self.bucket = items.iter(),
                Some(Entry::Node(child)) => self.stack.push(child.entries.iter()),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
