//! Dedup cache: `id -> projection`, single-writer per entity class.
//!
//! Not thread-safe by design — the swarm listener's per-class event loop is
//! the only writer. See the concurrency notes on why no lock is needed here.

use std::collections::HashMap;
use std::hash::Hash;


pub struct DedupCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for DedupCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> DedupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `value` under `key`. Returns `true` if there was no prior entry
    /// or the prior entry differed from `value`.
    pub fn insert_and_check(&mut self, key: K, value: V) -> bool {
        match self.entries.insert(key.clone(), value) {
            None => true,
            Some(prior) => prior != *self.entries.get(&key).expect("just inserted"),
        }
    }

    /// Atomically returns and removes the cached projection for `id`.
    pub fn get_and_remove(&mut self, id: &K) -> (Option<V>, bool) {
        match self.entries.remove(id) {
            Some(v) => (Some(v), true),
            None => (None, false),
        }
    }

    /// Read-only lookup, used on the remove path to build remove-parameters
    /// before the entry itself is drained via `get_and_remove`.
    pub fn get(&self, id: &K) -> Option<&V> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}
