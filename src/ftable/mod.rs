//! Inverse lookup table for extracted features.
//!
//! Feature vectors only carry 64-bit keys; this table maps a key back to
//! the byte sequence that produced it. It also counts insertions and
//! collisions so the dispersion of the hashing can be assessed. The table
//! is an owned handle, shared by reference between extractors; writes are
//! serialized through a single mutex, so extraction workers stage entries
//! locally and flush them in one batch.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::fvec::FeatureKey;

#[derive(Debug, Default)]
struct TableInner {
    map: HashMap<FeatureKey, Vec<u8>>,
    insertions: u64,
    collisions: u64,
}

/// Shared key → bytes map with collision accounting.
#[derive(Debug, Default)]
pub struct FeatureTable {
    inner: Mutex<TableInner>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a feature under its key. A duplicate put with identical
    /// bytes is a no-op; differing bytes under the same key count as a
    /// collision and keep the first entry.
    pub fn put(&self, key: FeatureKey, data: &[u8]) {
        let mut inner = self.inner.lock();
        Self::put_locked(&mut inner, key, data);
    }

    /// Flushes a staged batch of entries under one lock acquisition.
    pub fn put_all(&self, entries: Vec<(FeatureKey, Vec<u8>)>) {
        let mut inner = self.inner.lock();
        for (key, data) in entries {
            Self::put_locked(&mut inner, key, &data);
        }
    }

    fn put_locked(inner: &mut TableInner, key: FeatureKey, data: &[u8]) {
        match inner.map.get(&key) {
            Some(existing) => {
                if existing.as_slice() != data {
                    inner.collisions += 1;
                }
            }
            None => {
                inner.map.insert(key, data.to_vec());
                inner.insertions += 1;
            }
        }
    }

    /// Returns a copy of the bytes stored under a key.
    pub fn get(&self, key: FeatureKey) -> Option<Vec<u8>> {
        self.inner.lock().map.get(&key).cloned()
    }

    pub fn remove(&self, key: FeatureKey) {
        self.inner.lock().map.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    pub fn insertions(&self) -> u64 {
        self.inner.lock().insertions
    }

    pub fn collisions(&self) -> u64 {
        self.inner.lock().collisions
    }

    /// Fraction of puts that collided; 0 for an untouched table.
    pub fn collision_ratio(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.insertions == 0 {
            return 0.0;
        }
        inner.collisions as f64 / inner.insertions as f64
    }

    /// Drops all entries and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.insertions = 0;
        inner.collisions = 0;
    }

    /// Snapshot of all entries ordered by key; used by persistence.
    pub fn entries_sorted(&self) -> Vec<(FeatureKey, Vec<u8>)> {
        let inner = self.inner.lock();
        let mut entries: Vec<_> = inner.map.iter().map(|(&k, v)| (k, v.clone())).collect();
        entries.sort_unstable_by_key(|&(k, _)| k);
        entries
    }
}

impl std::fmt::Display for FeatureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        write!(
            f,
            "feature table: size={}, puts={}, collisions={}",
            inner.map.len(),
            inner.insertions,
            inner.collisions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let table = FeatureTable::new();
        table.put(0xdead, b"CreateFileA");
        assert_eq!(table.get(0xdead).unwrap(), b"CreateFileA");
        assert_eq!(table.get(0xbeef), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.insertions(), 1);
    }

    #[test]
    fn duplicate_put_is_idempotent() {
        let table = FeatureTable::new();
        table.put(1, b"x");
        table.put(1, b"x");
        assert_eq!(table.insertions(), 1);
        assert_eq!(table.collisions(), 0);
    }

    #[test]
    fn differing_bytes_count_as_collision() {
        let table = FeatureTable::new();
        table.put(1, b"x");
        table.put(1, b"y");
        assert_eq!(table.collisions(), 1);
        // First writer wins.
        assert_eq!(table.get(1).unwrap(), b"x");
        assert!((table.collision_ratio() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn batched_put() {
        let table = FeatureTable::new();
        table.put_all(vec![(1, b"a".to_vec()), (2, b"b".to_vec()), (1, b"a".to_vec())]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.insertions(), 2);
    }

    #[test]
    fn clear_resets_counters() {
        let table = FeatureTable::new();
        table.put(1, b"a");
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.insertions(), 0);
        assert_eq!(table.collision_ratio(), 0.0);
    }

    #[test]
    fn sorted_snapshot() {
        let table = FeatureTable::new();
        table.put(3, b"c");
        table.put(1, b"a");
        table.put(2, b"b");
        let keys: Vec<_> = table.entries_sorted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }
}
