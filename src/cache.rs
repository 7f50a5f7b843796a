//! Direct-mapped operation cache.
//!
//! Each key hashes to exactly one slot; collisions overwrite. This is the
//! computed table that keeps `apply_ite` from recomputing shared subproblems.

use crate::utils::MyHash;

pub struct OpCache<K, V> {
    entries: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: usize,
    misses: usize,
}

impl<K, V> OpCache<K, V> {
    /// Creates a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits should be in the range 0..=31");

        let size = 1usize << bits;

        Self {
            entries: (0..size).map(|_| None).collect(),
            bitmask: (size - 1) as u64,
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
    pub fn hits(&self) -> usize {
        self.hits
    }
    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl<K, V> OpCache<K, V>
where
    K: MyHash + Eq,
    V: Copy,
{
    #[inline]
    fn index(&self, key: &K) -> usize {
        (key.hash() & self.bitmask) as usize
    }

    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = self.index(key);

        match &self.entries[idx] {
            Some((k, v)) if k == key => {
                self.hits += 1;
                Some(v)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        let idx = self.index(&key);
        self.entries[idx] = Some((key, value));
    }
}
