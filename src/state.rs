//! Pooled, reference-counted state handles.
//!
//! Every configuration handed to the search is wrapped in a pool slot
//! carrying the shared configuration, its precomputed hash and an intrusive
//! reference count. [`StatePool::retain`] and [`StatePool::release`] are the
//! only entry points that touch the count; the slot is recycled exactly when
//! the count reaches zero, which also drops the slot's share of the
//! configuration.
//!
//! The pool is fixed-size, like the consing table: allocation past the
//! capacity panics.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::trace;

use crate::zg::Config;

/// Opaque handle to a pooled state.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StateId(u32);

impl StateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct Slot {
    config: Option<Rc<Config>>,
    hash: u64,
    count: u32,
}

pub struct StatePool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl StatePool {
    /// Create a pool with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Pool bits should be in the range 0..=31");
        let capacity = 1 << bits;
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            config: None,
            hash: 0,
            count: 0,
        });
        Self {
            slots,
            free: (0..capacity as u32).rev().collect(),
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live (allocated) states.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Wrap a configuration in a fresh slot with reference count 1.
    pub fn insert(&mut self, config: Rc<Config>) -> StateId {
        let Some(index) = self.free.pop() else {
            panic!("State pool is full");
        };
        let mut hasher = DefaultHasher::new();
        config.hash(&mut hasher);
        let slot = &mut self.slots[index as usize];
        slot.hash = hasher.finish();
        slot.count = 1;
        slot.config = Some(config);
        self.live += 1;
        trace!("insert -> {:?}", StateId(index));
        StateId(index)
    }

    fn slot(&self, id: StateId) -> &Slot {
        let slot = &self.slots[id.index()];
        assert!(slot.count > 0, "State {:?} is not allocated", id);
        slot
    }

    /// Increment the reference count. Returns the same handle.
    pub fn retain(&mut self, id: StateId) -> StateId {
        let slot = &mut self.slots[id.index()];
        assert!(slot.count > 0, "State {:?} is not allocated", id);
        slot.count += 1;
        id
    }

    /// Decrement the reference count; tear the slot down at zero.
    /// Returns true when the slot was recycled.
    pub fn release(&mut self, id: StateId) -> bool {
        let slot = &mut self.slots[id.index()];
        assert!(slot.count > 0, "State {:?} is not allocated", id);
        slot.count -= 1;
        if slot.count > 0 {
            return false;
        }
        slot.config = None; // drops this wrapper's share of the configuration
        self.free.push(id.index() as u32);
        self.live -= 1;
        trace!("release: recycled {:?}", id);
        true
    }

    /// O(1): the hash is computed once, at insertion.
    pub fn hash(&self, id: StateId) -> u64 {
        self.slot(id).hash
    }

    pub fn config(&self, id: StateId) -> &Rc<Config> {
        self.slot(id)
            .config
            .as_ref()
            .expect("allocated slot holds a configuration")
    }

    /// Total order on states: identity first, then cached hashes, ties
    /// broken by the structural order of the configurations. `Equal` holds
    /// iff the underlying configurations are equal.
    pub fn compare(&self, a: StateId, b: StateId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let sa = self.slot(a);
        let sb = self.slot(b);
        match sa.hash.cmp(&sb.hash) {
            Ordering::Equal => sa.config.cmp(&sb.config),
            other => other,
        }
    }

    /// Bulk teardown: destroy every outstanding state regardless of its
    /// count. Only the adapter's teardown path may call this.
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.count > 0 {
                slot.count = 0;
                slot.config = None;
                self.free.push(i as u32);
            }
        }
        self.live = 0;
    }
}

/// Deduplication table over pooled states, keyed by hash with collisions
/// resolved through [`StatePool::compare`]. Holds one retained reference
/// per canonical state.
#[derive(Default)]
pub struct StateTable {
    buckets: HashMap<u64, Vec<StateId>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical handle for `id`, taking ownership of the
    /// caller's reference: if an equal state is already known the new
    /// reference is released, otherwise `id` itself becomes canonical.
    pub fn canonicalize(&mut self, pool: &mut StatePool, id: StateId) -> StateId {
        let hash = pool.hash(id);
        let bucket = self.buckets.entry(hash).or_default();
        for &known in bucket.iter() {
            if known == id {
                return known;
            }
            if pool.compare(known, id) == Ordering::Equal {
                pool.release(id);
                return known;
            }
        }
        bucket.push(id);
        id
    }

    /// Release every canonical reference held by the table.
    pub fn clear(&mut self, pool: &mut StatePool) {
        for (_, bucket) in self.buckets.drain() {
            for id in bucket {
                pool.release(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::Dbm;

    fn config(ints: Vec<i32>) -> Rc<Config> {
        Rc::new(Config {
            vloc: vec![0],
            ints,
            zone: Dbm::zero(1),
        })
    }

    #[test]
    fn test_compare_reflexive_and_hash_stable() {
        let mut pool = StatePool::new(4);
        let s = pool.insert(config(vec![1]));
        assert_eq!(pool.compare(s, s), Ordering::Equal);
        let h = pool.hash(s);
        assert_eq!(pool.hash(s), h);
    }

    #[test]
    fn test_equal_configs_compare_equal() {
        let mut pool = StatePool::new(4);
        let a = pool.insert(config(vec![1]));
        let b = pool.insert(config(vec![1]));
        assert_ne!(a, b);
        assert_eq!(pool.compare(a, b), Ordering::Equal);
    }

    #[test]
    fn test_distinct_configs_never_equal() {
        let mut pool = StatePool::new(4);
        let a = pool.insert(config(vec![1]));
        let b = pool.insert(config(vec![2]));
        assert_ne!(pool.compare(a, b), Ordering::Equal);
        // Consistent orientation both ways.
        assert_eq!(pool.compare(a, b), pool.compare(b, a).reverse());
    }

    #[test]
    fn test_refcount_teardown_exactly_once() {
        let mut pool = StatePool::new(4);
        let cfg = config(vec![7]);
        let s = pool.insert(cfg.clone());
        let n = 3;
        for _ in 0..n {
            pool.retain(s);
        }
        for _ in 0..n {
            assert!(!pool.release(s));
            // The configuration is still shared with the pool.
            assert_eq!(Rc::strong_count(&cfg), 2);
        }
        assert!(pool.release(s));
        assert_eq!(Rc::strong_count(&cfg), 1);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    #[should_panic(expected = "is not allocated")]
    fn test_release_after_teardown_is_detected() {
        let mut pool = StatePool::new(4);
        let s = pool.insert(config(vec![0]));
        pool.release(s);
        pool.release(s);
    }

    #[test]
    fn test_slot_reuse() {
        let mut pool = StatePool::new(2);
        let a = pool.insert(config(vec![1]));
        pool.release(a);
        let b = pool.insert(config(vec![2]));
        // The freed slot is reused for the new state.
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn test_table_dedups_by_structure() {
        let mut pool = StatePool::new(4);
        let mut table = StateTable::new();
        let a = pool.insert(config(vec![1]));
        let canon = table.canonicalize(&mut pool, a);
        assert_eq!(canon, a);

        let b = pool.insert(config(vec![1]));
        let canon2 = table.canonicalize(&mut pool, b);
        assert_eq!(canon2, a);
        assert_eq!(pool.live(), 1); // duplicate was released

        table.clear(&mut pool);
        assert_eq!(pool.live(), 0);
    }
}
