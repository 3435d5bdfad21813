//! Least Recently Used (LRU) read-through cache.
//!
//! The reference baseline the adaptive policies are measured against: every
//! hit promotes the key to MRU, every miss loads through the injected
//! [`Loader`] and evicts the LRU key when full.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                       LruCore<K, V, L>                       │
//!   │                                                              │
//!   │   list: LruList<K>             table: FxHashMap<K, V>        │
//!   │                                                              │
//!   │   head ──► [C] ◄──► [B] ◄──► [A] ◄── tail                    │
//!   │            MRU               LRU                             │
//!   │                                │                             │
//!   │   miss at capacity: pop_tail ──┴──► table.remove, then       │
//!   │   install loader(k) and touch(k)                             │
//!   │                                                              │
//!   │   loader: L, consulted once per miss, before any mutation    │
//!   │   misses: u64, incremented per successful load               │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Operation | Time   | Notes                                     |
//! |-----------|--------|-------------------------------------------|
//! | `try_get` | O(1)*  | *Plus one loader call on a miss           |
//! | `get`     | O(1)*  | Only for infallible loaders               |
//! | `misses`  | O(1)   | True miss count                           |
//! | `size`    | O(1)   | Resident entries (LRU tracks no ghosts)   |
//!
//! ## Failure semantics
//!
//! The loader runs before any cache mutation. If it fails, the error is
//! returned unchanged, no entry is installed, the recency order is
//! untouched, and the miss counter does not move.
//!
//! ## Example Usage
//!
//! ```
//! use carcache::policy::lru::LruCore;
//! use carcache::traits::from_fn;
//!
//! let mut cache = LruCore::new(2, from_fn(|k: &u64| k * 10)).unwrap();
//! assert_eq!(*cache.get(&1), 10);
//! assert_eq!(*cache.get(&2), 20);
//! assert_eq!(*cache.get(&1), 10); // hit
//! assert_eq!(cache.misses(), 2);
//! ```
//!
//! ## Thread Safety
//!
//! - [`LruCore`]: single-threaded; `&mut self` on the access path.
//! - [`ConcurrentLruCache`]: serializes every operation on one
//!   `parking_lot::Mutex`, loader call included.

use std::convert::Infallible;
use std::hash::Hash;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::ds::LruList;
use crate::error::ConfigError;
use crate::traits::{Loader, ReplacementCache};

/// Single-threaded read-through LRU cache.
///
/// # Type Parameters
///
/// - `K`: key type, `Eq + Hash + Clone`
/// - `V`: value type, never inspected
/// - `L`: injected [`Loader`] producing `V`
///
/// # Example
///
/// ```
/// use carcache::policy::lru::LruCore;
/// use carcache::traits::from_fn;
///
/// let mut cache = LruCore::new(3, from_fn(|k: &u32| k.to_string())).unwrap();
/// assert_eq!(cache.get(&7), "7");
/// assert_eq!(cache.misses(), 1);
/// assert_eq!(cache.name(), "LRU");
/// ```
#[must_use]
pub struct LruCore<K, V, L> {
    /// Recency order; front is MRU, tail is the eviction victim.
    list: LruList<K>,
    /// Key -> value storage. Values live here only; the list borrows keys.
    table: FxHashMap<K, V>,
    capacity: usize,
    misses: u64,
    loader: L,
}

impl<K, V, L> LruCore<K, V, L>
where
    K: Eq + Hash + Clone,
    L: Loader<K, Value = V>,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `capacity` is zero.
    pub fn new(capacity: usize, loader: L) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("capacity must be greater than zero"));
        }
        Ok(Self {
            list: LruList::with_capacity(capacity),
            table: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
            misses: 0,
            loader,
        })
    }

    /// Returns the value for `key`, loading it on a miss.
    ///
    /// A hit promotes the key to MRU. A miss consults the loader first; on
    /// success the LRU entry is evicted if the cache is full, the new entry
    /// installed as MRU, and the miss counter incremented. On failure the
    /// loader's error is returned and the cache is untouched.
    pub fn try_get(&mut self, key: &K) -> Result<&V, L::Error> {
        if self.table.contains_key(key) {
            self.list.touch(key.clone());
            return Ok(self.table.get(key).expect("resident key is tabled"));
        }

        let value = self.loader.load(key)?;
        if self.list.len() == self.capacity {
            let evicted = self.list.pop_tail().expect("full list has a tail");
            self.table.remove(&evicted);
        }
        self.misses += 1;
        self.table.insert(key.clone(), value);
        self.list.touch(key.clone());
        Ok(self.table.get(key).expect("entry was just installed"))
    }

    /// Number of true misses since construction.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of resident entries.
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Maximum number of resident entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Policy name.
    pub fn name(&self) -> &'static str {
        "LRU"
    }

    /// Returns resident keys in MRU -> LRU order.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_resident_keys(&self) -> Vec<K> {
        self.list.debug_snapshot_keys()
    }

    /// Validates internal invariants. Panics on any violation.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.list.debug_validate_invariants();
        assert_eq!(
            self.list.len(),
            self.table.len(),
            "recency list and table disagree on entry count"
        );
        assert!(
            self.table.len() <= self.capacity,
            "resident entries ({}) exceed capacity ({})",
            self.table.len(),
            self.capacity
        );
        for key in self.list.debug_snapshot_keys() {
            assert!(
                self.table.contains_key(&key),
                "listed key missing from table"
            );
        }
    }
}

impl<K, V, L> LruCore<K, V, L>
where
    K: Eq + Hash + Clone,
    L: Loader<K, Value = V, Error = Infallible>,
{
    /// Returns the value for `key`, loading it on a miss.
    ///
    /// Available when the loader cannot fail.
    pub fn get(&mut self, key: &K) -> &V {
        match self.try_get(key) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<K, V, L> std::fmt::Debug for LruCore<K, V, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCore")
            .field("capacity", &self.capacity)
            .field("resident", &self.table.len())
            .field("misses", &self.misses)
            .finish()
    }
}

impl<K, V, L> ReplacementCache<K, V> for LruCore<K, V, L>
where
    K: Eq + Hash + Clone,
    L: Loader<K, Value = V>,
{
    type Error = L::Error;

    fn try_get(&mut self, key: &K) -> Result<&V, L::Error> {
        LruCore::try_get(self, key)
    }

    fn misses(&self) -> u64 {
        LruCore::misses(self)
    }

    fn size(&self) -> usize {
        LruCore::size(self)
    }

    fn capacity(&self) -> usize {
        LruCore::capacity(self)
    }

    fn name(&self) -> &'static str {
        LruCore::name(self)
    }
}

/// Thread-safe wrapper serializing every operation on a single mutex.
///
/// The loader runs while the lock is held, so it must not block for long
/// and must not re-enter the same cache. Values are returned by clone.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use carcache::policy::lru::ConcurrentLruCache;
/// use carcache::traits::from_fn;
///
/// let cache = Arc::new(ConcurrentLruCache::new(64, from_fn(|k: &u64| *k)).unwrap());
/// let worker = {
///     let cache = Arc::clone(&cache);
///     std::thread::spawn(move || cache.get(&1))
/// };
/// assert_eq!(worker.join().unwrap(), 1);
/// ```
pub struct ConcurrentLruCache<K, V, L> {
    inner: Mutex<LruCore<K, V, L>>,
}

impl<K, V, L> ConcurrentLruCache<K, V, L>
where
    K: Eq + Hash + Clone,
    V: Clone,
    L: Loader<K, Value = V>,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `capacity` is zero.
    pub fn new(capacity: usize, loader: L) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Mutex::new(LruCore::new(capacity, loader)?),
        })
    }

    /// Returns a clone of the value for `key`, loading it on a miss.
    pub fn try_get(&self, key: &K) -> Result<V, L::Error> {
        let mut core = self.inner.lock();
        core.try_get(key).map(V::clone)
    }

    /// Number of true misses since construction.
    ///
    /// Exact only while no operations are in flight.
    pub fn misses(&self) -> u64 {
        self.inner.lock().misses()
    }

    /// Number of resident entries.
    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }

    /// Maximum number of resident entries.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Policy name.
    pub fn name(&self) -> &'static str {
        "LRU"
    }
}

impl<K, V, L> ConcurrentLruCache<K, V, L>
where
    K: Eq + Hash + Clone,
    V: Clone,
    L: Loader<K, Value = V, Error = Infallible>,
{
    /// Returns a clone of the value for `key`, loading it on a miss.
    pub fn get(&self, key: &K) -> V {
        match self.try_get(key) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<K, V, L> std::fmt::Debug for ConcurrentLruCache<K, V, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("ConcurrentLruCache")
            .field("capacity", &core.capacity)
            .field("resident", &core.table.len())
            .field("misses", &core.misses)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
