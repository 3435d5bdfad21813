//! CAR with Temporal filtering (CART) read-through cache.
//!
//! Shares CAR's four-list skeleton but replaces the clocks with plain FIFO
//! queues and adds a per-entry temporal filter: a page is `Short` until it
//! proves re-reference over a long enough window, and only `Long` pages may
//! enter the frequency partition. A second adaptive target `q` governs how
//! much history the recency side may keep.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           CartCore<K, V, L>                              │
//! │                                                                          │
//! │   table: FxHashMap<K, Entry<V>>: value + access bit + filter bit         │
//! │                                                                          │
//! │   recent: FifoQueue<K> (T1)       frequent: FifoQueue<K> (T2)            │
//! │   head ──► [S] [L] [S] ◄── tail   head ──► [L] [L] ◄── tail              │
//! │                                                                          │
//! │   Sweep (replace):                                                       │
//! │     1. referenced T2 heads drain back to T1's tail                       │
//! │     2. T1 heads cycle while referenced (Short pages may earn Long)       │
//! │        or surrender to T2 while Long                                     │
//! │     3. demote T1 head to B1 if |T1| ≥ max(1, p), else T2 head to B2      │
//! │                                                                          │
//! │   history_recent: LruList<K> (B1)  history_frequent: LruList<K> (B2)     │
//! │   ns / nl: resident Short / Long page counts                             │
//! │   p: target |T1|   q: target |B1|                                        │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Operation | Time    | Notes                                          |
//! |-----------|---------|------------------------------------------------|
//! | `try_get` | O(1)*   | Hit sets a bit; miss may sweep and load        |
//! | `get`     | O(1)*   | Only for infallible loaders                    |
//! | `misses`  | O(1)    | Fresh misses only; ghost hits excluded         |
//! | `size`    | O(1)    | Tracked entries, ghosts included               |
//!
//! *Amortized; each sweep step clears a reference bit or moves a page, so
//! total sweep work is bounded by the accesses that set those bits.
//!
//! ## Failure semantics
//!
//! Identical to CAR: the loader runs before any mutation, and a failed load
//! surfaces its error with the cache untouched.
//!
//! ## Example Usage
//!
//! ```
//! use carcache::policy::cart::CartCore;
//! use carcache::traits::from_fn;
//!
//! let mut cache = CartCore::new(8, from_fn(|k: &u64| k * 10)).unwrap();
//! assert_eq!(*cache.get(&1), 10);
//! assert_eq!(*cache.get(&1), 10);
//! assert_eq!(cache.misses(), 1);
//! assert_eq!(cache.name(), "CART");
//! ```
//!
//! ## Thread Safety
//!
//! - [`CartCore`]: single-threaded; `&mut self` on the access path.
//! - [`ConcurrentCartCache`]: serializes every operation on one
//!   `parking_lot::Mutex`, loader call included.
//!
//! ## References
//!
//! - Bansal & Modha, "CAR: Clock with Adaptive Replacement", FAST 2004
//!   (CART is §4 of the same paper)

use std::convert::Infallible;
use std::hash::Hash;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::ds::{FifoQueue, LruList};
use crate::error::ConfigError;
use crate::traits::{Loader, ReplacementCache};

/// Temporal class of a page.
///
/// Fresh pages start `Short`; a page becomes `Long` by surviving in the
/// recency queue long enough (or by returning through a history), and only
/// `Long` pages are admitted to the frequency queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBit {
    /// Seen over a short window only.
    Short,
    /// Proven re-reference over a long window.
    Long,
}

/// Per-key record. Ghosts keep identity and filter class, but no value.
#[derive(Debug)]
struct Entry<V> {
    /// `Some` iff the key is resident; ghosts never expose a value.
    value: Option<V>,
    /// Set on every hit; cleared by the sweep.
    referenced: bool,
    /// True iff the key lives in one of the ghost histories.
    is_history: bool,
    filter: FilterBit,
}

/// Single-threaded read-through CART cache.
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
/// use carcache::policy::cart::CartCore;
/// use carcache::traits::from_fn;
///
/// let mut cache = CartCore::new(100, from_fn(|k: &u32| k.to_string())).unwrap();
/// assert_eq!(cache.get(&7), "7");
/// assert_eq!(cache.cache_size(), 50);
/// ```
#[must_use]
pub struct CartCore<K, V, L> {
    /// T1: recency queue; mixed Short and Long pages.
    recent: FifoQueue<K>,
    /// T2: frequency queue; Long pages only.
    frequent: FifoQueue<K>,
    /// B1: ghosts demoted from the recency queue.
    history_recent: LruList<K>,
    /// B2: ghosts demoted from the frequency queue.
    history_frequent: LruList<K>,
    /// Every tracked key, resident or ghost.
    table: FxHashMap<K, Entry<V>>,
    /// Total tracking budget (residents + ghosts).
    capacity: usize,
    /// Resident budget: `capacity / 2`.
    cache_size: usize,
    /// Adaptive target for `|recent|`, in `[0, cache_size]`.
    target_resident: usize,
    /// Adaptive target for `|history_recent|`, in `[0, 2 * cache_size]`.
    target_history: usize,
    /// Resident pages with `FilterBit::Short`.
    short_count: usize,
    /// Resident pages with `FilterBit::Long`.
    long_count: usize,
    misses: u64,
    loader: L,
}

impl<K, V, L> CartCore<K, V, L>
where
    K: Eq + Hash + Clone,
    L: Loader<K, Value = V>,
{
    /// Creates a cache tracking at most `capacity` keys, half of them
    /// resident.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `capacity` is zero, or too small to give
    /// the resident partition at least one slot (`capacity < 2`).
    pub fn new(capacity: usize, loader: L) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("capacity must be greater than zero"));
        }
        let cache_size = capacity / 2;
        if cache_size == 0 {
            return Err(ConfigError::new(
                "capacity must be at least 2 so half of it can hold resident entries",
            ));
        }
        Ok(Self {
            recent: FifoQueue::with_capacity(cache_size),
            frequent: FifoQueue::with_capacity(cache_size),
            history_recent: LruList::with_capacity(cache_size),
            history_frequent: LruList::with_capacity(cache_size),
            table: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
            cache_size,
            target_resident: 0,
            target_history: 0,
            short_count: 0,
            long_count: 0,
            misses: 0,
            loader,
        })
    }

    /// Returns the value for `key`, loading it on a miss.
    ///
    /// A resident hit sets the entry's reference bit and returns; queue
    /// positions never change on a hit. A miss (fresh or ghost) consults
    /// the loader first and, on success, makes room via the sweep, installs
    /// the entry at the recency tail, and adapts the targets. On loader
    /// failure the error is returned and the cache is untouched.
    pub fn try_get(&mut self, key: &K) -> Result<&V, L::Error> {
        let resident_hit = matches!(self.table.get(key), Some(entry) if !entry.is_history);
        if resident_hit {
            let entry = self.table.get_mut(key).expect("resident key is tabled");
            entry.referenced = true;
            return Ok(entry.value.as_ref().expect("resident entry holds a value"));
        }

        self.handle_miss(key)?;
        let entry = self.table.get(key).expect("miss handler installs the entry");
        Ok(entry.value.as_ref().expect("resident entry holds a value"))
    }

    fn handle_miss(&mut self, key: &K) -> Result<(), L::Error> {
        let ghost_recent_hit = self.history_recent.contains(key);
        let ghost_frequent_hit = self.history_frequent.contains(key);

        // Loader first: a failure must leave no trace.
        let value = self.loader.load(key)?;

        if self.recent.len() + self.frequent.len() == self.cache_size {
            self.replace();
            if !ghost_recent_hit && !ghost_frequent_hit {
                self.trim_histories();
            }
        }

        if !ghost_recent_hit && !ghost_frequent_hit {
            self.misses += 1;
            self.table.insert(
                key.clone(),
                Entry {
                    value: Some(value),
                    referenced: false,
                    is_history: false,
                    filter: FilterBit::Short,
                },
            );
            self.recent.push_back(key.clone());
            self.short_count += 1;
        } else if ghost_recent_hit {
            // Recency history proved its worth: grow p, readmit as Long.
            let delta = (self.short_count / self.history_recent.len()).max(1);
            self.target_resident = (self.target_resident + delta).min(self.cache_size);
            self.history_recent.erase(key);
            let entry = self.table.get_mut(key).expect("ghost key is tabled");
            entry.value = Some(value);
            entry.referenced = false;
            entry.is_history = false;
            entry.filter = FilterBit::Long;
            self.long_count += 1;
            self.recent.push_back(key.clone());
        } else {
            // Frequency history hit: shrink p; the page is already Long.
            let delta = (self.long_count / self.history_frequent.len()).max(1);
            self.target_resident = self.target_resident.saturating_sub(delta);
            self.history_frequent.erase(key);
            let entry = self.table.get_mut(key).expect("ghost key is tabled");
            entry.value = Some(value);
            entry.referenced = false;
            entry.is_history = false;
            self.long_count += 1;
            self.recent.push_back(key.clone());
            if self.long_pressure() >= self.cache_size {
                self.target_history =
                    (self.target_history + 1).min(2 * self.cache_size - self.recent.len());
            }
        }
        Ok(())
    }

    /// Long pages tracked on the frequency side plus Long residents of the
    /// recency queue. Reaching `cache_size` signals that the recency
    /// history deserves more room.
    fn long_pressure(&self) -> usize {
        debug_assert!(self.short_count <= self.recent.len());
        self.frequent.len() + self.history_frequent.len() + self.recent.len() - self.short_count
    }

    /// Sweeps until one resident entry is demoted to a ghost history.
    fn replace(&mut self) {
        // Phase 1: referenced frequency heads drain back to the recency
        // tail so the frequency queue's head is always unreferenced.
        loop {
            let referenced = match self.frequent.front() {
                Some(head) => {
                    self.table
                        .get(head)
                        .expect("queued key is tabled")
                        .referenced
                },
                None => false,
            };
            if !referenced {
                break;
            }
            let key = self.frequent.pop_front().expect("front was just observed");
            self.table
                .get_mut(&key)
                .expect("queued key is tabled")
                .referenced = false;
            self.recent.push_back(key);
            if self.long_pressure() >= self.cache_size {
                self.target_history =
                    (self.target_history + 1).min(2 * self.cache_size - self.recent.len());
            }
        }

        // Phase 2: cycle the recency queue until its head is an
        // unreferenced Short page.
        loop {
            let (referenced, filter) = match self.recent.front() {
                Some(head) => {
                    let entry = self.table.get(head).expect("queued key is tabled");
                    (entry.referenced, entry.filter)
                },
                None => break,
            };
            if !referenced && filter == FilterBit::Short {
                break;
            }

            let key = self.recent.pop_front().expect("front was just observed");
            if referenced {
                // Second chance at the tail; surviving a full pass of a
                // sufficiently large recency queue earns the Long class.
                self.table
                    .get_mut(&key)
                    .expect("queued key is tabled")
                    .referenced = false;
                self.recent.push_back(key.clone());
                if filter == FilterBit::Short
                    && self.recent.len()
                        >= (self.target_resident + 1).min(self.history_recent.len())
                {
                    let entry = self.table.get_mut(&key).expect("queued key is tabled");
                    entry.filter = FilterBit::Long;
                    self.short_count -= 1;
                    self.long_count += 1;
                }
            } else {
                // Unreferenced Long page: surrender to the frequency queue.
                self.frequent.push_back(key);
                self.target_history = self
                    .target_history
                    .saturating_sub(1)
                    .max(self.cache_size - self.recent.len());
            }
        }

        // Demote one page to history.
        if self.recent.len() >= self.target_resident.max(1) {
            let key = self
                .recent
                .pop_front()
                .expect("recency queue is non-empty while demoting");
            let entry = self.table.get_mut(&key).expect("queued key is tabled");
            entry.is_history = true;
            entry.value = None;
            self.history_recent.touch(key);
            self.short_count -= 1;
        } else {
            let key = self
                .frequent
                .pop_front()
                .expect("frequency queue is non-empty while demoting");
            let entry = self.table.get_mut(&key).expect("queued key is tabled");
            entry.is_history = true;
            entry.value = None;
            self.history_frequent.touch(key);
            self.long_count -= 1;
        }
    }

    /// Drops one ghost so the history budget keeps holding.
    ///
    /// Called only for fresh misses, right after the sweep demoted a page.
    fn trim_histories(&mut self) {
        if self.history_recent.len() > self.target_history || self.history_frequent.is_empty() {
            let dropped = self
                .history_recent
                .pop_tail()
                .expect("recency history is non-empty past its target");
            self.table.remove(&dropped);
        } else if self.history_recent.len() + self.history_frequent.len() == self.cache_size + 1 {
            let dropped = self
                .history_frequent
                .pop_tail()
                .expect("frequency history is non-empty at the bound");
            self.table.remove(&dropped);
        }
    }

    /// Number of true misses (fresh keys) since construction.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of tracked keys, ghosts included.
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Total tracking budget.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resident budget (`capacity / 2`).
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Current adaptive target for the recency queue (`p`).
    pub fn target_resident_size(&self) -> usize {
        self.target_resident
    }

    /// Current adaptive target for the recency history (`q`).
    pub fn target_history_size(&self) -> usize {
        self.target_history
    }

    /// Number of resident entries in the recency queue.
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Number of resident entries in the frequency queue.
    pub fn frequent_len(&self) -> usize {
        self.frequent.len()
    }

    /// Number of ghosts demoted from the recency queue.
    pub fn history_recent_len(&self) -> usize {
        self.history_recent.len()
    }

    /// Number of ghosts demoted from the frequency queue.
    pub fn history_frequent_len(&self) -> usize {
        self.history_frequent.len()
    }

    /// Policy name.
    pub fn name(&self) -> &'static str {
        "CART"
    }

    /// Returns `true` if `key` is resident (a ghost does not count).
    pub fn contains_resident(&self, key: &K) -> bool {
        matches!(self.table.get(key), Some(entry) if !entry.is_history)
    }

    /// Returns the temporal class of a tracked key.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_filter_bit(&self, key: &K) -> Option<FilterBit> {
        self.table.get(key).map(|entry| entry.filter)
    }

    /// Returns `true` if a tracked key's reference bit is set.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_referenced(&self, key: &K) -> bool {
        matches!(self.table.get(key), Some(entry) if entry.referenced)
    }

    /// Returns recency-queue keys in head -> tail order.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_recent_keys(&self) -> Vec<K> {
        self.recent.debug_snapshot_keys()
    }

    /// Returns frequency-queue keys in head -> tail order.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_frequent_keys(&self) -> Vec<K> {
        self.frequent.debug_snapshot_keys()
    }

    /// Returns recency-history keys in MRU -> LRU order.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_history_recent_keys(&self) -> Vec<K> {
        self.history_recent.debug_snapshot_keys()
    }

    /// Returns frequency-history keys in MRU -> LRU order.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_history_frequent_keys(&self) -> Vec<K> {
        self.history_frequent.debug_snapshot_keys()
    }

    /// Validates every structural and size invariant. Panics on violation.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.history_recent.debug_validate_invariants();
        self.history_frequent.debug_validate_invariants();

        let resident = self.recent.len() + self.frequent.len();
        let ghosts = self.history_recent.len() + self.history_frequent.len();
        assert!(
            resident <= self.cache_size,
            "resident ({}) > cache_size ({})",
            resident,
            self.cache_size
        );
        assert!(
            ghosts <= self.cache_size,
            "ghosts ({}) > cache_size ({})",
            ghosts,
            self.cache_size
        );
        assert!(
            resident + ghosts <= self.capacity,
            "tracked entries ({}) > capacity ({})",
            resident + ghosts,
            self.capacity
        );
        assert!(
            self.target_resident <= self.cache_size,
            "p ({}) > cache_size ({})",
            self.target_resident,
            self.cache_size
        );
        assert!(
            self.target_history <= 2 * self.cache_size,
            "q ({}) > 2 * cache_size ({})",
            self.target_history,
            2 * self.cache_size
        );
        assert_eq!(
            resident + ghosts,
            self.table.len(),
            "lists and table disagree on entry count"
        );
        assert_eq!(
            self.short_count + self.long_count,
            resident,
            "ns + nl ({} + {}) != resident ({})",
            self.short_count,
            self.long_count,
            resident
        );

        let mut seen = std::collections::HashSet::new();
        let mut shorts = 0usize;
        let mut longs = 0usize;
        for key in self.recent.debug_snapshot_keys() {
            assert!(seen.insert(key.clone()), "key in more than one list");
            let entry = self.table.get(&key).expect("recent key missing from table");
            assert!(!entry.is_history, "recent key flagged as history");
            assert!(entry.value.is_some(), "resident entry without a value");
            match entry.filter {
                FilterBit::Short => shorts += 1,
                FilterBit::Long => longs += 1,
            }
        }
        for key in self.frequent.debug_snapshot_keys() {
            assert!(seen.insert(key.clone()), "key in more than one list");
            let entry = self.table.get(&key).expect("frequent key missing from table");
            assert!(!entry.is_history, "frequent key flagged as history");
            assert!(entry.value.is_some(), "resident entry without a value");
            assert_eq!(
                entry.filter,
                FilterBit::Long,
                "frequency queue admitted a Short page"
            );
            longs += 1;
        }
        assert_eq!(shorts, self.short_count, "ns does not count Short residents");
        assert_eq!(longs, self.long_count, "nl does not count Long residents");

        for key in self
            .history_recent
            .debug_snapshot_keys()
            .into_iter()
            .chain(self.history_frequent.debug_snapshot_keys())
        {
            assert!(seen.insert(key.clone()), "key in more than one list");
            let entry = self.table.get(&key).expect("ghost key missing from table");
            assert!(entry.is_history, "ghost key not flagged as history");
            assert!(entry.value.is_none(), "ghost entry still holds a value");
        }
        assert_eq!(seen.len(), self.table.len(), "table key not in any list");
    }
}

impl<K, V, L> CartCore<K, V, L>
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

impl<K, V, L> std::fmt::Debug for CartCore<K, V, L>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartCore")
            .field("capacity", &self.capacity)
            .field("cache_size", &self.cache_size)
            .field("recent_len", &self.recent.len())
            .field("frequent_len", &self.frequent.len())
            .field("history_recent_len", &self.history_recent.len())
            .field("history_frequent_len", &self.history_frequent.len())
            .field("target_resident", &self.target_resident)
            .field("target_history", &self.target_history)
            .field("short_count", &self.short_count)
            .field("long_count", &self.long_count)
            .field("misses", &self.misses)
            .finish()
    }
}

impl<K, V, L> ReplacementCache<K, V> for CartCore<K, V, L>
where
    K: Eq + Hash + Clone,
    L: Loader<K, Value = V>,
{
    type Error = L::Error;

    fn try_get(&mut self, key: &K) -> Result<&V, L::Error> {
        CartCore::try_get(self, key)
    }

    fn misses(&self) -> u64 {
        CartCore::misses(self)
    }

    fn size(&self) -> usize {
        CartCore::size(self)
    }

    fn capacity(&self) -> usize {
        CartCore::capacity(self)
    }

    fn name(&self) -> &'static str {
        CartCore::name(self)
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
/// use carcache::policy::cart::ConcurrentCartCache;
/// use carcache::traits::from_fn;
///
/// let cache = Arc::new(ConcurrentCartCache::new(64, from_fn(|k: &u64| *k)).unwrap());
/// let worker = {
///     let cache = Arc::clone(&cache);
///     std::thread::spawn(move || cache.get(&1))
/// };
/// assert_eq!(worker.join().unwrap(), 1);
/// ```
pub struct ConcurrentCartCache<K, V, L> {
    inner: Mutex<CartCore<K, V, L>>,
}

impl<K, V, L> ConcurrentCartCache<K, V, L>
where
    K: Eq + Hash + Clone,
    V: Clone,
    L: Loader<K, Value = V>,
{
    /// Creates a cache tracking at most `capacity` keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] under the same conditions as
    /// [`CartCore::new`].
    pub fn new(capacity: usize, loader: L) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Mutex::new(CartCore::new(capacity, loader)?),
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

    /// Number of tracked keys, ghosts included.
    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }

    /// Total tracking budget.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Policy name.
    pub fn name(&self) -> &'static str {
        "CART"
    }
}

impl<K, V, L> ConcurrentCartCache<K, V, L>
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

impl<K, V, L> std::fmt::Debug for ConcurrentCartCache<K, V, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("ConcurrentCartCache")
            .field("capacity", &core.capacity)
            .field("misses", &core.misses)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{from_fn, try_from_fn};

    fn identity_cache(capacity: usize) -> CartCore<u64, u64, impl Loader<u64, Value = u64, Error = Infallible>> {
        CartCore::new(capacity, from_fn(|k: &u64| *k)).unwrap()
    }

    #[test]
    fn cart_rejects_tiny_capacities() {
        assert!(CartCore::<u64, u64, _>::new(0, from_fn(|k: &u64| *k)).is_err());
        assert!(CartCore::<u64, u64, _>::new(1, from_fn(|k: &u64| *k)).is_err());
        assert!(CartCore::<u64, u64, _>::new(2, from_fn(|k: &u64| *k)).is_ok());
    }

    #[test]
    fn cart_fresh_pages_start_short() {
        let mut cache = identity_cache(8);
        cache.get(&1);
        cache.get(&2);
        assert_eq!(cache.debug_filter_bit(&1), Some(FilterBit::Short));
        assert_eq!(cache.debug_filter_bit(&2), Some(FilterBit::Short));
        assert_eq!(cache.misses(), 2);
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_hit_sets_bit_without_moving() {
        let mut cache = identity_cache(8);
        cache.get(&1);
        cache.get(&2);
        cache.get(&1);
        assert_eq!(cache.debug_recent_keys(), vec![1, 2]);
        assert!(cache.debug_referenced(&1));
        assert!(!cache.debug_referenced(&2));
        assert_eq!(cache.misses(), 2);
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_scan_with_late_rereference() {
        // Capacity 4, trace 1,2,3,4,5,1,5. A pure scan misses throughout;
        // at this size each fresh ghost is reclaimed by the history trim, so
        // key 1 returns as a fresh miss, and the final access to 5 hits.
        let mut cache = identity_cache(4);
        for key in [1, 2, 3, 4, 5, 1] {
            assert_eq!(*cache.get(&key), key);
            cache.debug_validate_invariants();
        }
        assert_eq!(cache.misses(), 6);

        cache.get(&5);
        assert_eq!(cache.misses(), 6);
        assert!(cache.contains_resident(&5));
        assert!(cache.debug_referenced(&5));
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_cycled_referenced_page_earns_long() {
        // 1 is referenced when the sweep runs, so it cycles to the tail and,
        // with an empty recency history, immediately earns the Long class.
        let mut cache = identity_cache(4);
        cache.get(&1);
        cache.get(&2);
        cache.get(&1);
        cache.get(&3);
        assert_eq!(cache.debug_filter_bit(&1), Some(FilterBit::Long));
        assert!(cache.contains_resident(&1));
        assert!(!cache.contains_resident(&2));
        assert_eq!(cache.misses(), 3);
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_long_page_flows_through_frequency_queue() {
        // Continues the trace above: the Long page 1 surrenders to the
        // frequency queue on the next sweep.
        let mut cache = identity_cache(4);
        for key in [1, 2, 1, 3, 4] {
            cache.get(&key);
        }
        assert_eq!(cache.debug_frequent_keys(), vec![1]);
        assert!(
            cache.target_history_size() > 0,
            "moving a Long page out of the recency queue raises q's floor"
        );
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_frequency_ghost_hit_adapts_and_reenters_recency() {
        // Deterministic walk that parks a Long page in the frequency
        // history and brings it back. Capacity 4 (cache_size 2).
        let mut cache = identity_cache(4);
        for key in [1, 2, 1, 3, 4, 5] {
            cache.get(&key);
        }
        cache.get(&5); // reference the recency head
        cache.get(&1); // reference the frequency head
        cache.debug_validate_invariants();

        // The sweep for 6 drains the referenced pages, and with the recency
        // queue emptied the demotion falls on the frequency side.
        cache.get(&6);
        assert_eq!(cache.misses(), 6);
        assert_eq!(cache.debug_history_frequent_keys(), vec![1]);
        cache.debug_validate_invariants();

        // Ghost hit in the frequency history: 1 re-enters the recency
        // queue, still Long, without a new true miss.
        cache.get(&1);
        assert_eq!(cache.misses(), 6);
        assert!(cache.contains_resident(&1));
        assert_eq!(cache.debug_filter_bit(&1), Some(FilterBit::Long));
        assert!(cache.debug_recent_keys().contains(&1));
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_recency_ghost_hit_grows_target_and_marks_long() {
        // Extends the walk above until a recency ghost survives (possible
        // once the frequency history is non-empty and q has grown).
        let mut cache = identity_cache(4);
        for key in [1, 2, 1, 3, 4, 5, 5, 1, 6, 1] {
            cache.get(&key);
        }
        assert_eq!(cache.misses(), 6);
        assert_eq!(cache.debug_history_recent_keys(), vec![6]);
        let p_before = cache.target_resident_size();

        cache.get(&6); // ghost hit in the recency history
        assert_eq!(cache.misses(), 6);
        assert!(cache.target_resident_size() > p_before, "B1 hit grows p");
        assert!(cache.contains_resident(&6));
        assert_eq!(cache.debug_filter_bit(&6), Some(FilterBit::Long));
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_ghost_promotion_reloads_value() {
        let mut generation = 0u64;
        let mut cache = CartCore::new(4, try_from_fn(move |k: &u64| -> Result<u64, Infallible> {
            generation += 1;
            Ok(k * 1000 + generation)
        }))
        .unwrap();
        for key in [1, 2, 1, 3, 4, 5] {
            cache.try_get(&key).unwrap();
        }
        cache.try_get(&5).unwrap();
        cache.try_get(&1).unwrap();
        cache.try_get(&6).unwrap(); // 1 demoted to the frequency history
        assert!(!cache.debug_history_recent_keys().contains(&6));
        assert_eq!(cache.debug_history_frequent_keys(), vec![1]);

        // Loads so far: 1,2,3,4,5,6 (hits don't load). Generation is 6.
        assert_eq!(*cache.try_get(&1).unwrap(), 1007);
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_loader_error_leaves_state_untouched() {
        let mut cache = CartCore::new(4, try_from_fn(|k: &u64| -> Result<u64, String> {
            if *k == 99 { Err("backing store down".to_string()) } else { Ok(*k) }
        }))
        .unwrap();
        for key in [1, 2, 1, 3] {
            cache.try_get(&key).unwrap();
        }
        let recent_before = cache.debug_recent_keys();
        let misses_before = cache.misses();
        let q_before = cache.target_history_size();
        let size_before = cache.size();

        assert!(cache.try_get(&99).is_err());

        assert_eq!(cache.debug_recent_keys(), recent_before);
        assert_eq!(cache.misses(), misses_before);
        assert_eq!(cache.target_history_size(), q_before);
        assert_eq!(cache.size(), size_before);
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_long_scan_bounds_residency() {
        let mut cache = identity_cache(64);
        for key in 0..1000u64 {
            cache.get(&key);
        }
        assert_eq!(cache.misses(), 1000);
        assert_eq!(cache.recent_len() + cache.frequent_len(), 32);
        assert!(cache.size() <= 64);
        cache.debug_validate_invariants();
    }

    #[test]
    fn cart_concurrent_smoke() {
        use std::sync::Arc;

        let cache = Arc::new(ConcurrentCartCache::new(64, from_fn(|k: &u64| *k)).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        assert_eq!(cache.get(&((t * 41 + i) % 80)), (t * 41 + i) % 80);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.size() <= 64);
        assert!(cache.misses() >= 32);
    }
}
