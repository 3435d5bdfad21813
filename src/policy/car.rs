//! Clock with Adaptive Replacement (CAR) read-through cache.
//!
//! Combines ARC-style adaptivity with Clock mechanics: a hit only sets a
//! reference bit (no list movement), while the replacement sweep decides
//! between a recency partition and a frequency partition using a
//! self-tuning target size fed by two ghost histories.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           CarCore<K, V, L>                               │
//! │                                                                          │
//! │   table: FxHashMap<K, Entry<V>>: value + access bit + history flag       │
//! │                                                                          │
//! │   Resident clocks (values live in the table):                            │
//! │   recent: ClockRing<K>            frequent: ClockRing<K>                 │
//! │   ┌──────────────────┐            ┌──────────────────┐                   │
//! │   │ hand ──► A ──► B │            │ hand ──► X ──► Y │                   │
//! │   └──────────────────┘            └──────────────────┘                   │
//! │      ref=0 → demote to               ref=0 → demote to                   │
//! │      history_recent (B1)             history_frequent (B2)               │
//! │      ref=1 → move to frequent        ref=1 → clear ref, advance          │
//! │                                                                          │
//! │   Ghost histories (keys only, value dropped):                            │
//! │   history_recent: LruList<K>      history_frequent: LruList<K>           │
//! │                                                                          │
//! │   target_recent: adaptive target for |recent|; grown by B1 ghost hits,   │
//! │   shrunk by B2 ghost hits, in proportion to |B2|/|B1| resp. |B1|/|B2|    │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With `capacity = c`, at most `c/2` entries are resident
//! (`cache_size`) and the remaining tracking budget holds ghosts:
//! `|T1|+|B1| ≤ cache_size` and `|T1|+|T2|+|B1|+|B2| ≤ c`.
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
//! *Amortized; a miss at capacity runs the clock sweep.
//!
//! ## Failure semantics
//!
//! The loader runs before any mutation: a failed load surfaces its error
//! unchanged, installs nothing, and leaves sweep state, histories, and the
//! adaptation target exactly as they were.
//!
//! ## Example Usage
//!
//! ```
//! use carcache::policy::car::CarCore;
//! use carcache::traits::from_fn;
//!
//! let mut cache = CarCore::new(8, from_fn(|k: &u64| k * 10)).unwrap();
//! assert_eq!(*cache.get(&1), 10);
//! assert_eq!(*cache.get(&1), 10); // hit: reference bit set, no list move
//! assert_eq!(cache.misses(), 1);
//! assert_eq!(cache.name(), "CAR");
//! ```
//!
//! ## Thread Safety
//!
//! - [`CarCore`]: single-threaded; `&mut self` on the access path.
//! - [`ConcurrentCarCache`]: serializes every operation on one
//!   `parking_lot::Mutex`, loader call included.
//!
//! ## References
//!
//! - Bansal & Modha, "CAR: Clock with Adaptive Replacement", FAST 2004

use std::convert::Infallible;
use std::hash::Hash;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::ds::{ClockRing, LruList};
use crate::error::ConfigError;
use crate::traits::{Loader, ReplacementCache};

/// Per-key record. Ghosts keep their identity but drop the value.
#[derive(Debug)]
struct Entry<V> {
    /// `Some` iff the key is resident; ghosts never expose a value.
    value: Option<V>,
    /// Set on every hit; cleared by the sweep.
    referenced: bool,
    /// True iff the key lives in one of the ghost histories.
    is_history: bool,
}

/// Single-threaded read-through CAR cache.
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
/// use carcache::policy::car::CarCore;
/// use carcache::traits::from_fn;
///
/// let mut cache = CarCore::new(100, from_fn(|k: &u32| k.to_string())).unwrap();
/// assert_eq!(cache.get(&7), "7");
/// assert_eq!(cache.cache_size(), 50);
/// assert_eq!(cache.target_recent_size(), 0);
/// ```
#[must_use]
pub struct CarCore<K, V, L> {
    /// T1: resident keys seen once since entering the cache.
    recent: ClockRing<K>,
    /// T2: resident keys with re-reference history.
    frequent: ClockRing<K>,
    /// B1: ghosts evicted from the recent clock.
    history_recent: LruList<K>,
    /// B2: ghosts evicted from the frequent clock.
    history_frequent: LruList<K>,
    /// Every tracked key, resident or ghost.
    table: FxHashMap<K, Entry<V>>,
    /// Total tracking budget (residents + ghosts).
    capacity: usize,
    /// Resident budget: `capacity / 2`.
    cache_size: usize,
    /// Adaptive target for `|recent|`, in `[0, cache_size]`.
    target_recent: usize,
    misses: u64,
    loader: L,
}

impl<K, V, L> CarCore<K, V, L>
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
            recent: ClockRing::with_capacity(cache_size),
            frequent: ClockRing::with_capacity(cache_size),
            history_recent: LruList::with_capacity(cache_size),
            history_frequent: LruList::with_capacity(cache_size),
            table: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
            cache_size,
            target_recent: 0,
            misses: 0,
            loader,
        })
    }

    /// Returns the value for `key`, loading it on a miss.
    ///
    /// A resident hit sets the entry's reference bit and returns; the clock
    /// position does not change. A miss (fresh or ghost)
    /// consults the loader first and, on success, makes room via the sweep,
    /// installs the entry, and adapts the recency target if the key was a
    /// ghost. On loader failure the error is returned and the cache is
    /// untouched.
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
                },
            );
            self.recent.insert(key.clone());
        } else {
            self.adapt(ghost_recent_hit);
            if ghost_recent_hit {
                self.history_recent.erase(key);
            } else {
                self.history_frequent.erase(key);
            }
            let entry = self.table.get_mut(key).expect("ghost key is tabled");
            entry.value = Some(value);
            entry.referenced = false;
            entry.is_history = false;
            self.frequent.insert(key.clone());
        }
        Ok(())
    }

    /// Grows or shrinks the recency target after a ghost hit.
    ///
    /// The division sits inside the branch that already proved the hit
    /// ghost list non-empty, so the denominator is never zero.
    fn adapt(&mut self, ghost_recent_hit: bool) {
        if ghost_recent_hit {
            let delta = (self.history_frequent.len() / self.history_recent.len()).max(1);
            self.target_recent = (self.target_recent + delta).min(self.cache_size);
        } else {
            let delta = (self.history_recent.len() / self.history_frequent.len()).max(1);
            self.target_recent = self.target_recent.saturating_sub(delta);
        }
    }

    /// Sweeps until one resident entry is demoted to a ghost history.
    ///
    /// The entry under a hand is inspected before the hand moves on, so a
    /// clean revolution starts at the oldest entry of its clock.
    fn replace(&mut self) {
        loop {
            if self.recent.len() >= self.target_recent.max(1) {
                let victim = self
                    .recent
                    .peek()
                    .expect("recency clock is non-empty while swept")
                    .clone();
                let entry = self.table.get_mut(&victim).expect("swept key is tabled");
                if entry.referenced {
                    // Second reference: move to the frequent clock.
                    entry.referenced = false;
                    self.recent.remove_at_hand();
                    self.frequent.insert(victim);
                } else {
                    entry.is_history = true;
                    entry.value = None;
                    self.recent.remove_at_hand();
                    self.history_recent.touch(victim);
                    return;
                }
            } else {
                let victim = self
                    .frequent
                    .peek()
                    .expect("frequency clock is non-empty while swept")
                    .clone();
                let entry = self.table.get_mut(&victim).expect("swept key is tabled");
                if entry.referenced {
                    // Second chance within the frequent clock.
                    entry.referenced = false;
                    self.frequent.advance();
                } else {
                    entry.is_history = true;
                    entry.value = None;
                    self.frequent.remove_at_hand();
                    self.history_frequent.touch(victim);
                    return;
                }
            }
        }
    }

    /// Drops ghosts so the size invariants keep holding.
    ///
    /// Called only for fresh misses; a ghost hit shrinks a history by
    /// itself.
    fn trim_histories(&mut self) {
        if self.recent.len() + self.history_recent.len() == self.cache_size {
            let dropped = self
                .history_recent
                .pop_tail()
                .expect("recency history is non-empty at its bound");
            self.table.remove(&dropped);
        } else if self.table.len() == self.capacity {
            let dropped = self
                .history_frequent
                .pop_tail()
                .expect("frequency history is non-empty at the tracking bound");
            self.table.remove(&dropped);
        }
    }

    /// Number of true misses (fresh keys) since construction.
    ///
    /// Ghost hits reload through the loader but are not counted: the key's
    /// identity was still tracked.
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

    /// Current adaptive target for the recent clock.
    pub fn target_recent_size(&self) -> usize {
        self.target_recent
    }

    /// Number of resident entries in the recent clock.
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Number of resident entries in the frequent clock.
    pub fn frequent_len(&self) -> usize {
        self.frequent.len()
    }

    /// Number of ghosts evicted from the recent clock.
    pub fn history_recent_len(&self) -> usize {
        self.history_recent.len()
    }

    /// Number of ghosts evicted from the frequent clock.
    pub fn history_frequent_len(&self) -> usize {
        self.history_frequent.len()
    }

    /// Policy name.
    pub fn name(&self) -> &'static str {
        "CAR"
    }

    /// Returns `true` if `key` is resident (a ghost does not count).
    pub fn contains_resident(&self, key: &K) -> bool {
        matches!(self.table.get(key), Some(entry) if !entry.is_history)
    }

    /// Returns recent-clock keys in sweep order.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_recent_keys(&self) -> Vec<K> {
        self.recent.debug_snapshot_keys()
    }

    /// Returns frequent-clock keys in sweep order.
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
        self.recent.debug_validate_invariants();
        self.frequent.debug_validate_invariants();
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
            self.recent.len() + self.history_recent.len() <= self.cache_size,
            "|T1|+|B1| ({}) > cache_size ({})",
            self.recent.len() + self.history_recent.len(),
            self.cache_size
        );
        assert!(
            self.frequent.len() + self.history_frequent.len() <= self.capacity,
            "|T2|+|B2| exceeds the tracking budget"
        );
        assert!(
            resident + ghosts <= self.capacity,
            "tracked entries ({}) > capacity ({})",
            resident + ghosts,
            self.capacity
        );
        assert!(
            self.target_recent <= self.cache_size,
            "p ({}) > cache_size ({})",
            self.target_recent,
            self.cache_size
        );
        assert_eq!(
            resident + ghosts,
            self.table.len(),
            "lists and table disagree on entry count"
        );

        // Every tracked key appears in exactly one list, with a matching
        // history flag and value presence.
        let mut seen = std::collections::HashSet::new();
        for key in self.recent.debug_snapshot_keys() {
            assert!(seen.insert(key.clone()), "key in more than one list");
            let entry = self.table.get(&key).expect("recent key missing from table");
            assert!(!entry.is_history, "recent key flagged as history");
            assert!(entry.value.is_some(), "resident entry without a value");
        }
        for key in self.frequent.debug_snapshot_keys() {
            assert!(seen.insert(key.clone()), "key in more than one list");
            let entry = self.table.get(&key).expect("frequent key missing from table");
            assert!(!entry.is_history, "frequent key flagged as history");
            assert!(entry.value.is_some(), "resident entry without a value");
        }
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

impl<K, V, L> CarCore<K, V, L>
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

impl<K, V, L> std::fmt::Debug for CarCore<K, V, L>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarCore")
            .field("capacity", &self.capacity)
            .field("cache_size", &self.cache_size)
            .field("recent_len", &self.recent.len())
            .field("frequent_len", &self.frequent.len())
            .field("history_recent_len", &self.history_recent.len())
            .field("history_frequent_len", &self.history_frequent.len())
            .field("target_recent", &self.target_recent)
            .field("misses", &self.misses)
            .finish()
    }
}

impl<K, V, L> ReplacementCache<K, V> for CarCore<K, V, L>
where
    K: Eq + Hash + Clone,
    L: Loader<K, Value = V>,
{
    type Error = L::Error;

    fn try_get(&mut self, key: &K) -> Result<&V, L::Error> {
        CarCore::try_get(self, key)
    }

    fn misses(&self) -> u64 {
        CarCore::misses(self)
    }

    fn size(&self) -> usize {
        CarCore::size(self)
    }

    fn capacity(&self) -> usize {
        CarCore::capacity(self)
    }

    fn name(&self) -> &'static str {
        CarCore::name(self)
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
/// use carcache::policy::car::ConcurrentCarCache;
/// use carcache::traits::from_fn;
///
/// let cache = Arc::new(ConcurrentCarCache::new(64, from_fn(|k: &u64| *k)).unwrap());
/// let worker = {
///     let cache = Arc::clone(&cache);
///     std::thread::spawn(move || cache.get(&1))
/// };
/// assert_eq!(worker.join().unwrap(), 1);
/// ```
pub struct ConcurrentCarCache<K, V, L> {
    inner: Mutex<CarCore<K, V, L>>,
}

impl<K, V, L> ConcurrentCarCache<K, V, L>
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
    /// [`CarCore::new`].
    pub fn new(capacity: usize, loader: L) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Mutex::new(CarCore::new(capacity, loader)?),
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
        "CAR"
    }
}

impl<K, V, L> ConcurrentCarCache<K, V, L>
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

impl<K, V, L> std::fmt::Debug for ConcurrentCarCache<K, V, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("ConcurrentCarCache")
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

    fn identity_cache(capacity: usize) -> CarCore<u64, u64, impl Loader<u64, Value = u64, Error = Infallible>> {
        CarCore::new(capacity, from_fn(|k: &u64| *k)).unwrap()
    }

    #[test]
    fn car_rejects_tiny_capacities() {
        assert!(CarCore::<u64, u64, _>::new(0, from_fn(|k: &u64| *k)).is_err());
        assert!(CarCore::<u64, u64, _>::new(1, from_fn(|k: &u64| *k)).is_err());
        assert!(CarCore::<u64, u64, _>::new(2, from_fn(|k: &u64| *k)).is_ok());
    }

    #[test]
    fn car_new_cache_is_empty() {
        let cache = identity_cache(100);
        assert_eq!(cache.capacity(), 100);
        assert_eq!(cache.cache_size(), 50);
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.target_recent_size(), 0);
        assert_eq!(cache.misses(), 0);
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_hit_sets_bit_without_moving() {
        let mut cache = identity_cache(8);
        cache.get(&1);
        cache.get(&2);
        assert_eq!(cache.debug_recent_keys(), vec![1, 2]);

        cache.get(&1);
        // Hits never reorder the clock.
        assert_eq!(cache.debug_recent_keys(), vec![1, 2]);
        assert_eq!(cache.frequent_len(), 0);
        assert_eq!(cache.misses(), 2);
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_repeated_gets_miss_once() {
        // Capacity 4, trace 1,1,2,2,1.
        let mut cache = identity_cache(4);
        for key in [1, 1, 2, 2, 1] {
            assert_eq!(*cache.get(&key), key);
            cache.debug_validate_invariants();
        }
        assert_eq!(cache.misses(), 2);
        assert!(cache.contains_resident(&1));
        assert!(cache.contains_resident(&2));
    }

    #[test]
    fn car_scan_churns_through_recent_clock() {
        // Capacity 4, trace 1,2,3,4,5,1: a pure scan. Every access misses;
        // at this size each fresh ghost is reclaimed by the history trim
        // before it can be re-referenced, so key 1 returns as a fresh miss.
        let mut cache = identity_cache(4);
        for key in [1, 2, 3, 4, 5, 1] {
            assert_eq!(*cache.get(&key), key);
            cache.debug_validate_invariants();
        }
        assert_eq!(cache.misses(), 6);
        assert_eq!(cache.recent_len() + cache.frequent_len(), 2);
        assert!(cache.contains_resident(&1));
    }

    #[test]
    fn car_referenced_entry_promotes_to_frequent() {
        let mut cache = identity_cache(4);
        cache.get(&1);
        cache.get(&2);
        cache.get(&1); // set reference bit on 1
        cache.get(&3); // sweep: 1 moves to frequent, 2 demoted to history

        assert_eq!(cache.debug_frequent_keys(), vec![1]);
        assert!(cache.contains_resident(&1));
        assert!(!cache.contains_resident(&2));
        assert_eq!(cache.misses(), 3);
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_ghost_hit_promotes_to_frequent_and_grows_target() {
        // Fill, reference 1 so the sweep moves it to the frequent clock and
        // demotes 2 with T2 non-empty; the ghost of 2 then survives the trim.
        let mut cache = identity_cache(4);
        cache.get(&1);
        cache.get(&2);
        cache.get(&1);
        cache.get(&3);
        assert_eq!(cache.debug_history_recent_keys(), vec![2]);
        assert_eq!(cache.target_recent_size(), 0);

        let misses_before = cache.misses();
        cache.get(&2); // ghost hit in the recency history
        assert_eq!(cache.misses(), misses_before, "ghost hit is not a true miss");
        assert!(cache.contains_resident(&2));
        assert!(cache.debug_frequent_keys().contains(&2));
        assert_eq!(cache.target_recent_size(), 1, "B1 hit grows the target");
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_frequency_ghost_hit_shrinks_target() {
        let mut cache = identity_cache(4);
        // Build p = 1 with 1, 2 resident in the frequent clock (see above).
        cache.get(&1);
        cache.get(&2);
        cache.get(&1);
        cache.get(&3);
        cache.get(&2);
        assert_eq!(cache.target_recent_size(), 1);

        // Next miss sweeps the frequent clock (|T1| < max(1, p)) and
        // demotes 1 to the frequency history.
        cache.get(&4);
        assert_eq!(cache.debug_history_frequent_keys(), vec![1]);

        cache.get(&1); // ghost hit in the frequency history
        assert_eq!(cache.target_recent_size(), 0, "B2 hit shrinks the target");
        assert!(cache.contains_resident(&1));
        assert!(cache.debug_frequent_keys().contains(&1));
        assert_eq!(cache.misses(), 4);
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_ghost_promotion_reloads_value() {
        // The loader's output changes between generations; a promoted ghost
        // must serve the freshly loaded value, not a stale one.
        let mut generation = 0u64;
        let mut cache = CarCore::new(4, try_from_fn(move |k: &u64| -> Result<u64, Infallible> {
            generation += 1;
            Ok(k * 1000 + generation)
        }))
        .unwrap();
        cache.try_get(&1).unwrap();
        cache.try_get(&2).unwrap(); // generation 2
        cache.try_get(&1).unwrap();
        cache.try_get(&3).unwrap();
        assert!(cache.debug_history_recent_keys().contains(&2));
        // Ghost hit: generation 4, not the stale 2002.
        assert_eq!(*cache.try_get(&2).unwrap(), 2004);
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_loader_error_leaves_state_untouched() {
        let mut cache = CarCore::new(4, try_from_fn(|k: &u64| -> Result<u64, String> {
            if *k == 99 { Err("backing store down".to_string()) } else { Ok(*k) }
        }))
        .unwrap();
        cache.try_get(&1).unwrap();
        cache.try_get(&2).unwrap();
        cache.try_get(&1).unwrap(); // reference bit on 1

        let recent_before = cache.debug_recent_keys();
        let misses_before = cache.misses();
        let target_before = cache.target_recent_size();

        assert!(cache.try_get(&99).is_err());

        assert_eq!(cache.debug_recent_keys(), recent_before);
        assert_eq!(cache.misses(), misses_before);
        assert_eq!(cache.target_recent_size(), target_before);
        assert_eq!(cache.size(), 2);
        cache.debug_validate_invariants();
    }

    #[test]
    fn car_long_scan_bounds_residency() {
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
    fn car_concurrent_smoke() {
        use std::sync::Arc;

        let cache = Arc::new(ConcurrentCarCache::new(64, from_fn(|k: &u64| *k)).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        assert_eq!(cache.get(&((t * 37 + i) % 80)), (t * 37 + i) % 80);
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
