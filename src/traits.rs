//! # Cache trait surface
//!
//! Two traits tie the crate together:
//!
//! ```text
//!   ┌──────────────────────────────────────┐
//!   │            Loader<K>                 │
//!   │                                      │
//!   │  type Value; type Error;             │
//!   │  load(&mut, &K) → Result<Value, Err> │
//!   └──────────────────┬───────────────────┘
//!                      │ injected at construction
//!                      ▼
//!   ┌──────────────────────────────────────┐
//!   │       ReplacementCache<K, V>         │
//!   │                                      │
//!   │  try_get(&mut, &K) → Result<&V, E>   │
//!   │  misses(&) → u64                     │
//!   │  size(&) → usize                     │
//!   │  capacity(&) → usize                 │
//!   │  name(&) → &'static str              │
//!   └──────────────────┬───────────────────┘
//!          ┌───────────┼───────────┐
//!          ▼           ▼           ▼
//!       LruCore     CarCore     CartCore
//! ```
//!
//! [`Loader`] is the backing store: the cache calls it once per miss and
//! installs whatever it returns. Closures become loaders through two
//! adapters: [`from_fn`] wraps an infallible `FnMut(&K) -> V` (its error
//! type is [`Infallible`], which unlocks the panic-free `get` on the policy
//! types), and [`try_from_fn`] wraps a fallible
//! `FnMut(&K) -> Result<V, E>`.
//!
//! [`ReplacementCache`] is the query surface shared by every policy, so a
//! single driver can replay one trace against a mixed set of caches and
//! compare miss counters.
//!
//! ## Example Usage
//!
//! ```
//! use carcache::policy::car::CarCore;
//! use carcache::policy::lru::LruCore;
//! use carcache::traits::{from_fn, ReplacementCache};
//!
//! fn replay<C: ReplacementCache<u64, u64>>(cache: &mut C, trace: &[u64]) -> u64 {
//!     for key in trace {
//!         let _ = cache.try_get(key);
//!     }
//!     cache.misses()
//! }
//!
//! let trace = [1, 2, 1, 3, 2, 1];
//! let mut lru = LruCore::new(2, from_fn(|k: &u64| *k)).unwrap();
//! let mut car = CarCore::new(4, from_fn(|k: &u64| *k)).unwrap();
//! assert_eq!(replay(&mut lru, &trace), 5);
//! assert_eq!(replay(&mut car, &trace), 3);
//! ```

use std::convert::Infallible;

/// Computes the value for a key on a cache miss.
///
/// The cache calls [`load`](Loader::load) exactly once per miss and installs
/// the returned value verbatim. A failing load propagates out of the cache
/// unchanged, and the cache performs no mutation for that key.
///
/// Use [`from_fn`] or [`try_from_fn`] to build a loader from a closure;
/// implement the trait directly for loaders with their own state or error
/// taxonomy.
///
/// # Example
///
/// ```
/// use carcache::traits::{try_from_fn, Loader};
///
/// let mut flaky = try_from_fn(|k: &u32| {
///     if *k == 0 { Err("no value for zero".to_string()) } else { Ok(k * 10) }
/// });
/// assert_eq!(flaky.load(&4), Ok(40));
/// assert!(flaky.load(&0).is_err());
/// ```
pub trait Loader<K> {
    /// Value produced on a successful load.
    type Value;
    /// Error surfaced to the caller on a failed load.
    type Error;

    /// Produces the value for `key`.
    fn load(&mut self, key: &K) -> Result<Self::Value, Self::Error>;
}

/// A [`Loader`] built from an infallible closure. See [`from_fn`].
#[derive(Debug, Clone)]
pub struct FnLoader<F>(F);

impl<K, V, F> Loader<K> for FnLoader<F>
where
    F: FnMut(&K) -> V,
{
    type Value = V;
    type Error = Infallible;

    fn load(&mut self, key: &K) -> Result<V, Infallible> {
        Ok((self.0)(key))
    }
}

/// Wraps an infallible `FnMut(&K) -> V` as a [`Loader`].
///
/// Caches built over an infallible loader expose a plain `get` returning
/// `&V` in addition to `try_get`.
///
/// # Example
///
/// ```
/// use carcache::traits::{from_fn, Loader};
///
/// let mut identity = from_fn(|k: &u64| *k);
/// assert_eq!(identity.load(&7), Ok(7));
/// ```
pub fn from_fn<F>(f: F) -> FnLoader<F> {
    FnLoader(f)
}

/// A [`Loader`] built from a fallible closure. See [`try_from_fn`].
#[derive(Debug, Clone)]
pub struct TryFnLoader<F>(F);

impl<K, V, E, F> Loader<K> for TryFnLoader<F>
where
    F: FnMut(&K) -> Result<V, E>,
{
    type Value = V;
    type Error = E;

    fn load(&mut self, key: &K) -> Result<V, E> {
        (self.0)(key)
    }
}

/// Wraps a fallible `FnMut(&K) -> Result<V, E>` as a [`Loader`].
///
/// The error type flows through the cache unchanged: `try_get` on a cache
/// built over this loader returns `Result<&V, E>`.
///
/// # Example
///
/// ```
/// use carcache::policy::lru::LruCore;
/// use carcache::traits::try_from_fn;
///
/// let mut cache = LruCore::new(4, try_from_fn(|k: &u32| {
///     if *k < 100 { Ok(k + 1) } else { Err("out of range") }
/// }))
/// .unwrap();
/// assert_eq!(cache.try_get(&1), Ok(&2));
/// assert_eq!(cache.try_get(&100), Err("out of range"));
/// ```
pub fn try_from_fn<F>(f: F) -> TryFnLoader<F> {
    TryFnLoader(f)
}

/// Query surface shared by every replacement policy.
///
/// `try_get` is the single top-level operation: it returns the resident
/// value or consults the loader, mutating the policy state machine either
/// way. The remaining methods are observers used by drivers and tests.
///
/// # Example
///
/// ```
/// use carcache::policy::cart::CartCore;
/// use carcache::traits::{from_fn, ReplacementCache};
///
/// let mut cache = CartCore::new(8, from_fn(|k: &u32| k.to_string())).unwrap();
/// assert_eq!(cache.name(), "CART");
/// let _ = cache.try_get(&1);
/// assert_eq!(cache.misses(), 1);
/// ```
pub trait ReplacementCache<K, V> {
    /// Error type of the injected loader.
    type Error;

    /// Returns the value for `key`, loading and installing it on a miss.
    fn try_get(&mut self, key: &K) -> Result<&V, Self::Error>;

    /// Monotonic count of true misses (accesses that invoked the loader for
    /// a key with no tracked history) since construction.
    fn misses(&self) -> u64;

    /// Number of tracked entries. Adaptive policies count ghosts; LRU does
    /// not have any.
    fn size(&self) -> usize;

    /// Hard bound on tracked entries.
    fn capacity(&self) -> usize;

    /// Policy name: `"LRU"`, `"CAR"`, or `"CART"`.
    fn name(&self) -> &'static str;
}
