pub use crate::ds::{ClockRing, FifoQueue, LruList};
pub use crate::error::ConfigError;
pub use crate::policy::car::{CarCore, ConcurrentCarCache};
pub use crate::policy::cart::{CartCore, ConcurrentCartCache, FilterBit};
pub use crate::policy::lru::{ConcurrentLruCache, LruCore};
pub use crate::traits::{from_fn, try_from_fn, FnLoader, Loader, ReplacementCache, TryFnLoader};
