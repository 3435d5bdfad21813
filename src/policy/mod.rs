pub mod car;
pub mod cart;
pub mod lru;

pub use car::{CarCore, ConcurrentCarCache};
pub use cart::{CartCore, ConcurrentCartCache, FilterBit};
pub use lru::{ConcurrentLruCache, LruCore};
