pub mod clock_ring;
pub mod fifo_queue;
pub mod lru_list;

pub use clock_ring::ClockRing;
pub use fifo_queue::FifoQueue;
pub use lru_list::LruList;
