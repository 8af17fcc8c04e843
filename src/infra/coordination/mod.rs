//! Coordination backends (lock, cache, pub/sub).

pub mod memory;

pub use memory::InMemoryCoordination;
