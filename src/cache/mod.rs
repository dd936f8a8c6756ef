//! Decision cache
//!
//! [`CacheStorage`] keeps remediation decisions in a key-value [`CacheBackend`]
//! with deferred writes, and indexes IPv4 ranges in fixed-size buckets.

pub mod backend;
pub mod bucket;
pub mod key;
pub mod memory;
pub mod sqlite;
pub mod storage;

// Re-export main types
pub use backend::{CacheBackend, CacheItem};
pub use key::{backend_key, cache_key};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use storage::{BucketEntry, CacheStorage, CachedDecision, FOREVER, StoreOutcome};
