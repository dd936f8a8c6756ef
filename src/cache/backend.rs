//! Key-value backend contract consumed by the cache storage engine

use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// One item handed to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    /// Backend key (already encoded)
    pub key: String,
    /// Serialized value
    pub value: Vec<u8>,
    /// Unix timestamp after which the item is gone
    pub expires_at: i64,
    /// Tags for bulk invalidation
    pub tags: Vec<String>,
}

/// Minimal key-value store with deferred writes.
///
/// Implementations must give read-your-writes semantics: `get` sees items
/// saved with `save_deferred` even before `commit`. Expired items are never
/// returned.
pub trait CacheBackend: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &'static str;

    /// Fetch a live item's value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Buffer a write until the next `commit`
    fn save_deferred(&self, item: CacheItem) -> bool;

    /// Persist every buffered write
    fn commit(&self) -> Result<bool>;

    /// Delete an item immediately, dropping any buffered write for it
    fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every item
    fn clear(&self) -> Result<bool>;

    /// Delete expired items; only some backends support it
    fn prune(&self) -> Result<bool> {
        Err(CacheError::NotPruneable(self.name().to_string()))
    }

    /// Delete every item carrying one of the tags; `Ok(false)` when the
    /// backend is not tag-aware
    fn invalidate_tags(&self, _tags: &[&str]) -> Result<bool> {
        Ok(false)
    }
}
