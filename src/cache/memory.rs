//! In-process map backend

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::backend::{CacheBackend, CacheItem};
use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<String, CacheItem>,
    deferred: HashMap<String, CacheItem>,
}

/// Mutex-guarded map backend; tag-aware and pruneable
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items waiting for a commit
    pub fn pending(&self) -> usize {
        self.lock().map(|state| state.deferred.len()).unwrap_or(0)
    }

    /// Drop every pending write; returns how many were dropped
    pub fn rollback(&self) -> usize {
        self.lock()
            .map(|mut state| std::mem::take(&mut state.deferred).len())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| CacheError::Io("memory cache lock poisoned".to_string()))
    }
}

impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now().timestamp();
        let state = self.lock()?;
        let item = state.deferred.get(key).or_else(|| state.items.get(key));
        Ok(item
            .filter(|item| item.expires_at > now)
            .map(|item| item.value.clone()))
    }

    fn save_deferred(&self, item: CacheItem) -> bool {
        match self.lock() {
            Ok(mut state) => {
                state.deferred.insert(item.key.clone(), item);
                true
            }
            Err(_) => false,
        }
    }

    fn commit(&self) -> Result<bool> {
        let mut state = self.lock()?;
        let deferred = std::mem::take(&mut state.deferred);
        state.items.extend(deferred);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let pending = state.deferred.remove(key).is_some();
        Ok(state.items.remove(key).is_some() || pending)
    }

    fn clear(&self) -> Result<bool> {
        let mut state = self.lock()?;
        state.items.clear();
        state.deferred.clear();
        Ok(true)
    }

    fn prune(&self) -> Result<bool> {
        let now = Utc::now().timestamp();
        let mut state = self.lock()?;
        state.items.retain(|_, item| item.expires_at > now);
        Ok(true)
    }

    fn invalidate_tags(&self, tags: &[&str]) -> Result<bool> {
        let mut state = self.lock()?;
        let tagged = |item: &CacheItem| item.tags.iter().any(|t| tags.contains(&t.as_str()));
        state.items.retain(|_, item| !tagged(item));
        state.deferred.retain(|_, item| !tagged(item));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, value: &str, ttl: i64, tags: &[&str]) -> CacheItem {
        CacheItem {
            key: key.to_string(),
            value: value.as_bytes().to_vec(),
            expires_at: Utc::now().timestamp() + ttl,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_deferred_is_readable_before_commit() {
        let backend = MemoryBackend::new();
        assert!(backend.save_deferred(item("k1", "v1", 60, &[])));
        assert_eq!(backend.pending(), 1);
        assert_eq!(backend.get("k1").unwrap(), Some(b"v1".to_vec()));

        assert!(backend.commit().unwrap());
        assert_eq!(backend.pending(), 0);
        assert_eq!(backend.get("k1").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_rollback_drops_pending_writes() {
        let backend = MemoryBackend::new();
        backend.save_deferred(item("k1", "v1", 60, &[]));
        backend.commit().unwrap();
        backend.save_deferred(item("k1", "v2", 60, &[]));
        backend.save_deferred(item("k2", "v2", 60, &[]));

        assert_eq!(backend.rollback(), 2);
        assert_eq!(backend.get("k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(backend.get("k2").unwrap(), None);
    }

    #[test]
    fn test_expired_items_are_misses() {
        let backend = MemoryBackend::new();
        backend.save_deferred(item("k1", "v1", -10, &[]));
        backend.commit().unwrap();
        assert_eq!(backend.get("k1").unwrap(), None);
    }

    #[test]
    fn test_delete_drops_pending_write() {
        let backend = MemoryBackend::new();
        backend.save_deferred(item("k1", "v1", 60, &[]));
        assert!(backend.delete("k1").unwrap());
        backend.commit().unwrap();
        assert_eq!(backend.get("k1").unwrap(), None);
        assert!(!backend.delete("k1").unwrap());
    }

    #[test]
    fn test_prune_and_tags() {
        let backend = MemoryBackend::new();
        backend.save_deferred(item("old", "v", -10, &["remediation"]));
        backend.save_deferred(item("ip", "v", 60, &["remediation", "ip"]));
        backend.save_deferred(item("bucket", "v", 60, &["RANGE_BUCKET"]));
        backend.commit().unwrap();

        assert!(backend.prune().unwrap());
        assert!(backend.invalidate_tags(&["ip"]).unwrap());
        assert_eq!(backend.get("ip").unwrap(), None);
        assert_eq!(backend.get("bucket").unwrap(), Some(b"v".to_vec()));

        assert!(backend.clear().unwrap());
        assert_eq!(backend.get("bucket").unwrap(), None);
    }
}
