//! SQLite-backed local file cache
//!
//! Items live in a single table; deferred writes are buffered in memory and
//! flushed in one transaction on commit.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::backend::{CacheBackend, CacheItem};
use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

const DB_FILE: &str = "remediation-cache.db";

type Result<T> = std::result::Result<T, CacheError>;

/// SQLite cache backend; tag-aware and pruneable
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    deferred: Mutex<HashMap<String, CacheItem>>,
}

impl SqliteBackend {
    /// Open or create the cache at the default XDG cache location
    pub fn open() -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir)
    }

    /// Default cache directory (~/.cache/remediation-engine on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("remediation-engine"))
    }

    /// Open or create the cache in a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_items (
                cache_key TEXT PRIMARY KEY NOT NULL,
                data BLOB NOT NULL,
                tags TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_expires_at ON cache_items(expires_at);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            deferred: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Io("sqlite connection lock poisoned".to_string()))
    }

    fn deferred(&self) -> Result<MutexGuard<'_, HashMap<String, CacheItem>>> {
        self.deferred
            .lock()
            .map_err(|_| CacheError::Io("deferred buffer lock poisoned".to_string()))
    }
}

/// Tags are stored as `|a|b|` so a single LIKE finds any of them
fn encode_tags(tags: &[String]) -> String {
    format!("|{}|", tags.join("|"))
}

impl CacheBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now().timestamp();

        if let Some(item) = self.deferred()?.get(key) {
            return Ok((item.expires_at > now).then(|| item.value.clone()));
        }

        let data = self
            .conn()?
            .query_row(
                "SELECT data FROM cache_items WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    fn save_deferred(&self, item: CacheItem) -> bool {
        match self.deferred() {
            Ok(mut deferred) => {
                deferred.insert(item.key.clone(), item);
                true
            }
            Err(e) => {
                log::warn!("Failed to buffer cache write: {}", e);
                false
            }
        }
    }

    /// The buffer is emptied before writing: a failed commit drops it
    fn commit(&self) -> Result<bool> {
        let deferred = std::mem::take(&mut *self.deferred()?);
        if deferred.is_empty() {
            return Ok(true);
        }

        let now = Utc::now().timestamp();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for item in deferred.values() {
            tx.execute(
                "INSERT OR REPLACE INTO cache_items (cache_key, data, tags, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![item.key, item.value, encode_tags(&item.tags), now, item.expires_at],
            )?;
        }
        tx.commit()?;

        log::debug!("Committed {} deferred cache items", deferred.len());
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let pending = self.deferred()?.remove(key).is_some();
        let deleted = self
            .conn()?
            .execute("DELETE FROM cache_items WHERE cache_key = ?1", [key])?;
        Ok(deleted > 0 || pending)
    }

    fn clear(&self) -> Result<bool> {
        self.deferred()?.clear();
        self.conn()?.execute("DELETE FROM cache_items", [])?;
        Ok(true)
    }

    fn prune(&self) -> Result<bool> {
        let now = Utc::now().timestamp();
        let pruned = self
            .conn()?
            .execute("DELETE FROM cache_items WHERE expires_at <= ?1", [now])?;
        log::debug!("Pruned {} expired cache items", pruned);
        Ok(true)
    }

    fn invalidate_tags(&self, tags: &[&str]) -> Result<bool> {
        self.deferred()?
            .retain(|_, item| !item.tags.iter().any(|t| tags.contains(&t.as_str())));

        let conn = self.conn()?;
        for tag in tags {
            conn.execute(
                "DELETE FROM cache_items WHERE tags LIKE ?1",
                [format!("%|{}|%", tag)],
            )?;
        }
        Ok(true)
    }
}
