//! Cache key convention: `<scope>_<value>` with unsafe characters replaced

use base64::{Engine as _, engine::general_purpose};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CacheError;

/// Separator between scope and value, also the replacement for unsafe characters
pub const CACHE_SEP: char = '_';

/// Pseudo-scope of the IPv4 range bucket index
pub const IPV4_BUCKET_KEY: &str = "RANGE_BUCKET_IPV4";

/// Build the semantic cache key for a scope/value pair.
///
/// Supported scopes are `ip`, `range` and the bucket pseudo-scope. Every
/// character outside `[A-Za-z0-9_.]` is replaced with `_`.
pub fn cache_key(scope: &str, value: &str) -> Result<String, CacheError> {
    match scope {
        "ip" | "range" | IPV4_BUCKET_KEY => {}
        _ => return Err(CacheError::UnknownScope(scope.to_string())),
    }

    Ok(format!("{}{}{}", scope, CACHE_SEP, value)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                CACHE_SEP
            }
        })
        .collect())
}

/// Key handed to the backend: base64 of the semantic key, so any backend
/// charset restriction is satisfied.
pub fn backend_key(cache_key: &str) -> String {
    general_purpose::STANDARD.encode(cache_key)
}

/// Memoized cache keys for the lifetime of an engine instance
#[derive(Debug, Default)]
pub struct CacheKeys {
    keys: Mutex<HashMap<(String, String), String>>,
}

impl CacheKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same result as [`cache_key`], computed once per pair
    pub fn get(&self, scope: &str, value: &str) -> Result<String, CacheError> {
        let pair = (scope.to_string(), value.to_string());
        if let Ok(keys) = self.keys.lock()
            && let Some(key) = keys.get(&pair)
        {
            return Ok(key.clone());
        }

        let key = cache_key(scope, value)?;
        if let Ok(mut keys) = self.keys.lock() {
            keys.insert(pair, key.clone());
        }
        Ok(key)
    }
}
