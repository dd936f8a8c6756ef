//! Decision cache storage engine
//!
//! Each cache item holds the list of decisions for one scope/value pair as
//! compact tuples, sorted by priority (most severe first) on every write. Range
//! decisions are additionally indexed in IPv4 buckets so that a lookup only
//! checks the ranges sharing the queried address's bucket.
//!
//! Writes are deferred: nothing is durable until [`CacheStorage::commit`].
//! There is no cross-writer lock; two writers updating the same item
//! concurrently can lose one update (read-then-write without compare-and-swap).

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::ops::{Add, AddAssign};

use super::backend::{CacheBackend, CacheItem};
use super::bucket::{RANGE_BUCKET_TAG, bucket_of, bucket_span, decision_range, range_contains};
use super::key::{CacheKeys, IPV4_BUCKET_KEY, backend_key};
use super::memory::MemoryBackend;
use super::sqlite::SqliteBackend;
use crate::config::{BackendDsn, CacheConfig};
use crate::constants::{CACHE_TAG_REM, EventType, REMEDIATION_BYPASS};
use crate::decision::{Decision, Scope};
use crate::duration::parse_duration;
use crate::error::{CacheError, Result};

/// Lifetime of clean IPs in stream mode. Ten years rather than `i64::MAX`,
/// which some backends mangle into floats.
pub const FOREVER: i64 = 315_360_000;

/// Cached form of one decision: `[type, expiration, identifier, priority]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDecision(pub String, pub i64, pub String, pub usize);

impl CachedDecision {
    /// Remediation type
    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn expires_at(&self) -> i64 {
        self.1
    }

    pub fn identifier(&self) -> &str {
        &self.2
    }

    pub fn priority(&self) -> usize {
        self.3
    }
}

/// Bucket index entry: `[range, expiration, identifier]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry(pub String, pub i64, pub String);

impl BucketEntry {
    pub fn range(&self) -> &str {
        &self.0
    }

    pub fn expires_at(&self) -> i64 {
        self.1
    }

    pub fn identifier(&self) -> &str {
        &self.2
    }
}

/// Tuple shapes stored in cache items
trait CachedTuple: Serialize + DeserializeOwned {
    fn expires_at(&self) -> i64;
    fn identifier(&self) -> &str;
    fn priority(&self) -> usize {
        0
    }
}

impl CachedTuple for CachedDecision {
    fn expires_at(&self) -> i64 {
        self.1
    }

    fn identifier(&self) -> &str {
        &self.2
    }

    fn priority(&self) -> usize {
        self.3
    }
}

impl CachedTuple for BucketEntry {
    fn expires_at(&self) -> i64 {
        self.1
    }

    fn identifier(&self) -> &str {
        &self.2
    }
}

/// Writes applied by a store or remove: `done` is already durable, `deferred`
/// waits for the next commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    pub done: usize,
    pub deferred: usize,
}

impl StoreOutcome {
    pub const NONE: StoreOutcome = StoreOutcome {
        done: 0,
        deferred: 0,
    };
    const DONE: StoreOutcome = StoreOutcome {
        done: 1,
        deferred: 0,
    };
    const DEFERRED: StoreOutcome = StoreOutcome {
        done: 0,
        deferred: 1,
    };
}

impl Add for StoreOutcome {
    type Output = StoreOutcome;

    fn add(self, rhs: StoreOutcome) -> StoreOutcome {
        StoreOutcome {
            done: self.done + rhs.done,
            deferred: self.deferred + rhs.deferred,
        }
    }
}

impl AddAssign for StoreOutcome {
    fn add_assign(&mut self, rhs: StoreOutcome) {
        *self = *self + rhs;
    }
}

/// Where a write lands: a decision item or a bucket of the range index
#[derive(Debug, Clone, Copy)]
enum Target {
    Decision,
    Bucket(u32),
}

/// Decision cache on top of a [`CacheBackend`]
pub struct CacheStorage {
    backend: Box<dyn CacheBackend>,
    keys: CacheKeys,
    stream_mode: bool,
    clean_ip_cache_duration: i64,
    bad_ip_cache_duration: i64,
}

impl CacheStorage {
    /// Wrap a backend using the lifetimes and mode of `config`
    pub fn new(config: &CacheConfig, backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            keys: CacheKeys::new(),
            stream_mode: config.stream_mode,
            clean_ip_cache_duration: i64::try_from(config.clean_ip_cache_duration)
                .unwrap_or(FOREVER),
            bad_ip_cache_duration: i64::try_from(config.bad_ip_cache_duration).unwrap_or(FOREVER),
        }
    }

    /// Build the backend selected by the configured DSN
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let storage = match config.backend()? {
            BackendDsn::Memory => Self::new(config, MemoryBackend::new()),
            BackendDsn::Sqlite(None) => Self::new(config, SqliteBackend::open()?),
            BackendDsn::Sqlite(Some(dir)) => Self::new(config, SqliteBackend::open_at(&dir)?),
        };
        log::debug!("Cache storage ready on {} backend", storage.backend.name());
        Ok(storage)
    }

    /// Underlying backend
    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    /// Lifetime of a cached clean IP outside stream mode, in seconds
    pub fn clean_ip_cache_duration(&self) -> i64 {
        self.clean_ip_cache_duration
    }

    pub fn stream_mode(&self) -> bool {
        self.stream_mode
    }

    /// In stream mode only feed refreshes change cache state: clean IPs are
    /// kept "forever" and bad IP durations are not capped.
    pub fn set_stream_mode(&mut self, stream_mode: bool) {
        self.stream_mode = stream_mode;
    }

    /// Store a decision; storing an identifier already cached is a no-op
    pub fn store_decision(&self, decision: &Decision) -> StoreOutcome {
        match decision.scope() {
            Scope::Ip => self.store(decision, Target::Decision),
            Scope::Range => self.store_range(decision),
            Scope::Country | Scope::Other(_) => {
                log::warn!(
                    "{} decision={}",
                    EventType::CacheStoreNonImplementedScope,
                    decision
                );
                StoreOutcome::NONE
            }
        }
    }

    /// Remove a decision by identifier, purging expired tuples on the way
    pub fn remove_decision(&self, decision: &Decision) -> StoreOutcome {
        match decision.scope() {
            Scope::Ip => self.remove(decision, Target::Decision),
            Scope::Range => self.remove_range(decision),
            Scope::Country | Scope::Other(_) => {
                log::warn!(
                    "{} decision={}",
                    EventType::CacheRemoveNonImplementedScope,
                    decision
                );
                StoreOutcome::NONE
            }
        }
    }

    /// Cached decision lists applying to an address, one list per matching
    /// cache item. Callers merge them.
    pub fn retrieve_decisions_for_ip(&self, scope: &Scope, ip: &str) -> Vec<Vec<CachedDecision>> {
        match scope {
            Scope::Ip => {
                let Some(key) = self.key_for(Scope::Ip.as_str(), ip) else {
                    return Vec::new();
                };
                let decisions: Vec<CachedDecision> = live(self.load(&key));
                if decisions.is_empty() {
                    Vec::new()
                } else {
                    vec![decisions]
                }
            }
            Scope::Range => self.retrieve_range_decisions(ip),
            Scope::Country | Scope::Other(_) => {
                log::warn!(
                    "{} scope={}",
                    EventType::CacheRetrieveForIpNonImplementedScope,
                    scope
                );
                Vec::new()
            }
        }
    }

    /// Entries of one IPv4 bucket
    pub fn bucket_entries(&self, bucket: u32) -> Vec<BucketEntry> {
        self.key_for(IPV4_BUCKET_KEY, &bucket.to_string())
            .map(|key| live(self.load(&key)))
            .unwrap_or_default()
    }

    /// Persist every deferred write
    pub fn commit(&self) -> bool {
        match self.backend.commit() {
            Ok(true) => true,
            Ok(false) => {
                log::error!("{} backend={}", EventType::CacheCommitFailed, self.backend.name());
                false
            }
            Err(e) => {
                log::error!("{} error={}", EventType::CacheCommitFailed, e);
                false
            }
        }
    }

    /// Delete every cached item
    pub fn clear(&self) -> bool {
        self.backend.clear().unwrap_or_else(|e| {
            log::error!("Failed to clear cache: {}", e);
            false
        })
    }

    /// Delete expired items; fails if the backend cannot sweep expired items
    pub fn prune(&self) -> std::result::Result<bool, CacheError> {
        self.backend.prune()
    }

    /// Delete every item tagged with one of `tags` (e.g. `ip`, `range`,
    /// `RANGE_BUCKET`). Returns false on backends without tag support.
    pub fn invalidate_tags(&self, tags: &[&str]) -> std::result::Result<bool, CacheError> {
        self.backend.invalidate_tags(tags)
    }

    fn store_range(&self, decision: &Decision) -> StoreOutcome {
        let Some(range) = decision_range(decision) else {
            return StoreOutcome::NONE;
        };

        for bucket in bucket_span(&range) {
            self.store(decision, Target::Bucket(bucket));
        }
        self.store(decision, Target::Decision)
    }

    fn remove_range(&self, decision: &Decision) -> StoreOutcome {
        let Some(range) = decision_range(decision) else {
            return StoreOutcome::NONE;
        };

        for bucket in bucket_span(&range) {
            self.remove(decision, Target::Bucket(bucket));
        }
        self.remove(decision, Target::Decision)
    }

    fn retrieve_range_decisions(&self, ip: &str) -> Vec<Vec<CachedDecision>> {
        let address = match ip.trim().parse::<Ipv4Addr>() {
            Ok(address) => address,
            Err(_) => {
                log::debug!(
                    "{} ip={} (range lookup is IPv4 only)",
                    EventType::InvalidIpAddress,
                    ip
                );
                return Vec::new();
            }
        };

        let mut matches = Vec::new();
        for entry in self.bucket_entries(bucket_of(address)) {
            if !range_contains(entry.range(), IpAddr::V4(address)) {
                continue;
            }
            let Some(key) = self.key_for(Scope::Range.as_str(), entry.range()) else {
                continue;
            };
            let decisions: Vec<CachedDecision> = live(self.load(&key));
            if !decisions.is_empty() {
                matches.push(decisions);
            }
        }
        matches
    }

    fn store(&self, decision: &Decision, target: Target) -> StoreOutcome {
        let tuple = self.format(decision);
        match target {
            Target::Decision => self.upsert(decision, target, tuple),
            Target::Bucket(_) => {
                let entry = BucketEntry(
                    decision.value().to_string(),
                    tuple.expires_at(),
                    tuple.identifier().to_string(),
                );
                self.upsert(decision, target, entry)
            }
        }
    }

    fn remove(&self, decision: &Decision, target: Target) -> StoreOutcome {
        match target {
            Target::Decision => self.delete_tuple::<CachedDecision>(decision, target),
            Target::Bucket(_) => self.delete_tuple::<BucketEntry>(decision, target),
        }
    }

    fn upsert<T: CachedTuple>(&self, decision: &Decision, target: Target, tuple: T) -> StoreOutcome {
        let Some(key) = self.target_key(decision, target) else {
            return StoreOutcome::NONE;
        };

        let mut tuples: Vec<T> = live(self.load(&key));
        if tuples.iter().any(|t| t.identifier() == tuple.identifier()) {
            return StoreOutcome::NONE;
        }
        tuples.push(tuple);
        tuples.sort_by_key(|t| t.priority());

        if self.save_deferred(&key, &tuples, self.tags(decision, target)) {
            StoreOutcome::DEFERRED
        } else {
            log::warn!(
                "{} decision={} bucket={:?}",
                EventType::CacheStoreDeferredFailed,
                decision,
                bucket_of_target(target)
            );
            StoreOutcome::NONE
        }
    }

    fn delete_tuple<T: CachedTuple>(&self, decision: &Decision, target: Target) -> StoreOutcome {
        let Some(key) = self.target_key(decision, target) else {
            return StoreOutcome::NONE;
        };

        let tuples: Vec<T> = self.load(&key);
        if !tuples.iter().any(|t| t.identifier() == decision.identifier()) {
            return StoreOutcome::NONE;
        }
        let remaining: Vec<T> = live(tuples)
            .into_iter()
            .filter(|t| t.identifier() != decision.identifier())
            .collect();

        if remaining.is_empty() {
            return match self.backend.delete(&backend_key(&key)) {
                Ok(_) => StoreOutcome::DONE,
                Err(e) => {
                    log::warn!("Failed to delete cache item {}: {}", key, e);
                    StoreOutcome::NONE
                }
            };
        }

        if self.save_deferred(&key, &remaining, self.tags(decision, target)) {
            StoreOutcome::DEFERRED
        } else {
            log::warn!(
                "{} decision={} bucket={:?}",
                EventType::CacheStoreDeferredFailedForRemoveDecision,
                decision,
                bucket_of_target(target)
            );
            StoreOutcome::NONE
        }
    }

    /// Compact tuple for a decision item.
    ///
    /// Bypass: now + clean IP duration, or [`FOREVER`] in stream mode.
    /// Others: now + parsed duration, capped by the bad IP duration outside
    /// stream mode. Expirations saturate at `i64` bounds.
    fn format(&self, decision: &Decision) -> CachedDecision {
        let now = Utc::now().timestamp();
        if decision.remediation() == REMEDIATION_BYPASS {
            let duration = if self.stream_mode {
                FOREVER
            } else {
                self.clean_ip_cache_duration
            };
            return CachedDecision(
                REMEDIATION_BYPASS.to_string(),
                now.saturating_add(duration),
                decision.identifier().to_string(),
                decision.priority(),
            );
        }

        CachedDecision(
            decision.remediation().to_string(),
            now.saturating_add(self.bad_ip_duration(decision)),
            decision.identifier().to_string(),
            decision.priority(),
        )
    }

    fn bad_ip_duration(&self, decision: &Decision) -> i64 {
        let duration = parse_duration(decision.duration());
        if self.stream_mode {
            duration
        } else {
            duration.min(self.bad_ip_cache_duration)
        }
    }

    fn tags(&self, decision: &Decision, target: Target) -> Vec<String> {
        match target {
            Target::Decision => vec![CACHE_TAG_REM.to_string(), decision.scope().to_string()],
            Target::Bucket(_) => vec![RANGE_BUCKET_TAG.to_string()],
        }
    }

    fn target_key(&self, decision: &Decision, target: Target) -> Option<String> {
        match target {
            Target::Decision => self.key_for(decision.scope().as_str(), decision.value()),
            Target::Bucket(bucket) => self.key_for(IPV4_BUCKET_KEY, &bucket.to_string()),
        }
    }

    fn key_for(&self, scope: &str, value: &str) -> Option<String> {
        match self.keys.get(scope, value) {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("Unable to build cache key: {}", e);
                None
            }
        }
    }

    /// Tuples of an item; backend and decoding failures read as empty
    fn load<T: CachedTuple>(&self, key: &str) -> Vec<T> {
        let data = match self.backend.get(&backend_key(key)) {
            Ok(Some(data)) => data,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("{} key={} error={}", EventType::CacheBackendReadFailed, key, e);
                return Vec::new();
            }
        };

        serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("{} key={} error={}", EventType::CacheBackendReadFailed, key, e);
            Vec::new()
        })
    }

    /// Item TTL is the latest expiration among its tuples
    fn save_deferred<T: CachedTuple>(&self, key: &str, tuples: &[T], tags: Vec<String>) -> bool {
        let Some(expires_at) = tuples.iter().map(CachedTuple::expires_at).max() else {
            return false;
        };
        let value = match serde_json::to_vec(tuples) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to serialize cache item {}: {}", key, e);
                return false;
            }
        };

        self.backend.save_deferred(CacheItem {
            key: backend_key(key),
            value,
            expires_at,
            tags,
        })
    }
}

fn bucket_of_target(target: Target) -> Option<u32> {
    match target {
        Target::Decision => None,
        Target::Bucket(bucket) => Some(bucket),
    }
}

/// Drop tuples past their expiration
fn live<T: CachedTuple>(tuples: Vec<T>) -> Vec<T> {
    let now = Utc::now().timestamp();
    tuples.into_iter().filter(|t| t.expires_at() >= now).collect()
}
