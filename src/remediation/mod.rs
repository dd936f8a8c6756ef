//! Remediation engines
//!
//! An engine answers "what should happen to this IP" from the decision cache,
//! and keeps that cache in sync with a decision feed.

use async_trait::async_trait;

use crate::cache::{CacheStorage, CachedDecision, StoreOutcome};
use crate::config::RemediationConfig;
use crate::constants::{EventType, ORIGIN, REMEDIATION_BYPASS};
use crate::decision::{Decision, RawDecision, Scope};
use crate::error::Result;

pub mod capi;

pub use capi::CapiRemediation;

/// Decisions applied by one refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshCounts {
    pub new: usize,
    pub deleted: usize,
}

/// Common surface of remediation engines
#[async_trait]
pub trait RemediationEngine: Send + Sync {
    /// Remediation to apply to an IP; never fails, defaults to bypass
    fn get_ip_remediation(&self, ip: &str) -> String;

    /// Pull decision changes from the feed and apply them to the cache
    async fn refresh_decisions(&self) -> Result<RefreshCounts>;

    /// Delete every cached item
    fn clear_cache(&self) -> bool;

    /// Delete expired cached items
    fn prune_cache(&self) -> Result<bool>;
}

/// Store a batch then commit once.
///
/// Deferred writes only count when the commit succeeds.
pub fn store_decisions(cache: &CacheStorage, decisions: &[Decision]) -> usize {
    let mut outcome = StoreOutcome::NONE;
    for decision in decisions {
        outcome += cache.store_decision(decision);
    }
    applied(cache, outcome)
}

/// Remove a batch then commit once
pub fn remove_decisions(cache: &CacheStorage, decisions: &[Decision]) -> usize {
    let mut outcome = StoreOutcome::NONE;
    for decision in decisions {
        outcome += cache.remove_decision(decision);
    }
    applied(cache, outcome)
}

fn applied(cache: &CacheStorage, outcome: StoreOutcome) -> usize {
    if cache.commit() {
        outcome.done + outcome.deferred
    } else {
        outcome.done
    }
}

/// Convert feed records, dropping the malformed ones
pub fn convert_raw_decisions(config: &RemediationConfig, raw: &[RawDecision]) -> Vec<Decision> {
    raw.iter()
        .filter_map(|record| match Decision::from_raw(config, record) {
            Ok(decision) => Some(decision),
            Err(field) => {
                log::warn!(
                    "{} missing={} raw={:?}",
                    EventType::RawDecisionNotAsExpected,
                    field,
                    record
                );
                None
            }
        })
        .collect()
}

/// Sort cached tuples most severe first; ties keep their order
pub fn sort_decisions_by_priority(decisions: &mut [CachedDecision]) {
    decisions.sort_by_key(CachedDecision::priority);
}

/// Bypass decision created by the engine itself for a clean value
pub fn create_internal_decision(
    config: &RemediationConfig,
    scope: Scope,
    value: &str,
    duration: &str,
) -> Decision {
    Decision::new(
        config,
        scope,
        value,
        REMEDIATION_BYPASS,
        ORIGIN,
        duration,
        "",
        None,
    )
}
