//! Remediation engine fed by the CAPI decision stream
//!
//! The stream is the only source of cache changes, so the cache is switched to
//! stream mode at construction.

use async_trait::async_trait;

use super::{
    RefreshCounts, RemediationEngine, convert_raw_decisions, create_internal_decision,
    remove_decisions, sort_decisions_by_priority, store_decisions,
};
use crate::cache::{CacheStorage, CachedDecision};
use crate::config::{Config, RemediationConfig};
use crate::constants::REMEDIATION_BYPASS;
use crate::decision::Scope;
use crate::error::Result;
use crate::feed::DecisionFeed;

pub struct CapiRemediation<F: DecisionFeed> {
    config: RemediationConfig,
    feed: F,
    cache: CacheStorage,
}

impl<F: DecisionFeed> CapiRemediation<F> {
    pub fn new(config: RemediationConfig, feed: F, mut cache: CacheStorage) -> Self {
        cache.set_stream_mode(true);
        Self {
            config,
            feed,
            cache,
        }
    }

    /// Build the engine and its cache backend from a validated configuration
    pub fn from_config(config: &Config, feed: F) -> Result<Self> {
        let mut remediation = config.remediation.clone();
        remediation.validate()?;
        let cache = CacheStorage::from_config(&config.cache)?;
        Ok(Self::new(remediation, feed, cache))
    }

    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }
}

#[async_trait]
impl<F: DecisionFeed> RemediationEngine for CapiRemediation<F> {
    fn get_ip_remediation(&self, ip: &str) -> String {
        let ip_decisions = self.cache.retrieve_decisions_for_ip(&Scope::Ip, ip);
        let range_decisions = self.cache.retrieve_decisions_for_ip(&Scope::Range, ip);

        let mut decisions: Vec<CachedDecision> = ip_decisions
            .into_iter()
            .next()
            .into_iter()
            .chain(range_decisions.into_iter().next())
            .flatten()
            .collect();

        if decisions.is_empty() {
            // Cache the clean IP so the next lookup is a hit
            let duration = format!("{}s", self.cache.clean_ip_cache_duration());
            let decision = create_internal_decision(&self.config, Scope::Ip, ip, &duration);
            store_decisions(&self.cache, &[decision]);
            return REMEDIATION_BYPASS.to_string();
        }

        sort_decisions_by_priority(&mut decisions);
        decisions
            .first()
            .map(|d| d.value().to_string())
            .unwrap_or_else(|| REMEDIATION_BYPASS.to_string())
    }

    async fn refresh_decisions(&self) -> Result<RefreshCounts> {
        let stream = self.feed.pull_stream_decisions().await?;
        log::debug!(
            "Pulled {} new and {} deleted decisions",
            stream.new.len(),
            stream.deleted.len()
        );

        let new = convert_raw_decisions(&self.config, &stream.new);
        let deleted = convert_raw_decisions(&self.config, &stream.deleted);

        let counts = RefreshCounts {
            new: store_decisions(&self.cache, &new),
            deleted: remove_decisions(&self.cache, &deleted),
        };
        log::info!(
            "Decisions refreshed: {} new, {} deleted",
            counts.new,
            counts.deleted
        );
        Ok(counts)
    }

    fn clear_cache(&self) -> bool {
        self.cache.clear()
    }

    fn prune_cache(&self) -> Result<bool> {
        Ok(self.cache.prune()?)
    }
}
