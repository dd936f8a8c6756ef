//! Remediation engine - decides what to do with an incoming IP
//!
//! Decisions (`ban`, `captcha`, `bypass`, ...) pulled from a remote feed are
//! materialized in a local cache. Lookups answer from that cache only: an IP
//! with no cached decision is cached as `bypass`.
//!
//! ```ignore
//! let config = Config::load_from("remediation.yaml")?;
//! let engine = CapiRemediation::from_config(&config, feed)?;
//!
//! engine.refresh_decisions().await?;
//! let remediation = engine.get_ip_remediation("1.2.3.4");
//! ```
//!
//! Events are emitted through the `log` facade and discarded unless the
//! embedding application installs a logger.

pub mod cache;
pub mod config;
pub mod constants;
pub mod decision;
pub mod duration;
pub mod error;
pub mod feed;
pub mod remediation;

pub use cache::{CacheBackend, CacheStorage, MemoryBackend, SqliteBackend, StoreOutcome};
pub use config::{CacheConfig, Config, RemediationConfig};
pub use decision::{Decision, RawDecision, Scope};
pub use error::{Error, Result};
pub use feed::{DecisionFeed, StreamDecisions};
pub use remediation::{CapiRemediation, RefreshCounts, RemediationEngine};
