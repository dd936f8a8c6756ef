//! Refresh/lookup round trips against every shipped backend
//!
//! A scripted feed plays successive stream pulls; each test checks the refresh
//! counts and the remediation served afterwards.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tempfile::TempDir;

use remediation_engine::error::FeedError;
use remediation_engine::{
    CacheConfig, CacheStorage, CapiRemediation, DecisionFeed, MemoryBackend, RawDecision,
    RefreshCounts, RemediationConfig, RemediationEngine, SqliteBackend, StreamDecisions,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Feed replaying queued pulls, then empty ones
#[derive(Default)]
struct ScriptedFeed {
    pulls: Mutex<VecDeque<StreamDecisions>>,
}

impl ScriptedFeed {
    fn new(pulls: Vec<StreamDecisions>) -> Self {
        Self {
            pulls: Mutex::new(pulls.into()),
        }
    }
}

#[async_trait]
impl DecisionFeed for ScriptedFeed {
    async fn pull_stream_decisions(&self) -> Result<StreamDecisions, FeedError> {
        let mut pulls = self
            .pulls
            .lock()
            .map_err(|_| FeedError::Network("feed lock poisoned".to_string()))?;
        Ok(pulls.pop_front().unwrap_or_default())
    }
}

fn ban(scope: &str, value: &str) -> RawDecision {
    RawDecision {
        scope: Some(scope.to_string()),
        value: Some(value.to_string()),
        remediation: Some("ban".to_string()),
        origin: Some("CAPI".to_string()),
        duration: Some("147h".to_string()),
        scenario: Some("manual".to_string()),
        id: None,
    }
}

fn pull(new: Vec<RawDecision>, deleted: Vec<RawDecision>) -> StreamDecisions {
    StreamDecisions { new, deleted }
}

fn memory_cache() -> CacheStorage {
    CacheStorage::new(&CacheConfig::with_dsn("memory://"), MemoryBackend::new())
}

fn sqlite_cache(dir: &TempDir) -> CacheStorage {
    let backend = SqliteBackend::open_at(dir.path()).unwrap();
    CacheStorage::new(&CacheConfig::with_dsn("sqlite://"), backend)
}

async fn ip_ban_then_delete(cache: CacheStorage) {
    let feed = ScriptedFeed::new(vec![
        pull(vec![ban("ip", "5.6.7.8")], vec![]),
        pull(vec![], vec![ban("ip", "5.6.7.8")]),
    ]);
    let engine = CapiRemediation::new(RemediationConfig::default(), feed, cache);

    let counts = engine.refresh_decisions().await.unwrap();
    assert_eq!(counts, RefreshCounts { new: 1, deleted: 0 });
    assert_eq!(engine.get_ip_remediation("5.6.7.8"), "ban");

    let counts = engine.refresh_decisions().await.unwrap();
    assert_eq!(counts, RefreshCounts { new: 0, deleted: 1 });
    assert_eq!(engine.get_ip_remediation("5.6.7.8"), "bypass");
    // The bypass is now cached
    assert_eq!(engine.get_ip_remediation("5.6.7.8"), "bypass");

    let counts = engine.refresh_decisions().await.unwrap();
    assert_eq!(counts, RefreshCounts::default());
}

async fn range_ban_then_delete(cache: CacheStorage) {
    let feed = ScriptedFeed::new(vec![
        pull(vec![ban("Range", "10.0.4.0/22")], vec![]),
        pull(vec![], vec![ban("Range", "10.0.4.0/22")]),
    ]);
    let engine = CapiRemediation::new(RemediationConfig::default(), feed, cache);

    let counts = engine.refresh_decisions().await.unwrap();
    assert_eq!(counts, RefreshCounts { new: 1, deleted: 0 });
    assert_eq!(engine.get_ip_remediation("10.0.4.1"), "ban");
    assert_eq!(engine.get_ip_remediation("10.0.7.255"), "ban");
    assert_eq!(engine.get_ip_remediation("10.0.8.0"), "bypass");

    let counts = engine.refresh_decisions().await.unwrap();
    assert_eq!(counts, RefreshCounts { new: 0, deleted: 1 });
    assert_eq!(engine.get_ip_remediation("10.0.4.1"), "bypass");
    assert_eq!(engine.get_ip_remediation("10.0.6.9"), "bypass");
}

#[tokio::test]
async fn test_ip_reconciliation_memory() {
    init_logger();
    ip_ban_then_delete(memory_cache()).await;
}

#[tokio::test]
async fn test_ip_reconciliation_sqlite() {
    init_logger();
    let dir = TempDir::new().unwrap();
    ip_ban_then_delete(sqlite_cache(&dir)).await;
}

#[tokio::test]
async fn test_range_reconciliation_memory() {
    init_logger();
    range_ban_then_delete(memory_cache()).await;
}

#[tokio::test]
async fn test_range_reconciliation_sqlite() {
    init_logger();
    let dir = TempDir::new().unwrap();
    range_ban_then_delete(sqlite_cache(&dir)).await;
}

#[tokio::test]
async fn test_malformed_records_do_not_abort_batch() {
    init_logger();
    let feed = ScriptedFeed::new(vec![pull(
        vec![
            RawDecision {
                origin: None,
                ..ban("ip", "1.1.1.1")
            },
            ban("range", "2001:db8::/32"),
            ban("range", "not-a-range"),
            ban("country", "FR"),
            ban("ip", "2.2.2.2"),
        ],
        vec![],
    )]);
    let engine = CapiRemediation::new(RemediationConfig::default(), feed, memory_cache());

    let counts = engine.refresh_decisions().await.unwrap();
    assert_eq!(counts, RefreshCounts { new: 1, deleted: 0 });
    assert_eq!(engine.get_ip_remediation("2.2.2.2"), "ban");
    assert_eq!(engine.get_ip_remediation("1.1.1.1"), "bypass");
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    init_logger();
    let dir = TempDir::new().unwrap();

    let feed = ScriptedFeed::new(vec![pull(vec![ban("ip", "5.6.7.8")], vec![])]);
    let engine = CapiRemediation::new(RemediationConfig::default(), feed, sqlite_cache(&dir));
    engine.refresh_decisions().await.unwrap();
    drop(engine);

    let engine = CapiRemediation::new(
        RemediationConfig::default(),
        ScriptedFeed::default(),
        sqlite_cache(&dir),
    );
    assert_eq!(engine.get_ip_remediation("5.6.7.8"), "ban");
}
