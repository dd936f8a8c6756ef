//! Library-wide constants and log event discriminators

use std::fmt;

/// The ban remediation
pub const REMEDIATION_BAN: &str = "ban";
/// The captcha remediation
pub const REMEDIATION_CAPTCHA: &str = "captcha";
/// The bypass remediation
pub const REMEDIATION_BYPASS: &str = "bypass";

/// Every known remediation, most severe first
pub const ORDERED_REMEDIATIONS: [&str; 3] = [REMEDIATION_BAN, REMEDIATION_CAPTCHA, REMEDIATION_BYPASS];

/// Origin of decisions synthesized by this library
pub const ORIGIN: &str = "remediation-engine";

/// Cache tag carried by every decision item
pub const CACHE_TAG_REM: &str = "remediation";

/// Default lifetime of a cached clean IP, in seconds
pub const CACHE_EXPIRATION_FOR_CLEAN_IP: u64 = 60;
/// Default cap on the lifetime of a cached bad IP, in seconds
pub const CACHE_EXPIRATION_FOR_BAD_IP: u64 = 120;

/// Discriminator rendered at the head of every structured log event.
///
/// Non-fatal conditions are reported through these instead of errors so that a
/// single bad record never aborts a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    CacheDurationParseError,
    InvalidRange,
    Ipv6RangeNotImplemented,
    InvalidIpAddress,
    CacheStoreNonImplementedScope,
    CacheRemoveNonImplementedScope,
    CacheRetrieveForIpNonImplementedScope,
    CacheStoreDeferredFailed,
    CacheStoreDeferredFailedForRemoveDecision,
    CacheBackendReadFailed,
    CacheCommitFailed,
    RawDecisionNotAsExpected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CacheDurationParseError => "CACHE_DURATION_PARSE_ERROR",
            EventType::InvalidRange => "INVALID_RANGE",
            EventType::Ipv6RangeNotImplemented => "IPV6_RANGE_NOT_IMPLEMENTED",
            EventType::InvalidIpAddress => "INVALID_IP_ADDRESS",
            EventType::CacheStoreNonImplementedScope => "CACHE_STORE_NON_IMPLEMENTED_SCOPE",
            EventType::CacheRemoveNonImplementedScope => "CACHE_REMOVE_NON_IMPLEMENTED_SCOPE",
            EventType::CacheRetrieveForIpNonImplementedScope => {
                "CACHE_RETRIEVE_FOR_IP_NON_IMPLEMENTED_SCOPE"
            }
            EventType::CacheStoreDeferredFailed => "CACHE_STORE_DEFERRED_FAILED",
            EventType::CacheStoreDeferredFailedForRemoveDecision => {
                "CACHE_STORE_DEFERRED_FAILED_FOR_REMOVE_DECISION"
            }
            EventType::CacheBackendReadFailed => "CACHE_BACKEND_READ_FAILED",
            EventType::CacheCommitFailed => "CACHE_COMMIT_FAILED",
            EventType::RawDecisionNotAsExpected => "RAW_DECISION_NOT_AS_EXPECTED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
