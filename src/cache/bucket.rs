//! IPv4 range bucketing
//!
//! IPv4 space is split into fixed 256-address buckets. Every stored CIDR range
//! is listed in each bucket its span touches, so a containment lookup for one
//! address only has to check the ranges of that address's bucket.

use ipnet::{IpNet, Ipv4Net};
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;

use crate::constants::EventType;
use crate::decision::Decision;
use crate::error::CacheError;

/// Number of addresses per bucket
pub const IPV4_BUCKET_SIZE: u32 = 256;

/// Cache tag carried by bucket items
pub const RANGE_BUCKET_TAG: &str = "RANGE_BUCKET";

/// Bucket holding a given address
pub fn bucket_of(address: Ipv4Addr) -> u32 {
    u32::from(address) / IPV4_BUCKET_SIZE
}

/// Bucket holding a dotted IPv4 address
pub fn bucket_index(ip: &str) -> Result<u32, CacheError> {
    ip.trim()
        .parse::<Ipv4Addr>()
        .map(bucket_of)
        .map_err(|_| CacheError::InvalidAddress(ip.to_string()))
}

/// Every bucket touched by a range, from its first to its last address
pub fn bucket_span(range: &Ipv4Net) -> RangeInclusive<u32> {
    bucket_of(range.network())..=bucket_of(range.broadcast())
}

/// Parse the value of a range-scoped decision.
///
/// Invalid ranges and IPv6 ranges are logged and yield `None`; callers turn
/// that into a zero-effect result.
pub fn decision_range(decision: &Decision) -> Option<Ipv4Net> {
    match decision.value().trim().parse::<IpNet>() {
        Ok(IpNet::V4(range)) => Some(range),
        Ok(IpNet::V6(_)) => {
            log::warn!("{} decision={}", EventType::Ipv6RangeNotImplemented, decision);
            None
        }
        Err(_) => {
            log::warn!("{} decision={}", EventType::InvalidRange, decision);
            None
        }
    }
}

/// Whether a stored range string contains the address
pub fn range_contains(range: &str, address: IpAddr) -> bool {
    range
        .parse::<IpNet>()
        .map(|range| range.contains(&address))
        .unwrap_or(false)
}
