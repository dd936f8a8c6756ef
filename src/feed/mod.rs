//! Remote decision feed
//!
//! The feed is the source of truth for decision changes. Transport concerns
//! (HTTP, authentication, retries) belong to the implementor.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::decision::RawDecision;
use crate::error::FeedError;

#[cfg(test)]
pub mod mock;

/// One pull of the decision stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDecisions {
    /// Decisions to add
    #[serde(default, deserialize_with = "null_as_empty")]
    pub new: Vec<RawDecision>,

    /// Decisions to remove
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deleted: Vec<RawDecision>,
}

/// The stream sends `null` instead of `[]` when nothing changed
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawDecision>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RawDecision>>::deserialize(deserializer)?.unwrap_or_default())
}

impl StreamDecisions {
    /// Parse the JSON body of a stream pull
    pub fn from_json(body: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Source of decision changes
#[async_trait]
pub trait DecisionFeed: Send + Sync {
    /// Pull new and deleted decisions since the previous pull
    async fn pull_stream_decisions(&self) -> Result<StreamDecisions, FeedError>;
}
