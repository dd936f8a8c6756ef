//! Scripted decision feed for tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{DecisionFeed, StreamDecisions};
use crate::decision::RawDecision;
use crate::error::FeedError;

/// Mock feed returning queued pulls in order.
///
/// Once the queue is drained every pull is empty.
#[derive(Default)]
pub struct MockDecisionFeed {
    responses: Arc<Mutex<VecDeque<Result<StreamDecisions, FeedError>>>>,
    /// Track number of pulls for verification
    call_count: Arc<Mutex<usize>>,
}

impl MockDecisionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful pull
    pub fn with_response(self, new: Vec<RawDecision>, deleted: Vec<RawDecision>) -> Self {
        self.responses
            .try_lock()
            .expect("mock not shared yet")
            .push_back(Ok(StreamDecisions { new, deleted }));
        self
    }

    /// Queue a failed pull
    pub fn with_error(self, error: FeedError) -> Self {
        self.responses
            .try_lock()
            .expect("mock not shared yet")
            .push_back(Err(error));
        self
    }

    pub async fn call_count(&self) -> usize {
        *self.call_count.lock().await
    }
}

#[async_trait]
impl DecisionFeed for MockDecisionFeed {
    async fn pull_stream_decisions(&self) -> Result<StreamDecisions, FeedError> {
        *self.call_count.lock().await += 1;
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(StreamDecisions::default()))
    }
}
