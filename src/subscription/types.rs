//! Subscription configuration and statistics.

use crate::error::{Result, StreamError};
use crate::position::PositionPolicy;
use crate::types::PartitionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What happens to the whole subscription when one partition fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Any partition's fatal error ends the subscription.
    #[default]
    Terminate,
    /// Only the failing partition stops; the rest keep delivering.
    IsolatePartition,
}

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Pause between fetches on each partition.
    /// Default: 30s
    pub poll_interval: Duration,

    /// Max records requested per fetch.
    /// Default: 1000
    pub batch_limit: usize,

    /// Where each partition starts reading.
    pub position: PositionPolicy,

    /// Reaction to a partition's fatal fetch error.
    pub failure_policy: FailurePolicy,

    /// Restrict the subscription to these partitions. `None` reads all of them.
    /// Needed with `AfterSequence`, since markers only mean something in the
    /// partition that issued them.
    pub partitions: Option<Vec<PartitionId>>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_limit: 1000,
            position: PositionPolicy::Latest,
            failure_policy: FailurePolicy::Terminate,
            partitions: None,
        }
    }
}

impl SubscriptionConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn with_position(mut self, position: PositionPolicy) -> Self {
        self.position = position;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_partitions(mut self, partitions: impl IntoIterator<Item = PartitionId>) -> Self {
        self.partitions = Some(partitions.into_iter().collect());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_limit == 0 {
            return Err(StreamError::InvalidConfig("batch_limit must be > 0".into()));
        }
        if matches!(self.partitions, Some(ref p) if p.is_empty()) {
            return Err(StreamError::InvalidConfig("partition filter is empty".into()));
        }
        Ok(())
    }
}

/// Point-in-time counters for a subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Raw records fetched from the backend.
    pub records_received: u64,
    /// Records handed to the caller.
    pub records_delivered: u64,
    /// Records dropped because the codec rejected them.
    pub decode_failures: u64,
    /// Successful fetch calls, empty batches included.
    pub batches_fetched: u64,
    /// Pollers currently running.
    pub active_pollers: u64,
}

/// Counters shared between the subscription and its pollers.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub records_received: AtomicU64,
    pub records_delivered: AtomicU64,
    pub decode_failures: AtomicU64,
    pub batches_fetched: AtomicU64,
    pub active_pollers: AtomicU64,
}

impl StatsCounters {
    pub fn snapshot(&self) -> SubscriptionStats {
        SubscriptionStats {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            batches_fetched: self.batches_fetched.load(Ordering::Relaxed),
            active_pollers: self.active_pollers.load(Ordering::Relaxed),
        }
    }
}
