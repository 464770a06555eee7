//! Starting-position policies for partition cursors.

use crate::types::{SequenceMarker, Timestamp};
use std::time::Duration;

/// Where a subscription starts reading each partition.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum PositionPolicy {
    /// Only records arriving after the subscription starts.
    #[default]
    Latest,

    /// Records with arrival time at or after the timestamp, within retention.
    SinceTimestamp(Timestamp),

    /// Records from the last `Duration`, measured from subscription construction.
    SinceDuration(Duration),

    /// Records strictly after the marker. Markers are per-partition, so this is
    /// only meaningful against a partition that actually holds the marker;
    /// pair it with [`SubscriptionConfig::with_partitions`](crate::SubscriptionConfig::with_partitions)
    /// on multi-partition streams.
    AfterSequence(SequenceMarker),
}

impl PositionPolicy {
    /// Resolve to the concrete request sent to the backend.
    ///
    /// `SinceDuration` is pinned to `now - duration` here and never re-evaluated.
    pub fn resolve(&self, now: Timestamp) -> CursorRequest {
        match self {
            PositionPolicy::Latest => CursorRequest::Latest,
            PositionPolicy::SinceTimestamp(ts) => CursorRequest::AtTimestamp(*ts),
            PositionPolicy::SinceDuration(d) => CursorRequest::AtTimestamp(now.saturating_sub(*d)),
            PositionPolicy::AfterSequence(marker) => CursorRequest::AfterSequence(marker.clone()),
        }
    }
}

/// Cursor request passed to [`PartitionBackend::get_cursor`](crate::PartitionBackend::get_cursor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorRequest {
    Latest,
    AtTimestamp(Timestamp),
    AfterSequence(SequenceMarker),
}
