//! Per-partition polling loop.

use super::multiplexer::Producer;
use super::types::StatsCounters;
use crate::backend::PartitionBackend;
use crate::cancel::CancellationToken;
use crate::codec::RecordCodec;
use crate::error::BackendError;
use crate::position::CursorRequest;
use crate::types::{PartitionId, RawRecord, Record};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// What a poller hands to the subscription.
pub(crate) enum Delivery<T> {
    Record(Record<T>),
    /// The poller hit a fatal backend error and stopped.
    Failed {
        partition: PartitionId,
        error: BackendError,
    },
}

/// Why a poller loop ended without error.
#[derive(Debug, PartialEq, Eq)]
enum PollerExit {
    Cancelled,
    /// Backend returned no next cursor.
    PartitionClosed,
    /// The subscription side was dropped.
    ConsumerGone,
}

/// Owns one partition for the lifetime of a subscription.
pub(crate) struct PartitionPoller<T> {
    pub partition: PartitionId,
    pub stream_path: String,
    pub request: CursorRequest,
    pub backend: Arc<dyn PartitionBackend>,
    pub codec: Arc<dyn RecordCodec<T>>,
    pub producer: Producer<Delivery<T>>,
    pub cancel: CancellationToken,
    pub poll_interval: Duration,
    pub batch_limit: usize,
    pub stats: Arc<StatsCounters>,
}

impl<T: Send + 'static> PartitionPoller<T> {
    /// Run the poller on its own named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("partition-{}", self.partition))
            .spawn(move || self.run())
    }

    fn run(self) {
        self.stats.active_pollers.fetch_add(1, Ordering::SeqCst);
        debug!(partition = %self.partition, "poller started");

        match self.poll() {
            Ok(exit) => {
                debug!(partition = %self.partition, ?exit, "poller stopped");
            }
            Err(e) if self.cancel.is_cancelled() => {
                debug!(partition = %self.partition, error = %e, "poller stopped during cancellation");
            }
            Err(e) => {
                error!(partition = %self.partition, error = %e, "partition fetch failed");
                self.producer.push(Delivery::Failed {
                    partition: self.partition.clone(),
                    error: e,
                });
            }
        }

        self.stats.active_pollers.fetch_sub(1, Ordering::SeqCst);
    }

    fn poll(&self) -> Result<PollerExit, BackendError> {
        if self.cancel.is_cancelled() {
            return Ok(PollerExit::Cancelled);
        }

        let mut cursor = self
            .backend
            .get_cursor(&self.stream_path, &self.partition, &self.request, &self.cancel)?;

        loop {
            let batch = self
                .backend
                .fetch_batch(&cursor, self.batch_limit, &self.cancel)?;
            if self.cancel.is_cancelled() {
                return Ok(PollerExit::Cancelled);
            }
            self.stats.batches_fetched.fetch_add(1, Ordering::Relaxed);

            for raw in batch.records {
                if !self.deliver(raw) {
                    return Ok(PollerExit::ConsumerGone);
                }
            }

            cursor = match batch.next_cursor {
                Some(next) => next,
                None => return Ok(PollerExit::PartitionClosed),
            };

            if !self.cancel.sleep(self.poll_interval) {
                return Ok(PollerExit::Cancelled);
            }
        }
    }

    /// Decode one record and enqueue it. Returns false if nobody is listening.
    fn deliver(&self, raw: RawRecord) -> bool {
        self.stats.records_received.fetch_add(1, Ordering::Relaxed);
        debug!(partition = %self.partition, sequence = %raw.sequence, "record received");

        match self.codec.decode(&raw.data) {
            Ok(message) => self.producer.push(Delivery::Record(Record {
                partition: self.partition.clone(),
                sequence: raw.sequence,
                arrival: raw.arrival,
                message,
            })),
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    partition = %self.partition,
                    sequence = %raw.sequence,
                    error = %e,
                    "record decode failed, dropping"
                );
                true
            }
        }
    }
}
