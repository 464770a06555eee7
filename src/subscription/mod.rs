//! Pull-based subscriptions over partitioned streams.
//!
//! A [`Subscription`] discovers the partitions of a stream on the first pull,
//! starts one poller thread per partition, and hands decoded records to the
//! caller one at a time through a fan-in [`Multiplexer`].
//!
//! Ordering holds within a partition only. Records from different partitions
//! interleave in the order their pollers enqueued them.
//!
//! # Example
//!
//! ```ignore
//! let stream = StreamIdentity::parse("/ru-central1/b1g/etn/orders")?;
//! let config = SubscriptionConfig::default()
//!     .with_position(PositionPolicy::SinceDuration(Duration::from_secs(3600)));
//!
//! let mut subscription = Subscription::new(stream, backend, JsonCodec::<Order>::new(), config)?;
//! let cancel = subscription.cancellation_token();
//!
//! for record in &mut subscription {
//!     let record = record?;
//!     println!("{} {}: {:?}", record.partition, record.sequence, record.message);
//! }
//! ```

mod multiplexer;
mod poller;
mod types;

pub use multiplexer::{Multiplexer, Producer};
pub use types::{FailurePolicy, SubscriptionConfig, SubscriptionStats};

use crate::backend::PartitionBackend;
use crate::cancel::CancellationToken;
use crate::codec::RecordCodec;
use crate::error::{BackendError, Result, StreamError};
use crate::position::CursorRequest;
use crate::types::{PartitionId, Record, StreamIdentity, Timestamp};
use poller::{Delivery, PartitionPoller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use types::StatsCounters;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Constructed, nothing started yet.
    Idle,
    /// Pollers running.
    Running,
    /// Ended by a fatal error.
    Terminated,
    Disposed,
}

/// A lazily started, effectively infinite sequence of records from one stream.
///
/// Single consumer: pulling takes `&mut self`. To cancel a blocked pull from
/// another thread, use the token from [`cancellation_token`](Self::cancellation_token).
pub struct Subscription<T> {
    stream: StreamIdentity,
    config: SubscriptionConfig,
    /// Resolved once at construction.
    request: CursorRequest,
    backend: Arc<dyn PartitionBackend>,
    codec: Arc<dyn RecordCodec<T>>,
    cancel: CancellationToken,
    mux: Multiplexer<Delivery<T>>,
    state: State,
    partitions: Vec<PartitionId>,
    pollers: Vec<JoinHandle<()>>,
    failed: Vec<(PartitionId, BackendError)>,
    stats: Arc<StatsCounters>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Create a subscription. No backend call is made until the first pull.
    pub fn new(
        stream: StreamIdentity,
        backend: impl PartitionBackend + 'static,
        codec: impl RecordCodec<T> + 'static,
        config: SubscriptionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let request = config.position.resolve(Timestamp::now());

        Ok(Self {
            stream,
            config,
            request,
            backend: Arc::new(backend),
            codec: Arc::new(codec),
            cancel: CancellationToken::new(),
            mux: Multiplexer::new(),
            state: State::Idle,
            partitions: Vec::new(),
            pollers: Vec::new(),
            failed: Vec::new(),
            stats: Arc::new(StatsCounters::default()),
        })
    }

    /// Tie this subscription to an outer token.
    ///
    /// Cancelling `parent` ends the subscription; disposing the subscription
    /// leaves `parent` untouched. The subscription keeps its own token, so
    /// pollers already running and tokens from
    /// [`cancellation_token`](Self::cancellation_token) follow `parent` too.
    pub fn with_cancellation(self, parent: &CancellationToken) -> Self {
        parent.adopt(&self.cancel);
        self
    }

    /// Block until the next record, cancellation, or a fatal error.
    ///
    /// The first call discovers partitions and starts the pollers.
    pub fn recv(&mut self) -> Result<Record<T>> {
        loop {
            self.ensure_started()?;
            let delivery = self.mux.pop(&self.cancel)?;
            if let Some(record) = self.accept(delivery)? {
                return Ok(record);
            }
        }
    }

    /// Like [`recv`](Self::recv), but returns `Ok(None)` if nothing arrives in time.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Record<T>>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_started()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let delivery = match self.mux.pop_timeout(&self.cancel, remaining)? {
                Some(delivery) => delivery,
                None => return Ok(None),
            };
            if let Some(record) = self.accept(delivery)? {
                return Ok(Some(record));
            }
        }
    }

    /// Return a queued record without waiting.
    pub fn try_recv(&mut self) -> Result<Option<Record<T>>> {
        loop {
            self.ensure_started()?;
            let delivery = match self.mux.try_pop() {
                Some(delivery) => delivery,
                None if self.cancel.is_cancelled() => return Err(StreamError::Cancelled),
                None => return Ok(None),
            };
            if let Some(record) = self.accept(delivery)? {
                return Ok(Some(record));
            }
        }
    }

    fn ensure_started(&mut self) -> Result<()> {
        match self.state {
            State::Running => Ok(()),
            State::Terminated => Err(StreamError::Terminated),
            State::Disposed => Err(StreamError::Disposed),
            State::Idle => self.start(),
        }
    }

    fn start(&mut self) -> Result<()> {
        let path = self.stream.path();

        let partitions = match self
            .backend
            .list_partitions(&path)
            .and_then(|found| self.select(found))
        {
            Ok(partitions) => partitions,
            Err(e) => {
                self.terminate();
                return Err(StreamError::Discovery(e));
            }
        };

        info!(stream = %path, partitions = partitions.len(), "discovered partitions");
        if partitions.is_empty() {
            warn!(stream = %path, "stream has no partitions, nothing will be delivered");
        }

        for partition in &partitions {
            let poller = PartitionPoller {
                partition: partition.clone(),
                stream_path: path.clone(),
                request: self.request.clone(),
                backend: Arc::clone(&self.backend),
                codec: Arc::clone(&self.codec),
                producer: self.mux.producer(),
                cancel: self.cancel.clone(),
                poll_interval: self.config.poll_interval,
                batch_limit: self.config.batch_limit,
                stats: Arc::clone(&self.stats),
            };

            match poller.spawn() {
                Ok(handle) => self.pollers.push(handle),
                Err(e) => {
                    self.terminate();
                    return Err(StreamError::Spawn(e));
                }
            }
        }

        self.partitions = partitions;
        self.state = State::Running;
        Ok(())
    }

    /// Apply the configured partition filter, in discovery order.
    fn select(
        &self,
        found: Vec<PartitionId>,
    ) -> std::result::Result<Vec<PartitionId>, BackendError> {
        let wanted = match self.config.partitions {
            Some(ref wanted) => wanted,
            None => return Ok(found),
        };

        if let Some(missing) = wanted.iter().find(|p| !found.contains(p)) {
            return Err(BackendError::NotFound(format!(
                "partition {} in stream {}",
                missing, self.stream
            )));
        }
        Ok(found.into_iter().filter(|p| wanted.contains(p)).collect())
    }

    /// Turn a delivery into a record, or apply the failure policy.
    fn accept(&mut self, delivery: Delivery<T>) -> Result<Option<Record<T>>> {
        match delivery {
            Delivery::Record(record) => {
                self.stats.records_delivered.fetch_add(1, Ordering::Relaxed);
                Ok(Some(record))
            }
            Delivery::Failed { partition, error } => match self.config.failure_policy {
                FailurePolicy::Terminate => {
                    self.terminate();
                    Err(StreamError::Partition {
                        partition,
                        source: error,
                    })
                }
                FailurePolicy::IsolatePartition => {
                    warn!(
                        stream = %self.stream,
                        partition = %partition,
                        error = %error,
                        "partition stopped, continuing with the rest"
                    );
                    self.failed.push((partition, error));
                    Ok(None)
                }
            },
        }
    }

    fn terminate(&mut self) {
        self.cancel.cancel();
        self.pollers.clear();
        self.state = State::Terminated;
    }
}

impl<T> Subscription<T> {
    /// Stop all pollers and refuse further pulls. Idempotent.
    ///
    /// Queued records are discarded. Poller threads are detached rather than
    /// joined, so a fetch stuck in the backend does not block disposal.
    pub fn dispose(&mut self) {
        if self.state == State::Disposed {
            return;
        }

        self.cancel.cancel();
        self.pollers.clear();
        self.state = State::Disposed;
        debug!(stream = %self.stream, "subscription disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state == State::Disposed
    }

    /// Token that cancels this subscription. Safe to use from other threads.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stream(&self) -> &StreamIdentity {
        &self.stream
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Cursor request every poller uses.
    pub fn cursor_request(&self) -> &CursorRequest {
        &self.request
    }

    /// Partitions polled, after any configured filter. Empty before the first pull.
    pub fn partitions(&self) -> &[PartitionId] {
        &self.partitions
    }

    /// Number of pollers started.
    pub fn poller_count(&self) -> usize {
        self.pollers.len()
    }

    /// Partitions stopped under [`FailurePolicy::IsolatePartition`].
    pub fn failed_partitions(&self) -> &[(PartitionId, BackendError)] {
        &self.failed
    }

    /// Records waiting to be pulled.
    pub fn pending(&self) -> usize {
        self.mux.len()
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.stats.snapshot()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Send + 'static> Iterator for Subscription<T> {
    type Item = Result<Record<T>>;

    /// Ends on cancellation, disposal, or after yielding a fatal error once.
    fn next(&mut self) -> Option<Self::Item> {
        match self.recv() {
            Ok(record) => Some(Ok(record)),
            Err(StreamError::Terminated) => None,
            Err(e) if e.is_cancellation() => None,
            Err(e) => Some(Err(e)),
        }
    }
}
