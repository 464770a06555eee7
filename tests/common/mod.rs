//! Common test utilities for integration tests

#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use shardstream::{
    BackendError, Batch, CancellationToken, Cursor, CursorRequest, PartitionBackend, PartitionId,
    RawRecord, SequenceMarker, StreamIdentity, Timestamp,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Route test logs through the test harness writer. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_stream() -> StreamIdentity {
    StreamIdentity::new("ru-central1", "b1gtestfolder", "etntestdb", "events").unwrap()
}

/// Raw record with a given marker and payload.
pub fn raw(sequence: &str, data: &[u8]) -> RawRecord {
    RawRecord {
        sequence: SequenceMarker::new(sequence),
        arrival: Timestamp::now(),
        data: data.to_vec(),
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// One scripted reaction to a fetch call.
pub enum Step {
    /// Return these records and a next cursor.
    Records(Vec<RawRecord>),
    /// Return these records and no next cursor.
    Close(Vec<RawRecord>),
    /// Fail the fetch.
    Fail(BackendError),
    /// Block until the sender fires or is dropped, then run the next step.
    Gate(Receiver<()>),
    /// Notify the receiver, then run the next step.
    Signal(Sender<()>),
    /// Block until the sender is dropped, ignoring cancellation.
    Hang(Receiver<()>),
}

/// Backend that replays per-partition scripts and records every call.
///
/// A partition whose script is exhausted returns empty batches forever.
pub struct ScriptedBackend {
    partitions: Vec<PartitionId>,
    scripts: Mutex<HashMap<PartitionId, VecDeque<Step>>>,
    list_calls: AtomicUsize,
    cursor_requests: Mutex<Vec<(PartitionId, CursorRequest)>>,
    fetches: Mutex<Vec<(PartitionId, Instant)>>,
    /// When set, cursor requests block until cancelled.
    hang_cursors: AtomicBool,
}

impl ScriptedBackend {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions)
                .map(|i| PartitionId(format!("p{}", i + 1)))
                .collect(),
            scripts: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            cursor_requests: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            hang_cursors: AtomicBool::new(false),
        }
    }

    pub fn partition(&self, index: usize) -> PartitionId {
        self.partitions[index].clone()
    }

    /// Append steps to a partition's script.
    pub fn script(&self, index: usize, steps: Vec<Step>) {
        let id = self.partition(index);
        self.scripts.lock().entry(id).or_default().extend(steps);
    }

    /// Make every cursor request block until its cancellation token fires.
    pub fn hang_cursor_requests(&self) {
        self.hang_cursors.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn cursor_requests(&self) -> Vec<(PartitionId, CursorRequest)> {
        self.cursor_requests.lock().clone()
    }

    /// Fetch instants for one partition, in call order.
    pub fn fetch_times(&self, index: usize) -> Vec<Instant> {
        let id = self.partition(index);
        self.fetches
            .lock()
            .iter()
            .filter(|(p, _)| *p == id)
            .map(|(_, t)| *t)
            .collect()
    }

    fn next_step(&self, partition: &PartitionId) -> Option<Step> {
        self.scripts
            .lock()
            .get_mut(partition)
            .and_then(|steps| steps.pop_front())
    }
}

impl PartitionBackend for ScriptedBackend {
    fn list_partitions(&self, _stream_path: &str) -> Result<Vec<PartitionId>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.partitions.clone())
    }

    fn get_cursor(
        &self,
        _stream_path: &str,
        partition: &PartitionId,
        request: &CursorRequest,
        cancel: &CancellationToken,
    ) -> Result<Cursor, BackendError> {
        self.cursor_requests
            .lock()
            .push((partition.clone(), request.clone()));

        if self.hang_cursors.load(Ordering::SeqCst) {
            cancel.wait();
            return Err(BackendError::Other("cursor request abandoned".into()));
        }
        Ok(Cursor(format!("{}:0", partition)))
    }

    fn fetch_batch(
        &self,
        cursor: &Cursor,
        _limit: usize,
        _cancel: &CancellationToken,
    ) -> Result<Batch, BackendError> {
        let (partition, n) = cursor
            .as_str()
            .split_once(':')
            .ok_or_else(|| BackendError::Other(format!("bad cursor {:?}", cursor)))?;
        let partition = PartitionId::new(partition);
        let n: u64 = n
            .parse()
            .map_err(|_| BackendError::Other(format!("bad cursor {:?}", cursor)))?;
        let next = Cursor(format!("{}:{}", partition, n + 1));

        self.fetches.lock().push((partition.clone(), Instant::now()));

        loop {
            // The script lock is released before any blocking step runs.
            let step = self.next_step(&partition);
            match step {
                None => {
                    return Ok(Batch {
                        records: Vec::new(),
                        next_cursor: Some(next),
                    })
                }
                Some(Step::Records(records)) => {
                    return Ok(Batch {
                        records,
                        next_cursor: Some(next),
                    })
                }
                Some(Step::Close(records)) => {
                    return Ok(Batch {
                        records,
                        next_cursor: None,
                    })
                }
                Some(Step::Fail(error)) => return Err(error),
                Some(Step::Gate(rx)) => {
                    let _ = rx.recv_timeout(Duration::from_secs(10));
                }
                Some(Step::Signal(tx)) => {
                    let _ = tx.send(());
                }
                Some(Step::Hang(rx)) => {
                    let _ = rx.recv();
                }
            }
        }
    }
}
