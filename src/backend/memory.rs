//! In-process partition backend.

use super::PartitionBackend;
use crate::cancel::CancellationToken;
use crate::error::BackendError;
use crate::position::CursorRequest;
use crate::types::{Batch, Cursor, PartitionId, RawRecord, SequenceMarker, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Separator between cursor fields. Stream paths never contain it.
const CURSOR_SEPARATOR: char = '#';

struct MemoryPartition {
    id: PartitionId,
    records: Vec<RawRecord>,
    next_sequence: u64,
    closed: bool,
    /// Returned by every fetch while set.
    failure: Option<BackendError>,
}

impl MemoryPartition {
    fn new(index: usize) -> Self {
        Self {
            id: PartitionId(format!("shard-{:06}", index)),
            records: Vec::new(),
            next_sequence: 1,
            closed: false,
            failure: None,
        }
    }
}

struct MemoryStream {
    partitions: Vec<MemoryPartition>,
}

impl MemoryStream {
    fn partition(&self, id: &PartitionId) -> Option<(usize, &MemoryPartition)> {
        self.partitions.iter().enumerate().find(|(_, p)| &p.id == id)
    }
}

/// Partitioned streams held in memory.
///
/// Sequence markers are zero-padded counters starting at 1, so they sort the
/// same way as they were assigned. Cursors are `path#partition#offset`.
pub struct MemoryBackend {
    streams: RwLock<HashMap<String, MemoryStream>>,
    /// Records older than this are no longer served.
    retention: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            retention: None,
        }
    }

    /// Create a backend that hides records older than `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            retention: Some(retention),
        }
    }

    /// Create a stream with a fixed number of partitions.
    pub fn create_stream(&self, path: &str, partitions: usize) -> Result<Vec<PartitionId>, BackendError> {
        if path.contains(CURSOR_SEPARATOR) {
            return Err(BackendError::Other(format!(
                "stream path contains '{}': {}",
                CURSOR_SEPARATOR, path
            )));
        }

        let mut streams = self.streams.write();
        if streams.contains_key(path) {
            return Err(BackendError::Other(format!("stream already exists: {}", path)));
        }

        let stream = MemoryStream {
            partitions: (0..partitions).map(MemoryPartition::new).collect(),
        };
        let ids = stream.partitions.iter().map(|p| p.id.clone()).collect();
        streams.insert(path.to_string(), stream);

        Ok(ids)
    }

    /// Append a record with the current time as arrival.
    pub fn append(
        &self,
        path: &str,
        partition: &PartitionId,
        payload: impl Into<Vec<u8>>,
    ) -> Result<SequenceMarker, BackendError> {
        self.append_at(path, partition, payload, Timestamp::now())
    }

    /// Append a record with an explicit arrival time.
    pub fn append_at(
        &self,
        path: &str,
        partition: &PartitionId,
        payload: impl Into<Vec<u8>>,
        arrival: Timestamp,
    ) -> Result<SequenceMarker, BackendError> {
        self.with_partition_mut(path, partition, |p| {
            if p.closed {
                return Err(BackendError::Other(format!("partition {} is closed", p.id)));
            }

            let sequence = SequenceMarker(format!("{:020}", p.next_sequence));
            p.next_sequence += 1;
            p.records.push(RawRecord {
                sequence: sequence.clone(),
                arrival,
                data: payload.into(),
            });

            Ok(sequence)
        })
    }

    /// Stop accepting records; readers get no next cursor once drained.
    pub fn close_partition(&self, path: &str, partition: &PartitionId) -> Result<(), BackendError> {
        self.with_partition_mut(path, partition, |p| {
            p.closed = true;
            Ok(())
        })
    }

    /// Make every subsequent fetch on the partition fail with `error`.
    pub fn fail_partition(
        &self,
        path: &str,
        partition: &PartitionId,
        error: BackendError,
    ) -> Result<(), BackendError> {
        self.with_partition_mut(path, partition, |p| {
            p.failure = Some(error);
            Ok(())
        })
    }

    /// Number of records stored in a partition, including expired ones.
    pub fn len(&self, path: &str, partition: &PartitionId) -> usize {
        self.streams
            .read()
            .get(path)
            .and_then(|s| s.partition(partition).map(|(_, p)| p.records.len()))
            .unwrap_or(0)
    }

    fn with_partition_mut<R>(
        &self,
        path: &str,
        partition: &PartitionId,
        f: impl FnOnce(&mut MemoryPartition) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        let mut streams = self.streams.write();
        let stream = streams
            .get_mut(path)
            .ok_or_else(|| BackendError::NotFound(format!("stream {}", path)))?;
        let p = stream
            .partitions
            .iter_mut()
            .find(|p| &p.id == partition)
            .ok_or_else(|| BackendError::NotFound(format!("partition {}", partition)))?;
        f(p)
    }

    fn retention_cutoff(&self) -> Timestamp {
        match self.retention {
            Some(retention) => Timestamp::now().saturating_sub(retention),
            None => Timestamp(0),
        }
    }

    fn encode_cursor(path: &str, index: usize, offset: usize) -> Cursor {
        Cursor(format!(
            "{path}{sep}{index}{sep}{offset}",
            sep = CURSOR_SEPARATOR
        ))
    }

    fn decode_cursor(cursor: &Cursor) -> Result<(&str, usize, usize), BackendError> {
        let invalid = || BackendError::Other(format!("invalid cursor: {:?}", cursor));

        let mut fields = cursor.as_str().rsplitn(3, CURSOR_SEPARATOR);
        let offset = fields.next().and_then(|f| f.parse().ok()).ok_or_else(invalid)?;
        let index = fields.next().and_then(|f| f.parse().ok()).ok_or_else(invalid)?;
        let path = fields.next().ok_or_else(invalid)?;

        Ok((path, index, offset))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionBackend for MemoryBackend {
    fn list_partitions(&self, stream_path: &str) -> Result<Vec<PartitionId>, BackendError> {
        let streams = self.streams.read();
        let stream = streams
            .get(stream_path)
            .ok_or_else(|| BackendError::NotFound(format!("stream {}", stream_path)))?;

        Ok(stream.partitions.iter().map(|p| p.id.clone()).collect())
    }

    fn get_cursor(
        &self,
        stream_path: &str,
        partition: &PartitionId,
        request: &CursorRequest,
        _cancel: &CancellationToken,
    ) -> Result<Cursor, BackendError> {
        let streams = self.streams.read();
        let stream = streams
            .get(stream_path)
            .ok_or_else(|| BackendError::NotFound(format!("stream {}", stream_path)))?;
        let (index, p) = stream
            .partition(partition)
            .ok_or_else(|| BackendError::NotFound(format!("partition {}", partition)))?;

        let offset = match request {
            CursorRequest::Latest => p.records.len(),
            CursorRequest::AtTimestamp(ts) => p
                .records
                .iter()
                .position(|r| r.arrival >= *ts)
                .unwrap_or(p.records.len()),
            CursorRequest::AfterSequence(marker) => {
                let pos = p
                    .records
                    .iter()
                    .position(|r| &r.sequence == marker)
                    .ok_or_else(|| {
                        BackendError::NotFound(format!(
                            "sequence {} in partition {}",
                            marker, partition
                        ))
                    })?;
                pos + 1
            }
        };

        Ok(Self::encode_cursor(stream_path, index, offset))
    }

    fn fetch_batch(
        &self,
        cursor: &Cursor,
        limit: usize,
        _cancel: &CancellationToken,
    ) -> Result<Batch, BackendError> {
        let (path, index, offset) = Self::decode_cursor(cursor)?;
        let cutoff = self.retention_cutoff();

        let streams = self.streams.read();
        let p = streams
            .get(path)
            .and_then(|s| s.partitions.get(index))
            .ok_or_else(|| BackendError::NotFound(format!("cursor target {:?}", cursor)))?;

        if let Some(ref failure) = p.failure {
            return Err(failure.clone());
        }

        let mut records = Vec::new();
        let mut pos = offset;
        while pos < p.records.len() && records.len() < limit {
            let record = &p.records[pos];
            pos += 1;
            if record.arrival >= cutoff {
                records.push(record.clone());
            }
        }

        let next_cursor = if p.closed && pos >= p.records.len() {
            None
        } else {
            Some(Self::encode_cursor(path, index, pos))
        };

        Ok(Batch {
            records,
            next_cursor,
        })
    }
}
