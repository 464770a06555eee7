//! Partition-log backend contract.
//!
//! A backend exposes three operations over a named stream:
//! - list the partitions composing the stream (called once per subscription)
//! - obtain a cursor for a partition and position (called once per poller)
//! - fetch the batch at a cursor, returning the replacement cursor
//!
//! [`MemoryBackend`] implements the contract in-process.

mod memory;

pub use memory::MemoryBackend;

use crate::cancel::CancellationToken;
use crate::error::BackendError;
use crate::position::CursorRequest;
use crate::types::{Batch, Cursor, PartitionId};
use std::sync::Arc;

/// Access to a partitioned append-only log service.
pub trait PartitionBackend: Send + Sync {
    /// Partitions currently composing the stream at `stream_path`.
    fn list_partitions(&self, stream_path: &str) -> Result<Vec<PartitionId>, BackendError>;

    /// Cursor for reading `partition` from the requested position.
    ///
    /// Like [`fetch_batch`](Self::fetch_batch), a blocking implementation
    /// should give up once `cancel` fires.
    fn get_cursor(
        &self,
        stream_path: &str,
        partition: &PartitionId,
        request: &CursorRequest,
        cancel: &CancellationToken,
    ) -> Result<Cursor, BackendError>;

    /// Up to `limit` records at `cursor`, in sequence order.
    ///
    /// Implementations that can block should give up once `cancel` fires;
    /// the poller discards whatever is returned after cancellation.
    fn fetch_batch(
        &self,
        cursor: &Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Batch, BackendError>;
}

impl<B: PartitionBackend + ?Sized> PartitionBackend for Arc<B> {
    fn list_partitions(&self, stream_path: &str) -> Result<Vec<PartitionId>, BackendError> {
        (**self).list_partitions(stream_path)
    }

    fn get_cursor(
        &self,
        stream_path: &str,
        partition: &PartitionId,
        request: &CursorRequest,
        cancel: &CancellationToken,
    ) -> Result<Cursor, BackendError> {
        (**self).get_cursor(stream_path, partition, request, cancel)
    }

    fn fetch_batch(
        &self,
        cursor: &Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Batch, BackendError> {
        (**self).fetch_batch(cursor, limit, cancel)
    }
}
