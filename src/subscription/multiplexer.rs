//! Fan-in queue between partition pollers and the subscriber.
//!
//! Many producers, one consumer, no capacity bound. Backed by an unbounded
//! crossbeam channel: the queued length is the availability count, and the
//! channel updates both together, so a consumer never wakes without an item.

use crate::cancel::CancellationToken;
use crate::error::{Result, StreamError};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::time::Duration;

/// Producer side of a [`Multiplexer`].
pub struct Producer<M> {
    sender: Sender<M>,
}

impl<M> Producer<M> {
    /// Enqueue an item. Never blocks.
    ///
    /// Returns `false` if the multiplexer is gone; the item is dropped.
    pub fn push(&self, item: M) -> bool {
        self.sender.send(item).is_ok()
    }
}

impl<M> Clone for Producer<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Unbounded many-producer, single-consumer queue with cancellable waits.
pub struct Multiplexer<M> {
    sender: Sender<M>,
    receiver: Receiver<M>,
}

impl<M> Multiplexer<M> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// New producer handle.
    pub fn producer(&self) -> Producer<M> {
        Producer {
            sender: self.sender.clone(),
        }
    }

    /// Enqueue directly from the consumer side.
    pub fn push(&self, item: M) {
        // Cannot fail: `self` holds the receiver.
        let _ = self.sender.send(item);
    }

    /// Wait for the next item or cancellation.
    ///
    /// A queued item is returned even if cancellation has already fired.
    pub fn pop(&self, cancel: &CancellationToken) -> Result<M> {
        if let Ok(item) = self.receiver.try_recv() {
            return Ok(item);
        }

        select! {
            recv(self.receiver) -> item => item.map_err(|_| StreamError::Cancelled),
            recv(cancel.signal()) -> _ => self.try_pop().ok_or(StreamError::Cancelled),
        }
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout` with `Ok(None)`.
    pub fn pop_timeout(&self, cancel: &CancellationToken, timeout: Duration) -> Result<Option<M>> {
        if let Ok(item) = self.receiver.try_recv() {
            return Ok(Some(item));
        }

        select! {
            recv(self.receiver) -> item => item.map(Some).map_err(|_| StreamError::Cancelled),
            recv(cancel.signal()) -> _ => match self.try_pop() {
                Some(item) => Ok(Some(item)),
                None => Err(StreamError::Cancelled),
            },
            default(timeout) => Ok(None),
        }
    }

    /// Take the head item if one is queued.
    pub fn try_pop(&self) -> Option<M> {
        self.receiver.try_recv().ok()
    }

    /// Items queued and not yet popped.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<M> Default for Multiplexer<M> {
    fn default() -> Self {
        Self::new()
    }
}
