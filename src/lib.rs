//! # Shard Stream
//!
//! Pull-based consumption of partitioned append-only log streams.
//!
//! ## Core Concepts
//!
//! - **Stream**: A named, partitioned log addressed by [`StreamIdentity`]
//! - **Backend**: The log service, behind the three-call [`PartitionBackend`] contract
//! - **Pollers**: One thread per partition, fetching, decoding and enqueuing
//! - **Subscription**: Merges every partition into one blocking `recv()` sequence
//!
//! ## Example
//!
//! ```ignore
//! use shardstream::{JsonCodec, MemoryBackend, PositionPolicy, StreamIdentity,
//!     Subscription, SubscriptionConfig};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let stream = StreamIdentity::new("ru-central1", "folder", "db", "events")?;
//! let partitions = backend.create_stream(&stream.path(), 2)?;
//!
//! let mut subscription = Subscription::new(
//!     stream.clone(),
//!     Arc::clone(&backend),
//!     JsonCodec::<serde_json::Value>::new(),
//!     SubscriptionConfig::default().with_position(PositionPolicy::SinceTimestamp(Timestamp(0))),
//! )?;
//!
//! backend.append(&stream.path(), &partitions[0], br#"{"hello":"world"}"#.to_vec())?;
//! let record = subscription.recv()?;
//! ```

pub mod backend;
pub mod cancel;
pub mod codec;
pub mod error;
pub mod position;
pub mod subscription;
pub mod types;

// Re-exports
pub use backend::{MemoryBackend, PartitionBackend};
pub use cancel::CancellationToken;
pub use codec::{JsonCodec, MessagePackCodec, RawCodec, RecordCodec};
pub use error::{BackendError, CodecError, Result, StreamError};
pub use position::{CursorRequest, PositionPolicy};
pub use subscription::{
    FailurePolicy, Multiplexer, Producer, Subscription, SubscriptionConfig, SubscriptionStats,
};
pub use types::*;
