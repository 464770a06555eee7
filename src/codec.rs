//! Payload codecs.
//!
//! A codec turns the raw bytes of one record into a typed message. Decoding
//! can fail per record; pollers log and drop records that fail.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Decodes raw record payloads into `T`.
pub trait RecordCodec<T>: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

impl<T, F> RecordCodec<T> for F
where
    F: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        self(bytes)
    }
}

/// JSON payloads via serde_json.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> RecordCodec<T> for JsonCodec<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// MessagePack payloads via rmp-serde.
pub struct MessagePackCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> MessagePackCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MessagePackCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> RecordCodec<T> for MessagePackCodec<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Passes payload bytes through unchanged. Never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawCodec;

impl RecordCodec<Vec<u8>> for RawCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}
