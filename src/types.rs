//! Core types shared by backends, pollers and subscriptions.

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Backend-assigned identifier of one partition (shard) of a stream.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub String);

impl PartitionId {
    pub fn new(id: impl Into<String>) -> Self {
        PartitionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionId({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-partition record identifier. Unique within a partition only.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceMarker(pub String);

impl SequenceMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        SequenceMarker(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SequenceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for SequenceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque backend token marking a read position within one partition.
#[derive(Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens can be long; the prefix is enough to tell them apart in logs.
        let prefix: String = self.0.chars().take(16).collect();
        write!(f, "Cursor({}...)", prefix)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    /// Move back in time by `duration`, clamping at the epoch.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_sub(micros).max(0))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A record as returned by the backend, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub sequence: SequenceMarker,
    pub arrival: Timestamp,
    pub data: Vec<u8>,
}

/// One fetch result: records in partition order plus the replacement cursor.
///
/// `next_cursor == None` means the partition is closed and polling it stops.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<Cursor>,
}

/// A decoded record delivered to the subscriber.
#[derive(Clone, Debug, PartialEq)]
pub struct Record<T> {
    /// Partition the record was read from.
    pub partition: PartitionId,

    /// Sequence marker, unique within `partition`.
    pub sequence: SequenceMarker,

    /// When the backend accepted the record.
    pub arrival: Timestamp,

    /// Decoded payload.
    pub message: T,
}

/// Fully-qualified address of a stream.
///
/// Composes into `/{region}/{folder_id}/{database_id}/{stream_name}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct StreamIdentity {
    region: String,
    folder_id: String,
    database_id: String,
    stream_name: String,
}

#[derive(Deserialize)]
struct StreamIdentityParts {
    region: String,
    folder_id: String,
    database_id: String,
    stream_name: String,
}

impl StreamIdentity {
    /// Create an identity, rejecting empty components or components with `/`.
    pub fn new(
        region: impl Into<String>,
        folder_id: impl Into<String>,
        database_id: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Result<Self> {
        let identity = Self {
            region: region.into(),
            folder_id: folder_id.into(),
            database_id: database_id.into(),
            stream_name: stream_name.into(),
        };

        for (field, value) in [
            ("region", &identity.region),
            ("folder_id", &identity.folder_id),
            ("database_id", &identity.database_id),
            ("stream_name", &identity.stream_name),
        ] {
            if value.is_empty() {
                return Err(StreamError::InvalidConfig(format!("{field} is empty")));
            }
            if value.contains('/') {
                return Err(StreamError::InvalidConfig(format!(
                    "{field} contains '/': {value}"
                )));
            }
        }

        Ok(identity)
    }

    /// Parse a path produced by [`StreamIdentity::path`].
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.strip_prefix('/').ok_or_else(|| {
            StreamError::InvalidConfig(format!("stream path must start with '/': {path}"))
        })?;

        let parts: Vec<&str> = trimmed.split('/').collect();
        match parts.as_slice() {
            [region, folder, database, stream] => Self::new(*region, *folder, *database, *stream),
            _ => Err(StreamError::InvalidConfig(format!(
                "stream path must have four components: {path}"
            ))),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Backend-addressable path of the stream.
    pub fn path(&self) -> String {
        format!(
            "/{}/{}/{}/{}",
            self.region, self.folder_id, self.database_id, self.stream_name
        )
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Deserialization goes through [`StreamIdentity::new`] so loaded configs are validated.
impl<'de> Deserialize<'de> for StreamIdentity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let parts = StreamIdentityParts::deserialize(deserializer)?;
        Self::new(
            parts.region,
            parts.folder_id,
            parts.database_id,
            parts.stream_name,
        )
        .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_path() {
        let id = StreamIdentity::new("ru-central1", "b1gfolder", "etndb", "orders").unwrap();
        assert_eq!(id.path(), "/ru-central1/b1gfolder/etndb/orders");
        assert_eq!(id.to_string(), id.path());
    }

    #[test]
    fn test_identity_parse() {
        let id = StreamIdentity::parse("/ru-central1/b1gfolder/etndb/orders").unwrap();
        assert_eq!(id.region(), "ru-central1");
        assert_eq!(id.folder_id(), "b1gfolder");
        assert_eq!(id.database_id(), "etndb");
        assert_eq!(id.stream_name(), "orders");

        assert!(StreamIdentity::parse("ru-central1/a/b/c").is_err());
        assert!(StreamIdentity::parse("/a/b/c").is_err());
        assert!(StreamIdentity::parse("/a/b/c/d/e").is_err());
    }

    #[test]
    fn test_identity_rejects_bad_components() {
        assert!(matches!(
            StreamIdentity::new("", "f", "d", "s"),
            Err(StreamError::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamIdentity::new("r", "f", "d/x", "s"),
            Err(StreamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_identity_serde_validates() {
        let id: StreamIdentity = serde_json::from_str(
            r#"{"region":"r","folder_id":"f","database_id":"d","stream_name":"s"}"#,
        )
        .unwrap();
        assert_eq!(id.path(), "/r/f/d/s");

        let bad: std::result::Result<StreamIdentity, _> = serde_json::from_str(
            r#"{"region":"","folder_id":"f","database_id":"d","stream_name":"s"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_timestamp_saturating_sub() {
        let ts = Timestamp(5_000_000);
        assert_eq!(ts.saturating_sub(Duration::from_secs(2)), Timestamp(3_000_000));
        assert_eq!(ts.saturating_sub(Duration::from_secs(10)), Timestamp(0));
        assert_eq!(Timestamp::from_millis(3), Timestamp(3000));
    }
}
