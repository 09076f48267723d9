//! Message types exchanged with the production engine.
//!
//! `ProducerMessage` is what callers hand to the producer; the engine fills in
//! the final partition, offset and timestamp before acknowledging it.
//! `ConsumerMessage` and `PartitionOffsetMetadata` only appear in the
//! transaction passthrough, where consumed offsets are committed alongside
//! produced records.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Partition reported for a message that was never acknowledged.
pub const INVALID_PARTITION: i32 = -1;
/// Offset reported for a message that was never acknowledged.
pub const INVALID_OFFSET: i64 = -1;

/// A single record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: Bytes,
    pub value: Bytes,
}

/// A message to be produced.
///
/// `requested_partition` pins the destination partition; left unset, the
/// engine picks one from the key or round-robin. `partition`, `offset` and
/// `timestamp` are outputs, only meaningful after a successful send, and are
/// never read by the partitioner. Resending an acknowledged message therefore
/// places it afresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    /// Destination topic.
    pub topic: String,
    /// Optional partitioning key.
    pub key: Option<Bytes>,
    /// Message payload.
    pub value: Option<Bytes>,
    /// Record headers, passed through untouched.
    pub headers: Vec<RecordHeader>,
    /// Opaque caller data, never sent to the broker.
    pub metadata: Option<String>,
    /// Partition the caller pinned the message to, if any.
    pub requested_partition: Option<i32>,
    /// Engine-assigned partition.
    pub partition: i32,
    /// Engine-assigned offset.
    pub offset: i64,
    /// Engine-assigned append time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProducerMessage {
    pub fn new(topic: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: Some(value.into()),
            headers: Vec::new(),
            metadata: None,
            requested_partition: None,
            partition: INVALID_PARTITION,
            offset: INVALID_OFFSET,
            timestamp: None,
        }
    }

    /// A message with no payload (a tombstone on compacted topics).
    pub fn tombstone(topic: impl Into<String>, key: impl Into<Bytes>) -> Self {
        Self {
            value: None,
            ..Self::new(topic, Bytes::new()).with_key(key)
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push(RecordHeader {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.requested_partition = Some(partition);
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Encoded size of key, value and headers, as checked against
    /// `max_message_bytes`.
    pub fn byte_size(&self) -> usize {
        let key = self.key.as_ref().map_or(0, Bytes::len);
        let value = self.value.as_ref().map_or(0, Bytes::len);
        let headers: usize = self
            .headers
            .iter()
            .map(|h| h.key.len() + h.value.len())
            .sum();
        key + value + headers
    }

    /// Copy the broker-assigned coordinates from an acknowledged copy.
    pub(crate) fn apply_ack(&mut self, acked: &ProducerMessage) {
        self.partition = acked.partition;
        self.offset = acked.offset;
        self.timestamp = acked.timestamp;
    }
}

/// A message previously consumed, whose offset can be committed inside a
/// producer transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Offset to commit for one partition of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffsetMetadata {
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}
