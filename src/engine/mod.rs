//! Asynchronous production engine contract.
//!
//! This module contains:
//! - `ProduceEngine` trait: intake, outcome streams, shutdown, transactions
//! - `Envelope` / `Failure`: what flows through the engine, tagged with the
//!   `RequestId` the producer uses to route the outcome back to its caller
//! - Implementations: `MemoryEngine` (in-process broker), `MockEngine`
//!   (hand-driven, for tests)

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ProducerConfig;
use crate::error::{ProducerError, TxnError};
use crate::message::{ConsumerMessage, PartitionOffsetMetadata, ProducerMessage};

pub mod memory;
pub mod mock;

pub use memory::{FaultPlan, MemoryEngine, MemoryEngineConfig};
pub use mock::{MockEngine, TxnCall};

/// Identifier attached to every in-flight submission.
///
/// Unique per producer instance; the engine must echo it back unchanged on
/// the success or error stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A message travelling through the engine.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: RequestId,
    pub message: ProducerMessage,
}

/// A failed submission, as reported on the error stream or by a rejected
/// intake push.
#[derive(Debug, Clone)]
pub struct Failure {
    pub id: RequestId,
    pub error: ProducerError,
}

/// Transaction manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnStatus {
    /// No transaction open; ready to begin one.
    #[default]
    Ready,
    /// A transaction is open and accepting records.
    InTransaction,
    /// A produce inside the transaction failed; only abort is allowed.
    AbortableError,
    /// The transaction manager cannot continue; the producer must be
    /// recreated.
    FatalError,
}

impl TxnStatus {
    pub fn is_error(self) -> bool {
        matches!(self, TxnStatus::AbortableError | TxnStatus::FatalError)
    }
}

/// Offsets to commit, keyed by topic.
pub type TopicOffsets = HashMap<String, Vec<PartitionOffsetMetadata>>;

/// An asynchronous, batching message-production engine.
///
/// Implementations:
/// - `MemoryEngine`: in-process partitioned log
/// - `MockEngine`: test double driven by the test itself
#[async_trait]
pub trait ProduceEngine: Send + Sync {
    /// Configuration the engine was started with.
    fn config(&self) -> &ProducerConfig;

    /// Push a message into the engine's intake.
    ///
    /// Suspends while the intake is full. Fails with
    /// `EngineError::ShuttingDown` once `async_close` has been called.
    async fn enqueue(&self, envelope: Envelope) -> Result<(), Failure>;

    /// Subscribe to the success stream. Returns `None` after the first call.
    fn take_successes(&self) -> Option<mpsc::Receiver<Envelope>>;

    /// Subscribe to the error stream. Returns `None` after the first call.
    fn take_errors(&self) -> Option<mpsc::Receiver<Failure>>;

    /// Stop intake, flush buffered work, then close both output streams.
    ///
    /// Returns immediately; closure of the streams signals completion.
    fn async_close(&self);

    fn is_transactional(&self) -> bool;

    fn txn_status(&self) -> TxnStatus;

    async fn begin_txn(&self) -> Result<(), TxnError>;

    async fn commit_txn(&self) -> Result<(), TxnError>;

    async fn abort_txn(&self) -> Result<(), TxnError>;

    async fn add_offsets_to_txn(&self, offsets: TopicOffsets, group_id: &str)
        -> Result<(), TxnError>;

    async fn add_message_to_txn(
        &self,
        message: &ConsumerMessage,
        group_id: &str,
        metadata: Option<&str>,
    ) -> Result<(), TxnError>;
}

/// Offsets that committing `message` inside a transaction should record:
/// the position after it, as the consumer would resume there.
pub fn offsets_for_message(message: &ConsumerMessage, metadata: Option<&str>) -> TopicOffsets {
    let mut offsets = TopicOffsets::new();
    offsets.insert(
        message.topic.clone(),
        vec![PartitionOffsetMetadata {
            partition: message.partition,
            offset: message.offset + 1,
            metadata: metadata.map(str::to_string),
        }],
    );
    offsets
}
