//! Error types.
//!
//! - `EngineError`: cause reported by the production engine, surfaced verbatim
//! - `ProducerError`: one failed message paired with its cause
//! - `ProducerErrors`: the failed members of a batch, in submission order
//! - `ConfigurationError`: construction-time precondition violations
//! - `TxnError`: transaction control failures
//! - `Error`: crate-level union of the above

use crate::engine::TxnStatus;
use crate::message::{ProducerMessage, INVALID_OFFSET, INVALID_PARTITION};

/// Result type for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cause of a failed produce, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("leader not available")]
    LeaderNotAvailable,

    #[error("not enough in-sync replicas")]
    NotEnoughReplicas,

    #[error("message size too large ({size} > {max} bytes)")]
    MessageSizeTooLarge { size: usize, max: usize },

    #[error("request timed out")]
    RequestTimedOut,

    #[error("unknown topic or partition: {topic}/{partition}")]
    UnknownTopicOrPartition { topic: String, partition: i32 },

    #[error("producer is shutting down")]
    ShuttingDown,

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("{0}")]
    Other(String),
}

/// A message that could not be produced, and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to produce message to topic {}: {cause}", .message.topic)]
pub struct ProducerError {
    pub message: Box<ProducerMessage>,
    #[source]
    pub cause: EngineError,
}

impl ProducerError {
    pub fn new(message: ProducerMessage, cause: EngineError) -> Self {
        Self {
            message: Box::new(message),
            cause,
        }
    }

    /// Always [`INVALID_PARTITION`]: a failed message has no placement.
    pub fn partition(&self) -> i32 {
        INVALID_PARTITION
    }

    /// Always [`INVALID_OFFSET`].
    pub fn offset(&self) -> i64 {
        INVALID_OFFSET
    }
}

/// Failed members of a batch send, in submission order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to deliver {} messages", .0.len())]
pub struct ProducerErrors(pub Vec<ProducerError>);

impl ProducerErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProducerError> {
        self.0.iter()
    }

    /// The messages that failed, in submission order.
    pub fn messages(&self) -> impl Iterator<Item = &ProducerMessage> {
        self.0.iter().map(|e| e.message.as_ref())
    }
}

impl IntoIterator for ProducerErrors {
    type Item = ProducerError;
    type IntoIter = std::vec::IntoIter<ProducerError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Invalid configuration detected while constructing a producer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Errors from transaction control operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxnError {
    #[error("producer is not transactional")]
    NotTransactional,

    #[error("invalid transaction transition from {from:?} while attempting {operation}")]
    InvalidTransition {
        from: TxnStatus,
        operation: &'static str,
    },

    #[error("transaction must be aborted: {0}")]
    Abortable(String),

    #[error("transaction manager failed fatally: {0}")]
    Fatal(String),

    #[error("producer is shutting down")]
    ShuttingDown,
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Produce(#[from] ProducerError),

    #[error(transparent)]
    Batch(#[from] ProducerErrors),

    #[error(transparent)]
    Txn(#[from] TxnError),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("{router} router terminated abnormally: {reason}")]
    RouterPanicked {
        router: &'static str,
        reason: String,
    },
}
