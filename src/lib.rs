//! sync-producer - blocking-contract message producer
//!
//! Wraps an asynchronous, batching production engine for a partitioned
//! broker and exposes sends that return only once each message has been
//! acknowledged or has failed. Outcomes are correlated back to their callers
//! through pooled one-deep rendezvous slots, so concurrent callers never wait
//! on each other's messages.

pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod message;
pub mod producer;
pub mod utils;

pub use config::{Config, ProducerConfig};
pub use engine::{MemoryEngine, MemoryEngineConfig, ProduceEngine, TxnStatus};
pub use error::{
    ConfigurationError, EngineError, Error, ProducerError, ProducerErrors, Result, TxnError,
};
pub use message::{
    ConsumerMessage, PartitionOffsetMetadata, ProducerMessage, INVALID_OFFSET, INVALID_PARTITION,
};
pub use producer::{BlockingSyncProducer, SyncProducer};
