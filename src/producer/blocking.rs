//! Thread-blocking facade over [`SyncProducer`].
//!
//! For callers with no async context of their own. The facade owns a
//! multi-threaded tokio runtime that hosts the engine and the result routers;
//! each call blocks the calling thread until its outcome is known. Calling
//! these methods from inside an async task panics, as with any `block_on`.

use tokio::runtime::{Builder, Runtime};

use super::SyncProducer;
use crate::config::Config;
use crate::engine::{TopicOffsets, TxnStatus};
use crate::error::{ProducerError, ProducerErrors, Result, TxnError};
use crate::message::{ConsumerMessage, ProducerMessage};

/// Blocking producer backed by its own runtime.
pub struct BlockingSyncProducer {
    runtime: Runtime,
    producer: SyncProducer,
}

impl BlockingSyncProducer {
    /// Build a runtime and start an in-process engine from `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("sync-producer")
            .build()?;

        let producer = {
            let _guard = runtime.enter();
            SyncProducer::new(config)?
        };

        Ok(Self { runtime, producer })
    }

    /// Wrap a producer started on `runtime`.
    pub fn from_parts(runtime: Runtime, producer: SyncProducer) -> Self {
        Self { runtime, producer }
    }

    /// The wrapped async producer.
    pub fn producer(&self) -> &SyncProducer {
        &self.producer
    }

    pub fn send_message(
        &self,
        message: ProducerMessage,
    ) -> std::result::Result<(i32, i64), ProducerError> {
        self.runtime.block_on(self.producer.send_message(message))
    }

    pub fn send_messages(
        &self,
        messages: &mut [ProducerMessage],
    ) -> std::result::Result<(), ProducerErrors> {
        self.runtime.block_on(self.producer.send_messages(messages))
    }

    /// Close the producer and shut the runtime down.
    pub fn close(self) -> Result<()> {
        let result = self.runtime.block_on(self.producer.close());
        drop(self.producer);
        self.runtime.shutdown_background();
        result
    }

    pub fn is_transactional(&self) -> bool {
        self.producer.is_transactional()
    }

    pub fn txn_status(&self) -> TxnStatus {
        self.producer.txn_status()
    }

    pub fn begin_txn(&self) -> std::result::Result<(), TxnError> {
        self.runtime.block_on(self.producer.begin_txn())
    }

    pub fn commit_txn(&self) -> std::result::Result<(), TxnError> {
        self.runtime.block_on(self.producer.commit_txn())
    }

    pub fn abort_txn(&self) -> std::result::Result<(), TxnError> {
        self.runtime.block_on(self.producer.abort_txn())
    }

    pub fn add_offsets_to_txn(
        &self,
        offsets: TopicOffsets,
        group_id: &str,
    ) -> std::result::Result<(), TxnError> {
        self.runtime
            .block_on(self.producer.add_offsets_to_txn(offsets, group_id))
    }

    pub fn add_message_to_txn(
        &self,
        message: &ConsumerMessage,
        group_id: &str,
        metadata: Option<&str>,
    ) -> std::result::Result<(), TxnError> {
        self.runtime
            .block_on(self.producer.add_message_to_txn(message, group_id, metadata))
    }
}
