//! Mock production engine for testing.
//!
//! The test plays the broker: it takes the intake receiver, decides what to
//! acknowledge and when, and pushes outcomes through the success and error
//! senders in whatever order it likes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Envelope, Failure, ProduceEngine, TopicOffsets, TxnStatus};
use crate::config::ProducerConfig;
use crate::error::{EngineError, ProducerError, TxnError};
use crate::message::ConsumerMessage;

/// A transaction call forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnCall {
    Begin,
    Commit,
    Abort,
    AddOffsets {
        group_id: String,
        offsets: TopicOffsets,
    },
    AddMessage {
        group_id: String,
        topic: String,
        partition: i32,
        offset: i64,
        metadata: Option<String>,
    },
}

/// Mock engine for testing.
pub struct MockEngine {
    config: ProducerConfig,
    intake_tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    intake_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    success_tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    success_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    error_tx: Mutex<Option<mpsc::Sender<Failure>>>,
    error_rx: Mutex<Option<mpsc::Receiver<Failure>>>,
    closed: Mutex<bool>,
    txn_status: Mutex<TxnStatus>,
    txn_calls: Mutex<Vec<TxnCall>>,
    txn_failure: Mutex<Option<TxnError>>,
}

impl MockEngine {
    pub fn new(config: ProducerConfig) -> Arc<Self> {
        let depth = config.channel_buffer_size.max(1);
        let (intake_tx, intake_rx) = mpsc::channel(depth);
        let (success_tx, success_rx) = mpsc::channel(depth);
        let (error_tx, error_rx) = mpsc::channel(depth);

        Arc::new(Self {
            config,
            intake_tx: Mutex::new(Some(intake_tx)),
            intake_rx: Mutex::new(Some(intake_rx)),
            success_tx: Mutex::new(Some(success_tx)),
            success_rx: Mutex::new(Some(success_rx)),
            error_tx: Mutex::new(Some(error_tx)),
            error_rx: Mutex::new(Some(error_rx)),
            closed: Mutex::new(false),
            txn_status: Mutex::new(TxnStatus::Ready),
            txn_calls: Mutex::new(Vec::new()),
            txn_failure: Mutex::new(None),
        })
    }

    /// Take the intake receiver to observe submitted envelopes.
    pub fn take_intake(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.intake_rx.lock().take()
    }

    /// Sender for acknowledging envelopes. `None` once closed.
    pub fn success_sender(&self) -> Option<mpsc::Sender<Envelope>> {
        self.success_tx.lock().clone()
    }

    /// Sender for failing envelopes. `None` once closed.
    pub fn error_sender(&self) -> Option<mpsc::Sender<Failure>> {
        self.error_tx.lock().clone()
    }

    /// Acknowledge `envelope` at the given coordinates.
    pub async fn acknowledge(&self, mut envelope: Envelope, partition: i32, offset: i64) {
        envelope.message.partition = partition;
        envelope.message.offset = offset;
        if let Some(tx) = self.success_sender() {
            let _ = tx.send(envelope).await;
        }
    }

    /// Fail `envelope` with `cause`.
    pub async fn fail(&self, envelope: Envelope, cause: EngineError) {
        let failure = Failure {
            id: envelope.id,
            error: ProducerError::new(envelope.message, cause),
        };
        if let Some(tx) = self.error_sender() {
            let _ = tx.send(failure).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    pub fn set_txn_status(&self, status: TxnStatus) {
        *self.txn_status.lock() = status;
    }

    /// Make the next transaction call fail with `error`.
    pub fn fail_next_txn(&self, error: TxnError) {
        *self.txn_failure.lock() = Some(error);
    }

    pub fn txn_calls(&self) -> Vec<TxnCall> {
        self.txn_calls.lock().clone()
    }

    fn record(&self, call: TxnCall) -> Result<(), TxnError> {
        self.txn_calls.lock().push(call);
        match self.txn_failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProduceEngine for MockEngine {
    fn config(&self) -> &ProducerConfig {
        &self.config
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<(), Failure> {
        let intake = self.intake_tx.lock().clone();
        let rejected = match intake {
            Some(tx) => match tx.send(envelope).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(envelope)) => envelope,
            },
            None => envelope,
        };
        Err(Failure {
            id: rejected.id,
            error: ProducerError::new(rejected.message, EngineError::ShuttingDown),
        })
    }

    fn take_successes(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.success_rx.lock().take()
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<Failure>> {
        self.error_rx.lock().take()
    }

    /// Closes intake and drops the engine's own outcome senders; the streams
    /// end once the test drops any senders it still holds.
    fn async_close(&self) {
        *self.closed.lock() = true;
        self.intake_tx.lock().take();
        self.success_tx.lock().take();
        self.error_tx.lock().take();
    }

    fn is_transactional(&self) -> bool {
        self.config.is_transactional()
    }

    fn txn_status(&self) -> TxnStatus {
        *self.txn_status.lock()
    }

    async fn begin_txn(&self) -> Result<(), TxnError> {
        self.record(TxnCall::Begin)
    }

    async fn commit_txn(&self) -> Result<(), TxnError> {
        self.record(TxnCall::Commit)
    }

    async fn abort_txn(&self) -> Result<(), TxnError> {
        self.record(TxnCall::Abort)
    }

    async fn add_offsets_to_txn(
        &self,
        offsets: TopicOffsets,
        group_id: &str,
    ) -> Result<(), TxnError> {
        self.record(TxnCall::AddOffsets {
            group_id: group_id.to_string(),
            offsets,
        })
    }

    async fn add_message_to_txn(
        &self,
        message: &ConsumerMessage,
        group_id: &str,
        metadata: Option<&str>,
    ) -> Result<(), TxnError> {
        self.record(TxnCall::AddMessage {
            group_id: group_id.to_string(),
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            metadata: metadata.map(str::to_string),
        })
    }
}
