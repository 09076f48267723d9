//! In-memory production engine for standalone mode.
//!
//! Simulates a partitioned broker inside the process: a bounded intake queue
//! feeds a single dispatcher task that assigns partitions and offsets,
//! appends to per-partition logs and reports each outcome on the success or
//! error stream. Ideal for local development and testing without a broker.
//!
//! Transactions follow broker semantics: records produced inside a
//! transaction occupy offsets immediately but only become visible to
//! `committed_records` after commit, and are discarded on abort.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{
    offsets_for_message, Envelope, Failure, ProduceEngine, RequestId, TopicOffsets, TxnStatus,
};
use crate::config::ProducerConfig;
use crate::error::{EngineError, ProducerError, TxnError};
use crate::message::{ConsumerMessage, PartitionOffsetMetadata, ProducerMessage};

/// Partitions created for a topic on first use.
pub const DEFAULT_PARTITIONS_PER_TOPIC: i32 = 3;

/// Configuration for the in-memory engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryEngineConfig {
    /// Partition count given to every topic when it is first produced to.
    pub partitions_per_topic: i32,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            partitions_per_topic: DEFAULT_PARTITIONS_PER_TOPIC,
        }
    }
}

#[derive(Debug, Clone)]
enum FaultMatcher {
    Any,
    Topic(String),
    Key(Bytes),
}

#[derive(Debug, Clone)]
struct FaultRule {
    matcher: FaultMatcher,
    cause: EngineError,
}

/// Injected produce failures.
///
/// Rules are checked in insertion order; the first match decides the cause.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    rules: Vec<FaultRule>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every message sent to `topic`.
    pub fn fail_topic(mut self, topic: impl Into<String>, cause: EngineError) -> Self {
        self.rules.push(FaultRule {
            matcher: FaultMatcher::Topic(topic.into()),
            cause,
        });
        self
    }

    /// Fail every message carrying `key`.
    pub fn fail_key(mut self, key: impl Into<Bytes>, cause: EngineError) -> Self {
        self.rules.push(FaultRule {
            matcher: FaultMatcher::Key(key.into()),
            cause,
        });
        self
    }

    /// Fail every message.
    pub fn fail_all(mut self, cause: EngineError) -> Self {
        self.rules.push(FaultRule {
            matcher: FaultMatcher::Any,
            cause,
        });
        self
    }

    fn cause_for(&self, message: &ProducerMessage) -> Option<EngineError> {
        self.rules
            .iter()
            .find(|rule| match &rule.matcher {
                FaultMatcher::Any => true,
                FaultMatcher::Topic(topic) => *topic == message.topic,
                FaultMatcher::Key(key) => message.key.as_ref() == Some(key),
            })
            .map(|rule| rule.cause.clone())
    }
}

/// Work accepted on the intake queue.
enum Intake {
    Produce(Envelope),
    /// Resolved once everything queued before it has been processed.
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Committed,
    Pending,
    Aborted,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    offset: i64,
    key: Option<Bytes>,
    value: Option<Bytes>,
    timestamp: DateTime<Utc>,
    state: RecordState,
}

#[derive(Default)]
struct Broker {
    /// Partition logs per topic.
    logs: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// Next round-robin partition per topic, for keyless messages.
    round_robin: HashMap<String, u32>,
    txn: TxnStatus,
    /// Offsets added to the open transaction, per consumer group.
    pending_offsets: HashMap<String, TopicOffsets>,
    /// Committed consumer group offsets, keyed by (group, topic, partition).
    group_offsets: HashMap<(String, String, i32), PartitionOffsetMetadata>,
}

impl Broker {
    fn choose_partition(
        &mut self,
        message: &ProducerMessage,
        partitions: i32,
    ) -> Result<i32, EngineError> {
        if let Some(requested) = message.requested_partition {
            if (0..partitions).contains(&requested) {
                return Ok(requested);
            }
            return Err(EngineError::UnknownTopicOrPartition {
                topic: message.topic.clone(),
                partition: requested,
            });
        }

        let count = partitions as u32;
        let chosen = match &message.key {
            Some(key) => fnv1a(key) % count,
            None => {
                let next = self.round_robin.entry(message.topic.clone()).or_insert(0);
                let chosen = *next % count;
                *next = next.wrapping_add(1);
                chosen
            }
        };
        Ok(chosen as i32)
    }

    fn partition_log(
        &mut self,
        topic: &str,
        partition: i32,
        partitions: i32,
    ) -> &mut Vec<StoredRecord> {
        let logs = self
            .logs
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions as usize]);
        &mut logs[partition as usize]
    }

    /// Settle every pending record and the group offsets added to the
    /// transaction, then return to `Ready`.
    fn end_transaction(&mut self, outcome: RecordState) {
        for partitions in self.logs.values_mut() {
            for record in partitions.iter_mut().flatten() {
                if record.state == RecordState::Pending {
                    record.state = outcome;
                }
            }
        }

        let pending = std::mem::take(&mut self.pending_offsets);
        if outcome == RecordState::Committed {
            for (group, topics) in pending {
                for (topic, partitions) in topics {
                    for offset in partitions {
                        self.group_offsets
                            .insert((group.clone(), topic.clone(), offset.partition), offset);
                    }
                }
            }
        }

        self.txn = TxnStatus::Ready;
    }
}

/// 32-bit FNV-1a, the hash the broker's default partitioner uses for keys.
fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(PRIME)
    })
}

fn reject(id: RequestId, message: ProducerMessage, cause: EngineError) -> Failure {
    Failure {
        id,
        error: ProducerError::new(message, cause),
    }
}

/// State shared between the engine handle and its dispatcher task.
struct Shared {
    producer: ProducerConfig,
    engine: MemoryEngineConfig,
    faults: FaultPlan,
    /// Dropped by `async_close`; `None` means intake is closed.
    intake: Mutex<Option<mpsc::Sender<Intake>>>,
    broker: Mutex<Broker>,
}

impl Shared {
    fn partitions(&self) -> i32 {
        self.engine.partitions_per_topic.max(1)
    }

    fn append(&self, envelope: Envelope) -> Result<Envelope, Failure> {
        let result = self.try_append(envelope);
        if result.is_err() {
            let mut broker = self.broker.lock();
            if broker.txn == TxnStatus::InTransaction {
                warn!("Produce failed inside transaction; transaction must be aborted");
                broker.txn = TxnStatus::AbortableError;
            }
        }
        result
    }

    fn try_append(&self, envelope: Envelope) -> Result<Envelope, Failure> {
        let Envelope { id, mut message } = envelope;

        if let Some(cause) = self.faults.cause_for(&message) {
            return Err(reject(id, message, cause));
        }

        let size = message.byte_size();
        let max = self.producer.max_message_bytes;
        if size > max {
            return Err(reject(
                id,
                message,
                EngineError::MessageSizeTooLarge { size, max },
            ));
        }

        let partitions = self.partitions();
        let mut broker = self.broker.lock();

        let state = if self.producer.is_transactional() {
            match broker.txn {
                TxnStatus::InTransaction => RecordState::Pending,
                status => {
                    let reason = format!("cannot produce while transaction status is {status:?}");
                    return Err(reject(id, message, EngineError::Transaction(reason)));
                }
            }
        } else {
            RecordState::Committed
        };

        let partition = match broker.choose_partition(&message, partitions) {
            Ok(partition) => partition,
            Err(cause) => return Err(reject(id, message, cause)),
        };

        let log = broker.partition_log(&message.topic, partition, partitions);
        let offset = log.len() as i64;
        let timestamp = Utc::now();
        log.push(StoredRecord {
            offset,
            key: message.key.clone(),
            value: message.value.clone(),
            timestamp,
            state,
        });

        message.partition = partition;
        message.offset = offset;
        message.timestamp = Some(timestamp);
        Ok(Envelope { id, message })
    }
}

/// Drain the intake until it closes, then drop the outcome senders.
async fn dispatch(
    shared: Arc<Shared>,
    mut intake: mpsc::Receiver<Intake>,
    successes: Option<mpsc::Sender<Envelope>>,
    errors: Option<mpsc::Sender<Failure>>,
) {
    while let Some(work) = intake.recv().await {
        match work {
            Intake::Flush(done) => {
                let _ = done.send(());
            }
            Intake::Produce(envelope) => match shared.append(envelope) {
                Ok(acked) => {
                    debug!(
                        id = %acked.id,
                        topic = %acked.message.topic,
                        partition = acked.message.partition,
                        offset = acked.message.offset,
                        "Appended message"
                    );
                    if let Some(tx) = &successes {
                        if tx.send(acked).await.is_err() {
                            warn!("Success stream receiver dropped, outcome discarded");
                        }
                    }
                }
                Err(failure) => {
                    debug!(
                        id = %failure.id,
                        topic = %failure.error.message.topic,
                        cause = %failure.error.cause,
                        "Rejected message"
                    );
                    if let Some(tx) = &errors {
                        if tx.send(failure).await.is_err() {
                            warn!("Error stream receiver dropped, outcome discarded");
                        }
                    }
                }
            },
        }
    }

    info!("Memory engine drained, closing outcome streams");
}

/// In-process production engine.
pub struct MemoryEngine {
    shared: Arc<Shared>,
    successes: Mutex<Option<mpsc::Receiver<Envelope>>>,
    errors: Mutex<Option<mpsc::Receiver<Failure>>>,
}

impl MemoryEngine {
    /// Start an engine. Must be called from within a tokio runtime.
    pub fn new(producer: ProducerConfig, engine: MemoryEngineConfig) -> Self {
        Self::with_faults(producer, engine, FaultPlan::default())
    }

    /// Start an engine that fails messages according to `faults`.
    pub fn with_faults(
        producer: ProducerConfig,
        engine: MemoryEngineConfig,
        faults: FaultPlan,
    ) -> Self {
        let depth = producer.channel_buffer_size.max(1);
        let (intake_tx, intake_rx) = mpsc::channel(depth);

        let (success_tx, success_rx) = if producer.return_successes {
            let (tx, rx) = mpsc::channel(depth);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (error_tx, error_rx) = if producer.return_errors {
            let (tx, rx) = mpsc::channel(depth);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        info!(
            partitions_per_topic = engine.partitions_per_topic,
            transactional = producer.is_transactional(),
            buffer = depth,
            "Memory engine started"
        );

        let shared = Arc::new(Shared {
            producer,
            engine,
            faults,
            intake: Mutex::new(Some(intake_tx)),
            broker: Mutex::new(Broker::default()),
        });

        tokio::spawn(dispatch(
            Arc::clone(&shared),
            intake_rx,
            success_tx,
            error_tx,
        ));

        Self {
            shared,
            successes: Mutex::new(success_rx),
            errors: Mutex::new(error_rx),
        }
    }

    /// Records visible to a `read_committed` consumer, ordered by partition
    /// then offset.
    pub fn committed_records(&self, topic: &str) -> Vec<ConsumerMessage> {
        let broker = self.shared.broker.lock();
        let Some(partitions) = broker.logs.get(topic) else {
            return Vec::new();
        };

        partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, log)| {
                log.iter()
                    .filter(|record| record.state == RecordState::Committed)
                    .map(move |record| ConsumerMessage {
                        topic: topic.to_string(),
                        partition: partition as i32,
                        offset: record.offset,
                        key: record.key.clone(),
                        value: record.value.clone(),
                        timestamp: Some(record.timestamp),
                    })
            })
            .collect()
    }

    /// Offset the next record appended to `topic/partition` will receive.
    pub fn log_end_offset(&self, topic: &str, partition: i32) -> i64 {
        let broker = self.shared.broker.lock();
        broker
            .logs
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map_or(0, |log| log.len() as i64)
    }

    /// Offset committed for a consumer group through a transaction.
    pub fn committed_offset(
        &self,
        group_id: &str,
        topic: &str,
        partition: i32,
    ) -> Option<PartitionOffsetMetadata> {
        let broker = self.shared.broker.lock();
        broker
            .group_offsets
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .cloned()
    }

    fn intake(&self) -> Option<mpsc::Sender<Intake>> {
        self.shared.intake.lock().clone()
    }

    fn require_transactional(&self) -> Result<(), TxnError> {
        if self.shared.producer.is_transactional() {
            Ok(())
        } else {
            Err(TxnError::NotTransactional)
        }
    }

    /// Wait until every message queued so far has been appended.
    async fn flush(&self) -> Result<(), TxnError> {
        let intake = self.intake().ok_or(TxnError::ShuttingDown)?;
        let (done_tx, done_rx) = oneshot::channel();
        intake
            .send(Intake::Flush(done_tx))
            .await
            .map_err(|_| TxnError::ShuttingDown)?;
        done_rx.await.map_err(|_| TxnError::ShuttingDown)
    }
}

#[async_trait]
impl ProduceEngine for MemoryEngine {
    fn config(&self) -> &ProducerConfig {
        &self.shared.producer
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<(), Failure> {
        let Some(intake) = self.intake() else {
            return Err(reject(envelope.id, envelope.message, EngineError::ShuttingDown));
        };

        if let Err(mpsc::error::SendError(Intake::Produce(envelope))) =
            intake.send(Intake::Produce(envelope)).await
        {
            return Err(reject(envelope.id, envelope.message, EngineError::ShuttingDown));
        }
        Ok(())
    }

    fn take_successes(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.successes.lock().take()
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<Failure>> {
        self.errors.lock().take()
    }

    fn async_close(&self) {
        if self.shared.intake.lock().take().is_none() {
            return;
        }

        let mut broker = self.shared.broker.lock();
        if matches!(
            broker.txn,
            TxnStatus::InTransaction | TxnStatus::AbortableError
        ) {
            warn!("Engine closed with an open transaction, pending records aborted");
            broker.end_transaction(RecordState::Aborted);
            broker.txn = TxnStatus::FatalError;
        }

        info!("Memory engine closing");
    }

    fn is_transactional(&self) -> bool {
        self.shared.producer.is_transactional()
    }

    fn txn_status(&self) -> TxnStatus {
        self.shared.broker.lock().txn
    }

    async fn begin_txn(&self) -> Result<(), TxnError> {
        self.require_transactional()?;
        if self.intake().is_none() {
            return Err(TxnError::ShuttingDown);
        }

        let mut broker = self.shared.broker.lock();
        match broker.txn {
            TxnStatus::Ready => {
                broker.txn = TxnStatus::InTransaction;
                debug!("Transaction started");
                Ok(())
            }
            TxnStatus::FatalError => Err(TxnError::Fatal(
                "producer closed with an open transaction".to_string(),
            )),
            from => Err(TxnError::InvalidTransition {
                from,
                operation: "begin",
            }),
        }
    }

    async fn commit_txn(&self) -> Result<(), TxnError> {
        self.require_transactional()?;
        self.flush().await?;

        let mut broker = self.shared.broker.lock();
        match broker.txn {
            TxnStatus::InTransaction => {
                broker.end_transaction(RecordState::Committed);
                debug!("Transaction committed");
                Ok(())
            }
            TxnStatus::AbortableError => Err(TxnError::Abortable(
                "a record in the transaction failed to produce".to_string(),
            )),
            TxnStatus::FatalError => Err(TxnError::Fatal(
                "producer closed with an open transaction".to_string(),
            )),
            from => Err(TxnError::InvalidTransition {
                from,
                operation: "commit",
            }),
        }
    }

    async fn abort_txn(&self) -> Result<(), TxnError> {
        self.require_transactional()?;
        self.flush().await?;

        let mut broker = self.shared.broker.lock();
        match broker.txn {
            TxnStatus::InTransaction | TxnStatus::AbortableError => {
                broker.end_transaction(RecordState::Aborted);
                debug!("Transaction aborted");
                Ok(())
            }
            TxnStatus::FatalError => Err(TxnError::Fatal(
                "producer closed with an open transaction".to_string(),
            )),
            from => Err(TxnError::InvalidTransition {
                from,
                operation: "abort",
            }),
        }
    }

    async fn add_offsets_to_txn(
        &self,
        offsets: TopicOffsets,
        group_id: &str,
    ) -> Result<(), TxnError> {
        self.require_transactional()?;

        let mut broker = self.shared.broker.lock();
        match broker.txn {
            TxnStatus::InTransaction => {
                let pending = broker
                    .pending_offsets
                    .entry(group_id.to_string())
                    .or_default();
                for (topic, partitions) in offsets {
                    pending.entry(topic).or_default().extend(partitions);
                }
                Ok(())
            }
            TxnStatus::AbortableError => Err(TxnError::Abortable(
                "cannot add offsets to a failed transaction".to_string(),
            )),
            from => Err(TxnError::InvalidTransition {
                from,
                operation: "add offsets",
            }),
        }
    }

    async fn add_message_to_txn(
        &self,
        message: &ConsumerMessage,
        group_id: &str,
        metadata: Option<&str>,
    ) -> Result<(), TxnError> {
        self.add_offsets_to_txn(offsets_for_message(message, metadata), group_id)
            .await
    }
}
