//! Synchronous-contract producer over an asynchronous engine.
//!
//! `SyncProducer` turns the engine's fire-and-forget intake plus outcome
//! streams into calls that return only once each message has been
//! acknowledged or has failed. Two router tasks drain the success and error
//! streams for the producer's whole lifetime, routing every outcome to the
//! slot registered for its request id.
//!
//! Callers are never serialized against each other: each send owns its slot,
//! and the only shared state is the slot pool and the correlator side-table.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::correlation::{Ack, Correlator, Resolution, Slot, SlotPool};
use crate::engine::{
    Envelope, Failure, MemoryEngine, ProduceEngine, RequestId, TopicOffsets, TxnStatus,
};
use crate::error::{ConfigurationError, Error, ProducerError, ProducerErrors, Result, TxnError};
use crate::message::{ConsumerMessage, ProducerMessage};

pub mod blocking;

pub use blocking::BlockingSyncProducer;

/// State shared with the router and submission tasks.
#[derive(Debug, Default)]
struct Shared {
    pool: SlotPool,
    correlator: Correlator,
}

struct Routers {
    successes: JoinHandle<()>,
    errors: JoinHandle<()>,
}

/// Position of a batch member, as published by the submission task.
enum Submitted {
    /// Accepted by the engine; the outcome will arrive in `slot`.
    Pending { index: usize, slot: Slot },
    /// Refused at intake.
    Rejected {
        index: usize,
        slot: Slot,
        error: ProducerError,
    },
}

/// Producer whose sends complete only when the engine reports an outcome.
///
/// Must be closed with [`SyncProducer::close`] so the engine is flushed and
/// the router tasks are joined.
pub struct SyncProducer {
    id: Uuid,
    engine: Arc<dyn ProduceEngine>,
    shared: Arc<Shared>,
    routers: Mutex<Option<Routers>>,
}

impl SyncProducer {
    /// Start an in-process engine from `config` and wrap it.
    ///
    /// The configuration is checked before the engine is started. Must be
    /// called from within a tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        config.producer.verify_for_sync()?;
        let engine = MemoryEngine::new(config.producer.clone(), config.engine.clone());
        Self::from_engine(Arc::new(engine))
    }

    /// Wrap an already started engine.
    ///
    /// Fails with a configuration error, closing the engine and starting no
    /// routers, when the engine does not report both successes and errors.
    pub fn from_engine(engine: Arc<dyn ProduceEngine>) -> Result<Self> {
        if let Err(e) = engine.config().verify_for_sync() {
            engine.async_close();
            return Err(e.into());
        }

        let (Some(successes), Some(errors)) = (engine.take_successes(), engine.take_errors())
        else {
            engine.async_close();
            return Err(ConfigurationError::new(
                "engine outcome streams are already subscribed",
            )
            .into());
        };

        let id = Uuid::new_v4();
        let shared = Arc::new(Shared::default());
        let routers = Routers {
            successes: tokio::spawn(route(
                id,
                "success",
                successes,
                Arc::clone(&shared),
                |envelope: Envelope| (envelope.id, Ok(envelope.message)),
            )),
            errors: tokio::spawn(route(
                id,
                "error",
                errors,
                Arc::clone(&shared),
                |failure: Failure| (failure.id, Err(failure.error)),
            )),
        };

        info!(
            producer_id = %id,
            transactional = engine.is_transactional(),
            "Sync producer started"
        );

        Ok(Self {
            id,
            engine,
            shared,
            routers: Mutex::new(Some(routers)),
        })
    }

    /// Instance id used in log output.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Produce one message and wait for its outcome.
    ///
    /// Returns the partition and offset the engine assigned. On failure the
    /// error carries the message and the engine's cause; its
    /// `partition()`/`offset()` report the `-1` sentinels.
    #[tracing::instrument(name = "producer.send_message", skip_all, fields(producer_id = %self.id, topic = %message.topic))]
    pub async fn send_message(
        &self,
        message: ProducerMessage,
    ) -> std::result::Result<(i32, i64), ProducerError> {
        let acked = self.deliver(message).await?;
        Ok((acked.partition, acked.offset))
    }

    /// Produce one message and return the acknowledged copy, with partition,
    /// offset and timestamp filled in.
    pub async fn deliver(&self, message: ProducerMessage) -> Ack {
        let mut slot = self.shared.pool.acquire();
        let reservation = self.shared.correlator.reserve(&slot);
        let id = reservation.id();
        debug!(%id, "Submitting message");

        if let Err(failure) = self.engine.enqueue(Envelope { id, message }).await {
            drop(reservation);
            self.shared.pool.release(slot);
            return Err(failure.error);
        }
        reservation.confirm();

        let ack = slot.wait().await;
        self.shared.pool.release(slot);
        ack
    }

    /// Produce a batch and wait until every member has an outcome.
    ///
    /// Members are submitted in order by a separate task while this call
    /// awaits their outcomes in the same order, so a full engine intake can
    /// never starve the routers this call depends on. Successful members get
    /// their assigned partition, offset and timestamp written back into
    /// `messages`. Failures are collected, in submission order, into the
    /// returned error.
    #[tracing::instrument(name = "producer.send_messages", skip_all, fields(producer_id = %self.id, count = messages.len()))]
    pub async fn send_messages(
        &self,
        messages: &mut [ProducerMessage],
    ) -> std::result::Result<(), ProducerErrors> {
        if messages.is_empty() {
            return Ok(());
        }

        let (order_tx, mut order_rx) = mpsc::channel(messages.len());
        tokio::spawn(submit_batch(
            Arc::clone(&self.engine),
            Arc::clone(&self.shared),
            messages.to_vec(),
            order_tx,
        ));

        let mut errors = Vec::new();
        while let Some(submitted) = order_rx.recv().await {
            let (index, slot, ack) = match submitted {
                Submitted::Pending { index, mut slot } => {
                    let ack = slot.wait().await;
                    (index, slot, ack)
                }
                Submitted::Rejected { index, slot, error } => (index, slot, Err(error)),
            };
            self.shared.pool.release(slot);

            match ack {
                Ok(acked) => messages[index].apply_ack(&acked),
                Err(error) => errors.push(error),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            debug!(failed = errors.len(), "Batch completed with failures");
            Err(ProducerErrors(errors))
        }
    }

    /// Shut down the producer.
    ///
    /// Closes the engine's intake, lets it flush and close its outcome
    /// streams, then waits for both routers to drain them. Sends still parked
    /// on outcomes the engine never reports are not woken. Engine shutdown
    /// errors are not surfaced; a router that panicked is.
    pub async fn close(&self) -> Result<()> {
        let mut routers = self.routers.lock().await;
        let Some(Routers { successes, errors }) = routers.take() else {
            return Ok(());
        };

        self.engine.async_close();
        let (successes, errors) = tokio::join!(successes, errors);

        for (router, joined) in [("success", successes), ("error", errors)] {
            if let Err(e) = joined {
                return Err(Error::RouterPanicked {
                    router,
                    reason: e.to_string(),
                });
            }
        }

        let in_flight = self.shared.correlator.in_flight();
        if in_flight > 0 {
            warn!(
                producer_id = %self.id,
                in_flight,
                "Sync producer closed with unresolved sends"
            );
        }
        info!(producer_id = %self.id, "Sync producer closed");
        Ok(())
    }

    /// Slots created by this producer's pool so far.
    pub fn slots_created(&self) -> usize {
        self.shared.pool.created()
    }

    /// Slots idle in this producer's pool.
    pub fn slots_idle(&self) -> usize {
        self.shared.pool.idle()
    }

    /// Sends registered and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.shared.correlator.in_flight()
    }

    pub fn is_transactional(&self) -> bool {
        self.engine.is_transactional()
    }

    pub fn txn_status(&self) -> TxnStatus {
        self.engine.txn_status()
    }

    pub async fn begin_txn(&self) -> std::result::Result<(), TxnError> {
        self.engine.begin_txn().await
    }

    pub async fn commit_txn(&self) -> std::result::Result<(), TxnError> {
        self.engine.commit_txn().await
    }

    pub async fn abort_txn(&self) -> std::result::Result<(), TxnError> {
        self.engine.abort_txn().await
    }

    pub async fn add_offsets_to_txn(
        &self,
        offsets: TopicOffsets,
        group_id: &str,
    ) -> std::result::Result<(), TxnError> {
        self.engine.add_offsets_to_txn(offsets, group_id).await
    }

    pub async fn add_message_to_txn(
        &self,
        message: &ConsumerMessage,
        group_id: &str,
        metadata: Option<&str>,
    ) -> std::result::Result<(), TxnError> {
        self.engine
            .add_message_to_txn(message, group_id, metadata)
            .await
    }
}

/// Drain one outcome stream until the engine closes it.
async fn route<T>(
    producer_id: Uuid,
    router: &'static str,
    mut outcomes: mpsc::Receiver<T>,
    shared: Arc<Shared>,
    split: fn(T) -> (RequestId, Ack),
) {
    debug!(%producer_id, router, "Result router started");

    while let Some(outcome) = outcomes.recv().await {
        let (id, ack) = split(outcome);
        match shared.correlator.resolve(id, ack) {
            Resolution::Delivered => {}
            Resolution::Abandoned => {
                debug!(%producer_id, router, %id, "Caller stopped waiting, outcome dropped");
            }
            Resolution::Duplicate => {
                warn!(%producer_id, router, %id, "Slot already held an outcome, duplicate dropped");
            }
            Resolution::Unknown => {
                warn!(%producer_id, router, %id, "Outcome for unknown request dropped");
            }
        }
    }

    debug!(%producer_id, router, "Result router stopped, stream closed");
}

/// Push every batch member into the engine in order, publishing each index
/// once its message is in flight.
async fn submit_batch(
    engine: Arc<dyn ProduceEngine>,
    shared: Arc<Shared>,
    batch: Vec<ProducerMessage>,
    order: mpsc::Sender<Submitted>,
) {
    for (index, message) in batch.into_iter().enumerate() {
        let slot = shared.pool.acquire();
        let reservation = shared.correlator.reserve(&slot);
        let id = reservation.id();

        let submitted = match engine.enqueue(Envelope { id, message }).await {
            Ok(()) => {
                reservation.confirm();
                Submitted::Pending { index, slot }
            }
            Err(failure) => {
                drop(reservation);
                Submitted::Rejected {
                    index,
                    slot,
                    error: failure.error,
                }
            }
        };

        if order.send(submitted).await.is_err() {
            debug!("Batch caller went away, stopping submission");
            break;
        }
    }
}
