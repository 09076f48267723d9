//! Result correlation between callers and the engine's outcome streams.
//!
//! A caller waiting on a message holds a [`Slot`]: a rendezvous with room for
//! exactly one [`Ack`]. Before the message enters the engine the slot is
//! registered with the [`Correlator`] under a fresh [`RequestId`]; a result
//! router later resolves that id, depositing the outcome into the slot even
//! if the caller is not yet waiting on it. Slots are recycled through a
//! per-producer [`SlotPool`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::RequestId;
use crate::error::ProducerError;
use crate::message::ProducerMessage;

/// Outcome delivered to a waiting caller: the acknowledged message, or the
/// reason it failed.
pub type Ack = Result<ProducerMessage, ProducerError>;

/// Idle slots retained by a pool; extras are dropped on release.
pub const MAX_IDLE_SLOTS: usize = 1024;

/// Single-value rendezvous with a one-deep buffer.
///
/// The slot keeps its own sender alive, so its channel never disconnects and
/// `wait` only returns once a value has been deposited.
#[derive(Debug)]
pub struct Slot {
    tx: mpsc::Sender<Ack>,
    rx: mpsc::Receiver<Ack>,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    /// Wait for the deposited outcome.
    pub async fn wait(&mut self) -> Ack {
        match self.rx.recv().await {
            Some(ack) => ack,
            None => unreachable!("slot retains its own sender"),
        }
    }

    /// Remove and return a deposited value without waiting.
    pub fn take(&mut self) -> Option<Ack> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Ack> {
        self.tx.clone()
    }
}

/// Pool of empty slots, owned by one producer.
#[derive(Debug, Default)]
pub struct SlotPool {
    idle: Mutex<Vec<Slot>>,
    created: AtomicUsize,
    discarded: AtomicUsize,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an empty slot, creating one if none is idle.
    pub fn acquire(&self) -> Slot {
        if let Some(slot) = self.idle.lock().pop() {
            return slot;
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Slot::new()
    }

    /// Return a drained slot to the pool.
    ///
    /// A slot still holding a value is dropped instead, so the pool never
    /// hands out a slot with a stale outcome in it.
    pub fn release(&self, mut slot: Slot) {
        if slot.take().is_some() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            warn!("Discarding slot released with an undelivered outcome");
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_SLOTS {
            idle.push(slot);
        }
    }

    /// Slots currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Slots created over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Slots dropped on release because they were not empty.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// What happened to an outcome handed to [`Correlator::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Deposited into the registered slot.
    Delivered,
    /// The slot was dropped before the outcome arrived.
    Abandoned,
    /// The slot already held an outcome.
    Duplicate,
    /// No slot registered under this id.
    Unknown,
}

/// Side-table from request ids to the slots awaiting them.
#[derive(Debug, Default)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, mpsc::Sender<Ack>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slot` for a new request and return its id.
    pub fn register(&self, slot: &Slot) -> RequestId {
        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().insert(id, slot.sender());
        id
    }

    /// Deliver the outcome for `id`. Each id resolves at most once.
    pub fn resolve(&self, id: RequestId, ack: Ack) -> Resolution {
        let Some(tx) = self.pending.lock().remove(&id) else {
            return Resolution::Unknown;
        };

        match tx.try_send(ack) {
            Ok(()) => Resolution::Delivered,
            Err(mpsc::error::TrySendError::Closed(_)) => Resolution::Abandoned,
            Err(mpsc::error::TrySendError::Full(_)) => Resolution::Duplicate,
        }
    }

    /// Register `slot` for a request that has not reached the engine yet.
    ///
    /// The registration is withdrawn when the returned guard drops, unless
    /// [`Reservation::confirm`] was called once the engine accepted the
    /// request. A caller cancelled while blocked on a full intake therefore
    /// leaves nothing behind.
    pub fn reserve(&self, slot: &Slot) -> Reservation<'_> {
        Reservation {
            correlator: self,
            id: self.register(slot),
            confirmed: false,
        }
    }

    /// Drop the registration for `id` without delivering anything.
    pub fn forget(&self, id: RequestId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Requests registered and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

/// A registration not yet handed to the engine.
#[derive(Debug)]
pub struct Reservation<'a> {
    correlator: &'a Correlator,
    id: RequestId,
    confirmed: bool,
}

impl Reservation<'_> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Keep the registration: the engine now owns the request and will
    /// resolve it.
    pub fn confirm(mut self) -> RequestId {
        self.confirmed = true;
        self.id
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.confirmed {
            self.correlator.forget(self.id);
        }
    }
}
