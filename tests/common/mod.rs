//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use sync_producer::engine::FaultPlan;
use sync_producer::{MemoryEngine, MemoryEngineConfig, ProducerConfig, SyncProducer};

/// Partitions per topic used by the fixtures.
pub const PARTITIONS: i32 = 3;

pub fn engine_config() -> MemoryEngineConfig {
    MemoryEngineConfig {
        partitions_per_topic: PARTITIONS,
    }
}

/// Start a memory engine with `faults` and wrap it in a sync producer.
///
/// The engine handle is returned too so tests can inspect the broker.
pub fn start(config: ProducerConfig, faults: FaultPlan) -> (Arc<MemoryEngine>, SyncProducer) {
    let engine = Arc::new(MemoryEngine::with_faults(config, engine_config(), faults));
    let producer = match SyncProducer::from_engine(engine.clone()) {
        Ok(producer) => producer,
        Err(e) => panic!("failed to start producer: {e}"),
    };
    (engine, producer)
}

pub fn start_sync() -> (Arc<MemoryEngine>, SyncProducer) {
    start(ProducerConfig::for_sync(), FaultPlan::new())
}

pub fn start_transactional() -> (Arc<MemoryEngine>, SyncProducer) {
    start(
        ProducerConfig::for_sync().with_transactional_id("it-tx"),
        FaultPlan::new(),
    )
}

pub fn utf8(bytes: &Option<bytes::Bytes>) -> String {
    bytes
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}
