//! Blocking facade, driven from plain threads.

use std::sync::Arc;
use std::thread;

use sync_producer::{
    BlockingSyncProducer, Config, Error, ProducerMessage, SyncProducer, TxnStatus,
};

#[test]
fn test_blocking_send_and_batch() {
    let producer = BlockingSyncProducer::new(&Config::for_sync()).unwrap();

    let (_, offset) = producer
        .send_message(ProducerMessage::new("orders", "one").with_partition(0))
        .unwrap();
    assert_eq!(offset, 0);

    let mut batch = vec![
        ProducerMessage::new("orders", "two").with_partition(0),
        ProducerMessage::new("orders", "three").with_partition(0),
    ];
    producer.send_messages(&mut batch).unwrap();
    assert_eq!(batch[0].offset, 1);
    assert_eq!(batch[1].offset, 2);

    producer.close().unwrap();
}

#[test]
fn test_blocking_callers_on_many_threads() {
    let producer = Arc::new(BlockingSyncProducer::new(&Config::for_sync()).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let producer = Arc::clone(&producer);
            thread::spawn(move || {
                (0..20)
                    .map(|i| {
                        producer
                            .send_message(ProducerMessage::new("orders", format!("{t}-{i}")))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut placed = Vec::new();
    for worker in workers {
        placed.extend(worker.join().unwrap());
    }
    placed.sort();
    placed.dedup();
    assert_eq!(placed.len(), 80);
    assert_eq!(producer.producer().in_flight(), 0);

    let producer = match Arc::try_unwrap(producer) {
        Ok(producer) => producer,
        Err(_) => panic!("producer still shared"),
    };
    producer.close().unwrap();
}

#[test]
fn test_blocking_transaction() {
    let mut config = Config::for_sync();
    config.producer = config.producer.with_transactional_id("blocking-tx");
    let producer = BlockingSyncProducer::new(&config).unwrap();

    producer.begin_txn().unwrap();
    producer
        .send_message(ProducerMessage::new("orders", "in-txn"))
        .unwrap();
    producer.commit_txn().unwrap();
    assert_eq!(producer.txn_status(), TxnStatus::Ready);

    producer.close().unwrap();
}

#[test]
fn test_blocking_rejects_invalid_config() {
    let result = BlockingSyncProducer::new(&Config::default());
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_blocking_wraps_producer_started_on_own_runtime() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let producer = {
        let _guard = runtime.enter();
        SyncProducer::new(&Config::for_sync()).unwrap()
    };
    let producer = BlockingSyncProducer::from_parts(runtime, producer);

    let (partition, offset) = producer
        .send_message(ProducerMessage::new("orders", "v").with_partition(1))
        .unwrap();

    assert_eq!((partition, offset), (1, 0));
    producer.close().unwrap();
}
