//! Transactional produce through the sync producer.

mod common;

use common::{start, start_sync, start_transactional, utf8};
use sync_producer::engine::FaultPlan;
use sync_producer::{
    ConsumerMessage, EngineError, ProducerConfig, ProducerMessage, TxnError, TxnStatus,
};

fn consumed(offset: i64) -> ConsumerMessage {
    ConsumerMessage {
        topic: "input".to_string(),
        partition: 0,
        offset,
        key: None,
        value: None,
        timestamp: None,
    }
}

#[tokio::test]
async fn test_consume_transform_produce_commit() {
    let (engine, producer) = start_transactional();
    assert!(producer.is_transactional());
    assert_eq!(producer.txn_status(), TxnStatus::Ready);

    producer.begin_txn().await.unwrap();
    assert_eq!(producer.txn_status(), TxnStatus::InTransaction);

    let (partition, offset) = producer
        .send_message(ProducerMessage::new("output", "transformed"))
        .await
        .unwrap();
    producer
        .add_message_to_txn(&consumed(41), "workers", Some("batch-1"))
        .await
        .unwrap();

    assert!(engine.committed_records("output").is_empty());
    assert!(engine.committed_offset("workers", "input", 0).is_none());

    producer.commit_txn().await.unwrap();

    let records = engine.committed_records("output");
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].partition, records[0].offset), (partition, offset));
    assert_eq!(utf8(&records[0].value), "transformed");

    let committed = engine.committed_offset("workers", "input", 0).unwrap();
    assert_eq!(committed.offset, 42);
    assert_eq!(committed.metadata.as_deref(), Some("batch-1"));
    assert_eq!(producer.txn_status(), TxnStatus::Ready);

    producer.close().await.unwrap();
}

#[tokio::test]
async fn test_abort_discards_records_and_offsets() {
    let (engine, producer) = start_transactional();

    producer.begin_txn().await.unwrap();
    let mut batch = vec![
        ProducerMessage::new("output", "a"),
        ProducerMessage::new("output", "b"),
    ];
    producer.send_messages(&mut batch).await.unwrap();
    producer
        .add_message_to_txn(&consumed(7), "workers", None)
        .await
        .unwrap();
    producer.abort_txn().await.unwrap();

    assert!(engine.committed_records("output").is_empty());
    assert!(engine.committed_offset("workers", "input", 0).is_none());
    assert_eq!(producer.txn_status(), TxnStatus::Ready);

    producer.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_send_makes_transaction_abortable() {
    let faults = FaultPlan::new().fail_key("poison", EngineError::NotEnoughReplicas);
    let (engine, producer) = start(
        ProducerConfig::for_sync().with_transactional_id("it-tx"),
        faults,
    );

    producer.begin_txn().await.unwrap();
    producer
        .send_message(ProducerMessage::new("output", "ok"))
        .await
        .unwrap();
    let err = producer
        .send_message(ProducerMessage::new("output", "bad").with_key("poison"))
        .await
        .unwrap_err();
    assert_eq!(err.cause, EngineError::NotEnoughReplicas);
    assert_eq!(producer.txn_status(), TxnStatus::AbortableError);

    assert!(matches!(
        producer.commit_txn().await,
        Err(TxnError::Abortable(_))
    ));
    producer.abort_txn().await.unwrap();

    assert!(engine.committed_records("output").is_empty());
    assert_eq!(producer.txn_status(), TxnStatus::Ready);

    producer.begin_txn().await.unwrap();
    producer
        .send_message(ProducerMessage::new("output", "retry"))
        .await
        .unwrap();
    producer.commit_txn().await.unwrap();
    assert_eq!(engine.committed_records("output").len(), 1);

    producer.close().await.unwrap();
}

#[tokio::test]
async fn test_send_outside_transaction_rejected() {
    let (_engine, producer) = start_transactional();

    let err = producer
        .send_message(ProducerMessage::new("output", "stray"))
        .await
        .unwrap_err();

    assert!(matches!(err.cause, EngineError::Transaction(_)));
    producer.close().await.unwrap();
}

#[tokio::test]
async fn test_commit_without_begin_is_invalid() {
    let (_engine, producer) = start_transactional();

    assert_eq!(
        producer.commit_txn().await,
        Err(TxnError::InvalidTransition {
            from: TxnStatus::Ready,
            operation: "commit",
        })
    );
    producer.close().await.unwrap();
}

#[tokio::test]
async fn test_non_transactional_producer_rejects_txn_calls() {
    let (_engine, producer) = start_sync();

    assert!(!producer.is_transactional());
    assert_eq!(producer.begin_txn().await, Err(TxnError::NotTransactional));
    assert_eq!(
        producer.add_message_to_txn(&consumed(0), "g", None).await,
        Err(TxnError::NotTransactional)
    );
    producer.close().await.unwrap();
}

#[tokio::test]
async fn test_close_with_open_transaction_is_fatal() {
    let (engine, producer) = start_transactional();

    producer.begin_txn().await.unwrap();
    producer
        .send_message(ProducerMessage::new("output", "unfinished"))
        .await
        .unwrap();
    producer.close().await.unwrap();

    assert_eq!(producer.txn_status(), TxnStatus::FatalError);
    assert!(engine.committed_records("output").is_empty());
}
