use super::*;
use std::io::Write;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert!(!config.producer.return_successes);
    assert!(config.producer.return_errors);
    assert_eq!(config.producer.channel_buffer_size, DEFAULT_CHANNEL_BUFFER_SIZE);
    assert!(config.producer.transactional_id.is_none());
}

#[test]
fn test_default_config_rejected_for_sync() {
    let err = ProducerConfig::default().verify_for_sync().unwrap_err();
    assert!(err.0.contains("return_successes"));
}

#[test]
fn test_for_sync_passes_verification() {
    assert!(Config::for_sync().producer.verify_for_sync().is_ok());
}

#[test]
fn test_errors_disabled_rejected_for_sync() {
    let config = ProducerConfig {
        return_errors: false,
        ..ProducerConfig::for_sync()
    };
    let err = config.verify_for_sync().unwrap_err();
    assert!(err.0.contains("return_errors"));
}

#[test]
fn test_zero_buffer_rejected_for_sync() {
    let config = ProducerConfig::for_sync().with_channel_buffer_size(0);
    assert!(config.verify_for_sync().is_err());
}

#[test]
fn test_transactional_requires_idempotence() {
    let mut config = ProducerConfig::for_sync().with_transactional_id("tx-1");
    assert!(config.idempotent);
    assert!(config.verify_for_sync().is_ok());

    config.idempotent = false;
    assert!(config.verify_for_sync().is_err());
}

#[test]
fn test_from_yaml_str() {
    let config = Config::from_yaml_str(
        r#"
producer:
  return_successes: true
  channel_buffer_size: 16
  transactional_id: orders-tx
  idempotent: true
engine:
  partitions_per_topic: 4
"#,
    )
    .unwrap();

    assert!(config.producer.return_successes);
    assert!(config.producer.return_errors);
    assert_eq!(config.producer.channel_buffer_size, 16);
    assert_eq!(config.producer.transactional_id.as_deref(), Some("orders-tx"));
    assert_eq!(config.engine.partitions_per_topic, 4);
}

#[test]
fn test_from_yaml_str_rejects_garbage() {
    let result = Config::from_yaml_str("producer: [not, a, map]");
    assert!(matches!(result, Err(crate::Error::Yaml(_))));
}

#[test]
#[serial_test::serial]
fn test_load_from_explicit_path() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "producer:\n  return_successes: true\n  max_message_bytes: 512"
    )
    .unwrap();

    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();

    assert!(config.producer.return_successes);
    assert_eq!(config.producer.max_message_bytes, 512);
}

#[test]
#[serial_test::serial]
fn test_load_environment_overrides() {
    std::env::set_var("SYNC_PRODUCER__PRODUCER__RETURN_SUCCESSES", "true");
    std::env::set_var("SYNC_PRODUCER__PRODUCER__CHANNEL_BUFFER_SIZE", "8");

    let result = Config::load(None);

    std::env::remove_var("SYNC_PRODUCER__PRODUCER__RETURN_SUCCESSES");
    std::env::remove_var("SYNC_PRODUCER__PRODUCER__CHANNEL_BUFFER_SIZE");

    let config = result.unwrap();
    assert!(config.producer.return_successes);
    assert_eq!(config.producer.channel_buffer_size, 8);
}

#[test]
#[serial_test::serial]
fn test_load_missing_explicit_file_fails() {
    let result = Config::load(Some("/nonexistent/sync-producer-missing.yaml"));
    assert!(matches!(result, Err(crate::Error::Config(_))));
}
