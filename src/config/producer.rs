//! Producer configuration.

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Default depth of the engine's intake and outcome queues.
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 256;
/// Default upper bound on key + value + header bytes per message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_000_000;

/// Producer configuration shared by the sync producer and its engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Emit acknowledged messages on the success stream.
    pub return_successes: bool,
    /// Emit failed messages on the error stream.
    pub return_errors: bool,
    /// Depth of the intake and outcome queues.
    pub channel_buffer_size: usize,
    /// Transactional id; enables transactions when set.
    pub transactional_id: Option<String>,
    /// Request idempotent delivery from the broker.
    pub idempotent: bool,
    /// Upper bound on message size.
    pub max_message_bytes: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            return_successes: false,
            return_errors: true,
            channel_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
            transactional_id: None,
            idempotent: false,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl ProducerConfig {
    /// Defaults with the success stream enabled, as a sync producer needs.
    pub fn for_sync() -> Self {
        Self {
            return_successes: true,
            ..Self::default()
        }
    }

    /// Enable transactions under `id`. Transactions imply idempotence.
    pub fn with_transactional_id(mut self, id: impl Into<String>) -> Self {
        self.transactional_id = Some(id.into());
        self.idempotent = true;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Check the preconditions a sync producer depends on.
    ///
    /// Every submitted message must eventually surface on exactly one of the
    /// two outcome streams, otherwise its caller would wait forever.
    pub fn verify_for_sync(&self) -> Result<(), ConfigurationError> {
        if !self.return_errors {
            return Err(ConfigurationError::new(
                "producer.return_errors must be true to be used in a sync producer",
            ));
        }
        if !self.return_successes {
            return Err(ConfigurationError::new(
                "producer.return_successes must be true to be used in a sync producer",
            ));
        }
        if self.channel_buffer_size == 0 {
            return Err(ConfigurationError::new(
                "producer.channel_buffer_size must be greater than zero",
            ));
        }
        if self.transactional_id.is_some() && !self.idempotent {
            return Err(ConfigurationError::new(
                "producer.idempotent must be true when producer.transactional_id is set",
            ));
        }
        Ok(())
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional_id.is_some()
    }
}
