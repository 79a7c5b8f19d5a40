use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dispatch::DispatcherConfig;
use crate::publisher::{ConfirmationMode, FactoryConfig};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
    #[serde(default = "default_destination")]
    pub default_destination: String,
    #[serde(default)]
    pub confirmation_mode: ConfirmationMode,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            default_destination: default_destination(),
            confirmation_mode: ConfirmationMode::default(),
            ack_timeout_ms: default_ack_timeout_ms(),
            pool_capacity: default_pool_capacity(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl KafkaConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Loads the file at `path`, overlaid by `EVENT_BRIDGE_*` environment
    /// variables (`EVENT_BRIDGE_PUBLISHER__POOL_CAPACITY=4`), and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("EVENT_BRIDGE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.iter().all(|broker| broker.trim().is_empty()) {
            return Err(Error::Config("kafka.brokers must list at least one broker".to_string()));
        }
        if self.kafka.client_id.trim().is_empty() {
            return Err(Error::Config("kafka.client_id must not be empty".to_string()));
        }
        if self.publisher.default_destination.trim().is_empty() {
            return Err(Error::Config(
                "publisher.default_destination must not be empty".to_string(),
            ));
        }
        if self.publisher.pool_capacity == 0 {
            return Err(Error::Config("publisher.pool_capacity must be positive".to_string()));
        }
        if self.publisher.shutdown_timeout_ms == 0 {
            return Err(Error::Config(
                "publisher.shutdown_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn factory_config(&self) -> FactoryConfig {
        FactoryConfig {
            confirmation_mode: self.publisher.confirmation_mode,
            pool_capacity: self.publisher.pool_capacity,
            terminate_timeout: Duration::from_millis(self.publisher.shutdown_timeout_ms),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            default_destination: self.publisher.default_destination.clone(),
            ack_timeout: Duration::from_millis(self.publisher.ack_timeout_ms),
        }
    }
}

fn default_client_id() -> String {
    "event-bridge".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_linger_ms() -> u32 {
    5
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_destination() -> String {
    "events".to_string()
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

fn default_pool_capacity() -> usize {
    10
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}
