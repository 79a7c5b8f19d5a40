#![allow(dead_code)]

use event_bridge::broker::memory::InMemoryBroker;
use event_bridge::config::KafkaConfig;
use event_bridge::monitor::RecordingMonitor;
use event_bridge::{
    ConfirmationMode, DefaultMessageConverter, DispatcherConfig, EventDispatcher, EventEnvelope,
    FactoryConfig, PublisherFactory,
};
use serde_json::json;
use std::env;
use std::sync::Arc;
use std::time::Duration;

pub type MemoryFactory = PublisherFactory<InMemoryBroker, InMemoryBroker>;
pub type MemoryDispatcher = EventDispatcher<InMemoryBroker, InMemoryBroker>;

pub fn create_factory(broker: &InMemoryBroker, mode: ConfirmationMode, pool_capacity: usize) -> Arc<MemoryFactory> {
    let config = FactoryConfig {
        confirmation_mode: mode,
        pool_capacity,
        terminate_timeout: Duration::from_secs(1),
    };
    Arc::new(PublisherFactory::new(config, broker.clone(), broker.clone()).unwrap())
}

pub fn create_dispatcher(
    factory: Arc<MemoryFactory>,
    ack_timeout: Duration,
    monitor: &RecordingMonitor,
) -> MemoryDispatcher {
    let config = DispatcherConfig {
        default_destination: "orders".to_string(),
        ack_timeout,
    };
    EventDispatcher::new(config, factory, DefaultMessageConverter::default(), monitor.clone()).unwrap()
}

/// The `OrderCreated` event with identifier `e1` and metadata `k=v`.
pub fn sample_event() -> EventEnvelope {
    EventEnvelope::new("OrderCreated", json!({"orderId": "o-1", "total": 42}))
        .with_identifier("e1")
        .with_metadata("k", "v")
}

/// Kafka settings for ignored tests, taken from `TEST_KAFKA_BROKERS`.
pub fn get_test_kafka_config() -> KafkaConfig {
    KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        client_id: format!("event-bridge-test-{}", std::process::id()),
        compression: "none".to_string(), // No compression for tests
        linger_ms: 0,                    // Immediate sending for tests
        message_timeout_ms: 10_000,
        connect_timeout_secs: 5,
    }
}

pub fn test_topic(name: &str) -> String {
    format!("test_{}_{}", std::process::id(), name)
}
