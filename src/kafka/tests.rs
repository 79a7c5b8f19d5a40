use super::producer::record_for;
use super::*;
use crate::broker::{BrokerPayload, ConnectionFactory};
use crate::config::KafkaConfig;
use crate::converter::{DefaultMessageConverter, MessageConverter};
use crate::envelope::EventEnvelope;
use crate::headers::{Headers, AGGREGATE_ID};
use crate::publisher::ConfirmationMode;
use rdkafka::message::{Header, OwnedHeaders, OwnedMessage, Timestamp};
use serde_json::json;

fn create_test_kafka_config() -> KafkaConfig {
    KafkaConfig {
        brokers: vec!["localhost:9092".to_string()],
        client_id: "event-bridge-test".to_string(),
        compression: "none".to_string(),
        linger_ms: 0,
        message_timeout_ms: 5000,
        connect_timeout_secs: 1,
    }
}

#[test]
fn test_acks_per_confirmation_mode() {
    assert_eq!(acks_for(ConfirmationMode::None), "0");
    assert_eq!(acks_for(ConfirmationMode::AutoAck), "1");
    assert_eq!(acks_for(ConfirmationMode::WaitForAck), "all");
}

#[test]
fn test_client_config_carries_settings() {
    let factory = KafkaConnectionFactory::new(create_test_kafka_config());
    let client_config = factory.client_config();

    assert_eq!(client_config.get("bootstrap.servers"), Some("localhost:9092"));
    assert_eq!(client_config.get("client.id"), Some("event-bridge-test"));
    assert_eq!(client_config.get("linger.ms"), Some("0"));
    assert_eq!(client_config.get("acks"), None);
}

#[test]
fn test_record_key_is_aggregate_id() {
    let mut headers = Headers::new();
    headers.insert(AGGREGATE_ID.to_string(), "order-7".to_string());
    headers.insert("identifier".to_string(), "e1".to_string());
    let payload = BrokerPayload::new(&b"{}"[..], headers);

    let record = record_for(&payload, "orders");

    assert_eq!(record.topic, "orders");
    assert_eq!(record.key, Some("order-7"));
    assert_eq!(record.payload, Some(&b"{}"[..]));
}

#[test]
fn test_record_without_aggregate_has_no_key() {
    let payload = BrokerPayload::new(&b"{}"[..], Headers::new());

    let record = record_for(&payload, "orders");

    assert!(record.key.is_none());
}

#[test]
fn test_inbound_message_round_trip() {
    let converter = DefaultMessageConverter::default();
    let event = EventEnvelope::new("OrderCreated", json!({"orderId": "o-1"}))
        .with_identifier("e1")
        .with_aggregate("Order", "o-1", 3)
        .with_metadata("k", "v");
    let payload = converter.to_broker_payload(&event).unwrap();

    let kafka_headers = payload
        .headers
        .iter()
        .fold(OwnedHeaders::new(), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
        .insert(Header {
            key: "binary",
            value: Some(&[0xffu8, 0xfe][..]),
        });

    let message = OwnedMessage::new(
        Some(payload.body.to_vec()),
        Some(b"o-1".to_vec()),
        "orders".to_string(),
        Timestamp::NotAvailable,
        0,
        42,
        Some(kafka_headers),
    );

    let inbound = broker_payload_from_message(&message);

    assert_eq!(inbound, payload);
    assert_eq!(converter.from_broker_payload(&inbound), Some(event));
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_connection_to_local_cluster() {
    let factory = KafkaConnectionFactory::new(create_test_kafka_config());

    let connection = factory.create_connection().await.unwrap();

    assert_eq!(connection.brokers(), "localhost:9092");
    factory.close_connection(&connection).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_cluster_is_connection_error() {
    let mut config = create_test_kafka_config();
    config.brokers = vec!["127.0.0.1:1".to_string()];
    let factory = KafkaConnectionFactory::new(config);

    let result = factory.create_connection().await;

    assert!(matches!(result, Err(crate::Error::Connection(_))));
}
