//! Kafka binding of the broker traits, built on `rdkafka`.
//!
//! Kafka has no connection object separate from its clients, so
//! [`KafkaConnection`] is the validated client configuration plus a proof
//! that the cluster answered a metadata request. Producers built on it
//! differ only in their `acks` setting.

pub mod connection;
pub mod inbound;
pub mod producer;

#[cfg(test)]
mod tests;

pub use connection::{KafkaConnection, KafkaConnectionFactory};
pub use inbound::broker_payload_from_message;
pub use producer::{acks_for, KafkaProducer, KafkaProducerBuilder};
