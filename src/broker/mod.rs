//! Broker abstraction.
//!
//! The publishing core never talks to a broker SDK directly. It goes through
//! a [`ConnectionFactory`] that establishes the shared connection and a
//! [`ProducerBuilder`] that builds producers on top of it. The crate ships a
//! Kafka binding in [`crate::kafka`] and an [`memory::InMemoryBroker`] for
//! tests and single-process use.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::headers::{self, Headers};
use crate::publisher::ConfirmationMode;
use crate::Result;

/// The wire-level unit sent to and received from the broker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerPayload {
    pub body: Bytes,
    pub headers: Headers,
}

impl BrokerPayload {
    pub fn new(body: impl Into<Bytes>, headers: Headers) -> Self {
        Self {
            body: body.into(),
            headers,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        headers::value_as_string(&self.headers, key)
    }

    /// Per-message destination that replaces the configured default for one send.
    pub fn destination_override(&self) -> Option<&str> {
        self.header(headers::DESTINATION_OVERRIDE)
            .filter(|destination| !destination.is_empty())
    }
}

/// Lifecycle of a broker producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Created,
    Running,
    Terminating,
    Terminated,
}

/// Establishes and tears down the physical broker connection.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    async fn create_connection(&self) -> Result<Self::Connection>;

    async fn close_connection(&self, connection: &Self::Connection) -> Result<()>;
}

/// Builds producers on an established connection.
#[async_trait]
pub trait ProducerBuilder<C>: Send + Sync + 'static
where
    C: Send + Sync + 'static,
{
    type Producer: BrokerProducer;

    async fn build(&self, connection: &C, mode: ConfirmationMode) -> Result<Self::Producer>;
}

/// A broker-native publishing handle.
///
/// Implementations must accept concurrent sends; pooling bounds the number of
/// producers, it does not serialize access to one.
#[async_trait]
pub trait BrokerProducer: Send + Sync + 'static {
    /// Hands the payload to the broker without waiting for an acknowledgment.
    async fn publish(&self, payload: &BrokerPayload, destination: &str) -> Result<()>;

    /// Publishes and resolves once the broker acknowledged the payload.
    ///
    /// Callers bound the wait with their own deadline.
    async fn publish_await_ack(&self, payload: &BrokerPayload, destination: &str) -> Result<()>;

    /// Really closes the producer, flushing for at most `timeout`.
    async fn terminate(&self, timeout: Duration) -> Result<()>;

    fn state(&self) -> ProducerState;
}
