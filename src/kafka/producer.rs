use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::KafkaConnection;
use crate::broker::{BrokerPayload, BrokerProducer, ProducerBuilder, ProducerState};
use crate::headers::AGGREGATE_ID;
use crate::publisher::ConfirmationMode;
use crate::{Error, Result};

const STATE_RUNNING: u8 = 1;
const STATE_TERMINATING: u8 = 2;
const STATE_TERMINATED: u8 = 3;

/// Kafka `acks` setting for a confirmation mode.
pub fn acks_for(mode: ConfirmationMode) -> &'static str {
    match mode {
        ConfirmationMode::None => "0",
        ConfirmationMode::AutoAck => "1",
        ConfirmationMode::WaitForAck => "all",
    }
}

/// Builds the Kafka record for `payload`.
///
/// Headers are copied as UTF-8 values and the aggregate identifier, when
/// present, becomes the record key so one aggregate stays on one partition.
pub(crate) fn record_for<'a>(payload: &'a BrokerPayload, destination: &'a str) -> FutureRecord<'a, str, [u8]> {
    let headers = payload
        .headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(payload.headers.len()), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        });

    let record = FutureRecord::to(destination)
        .payload(payload.body.as_ref())
        .headers(headers);

    match payload.header(AGGREGATE_ID) {
        Some(key) => record.key(key),
        None => record,
    }
}

#[derive(Default)]
pub struct KafkaProducerBuilder;

impl KafkaProducerBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProducerBuilder<KafkaConnection> for KafkaProducerBuilder {
    type Producer = KafkaProducer;

    async fn build(&self, connection: &KafkaConnection, mode: ConfirmationMode) -> Result<KafkaProducer> {
        let mut client_config = connection.client_config().clone();
        client_config.set("acks", acks_for(mode));

        let producer: FutureProducer = client_config.create()?;
        debug!("Created Kafka producer with acks={}", acks_for(mode));

        Ok(KafkaProducer {
            producer,
            mode,
            state: AtomicU8::new(STATE_RUNNING),
        })
    }
}

pub struct KafkaProducer {
    producer: FutureProducer,
    mode: ConfirmationMode,
    state: AtomicU8,
}

impl KafkaProducer {
    pub fn confirmation_mode(&self) -> ConfirmationMode {
        self.mode
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            ProducerState::Running => Ok(()),
            state => Err(Error::Broker(format!("Kafka producer is {:?}", state))),
        }
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn publish(&self, payload: &BrokerPayload, destination: &str) -> Result<()> {
        self.ensure_running()?;

        let delivery = self
            .producer
            .send_result(record_for(payload, destination))
            .map_err(|(e, _)| Error::Kafka(e))?;

        if self.mode.is_auto_ack() {
            let topic = destination.to_string();
            tokio::spawn(async move {
                match delivery.await {
                    Ok(Ok(_)) => {}
                    Ok(Err((e, _))) => warn!("Delivery to '{}' failed: {}", topic, e),
                    Err(_) => warn!("Delivery report for '{}' was dropped", topic),
                }
            });
        }
        Ok(())
    }

    async fn publish_await_ack(&self, payload: &BrokerPayload, destination: &str) -> Result<()> {
        self.ensure_running()?;

        self.producer
            .send(record_for(payload, destination), Timeout::Never)
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        Ok(())
    }

    async fn terminate(&self, timeout: Duration) -> Result<()> {
        self.state.store(STATE_TERMINATING, Ordering::SeqCst);

        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| Error::Broker(format!("flush did not complete: {}", e)));

        self.state.store(STATE_TERMINATED, Ordering::SeqCst);
        flushed?.map_err(Error::Kafka)
    }

    fn state(&self) -> ProducerState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => ProducerState::Running,
            STATE_TERMINATING => ProducerState::Terminating,
            STATE_TERMINATED => ProducerState::Terminated,
            _ => ProducerState::Created,
        }
    }
}
