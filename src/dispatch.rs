//! The send path: envelope in, broker payload out.

use futures::FutureExt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::broker::{BrokerPayload, BrokerProducer, ConnectionFactory, ProducerBuilder};
use crate::converter::MessageConverter;
use crate::envelope::EventEnvelope;
use crate::monitor::MessageMonitor;
use crate::publisher::{ConfirmationMode, ProducerHandle, PublisherFactory};
use crate::unit_of_work::{LifecycleHook, UnitOfWork};
use crate::{Error, Result};

/// Default destination used when a payload carries no override.
pub const DEFAULT_DESTINATION: &str = "events";
/// Default bound on a wait-for-acknowledgment send.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub default_destination: String,
    /// Bound on the acknowledgment wait. Zero waits without a deadline.
    pub ack_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_destination: DEFAULT_DESTINATION.to_string(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_destination.trim().is_empty() {
            return Err(Error::Config("default destination must not be empty".to_string()));
        }
        Ok(())
    }
}

type SharedHandle<P> = Arc<Mutex<Option<ProducerHandle<P>>>>;

/// Publishes event envelopes through a [`PublisherFactory`].
pub struct EventDispatcher<F, B>
where
    F: ConnectionFactory,
    B: ProducerBuilder<F::Connection>,
{
    config: DispatcherConfig,
    factory: Arc<PublisherFactory<F, B>>,
    converter: Arc<dyn MessageConverter>,
    monitor: Arc<dyn MessageMonitor>,
}

impl<F, B> EventDispatcher<F, B>
where
    F: ConnectionFactory,
    B: ProducerBuilder<F::Connection>,
{
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the default destination is empty.
    pub fn new(
        config: DispatcherConfig,
        factory: Arc<PublisherFactory<F, B>>,
        converter: impl MessageConverter + 'static,
        monitor: impl MessageMonitor + 'static,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            factory,
            converter: Arc::new(converter),
            monitor: Arc::new(monitor),
        })
    }

    pub fn factory(&self) -> &Arc<PublisherFactory<F, B>> {
        &self.factory
    }

    pub fn converter(&self) -> &dyn MessageConverter {
        self.converter.as_ref()
    }

    /// Publishes `envelope` as part of `unit_of_work`.
    ///
    /// The producer used for the send is released when the unit of work
    /// commits or rolls back, whichever comes first.
    ///
    /// # Errors
    ///
    /// Conversion and producer acquisition errors are returned as is. In
    /// wait-for-acknowledgment mode a timeout or a broker rejection is
    /// returned as [`Error::PublicationFailed`]. Once the factory is shut
    /// down the send is reported as ignored and [`Error::Shutdown`] returned.
    #[instrument(skip_all, fields(event_id = %envelope.identifier, payload_type = %envelope.payload_type))]
    pub async fn send(&self, envelope: &EventEnvelope, unit_of_work: &dyn UnitOfWork) -> Result<()> {
        let callback = self.monitor.on_ingested(envelope);

        match self.try_send(envelope, unit_of_work).await {
            Ok(()) => {
                callback.report_success();
                Ok(())
            }
            Err(Error::Shutdown) => {
                debug!("Publisher shut down, event not published");
                callback.report_ignored();
                Err(Error::Shutdown)
            }
            Err(e) => {
                callback.report_failure(&e);
                Err(e)
            }
        }
    }

    async fn try_send(&self, envelope: &EventEnvelope, unit_of_work: &dyn UnitOfWork) -> Result<()> {
        let payload = self.converter.to_broker_payload(envelope)?;
        let handle = self.factory.create_producer().await?;
        let destination = self.resolve_destination(&payload);
        debug!("Publishing to '{}'", destination);

        let outcome = self.publish(handle.producer(), &payload, destination).await;
        release_on_completion(unit_of_work, handle);
        outcome
    }

    async fn publish<P: BrokerProducer>(
        &self,
        producer: &P,
        payload: &BrokerPayload,
        destination: &str,
    ) -> Result<()> {
        match self.factory.confirmation_mode() {
            ConfirmationMode::None | ConfirmationMode::AutoAck => {
                producer.publish(payload, destination).await
            }
            ConfirmationMode::WaitForAck => {
                let ack = producer.publish_await_ack(payload, destination);
                let outcome = if self.config.ack_timeout.is_zero() {
                    ack.await
                } else {
                    match tokio::time::timeout(self.config.ack_timeout, ack).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Error::Timeout {
                            message: format!(
                                "no acknowledgment within {}ms",
                                self.config.ack_timeout.as_millis()
                            ),
                        }),
                    }
                };

                outcome.map_err(|e| {
                    Error::publication_failed(
                        format!("event was not acknowledged by '{}'", destination),
                        e,
                    )
                })
            }
        }
    }

    /// The per-message override if present, else the configured default.
    pub fn resolve_destination<'a>(&'a self, payload: &'a BrokerPayload) -> &'a str {
        payload
            .destination_override()
            .unwrap_or(&self.config.default_destination)
    }

    pub async fn shut_down(&self) {
        self.factory.shut_down().await;
    }
}

fn release_on_completion<P: BrokerProducer>(unit_of_work: &dyn UnitOfWork, handle: ProducerHandle<P>) {
    let slot: SharedHandle<P> = Arc::new(Mutex::new(Some(handle)));
    unit_of_work.on_prepare_commit(release_hook(&slot));
    unit_of_work.on_rollback(release_hook(&slot));
}

fn release_hook<P: BrokerProducer>(slot: &SharedHandle<P>) -> LifecycleHook {
    let slot = Arc::clone(slot);
    Box::new(move || {
        async move {
            let handle = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle {
                if let Err(e) = handle.release().await {
                    warn!("Failed to release producer: {}", e);
                }
            }
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::{AckBehavior, InMemoryBroker};
    use crate::converter::DefaultMessageConverter;
    use crate::envelope::METADATA_DESTINATION;
    use crate::monitor::RecordingMonitor;
    use crate::publisher::FactoryConfig;
    use crate::unit_of_work::DefaultUnitOfWork;
    use serde_json::json;
    use std::time::Instant;

    fn create_test_dispatcher(
        broker: &InMemoryBroker,
        mode: ConfirmationMode,
        ack_timeout: Duration,
        monitor: &RecordingMonitor,
    ) -> EventDispatcher<InMemoryBroker, InMemoryBroker> {
        let factory_config = FactoryConfig {
            confirmation_mode: mode,
            pool_capacity: 2,
            terminate_timeout: Duration::from_secs(1),
        };
        let factory =
            Arc::new(PublisherFactory::new(factory_config, broker.clone(), broker.clone()).unwrap());
        let config = DispatcherConfig {
            default_destination: "orders".to_string(),
            ack_timeout,
        };
        EventDispatcher::new(config, factory, DefaultMessageConverter::default(), monitor.clone())
            .unwrap()
    }

    fn create_test_event() -> EventEnvelope {
        EventEnvelope::new("OrderCreated", json!({"orderId": "o-1"}))
            .with_identifier("e1")
            .with_metadata("k", "v")
    }

    #[test]
    fn test_empty_destination_is_rejected() {
        let broker = InMemoryBroker::new();
        let factory = Arc::new(
            PublisherFactory::new(FactoryConfig::default(), broker.clone(), broker.clone()).unwrap(),
        );
        let config = DispatcherConfig {
            default_destination: "  ".to_string(),
            ..DispatcherConfig::default()
        };

        let result = EventDispatcher::new(
            config,
            factory,
            DefaultMessageConverter::default(),
            RecordingMonitor::new(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_none_mode_publishes_once() {
        let broker = InMemoryBroker::new();
        let monitor = RecordingMonitor::new();
        let dispatcher =
            create_test_dispatcher(&broker, ConfirmationMode::None, DEFAULT_ACK_TIMEOUT, &monitor);
        let uow = DefaultUnitOfWork::new();

        dispatcher.send(&create_test_event(), &uow).await.unwrap();
        uow.commit().await;

        let published = broker.published_to("orders");
        assert_eq!(published.len(), 1);
        assert!(!published[0].awaited_ack);
        assert_eq!(published[0].payload.header("identifier"), Some("e1"));
        assert_eq!(monitor.successes(), 1);
        assert_eq!(broker.total_terminations(), 0);
    }

    #[tokio::test]
    async fn test_destination_override_applies_to_one_send() {
        let broker = InMemoryBroker::new();
        let monitor = RecordingMonitor::new();
        let dispatcher =
            create_test_dispatcher(&broker, ConfirmationMode::AutoAck, DEFAULT_ACK_TIMEOUT, &monitor);
        let uow = DefaultUnitOfWork::new();

        let routed = create_test_event().with_metadata(METADATA_DESTINATION, "audit");
        dispatcher.send(&routed, &uow).await.unwrap();
        dispatcher.send(&create_test_event(), &uow).await.unwrap();

        assert_eq!(broker.published_to("audit").len(), 1);
        assert_eq!(broker.published_to("orders").len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_ack_times_out() {
        let broker = InMemoryBroker::new();
        broker.set_ack_behavior(AckBehavior::Never);
        let monitor = RecordingMonitor::new();
        let dispatcher = create_test_dispatcher(
            &broker,
            ConfirmationMode::WaitForAck,
            Duration::from_millis(100),
            &monitor,
        );
        let uow = DefaultUnitOfWork::new();

        let started = Instant::now();
        let result = dispatcher.send(&create_test_event(), &uow).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        match result {
            Err(Error::PublicationFailed { source: Some(source), .. }) => {
                assert!(matches!(*source, Error::Timeout { .. }));
            }
            other => panic!("expected publication failure, got {:?}", other),
        }
        assert_eq!(monitor.failures(), 1);
        assert_eq!(monitor.successes(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_ack_rejection_is_publication_failure() {
        let broker = InMemoryBroker::new();
        broker.set_ack_behavior(AckBehavior::Reject("not leader".to_string()));
        let monitor = RecordingMonitor::new();
        let dispatcher =
            create_test_dispatcher(&broker, ConfirmationMode::WaitForAck, Duration::ZERO, &monitor);
        let uow = DefaultUnitOfWork::new();

        let result = dispatcher.send(&create_test_event(), &uow).await;

        assert!(matches!(result, Err(Error::PublicationFailed { .. })));
        assert_eq!(monitor.failures(), 1);

        uow.rollback().await;
        assert_eq!(dispatcher.factory().idle_producers(), 1);
    }

    #[tokio::test]
    async fn test_pooled_producer_released_once() {
        let broker = InMemoryBroker::new();
        let monitor = RecordingMonitor::new();
        let dispatcher =
            create_test_dispatcher(&broker, ConfirmationMode::WaitForAck, DEFAULT_ACK_TIMEOUT, &monitor);
        let uow = DefaultUnitOfWork::new();

        dispatcher.send(&create_test_event(), &uow).await.unwrap();
        assert_eq!(dispatcher.factory().idle_producers(), 0);

        uow.commit().await;
        uow.rollback().await;

        assert_eq!(dispatcher.factory().idle_producers(), 1);
        assert_eq!(broker.total_terminations(), 0);
        assert_eq!(monitor.successes(), 1);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_ignored() {
        let broker = InMemoryBroker::new();
        let monitor = RecordingMonitor::new();
        let dispatcher =
            create_test_dispatcher(&broker, ConfirmationMode::None, DEFAULT_ACK_TIMEOUT, &monitor);
        let uow = DefaultUnitOfWork::new();

        dispatcher.shut_down().await;
        let result = dispatcher.send(&create_test_event(), &uow).await;

        assert!(matches!(result, Err(Error::Shutdown)));
        assert_eq!(monitor.ignored(), 1);
        assert_eq!(monitor.failures(), 0);
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_acquisition_failure_is_reported() {
        let broker = InMemoryBroker::new();
        broker.fail_next_connects(1);
        let monitor = RecordingMonitor::new();
        let dispatcher =
            create_test_dispatcher(&broker, ConfirmationMode::None, DEFAULT_ACK_TIMEOUT, &monitor);
        let uow = DefaultUnitOfWork::new();

        let result = dispatcher.send(&create_test_event(), &uow).await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(monitor.ingested(), 1);
        assert_eq!(monitor.failures(), 1);
        assert!(broker.published().is_empty());
    }
}
