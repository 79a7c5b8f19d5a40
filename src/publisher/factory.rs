use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{ConfirmationMode, ProducerHandle, ProducerPool};
use crate::broker::{BrokerProducer, ConnectionFactory, ProducerBuilder};
use crate::connection::ConnectionManager;
use crate::lazy::SharedSlot;
use crate::{Error, Result};

/// Default number of idle producers kept for wait-for-acknowledgment sends.
pub const DEFAULT_POOL_CAPACITY: usize = 10;
/// Default time a producer gets to flush when it is really closed.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings fixed for the lifetime of a [`PublisherFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryConfig {
    pub confirmation_mode: ConfirmationMode,
    pub pool_capacity: usize,
    pub terminate_timeout: Duration,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            confirmation_mode: ConfirmationMode::None,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
        }
    }
}

impl FactoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(Error::Config("pool capacity must be a positive number".to_string()));
        }
        if self.terminate_timeout.is_zero() {
            return Err(Error::Config("terminate timeout must be a positive duration".to_string()));
        }
        Ok(())
    }
}

type ProducerOf<F, B> = <B as ProducerBuilder<<F as ConnectionFactory>::Connection>>::Producer;

/// Hands out producers matching the configured [`ConfirmationMode`].
///
/// `None` and `AutoAck` share one lazily-created producer. `WaitForAck`
/// checks out a producer per send from a bounded pool, building a new one
/// when the pool is empty.
pub struct PublisherFactory<F, B>
where
    F: ConnectionFactory,
    B: ProducerBuilder<F::Connection>,
{
    connection: ConnectionManager<F>,
    builder: B,
    config: FactoryConfig,
    shared: SharedSlot<ProducerOf<F, B>>,
    pool: Arc<ProducerPool<ProducerOf<F, B>>>,
    shut_down: AtomicBool,
}

impl<F, B> PublisherFactory<F, B>
where
    F: ConnectionFactory,
    B: ProducerBuilder<F::Connection>,
{
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pool capacity or terminate timeout is
    /// not positive.
    pub fn new(config: FactoryConfig, connection_factory: F, builder: B) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ProducerPool::new(config.pool_capacity)?);

        Ok(Self {
            connection: ConnectionManager::new(connection_factory),
            builder,
            config,
            shared: SharedSlot::new(),
            pool,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn confirmation_mode(&self) -> ConfirmationMode {
        self.config.confirmation_mode
    }

    pub fn terminate_timeout(&self) -> Duration {
        self.config.terminate_timeout
    }

    pub fn connection_manager(&self) -> &ConnectionManager<F> {
        &self.connection
    }

    /// Number of producers currently parked in the pool.
    pub fn idle_producers(&self) -> usize {
        self.pool.len()
    }

    pub async fn create_producer(&self) -> Result<ProducerHandle<ProducerOf<F, B>>> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        if self.config.confirmation_mode.uses_shared_producer() {
            return self.shared_producer().await;
        }

        let producer = match self.pool.poll() {
            Some(producer) => {
                debug!("Reusing pooled producer");
                producer
            }
            None => {
                debug!("Producer pool empty, creating producer");
                Arc::new(self.build_producer().await?)
            }
        };

        Ok(ProducerHandle::Pooled {
            producer,
            pool: Arc::clone(&self.pool),
            terminate_timeout: self.config.terminate_timeout,
        })
    }

    /// Returns the long-lived shared producer, creating it on first use.
    ///
    /// This is what `create_producer` hands out in `None` and `AutoAck` mode;
    /// it is also available in `WaitForAck` mode for sends that must not
    /// occupy a pool slot.
    pub async fn shared_producer(&self) -> Result<ProducerHandle<ProducerOf<F, B>>> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        let producer = self
            .shared
            .get_or_try_init(|| async {
                // shut_down may have run while this call waited for the init lock.
                if self.shut_down.load(Ordering::Acquire) {
                    return Err(Error::Shutdown);
                }
                debug!("Creating shared producer for {}", self.config.confirmation_mode);
                self.build_producer().await
            })
            .await?;
        Ok(ProducerHandle::Shared(producer))
    }

    async fn build_producer(&self) -> Result<ProducerOf<F, B>> {
        let connection = self.connection.get().await?;
        self.builder
            .build(&connection, self.config.confirmation_mode)
            .await
    }

    /// Closes the shared producer and every idle pooled producer, then the
    /// connection.
    ///
    /// Close failures are logged and skipped so the remaining producers are
    /// still closed. Calling this more than once is harmless.
    pub async fn shut_down(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Publisher factory already shut down");
            return;
        }

        info!("Shutting down publisher factory");
        let timeout = self.config.terminate_timeout;

        if let Some(shared) = self.shared.take().await {
            if let Err(e) = shared.terminate(timeout).await {
                error!("Exception closing shared producer: {}", e);
            }
        }

        let idle = self.pool.close();
        debug!("Closing {} pooled producers", idle.len());
        for producer in idle {
            if let Err(e) = producer.terminate(timeout).await {
                error!("Exception closing pooled producer: {}", e);
            }
        }

        self.connection.shutdown().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::InMemoryBroker;

    fn create_test_factory(
        broker: &InMemoryBroker,
        mode: ConfirmationMode,
        pool_capacity: usize,
    ) -> PublisherFactory<InMemoryBroker, InMemoryBroker> {
        let config = FactoryConfig {
            confirmation_mode: mode,
            pool_capacity,
            terminate_timeout: Duration::from_secs(1),
        };
        PublisherFactory::new(config, broker.clone(), broker.clone()).unwrap()
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let broker = InMemoryBroker::new();

        let config = FactoryConfig {
            pool_capacity: 0,
            ..FactoryConfig::default()
        };
        assert!(matches!(
            PublisherFactory::new(config, broker.clone(), broker.clone()),
            Err(Error::Config(_))
        ));

        let config = FactoryConfig {
            terminate_timeout: Duration::ZERO,
            ..FactoryConfig::default()
        };
        assert!(PublisherFactory::new(config, broker.clone(), broker.clone()).is_err());
    }

    #[tokio::test]
    async fn test_shared_modes_reuse_one_producer() {
        for mode in [ConfirmationMode::None, ConfirmationMode::AutoAck] {
            let broker = InMemoryBroker::new();
            let factory = create_test_factory(&broker, mode, 2);

            let first = factory.create_producer().await.unwrap();
            let second = factory.create_producer().await.unwrap();

            assert!(first.is_shared() && second.is_shared());
            assert_eq!(first.producer().id(), second.producer().id());
            assert_eq!(broker.producers_built(), 1);
        }
    }

    #[tokio::test]
    async fn test_wait_for_ack_reuses_released_producers() {
        let broker = InMemoryBroker::new();
        let factory = create_test_factory(&broker, ConfirmationMode::WaitForAck, 2);

        let first = factory.create_producer().await.unwrap();
        let second = factory.create_producer().await.unwrap();
        assert!(!first.is_shared());
        assert_ne!(first.producer().id(), second.producer().id());

        first.release().await.unwrap();
        assert_eq!(factory.idle_producers(), 1);

        let third = factory.create_producer().await.unwrap();
        assert_eq!(third.producer().id(), 1);
        assert_eq!(broker.producers_built(), 2);
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces_and_retries() {
        let broker = InMemoryBroker::new();
        broker.fail_next_connects(1);
        let factory = create_test_factory(&broker, ConfirmationMode::None, 1);

        assert!(matches!(
            factory.create_producer().await,
            Err(Error::Connection(_))
        ));
        assert!(factory.create_producer().await.is_ok());
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_final() {
        let broker = InMemoryBroker::new();
        let factory = create_test_factory(&broker, ConfirmationMode::None, 1);
        factory.create_producer().await.unwrap();

        factory.shut_down().await;
        factory.shut_down().await;

        assert_eq!(broker.total_terminations(), 1);
        assert_eq!(broker.connections_closed(), 1);
        assert!(matches!(factory.create_producer().await, Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn test_waiting_creator_sees_shutdown() {
        let broker = InMemoryBroker::new();
        broker.set_connect_delay(Duration::from_millis(100));
        broker.fail_next_connects(1);
        let factory = Arc::new(create_test_factory(&broker, ConfirmationMode::None, 1));

        // The first creator holds the init lock while its connect attempt fails.
        let first = tokio::spawn({
            let factory = Arc::clone(&factory);
            async move { factory.create_producer().await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The second creator passed the shut-down check and waits for the lock.
        let second = tokio::spawn({
            let factory = Arc::clone(&factory);
            async move { factory.create_producer().await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        factory.shut_down().await;

        assert!(matches!(first.await.unwrap(), Err(Error::Connection(_))));
        assert!(matches!(second.await.unwrap(), Err(Error::Shutdown)));
        assert_eq!(broker.connect_attempts(), 1);
        assert_eq!(broker.producers_built(), 0);
        assert_eq!(broker.connections_closed(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_of_unused_factory() {
        let broker = InMemoryBroker::new();
        let factory = create_test_factory(&broker, ConfirmationMode::WaitForAck, 1);

        factory.shut_down().await;

        assert_eq!(broker.connect_attempts(), 0);
        assert_eq!(broker.connections_closed(), 0);
    }
}
