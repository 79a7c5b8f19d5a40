use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::broker::{BrokerProducer, ProducerState};
use crate::{Error, Result};

/// Bounded, lock-free collection of idle producers.
///
/// Offers and polls never block. Once closed, every offer is refused so
/// producers returned after shutdown get closed instead of parked.
#[derive(Debug)]
pub struct ProducerPool<P> {
    idle: ArrayQueue<Arc<P>>,
    closed: AtomicBool,
}

impl<P> ProducerPool<P> {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("producer pool capacity must be positive".to_string()));
        }

        Ok(Self {
            idle: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
        })
    }

    /// Parks `producer`, or hands it back if the pool is full or closed.
    pub fn offer(&self, producer: Arc<P>) -> std::result::Result<(), Arc<P>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(producer);
        }
        self.idle.push(producer)
    }

    pub fn poll(&self) -> Option<Arc<P>> {
        self.idle.pop()
    }

    pub fn len(&self) -> usize {
        self.idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuses further offers and removes every idle producer.
    pub fn close(&self) -> Vec<Arc<P>> {
        self.closed.store(true, Ordering::Release);
        std::iter::from_fn(|| self.idle.pop()).collect()
    }
}

/// A producer checked out of a [`PublisherFactory`](super::PublisherFactory).
///
/// Releasing a shared handle does nothing: the producer lives until the
/// factory shuts down. Releasing a pooled handle parks the producer in its
/// pool, or really closes it when the pool is full.
#[derive(Debug)]
pub enum ProducerHandle<P: BrokerProducer> {
    Shared(Arc<P>),
    Pooled {
        producer: Arc<P>,
        pool: Arc<ProducerPool<P>>,
        terminate_timeout: Duration,
    },
}

impl<P: BrokerProducer> ProducerHandle<P> {
    pub fn producer(&self) -> &P {
        match self {
            ProducerHandle::Shared(producer) => producer,
            ProducerHandle::Pooled { producer, .. } => producer,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ProducerHandle::Shared(_))
    }

    pub async fn release(self) -> Result<()> {
        match self {
            ProducerHandle::Shared(_) => Ok(()),
            ProducerHandle::Pooled {
                producer,
                pool,
                terminate_timeout,
            } => {
                if producer.state() != ProducerState::Running {
                    debug!("Dropping producer in state {:?} instead of pooling it", producer.state());
                    return Ok(());
                }

                match pool.offer(producer) {
                    Ok(()) => {
                        debug!("Returned producer to pool ({} idle)", pool.len());
                        Ok(())
                    }
                    Err(producer) => {
                        debug!("Producer pool full or closed, closing producer");
                        producer.terminate(terminate_timeout).await
                    }
                }
            }
        }
    }
}
