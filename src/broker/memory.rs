//! In-memory broker for testing and single-process scenarios.
//!
//! [`InMemoryBroker`] implements both [`ConnectionFactory`] and
//! [`ProducerBuilder`], records everything that is published, and exposes
//! knobs to simulate an unreachable broker, producers that never
//! acknowledge, and producers whose close fails.
//!
//! ## Example
//!
//! ```
//! use event_bridge::broker::memory::InMemoryBroker;
//!
//! let broker = InMemoryBroker::new();
//! broker.fail_next_connects(1);
//! assert_eq!(broker.connect_attempts(), 0);
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

use super::{BrokerPayload, BrokerProducer, ConnectionFactory, ProducerBuilder, ProducerState};
use crate::publisher::ConfirmationMode;
use crate::{Error, Result};

/// How in-memory producers answer `publish_await_ack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckBehavior {
    Immediate,
    After(Duration),
    Never,
    Reject(String),
}

/// A payload as it reached the in-memory broker.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub destination: String,
    pub payload: BrokerPayload,
    pub producer_id: usize,
    pub awaited_ack: bool,
}

/// Handle for a connection to the in-memory broker.
#[derive(Debug)]
pub struct InMemoryConnection {
    pub id: usize,
}

#[derive(Debug)]
struct BrokerState {
    connect_attempts: AtomicUsize,
    connections_closed: AtomicUsize,
    failing_connects: AtomicUsize,
    connect_delay: RwLock<Duration>,
    producers_built: AtomicUsize,
    ack_behavior: RwLock<AckBehavior>,
    failing_terminates: Mutex<HashSet<usize>>,
    terminations: Mutex<HashMap<usize, usize>>,
    published: RwLock<Vec<PublishedMessage>>,
}

/// In-memory broker for tests and single-process scenarios.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                connect_attempts: AtomicUsize::new(0),
                connections_closed: AtomicUsize::new(0),
                failing_connects: AtomicUsize::new(0),
                connect_delay: RwLock::new(Duration::ZERO),
                producers_built: AtomicUsize::new(0),
                ack_behavior: RwLock::new(AckBehavior::Immediate),
                failing_terminates: Mutex::new(HashSet::new()),
                terminations: Mutex::new(HashMap::new()),
                published: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Delays every connection attempt, widening first-call races.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn set_ack_behavior(&self, behavior: AckBehavior) {
        *self.state.ack_behavior.write().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Makes `terminate` fail for the producer with the given id.
    pub fn fail_terminate_of(&self, producer_id: usize) {
        self.state
            .failing_terminates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(producer_id);
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.state.connections_closed.load(Ordering::SeqCst)
    }

    pub fn producers_built(&self) -> usize {
        self.state.producers_built.load(Ordering::SeqCst)
    }

    /// Number of `terminate` calls the producer with `producer_id` received.
    pub fn terminations_of(&self, producer_id: usize) -> usize {
        self.state
            .terminations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&producer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of `terminate` calls across all producers.
    pub fn total_terminations(&self) -> usize {
        self.state
            .terminations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn published_to(&self, destination: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|message| message.destination == destination)
            .collect()
    }

    fn ack_behavior(&self) -> AckBehavior {
        self.state
            .ack_behavior
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryBroker {
    type Connection = InMemoryConnection;

    async fn create_connection(&self) -> Result<InMemoryConnection> {
        let attempt = self.state.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.state.connect_delay.read().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .state
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::Connection(format!(
                "in-memory broker refused connection attempt {}",
                attempt
            )));
        }

        debug!("In-memory connection {} established", attempt);
        Ok(InMemoryConnection { id: attempt })
    }

    async fn close_connection(&self, connection: &InMemoryConnection) -> Result<()> {
        debug!("Closing in-memory connection {}", connection.id);
        self.state.connections_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProducerBuilder<InMemoryConnection> for InMemoryBroker {
    type Producer = InMemoryProducer;

    async fn build(
        &self,
        _connection: &InMemoryConnection,
        mode: ConfirmationMode,
    ) -> Result<InMemoryProducer> {
        let id = self.state.producers_built.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Built in-memory producer {} for {:?}", id, mode);

        Ok(InMemoryProducer {
            id,
            broker: self.clone(),
            state: AtomicU8::new(encode_state(ProducerState::Running)),
        })
    }
}

/// Producer handed out by [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryProducer {
    id: usize,
    broker: InMemoryBroker,
    state: AtomicU8,
}

impl InMemoryProducer {
    pub fn id(&self) -> usize {
        self.id
    }

    fn record(&self, payload: &BrokerPayload, destination: &str, awaited_ack: bool) -> Result<()> {
        if self.state() != ProducerState::Running {
            return Err(Error::Broker(format!("producer {} is not running", self.id)));
        }

        self.broker
            .state
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedMessage {
                destination: destination.to_string(),
                payload: payload.clone(),
                producer_id: self.id,
                awaited_ack,
            });
        Ok(())
    }
}

#[async_trait]
impl BrokerProducer for InMemoryProducer {
    async fn publish(&self, payload: &BrokerPayload, destination: &str) -> Result<()> {
        self.record(payload, destination, false)
    }

    async fn publish_await_ack(&self, payload: &BrokerPayload, destination: &str) -> Result<()> {
        self.record(payload, destination, true)?;

        match self.broker.ack_behavior() {
            AckBehavior::Immediate => Ok(()),
            AckBehavior::After(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            AckBehavior::Never => futures::future::pending().await,
            AckBehavior::Reject(reason) => Err(Error::Broker(reason)),
        }
    }

    async fn terminate(&self, _timeout: Duration) -> Result<()> {
        *self
            .broker
            .state
            .terminations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.id)
            .or_insert(0) += 1;

        self.state
            .store(encode_state(ProducerState::Terminating), Ordering::SeqCst);

        let fails = self
            .broker
            .state
            .failing_terminates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&self.id);

        self.state
            .store(encode_state(ProducerState::Terminated), Ordering::SeqCst);

        if fails {
            Err(Error::Broker(format!("producer {} failed to close", self.id)))
        } else {
            Ok(())
        }
    }

    fn state(&self) -> ProducerState {
        decode_state(self.state.load(Ordering::SeqCst))
    }
}

fn encode_state(state: ProducerState) -> u8 {
    match state {
        ProducerState::Created => 0,
        ProducerState::Running => 1,
        ProducerState::Terminating => 2,
        ProducerState::Terminated => 3,
    }
}

fn decode_state(raw: u8) -> ProducerState {
    match raw {
        0 => ProducerState::Created,
        1 => ProducerState::Running,
        2 => ProducerState::Terminating,
        _ => ProducerState::Terminated,
    }
}
