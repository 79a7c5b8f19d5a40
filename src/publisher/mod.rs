//! Producer pooling and the publisher factory.
//!
//! [`PublisherFactory`] hands out [`ProducerHandle`]s according to the
//! factory's [`ConfirmationMode`]: fire-and-forget modes share one long-lived
//! producer, wait-for-acknowledgment sends each check out a producer from a
//! bounded [`ProducerPool`] so a slow acknowledgment never holds up others.

pub mod factory;
pub mod mode;
pub mod pool;

pub use factory::{FactoryConfig, PublisherFactory};
pub use mode::ConfirmationMode;
pub use pool::{ProducerHandle, ProducerPool};
