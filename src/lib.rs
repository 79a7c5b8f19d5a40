//! Bridges event envelopes and broker messages.
//!
//! Outbound, an [`EventDispatcher`] converts each envelope into a broker
//! payload, obtains a producer from a [`PublisherFactory`] and publishes it
//! with the configured [`ConfirmationMode`]. Inbound, the converter turns
//! broker payloads back into envelopes and ignores anything foreign.

pub mod broker;
pub mod config;
pub mod connection;
pub mod converter;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod kafka;
pub mod monitor;
pub mod publisher;
pub mod sequencing;
pub mod serializer;
pub mod unit_of_work;

mod lazy;

pub use config::Config;
pub use converter::{DefaultMessageConverter, MessageConverter};
pub use dispatch::{DispatcherConfig, EventDispatcher};
pub use envelope::EventEnvelope;
pub use error::{Error, Result};
pub use publisher::{ConfirmationMode, FactoryConfig, PublisherFactory};
