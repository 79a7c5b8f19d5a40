//! Error types and result handling for kafka-event-bridge.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use event_bridge::{Error, Result};
//!
//! fn connect_to_broker() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_broker() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for kafka-event-bridge operations.
///
/// This enum represents all possible errors that can occur while
/// publishing or converting events, from configuration issues to
/// delivery failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, raised at construction time and never at send time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The broker could not be reached when the shared connection was established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding or decoding payloads.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An envelope could not be turned into a broker payload.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A header value or key did not have the expected shape.
    #[error("Invalid header '{key}': {message}")]
    InvalidHeader {
        /// The offending header key
        key: String,
        /// Description of what was invalid
        message: String,
    },

    /// Generic broker-side failure reported by a producer.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Publishing in wait-for-acknowledgment mode did not complete.
    ///
    /// This is the only delivery error the caller of a send observes.
    #[error("Event publication failed: {message}")]
    PublicationFailed {
        /// Description of the failure
        message: String,
        /// The underlying cause, if any
        #[source]
        source: Option<Box<Error>>,
    },

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// I/O error, typically from reading envelopes or configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The publisher factory has been shut down.
    #[error("Shutdown requested")]
    Shutdown,
}

impl Error {
    /// Builds an [`Error::InvalidHeader`] for `key`.
    pub fn invalid_header(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidHeader {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wraps `cause` into an [`Error::PublicationFailed`].
    pub fn publication_failed(message: impl Into<String>, cause: Error) -> Self {
        Error::PublicationFailed {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// A convenient Result type alias for kafka-event-bridge operations.
///
/// This is equivalent to `std::result::Result<T, event_bridge::Error>`.
///
/// # Example
///
/// ```rust
/// use event_bridge::Result;
///
/// fn do_something() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
