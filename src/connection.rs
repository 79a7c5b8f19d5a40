use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::ConnectionFactory;
use crate::lazy::SharedSlot;
use crate::{Error, Result};

/// Owns the single shared connection to the broker.
///
/// The connection is established on the first [`get`](Self::get) and reused
/// by every later caller. Concurrent first calls result in exactly one
/// physical connection attempt. A failed attempt is surfaced to its caller
/// and not remembered, so the next call tries again.
pub struct ConnectionManager<F: ConnectionFactory> {
    factory: F,
    connection: SharedSlot<F::Connection>,
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            connection: SharedSlot::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<F::Connection>> {
        self.connection
            .get_or_try_init(|| async {
                info!("Connecting to broker");
                let connection = self.factory.create_connection().await?;
                info!("Successfully connected to broker");
                Ok::<_, Error>(connection)
            })
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.get().is_some()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Disconnects if a connection was ever established. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        match self.connection.take().await {
            Some(connection) => {
                info!("Closing broker connection");
                if let Err(e) = self.factory.close_connection(&connection).await {
                    warn!("Failed to close broker connection: {}", e);
                }
            }
            None => debug!("No broker connection to close"),
        }
    }
}
