use async_trait::async_trait;
use rdkafka::producer::{BaseProducer, Producer};
use rdkafka::ClientConfig;
use tracing::{debug, info, instrument};

use crate::broker::ConnectionFactory;
use crate::config::KafkaConfig;
use crate::{Error, Result};

/// An established Kafka "connection": client settings known to reach the cluster.
#[derive(Debug, Clone)]
pub struct KafkaConnection {
    client_config: ClientConfig,
    brokers: String,
}

impl KafkaConnection {
    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

pub struct KafkaConnectionFactory {
    config: KafkaConfig,
}

impl KafkaConnectionFactory {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    /// Client settings shared by every producer, without `acks`.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.config.brokers.join(","))
            .set("client.id", &self.config.client_id)
            .set("compression.type", &self.config.compression)
            .set("linger.ms", self.config.linger_ms.to_string())
            .set("message.timeout.ms", self.config.message_timeout_ms.to_string());
        client_config
    }
}

#[async_trait]
impl ConnectionFactory for KafkaConnectionFactory {
    type Connection = KafkaConnection;

    #[instrument(skip(self), fields(brokers = %self.config.brokers.join(",")))]
    async fn create_connection(&self) -> Result<KafkaConnection> {
        let client_config = self.client_config();
        let brokers = self.config.brokers.join(",");
        let timeout = self.config.connect_timeout();

        let probe: BaseProducer = client_config.create()?;
        let broker_count = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| Error::Connection(format!("metadata probe did not complete: {}", e)))?
        .map_err(|e| Error::Connection(format!("brokers {} unreachable: {}", brokers, e)))?;

        info!("Connected to Kafka cluster with {} brokers", broker_count);
        Ok(KafkaConnection {
            client_config,
            brokers,
        })
    }

    async fn close_connection(&self, connection: &KafkaConnection) -> Result<()> {
        // Producers own their sockets; nothing is held open here.
        debug!("Releasing Kafka connection to {}", connection.brokers);
        Ok(())
    }
}
