use bytes::Bytes;
use rdkafka::message::{Headers as _, Message};
use tracing::trace;

use crate::broker::BrokerPayload;
use crate::headers::Headers;

/// Turns a consumed Kafka message into a [`BrokerPayload`].
///
/// Headers without a value or with a non UTF-8 value are skipped; the
/// converter then decides whether the message is an envelope at all.
pub fn broker_payload_from_message<M: Message>(message: &M) -> BrokerPayload {
    let mut headers = Headers::new();

    if let Some(kafka_headers) = message.headers() {
        for header in kafka_headers.iter() {
            match header.value.map(std::str::from_utf8) {
                Some(Ok(value)) => {
                    headers.insert(header.key.to_string(), value.to_string());
                }
                Some(Err(_)) => trace!("Skipping non UTF-8 header '{}'", header.key),
                None => trace!("Skipping empty header '{}'", header.key),
            }
        }
    }

    let body = Bytes::copy_from_slice(message.payload().unwrap_or_default());
    BrokerPayload::new(body, headers)
}
