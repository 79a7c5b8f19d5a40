//! Conversion between event envelopes and broker payloads.
//!
//! Outbound, the payload is serialized into the body and the envelope's
//! identity, timestamp, aggregate fields and metadata become headers.
//! Inbound, a payload is only treated as an envelope when it carries the
//! `identifier` and `type` headers; anything else shares the destination
//! with us but is not ours, and is ignored rather than rejected.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::broker::BrokerPayload;
use crate::envelope::{
    AggregateInfo, EventEnvelope, Payload, UnknownPayload, METADATA_CORRELATION_ID,
    METADATA_DESTINATION, METADATA_SENDER_ID,
};
use crate::headers::{self, add_header, Headers};
use crate::sequencing::SequencingPolicy;
use crate::serializer::{JsonSerializer, Serializer};
use crate::{Error, Result};

/// Why an inbound payload did not yield an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotRecognized {
    /// The identifier or type header is missing: not an envelope at all.
    #[error("payload lacks the identifier or type header")]
    Foreign,
    /// The payload looked like an envelope but could not be rebuilt.
    #[error("payload could not be reconstructed: {0}")]
    Malformed(String),
}

pub trait MessageConverter: Send + Sync {
    fn to_broker_payload(&self, envelope: &EventEnvelope) -> Result<BrokerPayload>;

    fn try_from_broker_payload(
        &self,
        payload: &BrokerPayload,
    ) -> std::result::Result<EventEnvelope, NotRecognized>;

    /// Rebuilds an envelope, or `None` when the payload is not one of ours.
    ///
    /// Never fails: malformed input is logged and skipped.
    fn from_broker_payload(&self, payload: &BrokerPayload) -> Option<EventEnvelope> {
        match self.try_from_broker_payload(payload) {
            Ok(envelope) => Some(envelope),
            Err(NotRecognized::Foreign) => {
                trace!("Ignoring payload without envelope headers");
                None
            }
            Err(NotRecognized::Malformed(reason)) => {
                debug!("Error converting broker payload to an envelope: {}", reason);
                None
            }
        }
    }
}

/// Converter used unless the application supplies its own.
#[derive(Clone)]
pub struct DefaultMessageConverter {
    serializer: Arc<dyn Serializer>,
    sequencing_policy: SequencingPolicy,
}

impl Default for DefaultMessageConverter {
    fn default() -> Self {
        Self::new(JsonSerializer::new())
    }
}

impl DefaultMessageConverter {
    pub fn new(serializer: impl Serializer + 'static) -> Self {
        Self {
            serializer: Arc::new(serializer),
            sequencing_policy: SequencingPolicy::default(),
        }
    }

    pub fn with_sequencing_policy(mut self, policy: SequencingPolicy) -> Self {
        self.sequencing_policy = policy;
        self
    }

    pub fn sequencing_policy(&self) -> &SequencingPolicy {
        &self.sequencing_policy
    }

    fn serialize_body(&self, envelope: &EventEnvelope) -> Result<bytes::Bytes> {
        match self.serializer.serialize(&envelope.payload) {
            Ok(body) => Ok(body),
            Err(e) => match &envelope.payload {
                Payload::Unknown(unknown) => {
                    debug!(
                        "Passing through raw bytes of unknown payload type '{}'",
                        unknown.type_name
                    );
                    Ok(unknown.data.clone())
                }
                _ => Err(e),
            },
        }
    }

    fn rebuild(&self, payload: &BrokerPayload, identifier: &str, payload_type: &str) -> Result<EventEnvelope> {
        let headers = &payload.headers;
        let revision = headers::value_as_string(headers, headers::MESSAGE_REVISION);

        let timestamp = headers::value_as_timestamp(headers, headers::MESSAGE_TIMESTAMP)?
            .ok_or_else(|| Error::invalid_header(headers::MESSAGE_TIMESTAMP, "missing"))?;

        let body = match self.serializer.deserialize(&payload.body, payload_type, revision) {
            Ok(body) => body,
            Err(e) => {
                debug!("Keeping undecodable '{}' body as raw bytes: {}", payload_type, e);
                Payload::Unknown(UnknownPayload {
                    type_name: payload_type.to_string(),
                    revision: revision.map(str::to_string),
                    data: payload.body.clone(),
                })
            }
        };

        Ok(EventEnvelope {
            identifier: identifier.to_string(),
            payload_type: payload_type.to_string(),
            revision: revision.map(str::to_string),
            payload: body,
            timestamp,
            metadata: headers::extract_all_metadata(headers),
            aggregate: rebuild_aggregate(headers)?,
        })
    }
}

fn rebuild_aggregate(headers: &Headers) -> Result<Option<AggregateInfo>> {
    let Some(aggregate_id) = headers::value_as_string(headers, headers::AGGREGATE_ID) else {
        return Ok(None);
    };

    let aggregate_type = headers::value_as_string(headers, headers::AGGREGATE_TYPE)
        .ok_or_else(|| Error::invalid_header(headers::AGGREGATE_TYPE, "missing for aggregate event"))?;
    let sequence_number = headers::value_as_i64(headers, headers::AGGREGATE_SEQUENCE)?
        .ok_or_else(|| Error::invalid_header(headers::AGGREGATE_SEQUENCE, "missing for aggregate event"))?;

    Ok(Some(AggregateInfo {
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        sequence_number,
    }))
}

impl MessageConverter for DefaultMessageConverter {
    fn to_broker_payload(&self, envelope: &EventEnvelope) -> Result<BrokerPayload> {
        let body = self.serialize_body(envelope)?;
        let mut headers = Headers::new();

        for (key, value) in &envelope.metadata {
            headers.insert(headers::generate_metadata_key(key), value.clone());
        }

        add_header(&mut headers, headers::MESSAGE_ID, envelope.identifier.as_str());
        add_header(&mut headers, headers::MESSAGE_TYPE, envelope.payload_type.as_str());
        if let Some(revision) = &envelope.revision {
            add_header(&mut headers, headers::MESSAGE_REVISION, revision.as_str());
        }
        add_header(&mut headers, headers::MESSAGE_TIMESTAMP, envelope.timestamp);

        let passthrough = [
            (METADATA_CORRELATION_ID, headers::CORRELATION_ID),
            (METADATA_SENDER_ID, headers::SENDER_ID),
            (METADATA_DESTINATION, headers::DESTINATION_OVERRIDE),
        ];
        for (metadata_key, header) in passthrough {
            if let Some(value) = envelope.metadata.get(metadata_key) {
                add_header(&mut headers, header, value.as_str());
            }
        }

        if let Some(aggregate) = &envelope.aggregate {
            add_header(&mut headers, headers::AGGREGATE_TYPE, aggregate.aggregate_type.as_str());
            add_header(&mut headers, headers::AGGREGATE_ID, aggregate.aggregate_id.as_str());
            add_header(&mut headers, headers::AGGREGATE_SEQUENCE, aggregate.sequence_number);
        }

        if let Some(sequence_number) = self.sequencing_policy.sequence_number(envelope) {
            add_header(&mut headers, headers::SEQUENCE_NUMBER, sequence_number);
        }

        Ok(BrokerPayload::new(body, headers))
    }

    fn try_from_broker_payload(
        &self,
        payload: &BrokerPayload,
    ) -> std::result::Result<EventEnvelope, NotRecognized> {
        let (Some(identifier), Some(payload_type)) = (
            payload.header(headers::MESSAGE_ID),
            payload.header(headers::MESSAGE_TYPE),
        ) else {
            return Err(NotRecognized::Foreign);
        };

        self.rebuild(payload, identifier, payload_type)
            .map_err(|e| NotRecognized::Malformed(e.to_string()))
    }
}
