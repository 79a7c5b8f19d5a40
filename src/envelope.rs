use bytes::Bytes;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Application metadata attached to an envelope.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key whose value becomes the `correlation-id` header.
pub const METADATA_CORRELATION_ID: &str = "correlationId";
/// Metadata key whose value becomes the `sender-id` header.
pub const METADATA_SENDER_ID: &str = "senderId";
/// Metadata key whose value becomes the `destination-override` header.
pub const METADATA_DESTINATION: &str = "destinationName";

/// Bytes a serializer could not interpret, carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownPayload {
    pub type_name: String,
    pub revision: Option<String>,
    #[serde(with = "serde_bytes_base64")]
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Json(serde_json::Value),
    Unknown(UnknownPayload),
}

/// Ties an event to an ordered aggregate stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateInfo {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub sequence_number: i64,
}

/// One unit of domain data to be transported.
///
/// An envelope is either a plain event or an aggregate event; the aggregate
/// fields are grouped in [`AggregateInfo`] so they are always all present
/// or all absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub identifier: String,
    pub payload_type: String,
    #[serde(default)]
    pub revision: Option<String>,
    pub payload: Payload,
    #[serde(default = "now_millis", deserialize_with = "deserialize_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub aggregate: Option<AggregateInfo>,
}

impl EventEnvelope {
    /// Creates a plain event with a fresh identifier stamped with the current time.
    pub fn new(payload_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            identifier: uuid::Uuid::new_v4().to_string(),
            payload_type: payload_type.into(),
            revision: None,
            payload: Payload::Json(payload),
            timestamp: now_millis(),
            metadata: Metadata::new(),
            aggregate: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Sets the timestamp, truncated to the millisecond precision of the wire format.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = truncate_to_millis(timestamp);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Turns this event into an aggregate event.
    pub fn with_aggregate(
        mut self,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        sequence_number: i64,
    ) -> Self {
        self.aggregate = Some(AggregateInfo {
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            sequence_number,
        });
        self
    }

    pub fn is_aggregate_event(&self) -> bool {
        self.aggregate.is_some()
    }

    pub fn aggregate_id(&self) -> Option<&str> {
        self.aggregate.as_ref().map(|a| a.aggregate_id.as_str())
    }
}

fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    DateTime::<Utc>::deserialize(deserializer).map(truncate_to_millis)
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(ts)
}

mod serde_bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
