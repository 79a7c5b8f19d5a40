use bytes::Bytes;

use crate::envelope::Payload;
use crate::{Error, Result};

/// Turns envelope payloads into broker bytes and back.
pub trait Serializer: Send + Sync {
    fn serialize(&self, payload: &Payload) -> Result<Bytes>;

    fn deserialize(&self, data: &[u8], payload_type: &str, revision: Option<&str>) -> Result<Payload>;
}

/// Compact JSON payload serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, payload: &Payload) -> Result<Bytes> {
        match payload {
            Payload::Json(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            Payload::Unknown(unknown) => Err(Error::Conversion(format!(
                "JSON serializer cannot encode unknown payload of type '{}'",
                unknown.type_name
            ))),
        }
    }

    fn deserialize(&self, data: &[u8], _payload_type: &str, _revision: Option<&str>) -> Result<Payload> {
        Ok(Payload::Json(serde_json::from_slice(data)?))
    }
}
