//! Header codec for broker payloads.
//!
//! Broker headers are a flat `String -> String` map. Typed values are
//! written into a fixed-width big-endian buffer of exactly their width and
//! rendered as standard base64, so decoding recovers the exact bits.
//! Timestamps travel as their millisecond epoch on the 64-bit integer path.
//!
//! Application metadata is namespaced under the `metadata-` prefix:
//!
//! ```rust
//! use event_bridge::headers::{extract_key, generate_metadata_key};
//!
//! let key = generate_metadata_key("tenant");
//! assert_eq!(key, "metadata-tenant");
//! assert_eq!(extract_key(&key).unwrap(), "tenant");
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::{Error, Result};

pub const MESSAGE_ID: &str = "identifier";
pub const MESSAGE_TYPE: &str = "type";
pub const MESSAGE_REVISION: &str = "revision";
pub const MESSAGE_TIMESTAMP: &str = "timestamp";
pub const SEQUENCE_NUMBER: &str = "sequence-number";
pub const CORRELATION_ID: &str = "correlation-id";
pub const SENDER_ID: &str = "sender-id";
pub const DESTINATION_OVERRIDE: &str = "destination-override";
pub const AGGREGATE_TYPE: &str = "aggregate-type";
pub const AGGREGATE_ID: &str = "aggregate-id";
pub const AGGREGATE_SEQUENCE: &str = "aggregate-sequence";

/// Namespace under which application metadata is carried.
pub const METADATA_PREFIX: &str = "metadata";
const KEY_DELIMITER: &str = "-";

/// Broker header map.
pub type Headers = HashMap<String, String>;

/// A typed value that can be placed in a header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Timestamp(DateTime<Utc>),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Null,
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<i16> for HeaderValue {
    fn from(value: i16) -> Self {
        HeaderValue::I16(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::I32(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::I64(value)
    }
}

impl From<f32> for HeaderValue {
    fn from(value: f32) -> Self {
        HeaderValue::F32(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::F64(value)
    }
}

impl From<DateTime<Utc>> for HeaderValue {
    fn from(value: DateTime<Utc>) -> Self {
        HeaderValue::Timestamp(value)
    }
}

impl<T: Into<HeaderValue>> From<Option<T>> for HeaderValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HeaderValue::Null)
    }
}

/// Encodes a typed value into its header string.
pub fn encode(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Timestamp(ts) => encode(&HeaderValue::I64(ts.timestamp_millis())),
        HeaderValue::I16(v) => {
            let mut buf = BytesMut::with_capacity(2);
            buf.put_i16(*v);
            STANDARD.encode(&buf)
        }
        HeaderValue::I32(v) => {
            let mut buf = BytesMut::with_capacity(4);
            buf.put_i32(*v);
            STANDARD.encode(&buf)
        }
        HeaderValue::I64(v) => {
            let mut buf = BytesMut::with_capacity(8);
            buf.put_i64(*v);
            STANDARD.encode(&buf)
        }
        HeaderValue::F32(v) => {
            let mut buf = BytesMut::with_capacity(4);
            buf.put_f32(*v);
            STANDARD.encode(&buf)
        }
        HeaderValue::F64(v) => {
            let mut buf = BytesMut::with_capacity(8);
            buf.put_f64(*v);
            STANDARD.encode(&buf)
        }
        HeaderValue::Str(s) => s.clone(),
        HeaderValue::Null => String::new(),
    }
}

fn decode_fixed(encoded: &str, width: usize) -> Result<Bytes> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Conversion(format!("invalid base64 header value: {}", e)))?;

    if raw.len() != width {
        return Err(Error::Conversion(format!(
            "expected {} encoded bytes, found {}",
            width,
            raw.len()
        )));
    }

    Ok(Bytes::from(raw))
}

pub fn decode_i16(encoded: &str) -> Result<i16> {
    Ok(decode_fixed(encoded, 2)?.get_i16())
}

pub fn decode_i32(encoded: &str) -> Result<i32> {
    Ok(decode_fixed(encoded, 4)?.get_i32())
}

pub fn decode_i64(encoded: &str) -> Result<i64> {
    Ok(decode_fixed(encoded, 8)?.get_i64())
}

pub fn decode_f32(encoded: &str) -> Result<f32> {
    Ok(decode_fixed(encoded, 4)?.get_f32())
}

pub fn decode_f64(encoded: &str) -> Result<f64> {
    Ok(decode_fixed(encoded, 8)?.get_f64())
}

pub fn decode_timestamp(encoded: &str) -> Result<DateTime<Utc>> {
    let millis = decode_i64(encoded)?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::Conversion(format!("timestamp {} out of range", millis)))
}

/// Inserts `value` under `key`, encoding it first.
pub fn add_header(headers: &mut Headers, key: impl Into<String>, value: impl Into<HeaderValue>) {
    headers.insert(key.into(), encode(&value.into()));
}

/// Returns the raw string stored under `key`, if any.
pub fn value_as_string<'a>(headers: &'a Headers, key: &str) -> Option<&'a str> {
    headers.get(key).map(String::as_str)
}

/// Returns the 64-bit integer stored under `key`, if any.
///
/// # Errors
///
/// Returns [`Error::InvalidHeader`] when the entry exists but is not an
/// encoded 64-bit integer.
pub fn value_as_i64(headers: &Headers, key: &str) -> Result<Option<i64>> {
    headers
        .get(key)
        .map(|raw| decode_i64(raw).map_err(|e| Error::invalid_header(key, e.to_string())))
        .transpose()
}

/// Returns the timestamp stored under `key`, if any.
pub fn value_as_timestamp(headers: &Headers, key: &str) -> Result<Option<DateTime<Utc>>> {
    headers
        .get(key)
        .map(|raw| decode_timestamp(raw).map_err(|e| Error::invalid_header(key, e.to_string())))
        .transpose()
}

/// Namespaces an application metadata key, e.g. `foo` becomes `metadata-foo`.
pub fn generate_metadata_key(key: &str) -> String {
    format!("{}{}{}", METADATA_PREFIX, KEY_DELIMITER, key)
}

pub fn is_metadata_key(key: &str) -> bool {
    key.strip_prefix(METADATA_PREFIX)
        .is_some_and(|rest| rest.starts_with(KEY_DELIMITER))
}

/// Strips the metadata namespace from `namespaced`.
///
/// # Errors
///
/// Returns [`Error::InvalidHeader`] if `namespaced` does not start with
/// `metadata-`.
pub fn extract_key(namespaced: &str) -> Result<&str> {
    namespaced
        .strip_prefix(METADATA_PREFIX)
        .and_then(|rest| rest.strip_prefix(KEY_DELIMITER))
        .ok_or_else(|| {
            Error::invalid_header(
                namespaced,
                format!("not a '{}{}' key", METADATA_PREFIX, KEY_DELIMITER),
            )
        })
}

/// Collects every namespaced metadata header with its prefix removed.
pub fn extract_all_metadata(headers: &Headers) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(key, value)| {
            extract_key(key)
                .ok()
                .map(|k| (k.to_string(), value.clone()))
        })
        .collect()
}
