//! Wire codec for emitted records.
//!
//! A shard object is a sequence of JSON lines, one per record. Each line
//! carries the key and value as strings plus a flag per side saying
//! whether the string is the payload itself or a base64 escape of bytes
//! that are not valid text. The flags are persisted so decoding never
//! has to re-inspect content.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// One key-value pair produced by user code, with the escape flags the
/// emitter assigned to it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EmitRecord {
    /// The key, as the raw bytes the user emitted.
    pub key: Bytes,

    /// The value, as the raw bytes the user emitted.
    pub value: Bytes,

    /// Whether `key` must travel base64-escaped.
    pub key_is_base64: bool,

    /// Whether `value` must travel base64-escaped.
    pub value_is_base64: bool,
}

impl EmitRecord {
    /// Build a record, choosing the escape per side: text when the bytes
    /// are valid UTF-8, base64 otherwise.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        let key_is_base64 = std::str::from_utf8(&key).is_err();
        let value_is_base64 = std::str::from_utf8(&value).is_err();
        Self {
            key,
            value,
            key_is_base64,
            value_is_base64,
        }
    }
}

/// The persisted shape of one record line. Field names match the
/// original CFMR wire format.
#[derive(Serialize, Deserialize)]
struct WireRecord {
    key: String,
    value: String,
    #[serde(rename = "keyIsBase64")]
    key_is_base64: bool,
    #[serde(rename = "valueIsBase64")]
    value_is_base64: bool,
}

fn field_to_wire(bytes: &Bytes, is_base64: bool, field: &'static str) -> Result<String, CodecError> {
    if is_base64 {
        Ok(STANDARD.encode(bytes))
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(CodecError::NotText(field)),
        }
    }
}

fn field_from_wire(s: String, is_base64: bool, field: &'static str) -> Result<Bytes, CodecError> {
    if is_base64 {
        let raw = STANDARD
            .decode(&s)
            .map_err(|source| CodecError::InvalidBase64 { field, source })?;
        Ok(Bytes::from(raw))
    } else {
        Ok(Bytes::from(s))
    }
}

/// Encode a single record as one JSON line (without the trailing newline).
pub fn encode(record: &EmitRecord) -> Result<String, CodecError> {
    let wire = WireRecord {
        key: field_to_wire(&record.key, record.key_is_base64, "key")?,
        value: field_to_wire(&record.value, record.value_is_base64, "value")?,
        key_is_base64: record.key_is_base64,
        value_is_base64: record.value_is_base64,
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Decode a single JSON line back into the record it was encoded from.
pub fn decode(line: &str) -> Result<EmitRecord, CodecError> {
    let wire: WireRecord = serde_json::from_str(line)?;
    Ok(EmitRecord {
        key: field_from_wire(wire.key, wire.key_is_base64, "key")?,
        value: field_from_wire(wire.value, wire.value_is_base64, "value")?,
        key_is_base64: wire.key_is_base64,
        value_is_base64: wire.value_is_base64,
    })
}

/// Encode a buffered sequence of records as one shard object body.
///
/// Zero records encode to a zero-length body, so an invocation that
/// emitted nothing still produces a valid (empty) shard.
pub fn encode_shard(records: &[EmitRecord]) -> Result<Bytes, CodecError> {
    let mut body = String::new();
    for record in records {
        body.push_str(&encode(record)?);
        body.push('\n');
    }
    Ok(Bytes::from(body))
}

/// Decode a shard object body back into its records.
pub fn decode_shard(body: &[u8]) -> Result<Vec<EmitRecord>, CodecError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| CodecError::NotText("shard"))?;
    text.lines()
        .filter(|line| !line.is_empty())
        .map(decode)
        .collect()
}
