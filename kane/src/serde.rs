//! Stored-record serialization: a one-byte format tag, then the payload.
//!
//! Only `j` ("JSON follows") is defined. Decoders reject anything else so a
//! future format can claim a new leading byte without ambiguity. JSON
//! numbers round-trip through `serde_json::Number`, which keeps integers
//! integral instead of collapsing them into floats.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Format byte announcing a JSON payload.
pub(crate) const FORMAT_JSON: u8 = b'j';

/// Serializes a value into its tagged stored form.
pub(crate) fn serialize_stored<T: Serialize>(value: &T) -> Result<Bytes> {
    let payload = serde_json::to_vec(value)
        .map_err(|e| Error::Encoding(format!("failed to serialize record: {}", e)))?;
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(FORMAT_JSON);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Decodes a stored record, rejecting unknown format bytes.
pub(crate) fn deserialize_stored<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    match data.first() {
        Some(&FORMAT_JSON) => serde_json::from_slice(&data[1..])
            .map_err(|e| Error::Encoding(format!("failed to decode record: {}", e))),
        Some(other) => Err(Error::Encoding(format!(
            "unknown record format byte: 0x{:02x}",
            other
        ))),
        None => Err(Error::Encoding("empty record".to_string())),
    }
}
