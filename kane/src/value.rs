//! Indexable scalar values and their order-preserving byte encoding.
//!
//! Every scalar that may appear in an index key is encoded as a one-byte
//! kind tag followed by a payload whose lexicographic order matches the
//! scalar's natural order:
//!
//! - integers: tag, sign byte (`0` negative / `1` non-negative), 8-byte
//!   big-endian two's-complement (negatives) or magnitude (non-negatives);
//! - floats: tag, sign byte, 8-byte big-endian IEEE-754 total-order bits
//!   (negative: all bits flipped; non-negative: sign bit flipped);
//! - strings and byte strings: tag, payload verbatim (at most 1024 bytes,
//!   and never the `0xFF` separator);
//! - booleans: tag, one `0`/`1` byte.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Kind tag for integers.
pub(crate) const TAG_INTEGER: u8 = 1;
/// Kind tag for strings.
pub(crate) const TAG_STRING: u8 = 2;
/// Kind tag for floats.
pub(crate) const TAG_FLOAT: u8 = 3;
/// Kind tag for byte strings.
pub(crate) const TAG_BYTES: u8 = 4;
/// Kind tag for booleans.
pub(crate) const TAG_BOOL: u8 = 5;

/// Longest string or byte-string payload accepted into an index key.
pub(crate) const MAX_INDEXED_LEN: usize = 1024;

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// A scalar that can appear in a secondary index or as a primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl IndexValue {
    /// Encodes the scalar into its tagged, order-preserving byte form.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            IndexValue::Int(v) => {
                let mut buf = BytesMut::with_capacity(10);
                buf.put_u8(TAG_INTEGER);
                buf.put_u8(if *v >= 0 { 1 } else { 0 });
                buf.put_u64(*v as u64);
                Ok(buf.freeze())
            }
            IndexValue::UInt(v) => {
                let mut buf = BytesMut::with_capacity(10);
                buf.put_u8(TAG_INTEGER);
                buf.put_u8(1);
                buf.put_u64(*v);
                Ok(buf.freeze())
            }
            IndexValue::Float(v) => {
                let bits = v.to_bits();
                let mut buf = BytesMut::with_capacity(10);
                buf.put_u8(TAG_FLOAT);
                buf.put_u8(if bits & SIGN_BIT != 0 { 0 } else { 1 });
                buf.put_u64(encode_f64_sortable(*v));
                Ok(buf.freeze())
            }
            IndexValue::Str(s) => {
                check_indexable(s.as_bytes())?;
                let mut buf = BytesMut::with_capacity(1 + s.len());
                buf.put_u8(TAG_STRING);
                buf.extend_from_slice(s.as_bytes());
                Ok(buf.freeze())
            }
            IndexValue::Bytes(b) => {
                check_indexable(b)?;
                let mut buf = BytesMut::with_capacity(1 + b.len());
                buf.put_u8(TAG_BYTES);
                buf.extend_from_slice(b);
                Ok(buf.freeze())
            }
            IndexValue::Bool(v) => Ok(Bytes::from(vec![TAG_BOOL, u8::from(*v)])),
        }
    }
}

/// Rejects payloads the key schema cannot hold.
fn check_indexable(data: &[u8]) -> Result<()> {
    if data.len() > MAX_INDEXED_LEN {
        return Err(Error::InvalidInput(format!(
            "string too long for index: {} bytes (max {})",
            data.len(),
            MAX_INDEXED_LEN
        )));
    }
    if data.contains(&0xFF) {
        return Err(Error::InvalidInput(
            "indexed value must not contain the 0xff separator".to_string(),
        ));
    }
    Ok(())
}

/// Encodes an `f64` so that the big-endian result compares like the float.
///
/// Negative values have all bits flipped (reversing their order), positive
/// values only the sign bit (lifting them above every negative).
fn encode_f64_sortable(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for IndexValue {
            fn from(v: $t) -> Self {
                IndexValue::Int(v as i64)
            }
        })*
    };
}

macro_rules! from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for IndexValue {
            fn from(v: $t) -> Self {
                IndexValue::UInt(v as u64)
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, isize);
from_uint!(u8, u16, u32, u64, usize);

impl From<f32> for IndexValue {
    fn from(v: f32) -> Self {
        IndexValue::Float(v as f64)
    }
}

impl From<f64> for IndexValue {
    fn from(v: f64) -> Self {
        IndexValue::Float(v)
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        IndexValue::Bool(v)
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Str(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Str(v)
    }
}

impl From<Vec<u8>> for IndexValue {
    fn from(v: Vec<u8>) -> Self {
        IndexValue::Bytes(v)
    }
}

impl From<&[u8]> for IndexValue {
    fn from(v: &[u8]) -> Self {
        IndexValue::Bytes(v.to_vec())
    }
}
