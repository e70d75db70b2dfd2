//! Key construction and parsing for the four record namespaces.
//!
//! All keys live in one lexicographically ordered keyspace and use `0xFF` as
//! the structural separator, which is why no user-supplied byte may be
//! `0xFF` (it is not valid UTF-8, so ordinary strings can never smuggle it
//! in; byte strings are checked):
//!
//! ```text
//! o \xFF VTS(8) \xFF                                      object record
//! k \xFF model \xFF PK \xFF                               primary-key pointer
//! f \xFF model \xFF path \xFF TAG value \xFF VTS \xFF PK \xFF   index entry
//! _ \xFF ...                                              reserved
//! ```
//!
//! Builders always return freshly allocated buffers; nothing hands out a
//! slice a caller could later mutate.

use crate::error::{Error, Result};

/// The structural separator byte.
pub(crate) const SEP: u8 = 0xFF;

/// Minimum length of an encoded primary key (tag plus payload).
pub(crate) const MIN_ENCODED_PK: usize = 3;

/// Builds the object-record key `o \xFF VTS \xFF`.
pub(crate) fn object_key(vts: &[u8; 8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(11);
    key.push(b'o');
    key.push(SEP);
    key.extend_from_slice(vts);
    key.push(SEP);
    key
}

/// Builds the primary-key pointer key `k \xFF model \xFF PK \xFF`.
pub(crate) fn pointer_key(model: &str, pk: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + model.len() + pk.len());
    key.push(b'k');
    key.push(SEP);
    key.extend_from_slice(model.as_bytes());
    key.push(SEP);
    key.extend_from_slice(pk);
    key.push(SEP);
    key
}

/// Builds a field-index entry key.
pub(crate) fn index_key(
    model: &str,
    path: &[u8],
    encoded_value: &[u8],
    vts: &[u8; 8],
    pk: &[u8],
) -> Vec<u8> {
    let mut key = index_prefix(model, path);
    key.extend_from_slice(encoded_value);
    key.push(SEP);
    key.extend_from_slice(vts);
    key.push(SEP);
    key.extend_from_slice(pk);
    key.push(SEP);
    key
}

/// Builds the scan prefix `f \xFF model \xFF path \xFF` shared by an index
/// entry and the filter bounds over the same field.
pub(crate) fn index_prefix(model: &str, path: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + model.len() + path.len());
    key.push(b'f');
    key.push(SEP);
    key.extend_from_slice(model.as_bytes());
    key.push(SEP);
    key.extend_from_slice(path);
    key.push(SEP);
    key
}

/// Extracts the candidate primary key from a scanned index key.
///
/// Index keys end with `\xFF PK \xFF`, so after splitting on the separator
/// the PK is always the penultimate segment, regardless of any separator
/// bytes the version stamp happens to contain. Keys with fewer than four
/// segments are unrelated records caught by loose bounds and are skipped.
pub(crate) fn candidate_pk(key: &[u8]) -> Option<&[u8]> {
    let segments: Vec<&[u8]> = key.split(|b| *b == SEP).collect();
    if segments.len() < 4 {
        return None;
    }
    Some(segments[segments.len() - 2])
}

/// Rejects user-supplied key components containing the separator.
pub(crate) fn check_component(component: &[u8]) -> Result<()> {
    if component.contains(&SEP) {
        return Err(Error::InvalidInput(
            "key component must not contain the 0xff separator".to_string(),
        ));
    }
    Ok(())
}

/// Validates an encoded primary key: long enough to be a tagged scalar and
/// free of separator bytes.
pub(crate) fn check_encoded_pk(pk: &[u8]) -> Result<()> {
    if pk.len() < MIN_ENCODED_PK {
        return Err(Error::InvalidInput(format!(
            "encoded primary key too short: {} bytes (min {})",
            pk.len(),
            MIN_ENCODED_PK
        )));
    }
    check_component(pk)
}
