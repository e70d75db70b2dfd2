//! The document contract and the stored envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys;
use crate::value::IndexValue;

/// A value that can be stored as a document.
///
/// `model` names the document kind (the short type name) and namespaces
/// every key written for it; `primary_key` supplies the scalar that
/// identifies one document within that kind. Both are usually generated by
/// `#[derive(Document)]`, which takes the primary key from the field marked
/// `#[document(pk)]` or, failing that, the field named `id`.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Short type name; must not contain the `0xFF` separator.
    fn model() -> &'static str;

    /// The scalar identifying this document within its model.
    fn primary_key(&self) -> IndexValue;
}

/// The envelope persisted under an object-record key: the user value, the
/// version stamp that owns it, and optional history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stored<D> {
    pub vts: u64,
    pub val: D,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,
}

/// Creation and update timestamps, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

/// Encodes and validates a document's primary key.
pub(crate) fn encoded_primary_key<D: Document>(doc: &D) -> Result<Vec<u8>> {
    let encoded = doc.primary_key().encode()?;
    keys::check_encoded_pk(&encoded)?;
    Ok(encoded.to_vec())
}
