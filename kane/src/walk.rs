//! Document traversal into indexable `(path, scalar)` leaf pairs.
//!
//! Documents are serialized through `serde_json::Value`, so `serde`'s
//! rename and skip attributes decide field names and visibility at compile
//! time; the walk itself never inspects Rust types. Nested object keys join
//! with `.`, array elements reuse their parent path (a repeated value at one
//! path simply produces several index entries, giving "value IN list"
//! lookups), and nulls index nothing.

use serde_json::Value;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::IndexValue;

/// One indexable leaf: the dotted field path and the encoded scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WalkedField {
    pub path: Vec<u8>,
    pub value: bytes::Bytes,
}

/// Walks a document into its indexable leaf pairs.
pub(crate) fn walk_document<D: Document>(doc: &D) -> Result<Vec<WalkedField>> {
    let value = serde_json::to_value(doc)
        .map_err(|e| Error::Encoding(format!("failed to serialize document: {}", e)))?;
    walk_value(&value)
}

/// Walks an already-serialized document value.
pub(crate) fn walk_value(value: &Value) -> Result<Vec<WalkedField>> {
    let mut fields = Vec::new();
    walk_into(value, &[], &mut fields)?;
    Ok(fields)
}

fn walk_into(value: &Value, path: &[u8], out: &mut Vec<WalkedField>) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::Object(map) => {
            for (key, child) in map {
                // Object keys are UTF-8 and cannot carry 0xff, but a filter
                // bypass here would be silent, so check anyway.
                if key.as_bytes().contains(&0xFF) {
                    continue;
                }
                let mut child_path = Vec::with_capacity(path.len() + key.len() + 1);
                child_path.extend_from_slice(path);
                if !child_path.is_empty() {
                    child_path.push(b'.');
                }
                child_path.extend_from_slice(key.as_bytes());
                walk_into(child, &child_path, out)?;
            }
            Ok(())
        }
        Value::Array(elements) => {
            for element in elements {
                walk_into(element, path, out)?;
            }
            Ok(())
        }
        Value::Bool(b) => emit(IndexValue::Bool(*b), path, out),
        Value::Number(n) => {
            let scalar = if let Some(i) = n.as_i64() {
                IndexValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                IndexValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                IndexValue::Float(f)
            } else {
                return Err(Error::InvalidInput(format!(
                    "number cannot be indexed: {}",
                    n
                )));
            };
            emit(scalar, path, out)
        }
        Value::String(s) => emit(IndexValue::Str(s.clone()), path, out),
    }
}

fn emit(scalar: IndexValue, path: &[u8], out: &mut Vec<WalkedField>) -> Result<()> {
    let encoded = scalar.encode()?;
    out.push(WalkedField {
        path: path.to_vec(),
        value: encoded,
    });
    Ok(())
}
