//! Point reads through a filter.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::document::{Document, Stored};
use crate::error::{Error, Result};
use crate::find::Filter;
use crate::{keys, serde as record, Db};

impl Db {
    /// Returns the first document matching `filter`, or [`Error::NotFound`].
    pub async fn get<D: Document>(&self, cancel: &CancellationToken, filter: &Filter) -> Result<D> {
        let model = D::model();
        let mut candidates = self.find(cancel, model, filter).await;
        let pk = candidates.next().await?.ok_or(Error::NotFound)?;
        let stored = self.load::<D>(cancel, model, &pk).await?;
        Ok(stored.val)
    }

    /// Resolves a candidate primary key to its live record.
    ///
    /// The index yields primary keys, not version stamps, so reaching the
    /// object record takes two hops: the `k`-pointer names the owning stamp,
    /// and the stamp names the record. A pointer that is missing or not yet
    /// eight bytes (a delete in flight) reads as [`Error::NotFound`].
    pub(crate) async fn load<D: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        model: &str,
        pk: &[u8],
    ) -> Result<Stored<D>> {
        let pointer = self.kv.get(cancel, &keys::pointer_key(model, pk)).await?;
        if pointer.len() != 8 {
            return Err(Error::NotFound);
        }
        let mut vts = [0u8; 8];
        vts.copy_from_slice(&pointer);
        let bytes = self.kv.get(cancel, &keys::object_key(&vts)).await?;
        record::deserialize_stored(&bytes)
    }
}
