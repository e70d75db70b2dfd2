//! The write coordinator: put, set, swap, and del.
//!
//! Every write follows the same protocol. A fresh version stamp is
//! allocated, the new object record and its index entries are written under
//! that stamp, and only then does a compare-and-swap on the primary-key
//! pointer make the version reachable. The displaced version's record and
//! index entries are torn down after the swap. Because each version owns its
//! own index entries (the stamp is part of every index key), concurrent
//! writers can never delete each other's entries, and a crash at any point
//! leaves at most unreachable garbage, never a dangling pointer.

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::document::{encoded_primary_key, Document, Stored};
use crate::error::{Error, Result};
use crate::walk::WalkedField;
use crate::{index, keys, serde as record, walk, Db};

/// Pause between failed pointer swaps.
const RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Fail with [`Error::Conflict`] when the primary key is already live.
    Create,
    /// Displace whatever is live.
    Upsert,
}

impl Db {
    /// Creates a document. Fails with [`Error::Conflict`] if a document with
    /// the same primary key is live.
    pub async fn put<D: Document>(&self, cancel: &CancellationToken, doc: &D) -> Result<()> {
        self.store(cancel, doc, WriteMode::Create).await?;
        Ok(())
    }

    /// Stores a document, overwriting any live version under the same
    /// primary key.
    pub async fn set<D: Document>(&self, cancel: &CancellationToken, doc: &D) -> Result<()> {
        self.store(cancel, doc, WriteMode::Upsert).await?;
        Ok(())
    }

    /// Like [`Db::set`], but also returns the displaced document, if one
    /// existed.
    pub async fn swap<D: Document>(
        &self,
        cancel: &CancellationToken,
        doc: &D,
    ) -> Result<Option<D>> {
        match self.store(cancel, doc, WriteMode::Upsert).await? {
            Some(old) => {
                let prior = serde_json::from_value(old.val).map_err(|e| {
                    Error::Encoding(format!("failed to decode displaced record: {}", e))
                })?;
                Ok(Some(prior))
            }
            None => Ok(None),
        }
    }

    /// Removes the live document with `doc`'s primary key. A no-op when
    /// nothing is live.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn del<D: Document>(&self, cancel: &CancellationToken, doc: &D) -> Result<()> {
        let model = D::model();
        keys::check_component(model.as_bytes())?;
        let pk = encoded_primary_key(doc)?;
        let pointer_key = keys::pointer_key(model, &pk);

        // The engine's CAS cannot swap to absent, so the pointer is first
        // swapped to the empty marker and then deleted outright.
        let mut expected: Option<Bytes> = None;
        let displaced = loop {
            match self
                .kv
                .cas(cancel, &pointer_key, expected.as_deref(), &[])
                .await
            {
                Ok((_, true)) => break expected.take(),
                Ok((observed, false)) => expected = observed,
                Err(e) => return Err(e.into()),
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        };
        self.kv.del(cancel, &pointer_key).await?;

        if let Some(old_vts) = displaced.as_ref().filter(|b| b.len() == 8) {
            self.teardown_version(cancel, old_vts, model, &pk).await;
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn store<D: Document>(
        &self,
        cancel: &CancellationToken,
        doc: &D,
        mode: WriteMode,
    ) -> Result<Option<Stored<Value>>> {
        let model = D::model();
        keys::check_component(model.as_bytes())?;
        let pk = encoded_primary_key(doc)?;

        // Walker and codec failures abort before any KV mutation.
        let walked = walk::walk_document(doc)?;

        let vts = self.kv.vector_time(cancel).await?;
        let vts_bytes = vts.to_le_bytes();
        let object_key = keys::object_key(&vts_bytes);
        let payload = record::serialize_stored(&Stored {
            vts,
            val: doc,
            history: None,
        })?;

        self.kv.set(cancel, &object_key, &payload).await?;

        if let Err(e) = index::apply_index(
            self.kv.as_ref(),
            cancel,
            &walked,
            model,
            &vts_bytes,
            &pk,
            true,
        )
        .await
        {
            let _ = self.kv.del(cancel, &object_key).await;
            return Err(e);
        }

        // The version becomes reachable at this swap; everything before it
        // is invisible to readers, everything after it is cleanup.
        let pointer_key = keys::pointer_key(model, &pk);
        let mut expected: Option<Bytes> = None;
        let displaced = loop {
            match self
                .kv
                .cas(cancel, &pointer_key, expected.as_deref(), &vts_bytes)
                .await
            {
                Ok((_, true)) => break expected.take(),
                Ok((observed, false)) => {
                    if mode == WriteMode::Create && observed.is_some() {
                        self.back_out(&walked, model, &vts_bytes, &pk, &object_key).await;
                        return Err(Error::Conflict(format!(
                            "a live {} document holds this primary key",
                            model
                        )));
                    }
                    expected = observed;
                }
                Err(e) => {
                    self.back_out(&walked, model, &vts_bytes, &pk, &object_key).await;
                    return Err(e.into());
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.back_out(&walked, model, &vts_bytes, &pk, &object_key).await;
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        };

        if let Some(old_vts) = displaced.as_ref().filter(|b| b.len() == 8) {
            let old = self.teardown_version(cancel, old_vts, model, &pk).await;
            return Ok(old);
        }
        Ok(None)
    }

    /// Removes a superseded version's record and index entries. Best-effort:
    /// the pointer is already authoritative, so failures are logged and the
    /// orphaned keys are left behind.
    async fn teardown_version(
        &self,
        cancel: &CancellationToken,
        old_vts: &[u8],
        model: &str,
        pk: &[u8],
    ) -> Option<Stored<Value>> {
        let mut vts = [0u8; 8];
        vts.copy_from_slice(old_vts);
        let old_key = keys::object_key(&vts);

        let bytes = match self.kv.get(cancel, &old_key).await {
            Ok(b) => b,
            Err(e) => {
                warn!(model, error = %e, "failed to load superseded record");
                return None;
            }
        };
        let stored: Stored<Value> = match record::deserialize_stored(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!(model, error = %e, "failed to decode superseded record");
                return None;
            }
        };

        match walk::walk_value(&stored.val) {
            Ok(walked) => {
                let _ = index::apply_index(
                    self.kv.as_ref(),
                    cancel,
                    &walked,
                    model,
                    &vts,
                    pk,
                    false,
                )
                .await;
            }
            Err(e) => warn!(model, error = %e, "failed to walk superseded record"),
        }
        if let Err(e) = self.kv.del(cancel, &old_key).await {
            warn!(model, error = %e, "failed to delete superseded record");
        }
        Some(stored)
    }

    /// Undoes a half-finished write: deletes the index entries just written
    /// and the new object record. Runs on a fresh token so cleanup can
    /// proceed even when the caller's token already fired.
    async fn back_out(
        &self,
        walked: &[WalkedField],
        model: &str,
        vts: &[u8; 8],
        pk: &[u8],
        object_key: &[u8],
    ) {
        let cleanup = CancellationToken::new();
        let _ = index::apply_index(self.kv.as_ref(), &cleanup, walked, model, vts, pk, false).await;
        if let Err(e) = self.kv.del(&cleanup, object_key).await {
            warn!(model, error = %e, "failed to remove backed-out record");
        }
    }
}
