//! Lazy iteration over all documents matching a filter.

use std::marker::PhantomData;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::find::{Filter, FindIter};
use crate::Db;

/// Lazy sequence of documents matching a filter.
///
/// Candidates whose record has disappeared or fails to decode are skipped —
/// an index hit may race a concurrent writer's teardown, and the primary-key
/// pointer is the authority. Filter errors surface from the first call and
/// end the iteration.
pub struct DocIter<D> {
    db: Db,
    cancel: CancellationToken,
    candidates: FindIter,
    _marker: PhantomData<fn() -> D>,
}

impl Db {
    /// Iterates the documents matching `filter`.
    pub async fn iter<D: Document>(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> DocIter<D> {
        DocIter {
            db: self.clone(),
            cancel: cancel.clone(),
            candidates: self.find(cancel, D::model(), filter).await,
            _marker: PhantomData,
        }
    }
}

impl<D: Document> DocIter<D> {
    /// Returns the next matching document, or `None` when exhausted.
    pub async fn next(&mut self) -> Result<Option<D>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let pk = match self.candidates.next().await? {
                Some(pk) => pk,
                None => return Ok(None),
            };
            match self.db.load::<D>(&self.cancel, D::model(), &pk).await {
                Ok(stored) => return Ok(Some(stored.val)),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    debug!(error = %e, "skipping stale index candidate");
                }
            }
        }
    }

    /// Drains the iterator into a vector.
    pub async fn collect(mut self) -> Result<Vec<D>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }
}
