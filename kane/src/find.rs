//! Filters and the candidate scan they drive.
//!
//! A filter pins one field and either one value ([`Filter::eq`]) or mere
//! existence ([`Filter::has`]). Either way it becomes a half-open range over
//! the `f`-namespace: the bounds bracket every version stamp recorded under
//! `f \xFF model \xFF field \xFF …`, and each hit's penultimate segment is a
//! candidate primary key. Candidates are hints, not answers — a concurrent
//! writer may be mid-teardown — so readers always refetch the record through
//! the primary-key pointer.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::keys;
use crate::value::IndexValue;
use crate::Db;

/// A single-field predicate over one document model.
#[derive(Debug, Clone)]
pub struct Filter {
    field: Vec<u8>,
    start: Vec<u8>,
    end: Vec<u8>,
    err: Option<Error>,
}

impl Filter {
    /// Matches documents whose `field` equals `value`.
    pub fn eq(field: impl AsRef<[u8]>, value: impl Into<IndexValue>) -> Filter {
        let field = field.as_ref().to_vec();
        match value.into().encode() {
            Ok(encoded) => {
                let mut start = encoded.to_vec();
                start.push(keys::SEP);
                start.push(0x00);
                let mut end = start.clone();
                if let Some(last) = end.last_mut() {
                    *last = 0xFF;
                }
                Filter {
                    field,
                    start,
                    end,
                    err: None,
                }
            }
            Err(e) => Filter {
                field,
                start: Vec::new(),
                end: Vec::new(),
                err: Some(e),
            },
        }
    }

    /// Matches documents that have any value at `field`.
    pub fn has(field: impl AsRef<[u8]>) -> Filter {
        Filter {
            field: field.as_ref().to_vec(),
            start: vec![0x00],
            end: vec![0xFF],
            err: None,
        }
    }
}

/// Lazy sequence of candidate primary keys produced by a filter scan.
///
/// Surfaces at most one error, then terminates.
pub(crate) struct FindIter {
    inner: Option<Box<dyn kv::KvKeyIter>>,
    pending: Option<Error>,
    done: bool,
}

impl FindIter {
    fn failed(err: Error) -> Self {
        Self {
            inner: None,
            pending: Some(err),
            done: false,
        }
    }

    pub(crate) async fn next(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        if let Some(err) = self.pending.take() {
            self.done = true;
            return Err(err);
        }
        let iter = match self.inner.as_mut() {
            Some(iter) => iter,
            None => {
                self.done = true;
                return Ok(None);
            }
        };
        loop {
            match iter.next().await {
                Ok(Some(key)) => {
                    if let Some(pk) = keys::candidate_pk(&key) {
                        return Ok(Some(Bytes::copy_from_slice(pk)));
                    }
                    // unrelated key caught by loose bounds
                }
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            }
        }
    }
}

impl Db {
    /// Scans the index range a filter describes and yields candidate
    /// primary keys.
    pub(crate) async fn find(
        &self,
        cancel: &CancellationToken,
        model: &str,
        filter: &Filter,
    ) -> FindIter {
        if let Some(err) = &filter.err {
            return FindIter::failed(err.clone());
        }
        if let Err(e) = keys::check_component(&filter.field) {
            return FindIter::failed(e);
        }
        if let Err(e) = keys::check_component(model.as_bytes()) {
            return FindIter::failed(e);
        }

        let mut start = keys::index_prefix(model, &filter.field);
        let mut end = start.clone();
        start.extend_from_slice(&filter.start);
        end.extend_from_slice(&filter.end);

        match self.kv.iter_keys(cancel, start, Some(end)).await {
            Ok(iter) => FindIter {
                inner: Some(iter),
                pending: None,
                done: false,
            },
            Err(e) => FindIter::failed(e.into()),
        }
    }
}
