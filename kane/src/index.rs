//! Secondary-index maintenance for one object version.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::keys;
use crate::walk::WalkedField;

/// The value stored under every index key.
const INDEX_MARK: &[u8] = &[0xFF];

/// Installs (`creating = true`) or tears down the index entries for one
/// object version.
///
/// Engine failures inside one call are best-effort: every entry is still
/// attempted. When installing, the first failure is reported afterwards so
/// the caller can roll the version back; teardown failures are only logged,
/// because by then the primary-key pointer is already authoritative.
pub(crate) async fn apply_index(
    kv: &dyn kv::Kv,
    cancel: &CancellationToken,
    walked: &[WalkedField],
    model: &str,
    vts: &[u8; 8],
    pk: &[u8],
    creating: bool,
) -> Result<()> {
    let mut first_failure: Option<Error> = None;

    for field in walked {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let key = keys::index_key(model, &field.path, &field.value, vts, pk);
        let outcome = if creating {
            kv.set(cancel, &key, INDEX_MARK).await
        } else {
            kv.del(cancel, &key).await
        };
        if let Err(e) = outcome {
            warn!(
                model,
                creating,
                error = %e,
                "index entry write failed"
            );
            if first_failure.is_none() {
                first_failure = Some(e.into());
            }
        }
    }

    match first_failure {
        Some(e) if creating => Err(e),
        _ => Ok(()),
    }
}
