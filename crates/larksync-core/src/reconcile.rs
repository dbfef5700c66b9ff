//! Mirror reconciliation: given the freshly mapped remote row set,
//! compute and apply the deletes and upserts that bring the mirror in
//! line with the source.

use std::collections::HashSet;

use crate::error::Result;
use crate::mirror::MirrorStore;
use crate::models::{CanonicalRow, SyncResult};

/// Reconcile the mirror against one consistent remote snapshot.
///
/// Reads the persisted id set once, deletes every mirror row whose id
/// is absent from `rows`, then upserts all of `rows` keyed on
/// `record_id`. The two sets are disjoint by construction (an id cannot
/// be both absent from and present in the same snapshot), so the
/// delete-then-upsert order only affects transient visibility, never
/// the final state. Zero-row deletes and upserts are skipped entirely;
/// no empty batch request reaches the store.
///
/// Preconditions, enforced by the caller rather than here:
/// - at most one pass runs at a time against a given mirror table
///   (concurrent passes may race on the delete/upsert);
/// - `rows` comes from a single remote snapshot. If the source was
///   mutated mid-pagination the disjointness assumption can be
///   violated; that is a known limitation of the pull model.
///
/// An empty `rows` wipes the mirror completely. That is the intended
/// soft-delete-by-filter behavior (records excluded by the remote
/// filter are indistinguishable from deleted ones), but it is logged
/// loudly because it usually means the filter excluded everything.
pub async fn reconcile<S>(rows: &[CanonicalRow], store: &S) -> Result<SyncResult>
where
    S: MirrorStore + ?Sized,
{
    let mirror_ids = store.select_ids().await?;
    let remote_ids: HashSet<&str> = rows.iter().map(|row| row.record_id.as_str()).collect();

    let delete_ids: Vec<String> = mirror_ids
        .into_iter()
        .filter(|id| !remote_ids.contains(id.as_str()))
        .collect();

    if rows.is_empty() && !delete_ids.is_empty() {
        tracing::warn!(
            deleted = delete_ids.len(),
            "remote fetch returned no records; wiping the entire mirror"
        );
    }

    if !delete_ids.is_empty() {
        store.delete(&delete_ids).await?;
    }
    if !rows.is_empty() {
        store.upsert(rows).await?;
    }

    Ok(SyncResult {
        synced: rows.len(),
        deleted: delete_ids.len(),
    })
}
