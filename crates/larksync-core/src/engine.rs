//! The sync engine: one pass = fetch all → map all → reconcile.

use std::sync::Arc;

use crate::bitable::BitableClient;
use crate::error::Result;
use crate::mapper::{map_record, MapperOptions};
use crate::mirror::MirrorStore;
use crate::models::{CanonicalRow, SyncResult};
use crate::reconcile::reconcile;
use crate::util::normalize_text_option;

/// Composes the Bitable reader, record mapper, and mirror reconciler
/// into a single runnable pass.
///
/// A pass runs sequentially to completion and fails fast: the first
/// auth, fetch, or persistence error aborts it and nothing fetched so
/// far is written. Reruns are the retry mechanism; the engine never
/// retries internally. Callers must not overlap passes against the same
/// mirror table.
pub struct SyncEngine {
    bitable: BitableClient,
    store: Arc<dyn MirrorStore>,
    options: MapperOptions,
    filter: Option<String>,
}

impl SyncEngine {
    /// A blank or whitespace-only `filter` is treated as no filter at
    /// all rather than forwarded to the server.
    pub fn new(
        bitable: BitableClient,
        store: Arc<dyn MirrorStore>,
        options: MapperOptions,
        filter: Option<String>,
    ) -> Self {
        Self {
            bitable,
            store,
            options,
            filter: normalize_text_option(filter),
        }
    }

    /// Run one full sync pass and report the applied counts.
    pub async fn run_pass(&self) -> Result<SyncResult> {
        let records = self.bitable.list_all(self.filter.as_deref()).await?;
        tracing::info!(fetched = records.len(), "fetched remote records");

        let rows: Vec<CanonicalRow> = records
            .iter()
            .map(|record| map_record(record, &self.options))
            .collect();

        let result = reconcile(&rows, self.store.as_ref()).await?;
        tracing::info!(
            synced = result.synced,
            deleted = result.deleted,
            "sync pass complete"
        );
        Ok(result)
    }
}
