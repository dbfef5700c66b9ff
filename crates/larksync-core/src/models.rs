//! Data model for one sync pass: remote records as fetched from the
//! Bitable and the canonical row shape written to the mirror.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record as returned by the Bitable list endpoint: an opaque id
/// plus a bag of loosely-typed field values.
///
/// Lives for a single sync pass; the mapper turns it into a
/// [`CanonicalRow`] and the raw value is discarded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRecord {
    pub record_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    /// Create a record from an id and raw field bag (test helper and
    /// mapper input construction).
    #[must_use]
    pub fn new(record_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            record_id: record_id.into(),
            fields,
        }
    }
}

/// The fixed-schema row persisted to the mirror table.
///
/// `record_id` is the Bitable record id verbatim and acts as the
/// conflict key across every pass; it is never regenerated. The
/// underscore-prefixed shadow columns are search-normalized copies of
/// their display column and are only ever derived, never set
/// independently. Rows are recomputed in full on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub record_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub group: Option<String>,
    #[serde(rename = "docType")]
    pub doc_type: Option<String>,
    #[serde(rename = "khuVuc")]
    pub khu_vuc: Option<String>,
    /// Calendar date rendered in the configured fixed zone, `YYYY/MM/DD`.
    pub time: Option<String>,
    /// Epoch milliseconds backing `time`.
    #[serde(rename = "timeRaw")]
    pub time_raw: Option<i64>,
    #[serde(rename = "isPinned")]
    pub is_pinned: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: String,
    pub email: Option<String>,
    #[serde(rename = "lienHe")]
    pub lien_he: Option<String>,
    #[serde(rename = "linkFacebook")]
    pub link_facebook: Option<String>,
    #[serde(rename = "_name")]
    pub shadow_name: Option<String>,
    #[serde(rename = "_group")]
    pub shadow_group: Option<String>,
    #[serde(rename = "_docType")]
    pub shadow_doc_type: Option<String>,
    #[serde(rename = "_khuVuc")]
    pub shadow_khu_vuc: Option<String>,
}

/// Counts reported to the caller after a completed pass. Transient,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub synced: usize,
    pub deleted: usize,
}
