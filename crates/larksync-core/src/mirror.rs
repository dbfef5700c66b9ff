//! Mirror persistence: the store abstraction the reconciler writes
//! through, and its PostgREST implementation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{compact_body, sanitize, Error, Result};
use crate::models::CanonicalRow;

/// Generic persistence interface for the mirror table.
///
/// Upsert semantics are insert-or-replace-whole-row keyed on
/// `record_id`: a colliding row is overwritten with the freshly mapped
/// remote data, never merged column by column. The reconciler owns the
/// decision of what to write; implementations own durability only.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Read the full set of `record_id` values currently persisted.
    async fn select_ids(&self) -> Result<Vec<String>>;

    /// Batch-write rows, replacing any existing row with the same
    /// `record_id`. Callers never pass an empty batch.
    async fn upsert(&self, rows: &[CanonicalRow]) -> Result<()>;

    /// Batch-delete rows by `record_id`. Callers never pass an empty set.
    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Connection settings for the PostgREST mirror table.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgrestConfig {
    /// Project base URL, e.g. `https://project.supabase.co`.
    pub url: String,
    /// Service-role key, sent as both `apikey` and bearer token.
    pub service_key: String,
    pub table: String,
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PostgrestConfig")
            .field("url", &self.url)
            .field("service_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

/// [`MirrorStore`] backed by a PostgREST table endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: reqwest::Client,
    config: PostgrestConfig,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig) -> Result<Self> {
        if !crate::util::is_http_url(&config.url) {
            return Err(Error::Config(
                "mirror URL must start with http:// or https://".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Config(sanitize(&error)))?;
        Ok(Self {
            client,
            config: PostgrestConfig {
                url: config.url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.config.table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    async fn check(response: reqwest::Response, operation: &str) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Persistence(format!(
            "{operation} failed with HTTP {status}: {}",
            compact_body(&body)
        )))
    }
}

#[derive(Debug, Deserialize)]
struct RecordIdRow {
    record_id: String,
}

#[async_trait]
impl MirrorStore for PostgrestStore {
    async fn select_ids(&self) -> Result<Vec<String>> {
        let response = self
            .authorize(self.client.get(self.table_url()))
            .query(&[("select", "record_id")])
            .send()
            .await
            .map_err(|error| Error::Persistence(sanitize(&error)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Persistence(format!(
                "select failed with HTTP {status}: {}",
                compact_body(&body)
            )));
        }

        let rows = response
            .json::<Vec<RecordIdRow>>()
            .await
            .map_err(|error| Error::Persistence(sanitize(&error)))?;
        Ok(rows.into_iter().map(|row| row.record_id).collect())
    }

    async fn upsert(&self, rows: &[CanonicalRow]) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.table_url()))
            // merge-duplicates makes the POST a replace-whole-row upsert
            // on the record_id conflict key.
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows)
            .send()
            .await
            .map_err(|error| Error::Persistence(sanitize(&error)))?;
        Self::check(response, "upsert").await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let encoded: Vec<String> = ids
            .iter()
            .map(|id| urlencoding::encode(id).into_owned())
            .collect();
        let url = format!("{}?record_id=in.({})", self.table_url(), encoded.join(","));
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(|error| Error::Persistence(sanitize(&error)))?;
        Self::check(response, "delete").await
    }
}
