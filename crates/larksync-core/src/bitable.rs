//! Bitable remote reader: tenant token exchange with caching, plus the
//! paginated record listing that feeds a sync pass.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{compact_body, sanitize, Error, Result};
use crate::models::RemoteRecord;

/// Maximum page size accepted by the Bitable list endpoint.
const PAGE_SIZE: u32 = 500;

/// Safety margin subtracted from the token TTL so a token is refreshed
/// before the server would reject it mid-pagination.
const TOKEN_TTL_MARGIN_SECS: i64 = 120;

/// Connection settings for one Bitable table.
#[derive(Clone, PartialEq, Eq)]
pub struct BitableConfig {
    /// API host, e.g. `https://open.larksuite.com`.
    pub host: String,
    pub app_id: String,
    pub app_secret: String,
    /// Base (app) token identifying the Bitable.
    pub base_token: String,
    pub table_id: String,
}

impl std::fmt::Debug for BitableConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BitableConfig")
            .field("host", &self.host)
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("base_token", &self.base_token)
            .field("table_id", &self.table_id)
            .finish()
    }
}

/// A cached tenant access token and its refresh deadline (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at_millis: i64,
}

impl CachedToken {
    fn is_fresh(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at_millis
    }
}

/// Shared token cache, injected into the client so its lifetime is
/// explicit and tests can isolate it. Re-entrant refreshes serialize on
/// the mutex; the worst case is one redundant auth call, never a stale
/// token.
pub type TokenCache = Arc<Mutex<Option<CachedToken>>>;

/// HTTP client for one Bitable table.
#[derive(Debug, Clone)]
pub struct BitableClient {
    client: reqwest::Client,
    config: BitableConfig,
    token_cache: TokenCache,
}

impl BitableClient {
    pub fn new(config: BitableConfig) -> Result<Self> {
        Self::with_token_cache(config, Arc::new(Mutex::new(None)))
    }

    /// Build a client around an externally owned token cache.
    pub fn with_token_cache(config: BitableConfig, token_cache: TokenCache) -> Result<Self> {
        if !crate::util::is_http_url(&config.host) {
            return Err(Error::Config(
                "Bitable host must start with http:// or https://".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Config(sanitize(&error)))?;
        Ok(Self {
            client,
            config: BitableConfig {
                host: config.host.trim_end_matches('/').to_string(),
                ..config
            },
            token_cache,
        })
    }

    /// Fetch every record of the table, following `page_token`
    /// continuations until the server reports no further pages.
    ///
    /// `filter` is forwarded verbatim as the server-side predicate and,
    /// when present, is the only gate on which records participate in a
    /// sync: records excluded by it are indistinguishable from deleted
    /// ones downstream.
    pub async fn list_all(&self, filter: Option<&str>) -> Result<Vec<RemoteRecord>> {
        let token = self.tenant_access_token().await?;
        let url = format!(
            "{}/open-apis/bitable/v1/apps/{}/tables/{}/records",
            self.config.host, self.config.base_token, self.config.table_id,
        );

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query: Vec<(&str, String)> = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(continuation) = page_token.as_deref() {
                query.push(("page_token", continuation.to_string()));
            }
            if let Some(predicate) = filter {
                query.push(("filter", predicate.to_string()));
            }

            let response = self
                .client
                .get(&url)
                .query(&query)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|error| Error::Fetch(sanitize(&error)))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Fetch(format!(
                    "record listing failed with HTTP {status}: {}",
                    compact_body(&body)
                )));
            }

            let page = response
                .json::<ListResponse>()
                .await
                .map_err(|error| Error::Fetch(sanitize(&error)))?;
            if page.code != 0 {
                return Err(Error::Fetch(format!(
                    "record listing returned code {}: {}",
                    page.code,
                    page.msg.unwrap_or_default()
                )));
            }

            let data = page.data.unwrap_or_default();
            records.extend(data.items);
            page_token = if data.has_more {
                data.page_token.filter(|token| !token.is_empty())
            } else {
                None
            };
            if page_token.is_none() {
                break;
            }
        }
        Ok(records)
    }

    /// Return a tenant access token, exchanging credentials only when
    /// the cached one has passed its refresh deadline.
    pub async fn tenant_access_token(&self) -> Result<String> {
        let mut guard = self.token_cache.lock().await;
        let now = chrono::Utc::now().timestamp_millis();
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.token.clone());
            }
        }

        let refreshed = self.exchange_credentials(now).await?;
        let token = refreshed.token.clone();
        *guard = Some(refreshed);
        Ok(token)
    }

    async fn exchange_credentials(&self, now_millis: i64) -> Result<CachedToken> {
        let url = format!(
            "{}/open-apis/auth/v3/tenant_access_token/internal",
            self.config.host
        );
        let body = serde_json::json!({
            "app_id": self.config.app_id,
            "app_secret": self.config.app_secret,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::Auth(sanitize(&error)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token exchange failed with HTTP {status}: {}",
                compact_body(&body)
            )));
        }

        let payload = response
            .json::<AuthResponse>()
            .await
            .map_err(|error| Error::Auth(sanitize(&error)))?;
        if payload.code != 0 {
            return Err(Error::Auth(format!(
                "token exchange returned code {}: {}",
                payload.code,
                payload.msg.unwrap_or_default()
            )));
        }

        let token = payload
            .tenant_access_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Auth("response did not include tenant_access_token".to_string()))?;

        let ttl_secs = payload.expire.unwrap_or(3_600).max(TOKEN_TTL_MARGIN_SECS + 1);
        Ok(CachedToken {
            token,
            expires_at_millis: now_millis + (ttl_secs - TOKEN_TTL_MARGIN_SECS) * 1_000,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    code: i64,
    msg: Option<String>,
    tenant_access_token: Option<String>,
    expire: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    code: i64,
    msg: Option<String>,
    data: Option<ListData>,
}

#[derive(Debug, Default, Deserialize)]
struct ListData {
    #[serde(default)]
    items: Vec<RemoteRecord>,
    #[serde(default)]
    has_more: bool,
    page_token: Option<String>,
}
