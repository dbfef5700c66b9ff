use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use larksync_core::{BitableConfig, MapperOptions, MultiValuePolicy, PostgrestConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub lark_host: String,
    pub lark_app_id: String,
    pub lark_app_secret: String,
    pub lark_base_token: String,
    pub lark_table_id: String,
    /// Optional server-side record filter. When set, records it
    /// excludes are treated as deleted by the reconciler.
    pub lark_record_filter: Option<String>,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub supabase_table: String,
    /// Fixed zone for rendering the `time` column, independent of the
    /// host zone.
    pub tz: FixedOffset,
    pub multi_value_policy: MultiValuePolicy,
    /// When set, a background task runs a pass per tick.
    pub sync_interval: Option<Duration>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("lark_host", &self.lark_host)
            .field("lark_app_id", &self.lark_app_id)
            .field("lark_app_secret", &"[REDACTED]")
            .field("lark_base_token", &self.lark_base_token)
            .field("lark_table_id", &self.lark_table_id)
            .field("lark_record_filter", &self.lark_record_filter)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_service_key", &"[REDACTED]")
            .field("supabase_table", &self.supabase_table)
            .field("tz", &self.tz)
            .field("multi_value_policy", &self.multi_value_policy)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "LARKSYNC_BIND_ADDR", "127.0.0.1:8080");

        let lark_host = value_or_default(&lookup, "LARK_HOST", "https://open.larksuite.com");
        if !is_http_url(&lark_host) {
            return Err(ConfigError::Invalid(
                "LARK_HOST must start with http:// or https://".to_string(),
            ));
        }
        let lark_app_id = required_trimmed(&lookup, "LARK_APP_ID")?;
        let lark_app_secret = required_trimmed(&lookup, "LARK_APP_SECRET")?;
        let lark_base_token = required_trimmed(&lookup, "LARK_BASE_TOKEN")?;
        let lark_table_id = required_trimmed(&lookup, "LARK_TABLE_ID")?;
        let lark_record_filter = optional_trimmed(&lookup, "LARK_RECORD_FILTER");

        let supabase_url = required_trimmed(&lookup, "SUPABASE_URL")?;
        if !is_http_url(&supabase_url) {
            return Err(ConfigError::Invalid(
                "SUPABASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let supabase_service_key = required_trimmed(&lookup, "SUPABASE_SERVICE_KEY")?;
        let supabase_table = value_or_default(&lookup, "SUPABASE_TABLE", "TimDoSinhVien");

        let tz = value_or_default(&lookup, "SYNC_TZ_OFFSET", "+07:00")
            .parse::<FixedOffset>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "SYNC_TZ_OFFSET must be a UTC offset like +07:00".to_string(),
                )
            })?;

        let multi_value_policy = value_or_default(&lookup, "MULTI_VALUE_POLICY", "first")
            .parse::<MultiValuePolicy>()
            .map_err(|_| {
                ConfigError::Invalid("MULTI_VALUE_POLICY must be 'first' or 'join'".to_string())
            })?;

        let sync_interval = match optional_trimmed(&lookup, "SYNC_INTERVAL_SECS") {
            None => None,
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    ConfigError::Invalid(
                        "SYNC_INTERVAL_SECS must be an integer in [30, 86400]".to_string(),
                    )
                })?;
                if !(30..=86_400).contains(&secs) {
                    return Err(ConfigError::Invalid(
                        "SYNC_INTERVAL_SECS must be in [30, 86400]".to_string(),
                    ));
                }
                Some(Duration::from_secs(secs))
            }
        };

        Ok(Self {
            bind_addr,
            lark_host,
            lark_app_id,
            lark_app_secret,
            lark_base_token,
            lark_table_id,
            lark_record_filter,
            supabase_url,
            supabase_service_key,
            supabase_table,
            tz,
            multi_value_policy,
            sync_interval,
        })
    }

    pub fn bitable_config(&self) -> BitableConfig {
        BitableConfig {
            host: self.lark_host.clone(),
            app_id: self.lark_app_id.clone(),
            app_secret: self.lark_app_secret.clone(),
            base_token: self.lark_base_token.clone(),
            table_id: self.lark_table_id.clone(),
        }
    }

    pub fn postgrest_config(&self) -> PostgrestConfig {
        PostgrestConfig {
            url: self.supabase_url.clone(),
            service_key: self.supabase_service_key.clone(),
            table: self.supabase_table.clone(),
        }
    }

    pub const fn mapper_options(&self) -> MapperOptions {
        MapperOptions {
            tz: self.tz,
            policy: self.multi_value_policy,
        }
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
