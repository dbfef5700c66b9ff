//! Error types for larksync-core

use thiserror::Error;

/// Result type alias using larksync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a sync pass.
///
/// Every variant is fatal for the pass it occurs in: the pass aborts
/// immediately and no partial remote data is written. Normalization and
/// mapping never produce errors; malformed fields degrade to `None`.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bitable credential exchange failed
    #[error("Bitable auth error: {0}")]
    Auth(String),

    /// Paginated record listing failed mid-stream
    #[error("Bitable fetch error: {0}")]
    Fetch(String),

    /// Mirror select/upsert/delete failed
    #[error("Mirror persistence error: {0}")]
    Persistence(String),
}

/// Flatten an error's display into a single sanitized line.
pub(crate) fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

/// Truncate a response body to at most 180 characters for error messages.
pub(crate) fn compact_body(body: &str) -> String {
    body.trim().chars().take(180).collect()
}
