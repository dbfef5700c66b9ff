use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the HTTP trigger. Every sync failure maps to a
/// structured `{"success": false, "error": …}` body with a non-2xx
/// status; retry is the scheduler's responsibility, never performed
/// here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sync(#[from] larksync_core::Error),
}

#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Sync(larksync_core::Error::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Sync(_) => StatusCode::BAD_GATEWAY,
        };
        let body = FailureBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        let response =
            ApiError::from(larksync_core::Error::Fetch("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn config_errors_map_to_internal_error() {
        let response =
            ApiError::from(larksync_core::Error::Config("missing".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
