use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use larksync_core::{BitableClient, PostgrestStore, SyncEngine, SyncResult};

use crate::config::AppConfig;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<SyncEngine>,
}

impl AppState {
    /// Wire the sync engine from configuration. Fails when an endpoint
    /// URL is malformed or the HTTP client cannot be built.
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, larksync_core::Error> {
        let bitable = BitableClient::new(config.bitable_config())?;
        let store = PostgrestStore::new(config.postgrest_config())?;
        let engine = SyncEngine::new(
            bitable,
            Arc::new(store),
            config.mapper_options(),
            config.lark_record_filter.clone(),
        );
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sync", get(run_sync).post(run_sync))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    success: bool,
    synced: usize,
    deleted: usize,
}

impl From<SyncResult> for SyncResponse {
    fn from(result: SyncResult) -> Self {
        Self {
            success: true,
            synced: result.synced,
            deleted: result.deleted,
        }
    }
}

/// Run one sync pass. Overlap protection is the trigger's job (cron
/// schedulers should enforce a single active invocation); concurrent
/// requests here will race on the mirror.
async fn run_sync(State(state): State<AppState>) -> Result<Json<SyncResponse>, ApiError> {
    let result = state.engine.run_pass().await.inspect_err(|error| {
        tracing::error!(error = %error, "sync pass failed");
    })?;
    tracing::info!(
        synced = result.synced,
        deleted = result.deleted,
        "sync pass triggered over HTTP"
    );
    Ok(Json(result.into()))
}
