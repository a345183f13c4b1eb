use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde::Serialize;
use tracing::warn;

use super::common::success_response;
use crate::{db, errors::ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Reports service liveness and database reachability.
async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    db::check_connection(&state.db).await.map_err(|e| {
        warn!(error = %e, "health check failed");
        ApiError::ServiceError(e)
    })?;

    Ok(success_response(HealthStatus {
        status: "ok",
        database: "connected",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
