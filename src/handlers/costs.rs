use std::str::FromStr;

use super::common::{map_service_error, success_response};
use crate::{
    errors::{ApiError, ServiceError},
    handlers::AppState,
    services::cost_rollup::EntityKind,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use rust_decimal::prelude::ToPrimitive;
use tracing::info;

/// Cost recompute endpoints, mounted under `/costs`
pub fn cost_routes() -> Router<AppState> {
    Router::new()
        .route("/:kind/:id/recompute", post(recompute_cost))
        .route("/:kind/:id/rollup", post(recompute_rollup))
        .route("/:kind/:id/propagate", post(propagate_cost))
}

/// Whole-graph recompute, mounted under `/cost-graph`
pub fn cost_graph_routes() -> Router<AppState> {
    Router::new().route("/recompute", post(recompute_all))
}

fn parse_kind(kind: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_str(kind).map_err(|_| {
        ApiError::BadRequest(format!(
            "Unknown cost entity kind '{}', expected formula or product",
            kind
        ))
    })
}

/// Recomputes one entity and returns the new cost as a number
async fn recompute_cost(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let rollup = state
        .services
        .costs
        .recompute_cost(id, kind)
        .await
        .map_err(map_service_error)?;

    let cost = rollup.total_cost.to_f64().ok_or_else(|| {
        ApiError::ServiceError(ServiceError::InternalError(format!(
            "Cost {} is not representable as a number",
            rollup.total_cost
        )))
    })?;
    Ok(success_response(cost))
}

/// Recomputes one entity and returns the full line breakdown
async fn recompute_rollup(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let rollup = state
        .services
        .costs
        .recompute_cost(id, kind)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rollup))
}

/// Recomputes an entity and everything that embeds it
async fn propagate_cost(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let rollups = state
        .services
        .costs
        .recompute_with_dependents(id, kind)
        .await
        .map_err(map_service_error)?;
    info!("Propagated {} {}: {} rollups", kind, id, rollups.len());
    Ok(success_response(rollups))
}

async fn recompute_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rollups = state
        .services
        .costs
        .recompute_all()
        .await
        .map_err(map_service_error)?;
    info!("Recomputed {} costs", rollups.len());
    Ok(success_response(rollups))
}
