use super::common::{
    created_response, deleted_response, map_service_error, success_response, validate_input,
    AddComponentRequest, UpdateQuantityRequest,
};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::{
        catalog::{CatalogFilter, FormulaUpdate, NewFormula},
        composition::ComponentSlot,
        cost_rollup::EntityKind,
    },
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tracing::info;

/// Creates the router for formula endpoints
pub fn formula_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_formulas).post(create_formula))
        .route(
            "/:id",
            get(get_formula).put(update_formula).delete(delete_formula),
        )
        .route("/:id/:slot", post(add_component))
        .route(
            "/:id/:slot/:line_id",
            put(update_component_quantity).delete(remove_component),
        )
}

async fn list_formulas(
    State(state): State<AppState>,
    Query(filter): Query<CatalogFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let formulas = state
        .services
        .catalog
        .list_formulas(filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(formulas))
}

async fn create_formula(
    State(state): State<AppState>,
    Json(payload): Json<NewFormula>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let formula = state
        .services
        .catalog
        .create_formula(payload)
        .await
        .map_err(map_service_error)?;
    info!("Formula created: {}", formula.id);
    Ok(created_response(formula))
}

/// Formula with its composition lines
async fn get_formula(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .catalog
        .get_formula(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(detail))
}

async fn update_formula(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<FormulaUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let formula = state
        .services
        .catalog
        .update_formula(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(formula))
}

async fn delete_formula(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .catalog
        .delete_formula(id)
        .await
        .map_err(map_service_error)?;
    info!("Formula deleted: {}", id);
    Ok(deleted_response())
}

/// Adds a raw material (`/raw-materials`) or nested formula (`/formulas`) line
async fn add_component(
    State(state): State<AppState>,
    Path((id, slot)): Path<(i32, String)>,
    Json(payload): Json<AddComponentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let slot = ComponentSlot::from_segment(EntityKind::Formula, &slot).map_err(map_service_error)?;
    let change = state
        .services
        .composition
        .add_component(id, slot, payload.component_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(change))
}

async fn update_component_quantity(
    State(state): State<AppState>,
    Path((id, slot, line_id)): Path<(i32, String, i32)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let slot = ComponentSlot::from_segment(EntityKind::Formula, &slot).map_err(map_service_error)?;
    let change = state
        .services
        .composition
        .update_quantity(id, slot, line_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(change))
}

async fn remove_component(
    State(state): State<AppState>,
    Path((id, slot, line_id)): Path<(i32, String, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = ComponentSlot::from_segment(EntityKind::Formula, &slot).map_err(map_service_error)?;
    let change = state
        .services
        .composition
        .remove_component(id, slot, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(change))
}
