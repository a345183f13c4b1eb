use super::common::{
    created_response, deleted_response, map_service_error, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::catalog::{CatalogFilter, MaterialUpdate, NewMaterial, NewUnit},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::info;

/// Units of measure
pub fn unit_routes() -> Router<AppState> {
    Router::new().route("/", get(list_units).post(create_unit))
}

/// Raw materials
pub fn raw_material_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_raw_materials).post(create_raw_material))
        .route(
            "/:id",
            get(get_raw_material)
                .put(update_raw_material)
                .delete(delete_raw_material),
        )
}

/// Labeling materials
pub fn labeling_material_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_labeling_materials).post(create_labeling_material))
        .route(
            "/:id",
            get(get_labeling_material)
                .put(update_labeling_material)
                .delete(delete_labeling_material),
        )
}

async fn list_units(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let units = state
        .services
        .catalog
        .list_units()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(units))
}

async fn create_unit(
    State(state): State<AppState>,
    Json(payload): Json<NewUnit>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let unit = state
        .services
        .catalog
        .create_unit(payload)
        .await
        .map_err(map_service_error)?;
    info!("Unit of measure created: {}", unit.code);
    Ok(created_response(unit))
}

async fn list_raw_materials(
    State(state): State<AppState>,
    Query(filter): Query<CatalogFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let materials = state
        .services
        .catalog
        .list_raw_materials(filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(materials))
}

async fn create_raw_material(
    State(state): State<AppState>,
    Json(payload): Json<NewMaterial>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .services
        .catalog
        .create_raw_material(payload)
        .await
        .map_err(map_service_error)?;
    info!("Raw material created: {}", material.id);
    Ok(created_response(material))
}

async fn get_raw_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let material = state
        .services
        .catalog
        .get_raw_material(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(material))
}

async fn update_raw_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<MaterialUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .services
        .catalog
        .update_raw_material(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(material))
}

async fn delete_raw_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .catalog
        .delete_raw_material(id)
        .await
        .map_err(map_service_error)?;
    info!("Raw material deleted: {}", id);
    Ok(deleted_response())
}

async fn list_labeling_materials(
    State(state): State<AppState>,
    Query(filter): Query<CatalogFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let materials = state
        .services
        .catalog
        .list_labeling_materials(filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(materials))
}

async fn create_labeling_material(
    State(state): State<AppState>,
    Json(payload): Json<NewMaterial>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .services
        .catalog
        .create_labeling_material(payload)
        .await
        .map_err(map_service_error)?;
    info!("Labeling material created: {}", material.id);
    Ok(created_response(material))
}

async fn get_labeling_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let material = state
        .services
        .catalog
        .get_labeling_material(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(material))
}

async fn update_labeling_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<MaterialUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let material = state
        .services
        .catalog
        .update_labeling_material(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(material))
}

async fn delete_labeling_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .catalog
        .delete_labeling_material(id)
        .await
        .map_err(map_service_error)?;
    info!("Labeling material deleted: {}", id);
    Ok(deleted_response())
}
