use super::common::{
    created_response, deleted_response, map_service_error, success_response, validate_input,
    AddComponentRequest, UpdateQuantityRequest,
};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::{
        catalog::{CatalogFilter, NewProduct, ProductUpdate},
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

/// Creates the router for product endpoints
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/:slot", post(add_component))
        .route(
            "/:id/:slot/:line_id",
            put(update_component_quantity).delete(remove_component),
        )
}

async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<CatalogFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_products(filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;
    info!("Product created: {}", product.id);
    Ok(created_response(product))
}

/// Product with its cost breakdown and composition lines
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(detail))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ProductUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .catalog
        .delete_product(id)
        .await
        .map_err(map_service_error)?;
    info!("Product deleted: {}", id);
    Ok(deleted_response())
}

/// Adds a formula, raw material or labeling material line
async fn add_component(
    State(state): State<AppState>,
    Path((id, slot)): Path<(i32, String)>,
    Json(payload): Json<AddComponentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let slot = ComponentSlot::from_segment(EntityKind::Product, &slot).map_err(map_service_error)?;
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
    let slot = ComponentSlot::from_segment(EntityKind::Product, &slot).map_err(map_service_error)?;
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
    let slot = ComponentSlot::from_segment(EntityKind::Product, &slot).map_err(map_service_error)?;
    let change = state
        .services
        .composition
        .remove_component(id, slot, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(change))
}
