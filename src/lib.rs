//! Herbax costing library
//!
//! Catalog of raw materials, labeling materials, formulas and products, and
//! the bill-of-materials cost rollup that derives formula and product costs
//! from their composition.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires services for `db` using the costing settings in `config`.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> Result<Self, errors::ServiceError> {
        let options = services::cost_rollup::CostingOptions::try_from(&config)?;
        let services = handlers::AppServices::new(db.clone(), options);
        Ok(Self {
            db,
            config,
            services,
        })
    }
}

/// Response envelope shared by every endpoint: `{ success, data?, error? }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }

    /// Success without a payload.
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

/// Routes served under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/units", handlers::catalog::unit_routes())
        .nest("/raw-materials", handlers::catalog::raw_material_routes())
        .nest(
            "/labeling-materials",
            handlers::catalog::labeling_material_routes(),
        )
        .nest("/formulas", handlers::formulas::formula_routes())
        .nest("/products", handlers::products::product_routes())
        .nest("/costs", handlers::costs::cost_routes())
        .nest("/cost-graph", handlers::costs::cost_graph_routes())
}

/// Full application router with state applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_omits_error() {
        let body = serde_json::to_value(ApiResponse::success(6.0)).unwrap();
        assert_eq!(body, json!({ "success": true, "data": 6.0 }));
    }

    #[test]
    fn error_envelope_omits_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error("Formula 9 not found".into()))
            .unwrap();
        assert_eq!(
            body,
            json!({ "success": false, "error": "Formula 9 not found" })
        );
    }

    #[test]
    fn empty_envelope_is_bare_success() {
        let body = serde_json::to_value(ApiResponse::<()>::empty()).unwrap();
        assert_eq!(body, json!({ "success": true }));
    }
}
