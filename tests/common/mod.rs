#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use herbax_costing::{
    app_router,
    config::{AppConfig, DanglingPolicy, PropagationMode},
    db::{self, DbConfig},
    entities::{formula, product},
    services::{
        catalog::{CatalogService, NewFormula, NewMaterial, NewProduct},
        composition::{ComponentSlot, CompositionService},
        cost_rollup::{CostRollupEngine, CostingOptions},
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::Value;
use tower::ServiceExt;

/// Fresh in-memory SQLite database with the schema applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let pool = db::establish_connection_with_config(&DbConfig::in_memory())
        .await
        .expect("failed to open in-memory database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    Arc::new(pool)
}

pub fn options(propagation: PropagationMode, dangling_policy: DanglingPolicy) -> CostingOptions {
    CostingOptions {
        propagation,
        dangling_policy,
        ..Default::default()
    }
}

/// Services wired against one database.
pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub engine: Arc<CostRollupEngine>,
    pub catalog: CatalogService,
    pub composition: CompositionService,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(CostingOptions::default()).await
    }

    pub async fn with_options(options: CostingOptions) -> Self {
        let db = setup_db().await;
        let engine = Arc::new(CostRollupEngine::new(db.clone(), options));
        Self {
            catalog: CatalogService::new(db.clone(), engine.clone()),
            composition: CompositionService::new(db.clone(), engine.clone()),
            engine,
            db,
        }
    }

    /// Another engine over the same database, with different options.
    pub fn engine_with(&self, options: CostingOptions) -> CostRollupEngine {
        CostRollupEngine::new(self.db.clone(), options)
    }

    pub async fn raw_material(&self, code: &str, unit_cost: Decimal) -> i32 {
        self.catalog
            .create_raw_material(NewMaterial {
                code: code.to_string(),
                name: format!("Raw material {}", code),
                unit_cost,
                unit_of_measure_id: None,
            })
            .await
            .expect("create raw material")
            .id
    }

    pub async fn labeling_material(&self, code: &str, unit_cost: Decimal) -> i32 {
        self.catalog
            .create_labeling_material(NewMaterial {
                code: code.to_string(),
                name: format!("Labeling material {}", code),
                unit_cost,
                unit_of_measure_id: None,
            })
            .await
            .expect("create labeling material")
            .id
    }

    pub async fn formula(&self, code: &str, name: &str) -> i32 {
        self.catalog
            .create_formula(NewFormula {
                code: code.to_string(),
                name: name.to_string(),
                unit_of_measure_id: None,
            })
            .await
            .expect("create formula")
            .id
    }

    pub async fn product(&self, name: &str) -> i32 {
        self.catalog
            .create_product(NewProduct {
                name: name.to_string(),
                client_id: None,
                zone_id: None,
            })
            .await
            .expect("create product")
            .id
    }

    /// Adds a composition line and returns its id.
    pub async fn add(
        &self,
        owner_id: i32,
        slot: ComponentSlot,
        component_id: i32,
        quantity: Decimal,
    ) -> i32 {
        self.composition
            .add_component(owner_id, slot, component_id, quantity)
            .await
            .expect("add component")
            .line
            .line_id
    }

    pub async fn formula_row(&self, id: i32) -> formula::Model {
        formula::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query formula")
            .expect("formula exists")
    }

    pub async fn product_row(&self, id: i32) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    /// Stored formula total, normalised to four places.
    pub async fn formula_total(&self, id: i32) -> Decimal {
        self.formula_row(id).await.total_cost.round_dp(4)
    }
}

/// The "Base Mix" / "Final Blend" fixture.
///
/// Base Mix: 2 x A (1.50) + 1 x B (3.00). Final Blend: 3 x Base Mix.
pub struct Blend {
    pub raw_a: i32,
    pub raw_b: i32,
    pub base_mix: i32,
    pub final_blend: i32,
    pub line_a: i32,
    pub line_b: i32,
    pub nested_line: i32,
}

pub async fn seed_blend(h: &Harness) -> Blend {
    use rust_decimal_macros::dec;

    let raw_a = h.raw_material("RM-A", dec!(1.50)).await;
    let raw_b = h.raw_material("RM-B", dec!(3.00)).await;
    let base_mix = h.formula("F-BASE", "Base Mix").await;
    let final_blend = h.formula("F-FINAL", "Final Blend").await;

    let line_a = h
        .add(base_mix, ComponentSlot::FormulaRawMaterial, raw_a, dec!(2))
        .await;
    let line_b = h
        .add(base_mix, ComponentSlot::FormulaRawMaterial, raw_b, dec!(1))
        .await;
    let nested_line = h
        .add(final_blend, ComponentSlot::FormulaNestedFormula, base_mix, dec!(3))
        .await;

    Blend {
        raw_a,
        raw_b,
        base_mix,
        final_blend,
        line_a,
        line_b,
        nested_line,
    }
}

/// HTTP harness around the full router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let db = setup_db().await;
        let state = AppState::new(db, cfg).expect("valid test configuration");
        let router = app_router(state.clone());

        Self { router, state }
    }

    /// Sends a request and returns the status with the decoded JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
