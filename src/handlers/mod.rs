pub mod catalog;
pub mod common;
pub mod costs;
pub mod formulas;
pub mod health;
pub mod products;

use std::sync::Arc;

use crate::{
    db::DbPool,
    services::{
        catalog::CatalogService,
        composition::CompositionService,
        cost_rollup::{CostRollupEngine, CostingOptions},
    },
};

pub use crate::AppState;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub composition: Arc<CompositionService>,
    pub costs: Arc<CostRollupEngine>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, options: CostingOptions) -> Self {
        let costs = Arc::new(CostRollupEngine::new(db_pool.clone(), options));
        let catalog = Arc::new(CatalogService::new(db_pool.clone(), costs.clone()));
        let composition = Arc::new(CompositionService::new(db_pool, costs.clone()));

        Self {
            catalog,
            composition,
            costs,
        }
    }
}
