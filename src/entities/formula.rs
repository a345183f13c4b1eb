use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};

/// A recipe made of raw materials and other formulas.
///
/// `total_cost` is derived by the rollup engine and never written by callers.
/// `cost_stale` is raised whenever something the total depends on changes and
/// cleared by the next recompute.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "formulas")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub unit_of_measure_id: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_cost: Decimal,
    pub cost_stale: bool,
    pub cost_updated_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::formula_raw_material::Entity")]
    RawMaterialLines,
}

impl Related<super::formula_raw_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawMaterialLines.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(now);
            }
            if let ActiveValue::NotSet = self.total_cost {
                self.total_cost = ActiveValue::Set(Decimal::ZERO);
            }
            if let ActiveValue::NotSet = self.cost_stale {
                self.cost_stale = ActiveValue::Set(false);
            }
            if let ActiveValue::NotSet = self.cost_updated_at {
                self.cost_updated_at = ActiveValue::Set(None);
            }
            if let ActiveValue::NotSet = self.active {
                self.active = ActiveValue::Set(true);
            }
        }

        self.updated_at = ActiveValue::Set(now);

        Ok(self)
    }
}
