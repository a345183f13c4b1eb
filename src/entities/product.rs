use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};

/// A sellable item built from formulas, raw materials and labeling materials.
///
/// Cost breakdown columns:
/// * `mp`: raw material part (formula lines plus direct raw material lines)
/// * `me`: packaging part (labeling material lines)
/// * `ms`: overhead part, `mp * me * overhead_rate`
/// * `cost`: `mp + me + ms`
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub client_id: Option<i32>,
    pub zone_id: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub mp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub me: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub ms: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub mp_percentage: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub me_percentage: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub ms_percentage: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub cost: Decimal,
    pub cost_stale: bool,
    pub cost_updated_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_formula::Entity")]
    FormulaLines,
    #[sea_orm(has_many = "super::product_raw_material::Entity")]
    RawMaterialLines,
    #[sea_orm(has_many = "super::product_labeling_material::Entity")]
    LabelingMaterialLines,
}

impl Related<super::product_formula::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FormulaLines.def()
    }
}

impl Related<super::product_raw_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawMaterialLines.def()
    }
}

impl Related<super::product_labeling_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LabelingMaterialLines.def()
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
            for value in [
                &mut self.mp,
                &mut self.me,
                &mut self.ms,
                &mut self.mp_percentage,
                &mut self.me_percentage,
                &mut self.ms_percentage,
                &mut self.cost,
            ] {
                if let ActiveValue::NotSet = value {
                    *value = ActiveValue::Set(Decimal::ZERO);
                }
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
