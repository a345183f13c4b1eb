use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "formula_raw_materials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub formula_id: i32,
    pub raw_material_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub partial_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::formula::Entity",
        from = "Column::FormulaId",
        to = "super::formula::Column::Id"
    )]
    Formula,
}

impl Related<super::formula::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Formula.def()
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
            if let ActiveValue::NotSet = self.partial_cost {
                self.partial_cost = ActiveValue::Set(Decimal::ZERO);
            }
        }

        self.updated_at = ActiveValue::Set(now);

        Ok(self)
    }
}
