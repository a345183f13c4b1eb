use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::{Validate, ValidationError};

use crate::{
    entities::{
        formula, formula_nested_formula, formula_raw_material, labeling_material, product,
        product_formula, product_labeling_material, product_raw_material, raw_material,
        unit_of_measure,
    },
    errors::ServiceError,
    services::{
        composition::{load_composition, CompositionLine},
        cost_rollup::{not_found, CostRollupEngine, EntityKind},
        dependency_graph::{CostNode, DependencyGraph},
    },
};

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewUnit {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewMaterial {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(custom = "validate_non_negative")]
    pub unit_cost: Decimal,
    /// Ignored for labeling materials.
    #[serde(default)]
    pub unit_of_measure_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct MaterialUpdate {
    #[validate(length(min = 1, max = 64))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub unit_cost: Option<Decimal>,
    pub unit_of_measure_id: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewFormula {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub unit_of_measure_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct FormulaUpdate {
    #[validate(length(min = 1, max = 64))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub unit_of_measure_id: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub client_id: Option<i32>,
    #[serde(default)]
    pub zone_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub client_id: Option<i32>,
    pub zone_id: Option<i32>,
    pub active: Option<bool>,
}

/// List filters shared by every catalog collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFilter {
    /// Substring match on code or name.
    pub search: Option<String>,
    pub active: Option<bool>,
    /// Products only.
    pub client_id: Option<i32>,
    /// Products only.
    pub zone_id: Option<i32>,
}

impl CatalogFilter {
    fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FormulaDetail {
    #[serde(flatten)]
    pub formula: formula::Model,
    pub composition: Vec<CompositionLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: product::Model,
    pub composition: Vec<CompositionLine>,
}

/// Units, materials, formulas and products.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    engine: Arc<CostRollupEngine>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, engine: Arc<CostRollupEngine>) -> Self {
        Self { db, engine }
    }

    // Units of measure

    #[instrument(skip(self))]
    pub async fn create_unit(&self, input: NewUnit) -> Result<unit_of_measure::Model, ServiceError> {
        input.validate()?;
        let code = input.code.clone();

        let created = unit_of_measure::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write_error(e, &format!("Unit of measure {}", code)))?;

        info!(id = created.id, code = %created.code, "unit of measure created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn list_units(&self) -> Result<Vec<unit_of_measure::Model>, ServiceError> {
        unit_of_measure::Entity::find()
            .order_by_asc(unit_of_measure::Column::Code)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    // Raw materials

    #[instrument(skip(self))]
    pub async fn create_raw_material(
        &self,
        input: NewMaterial,
    ) -> Result<raw_material::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        ensure_unit(db, input.unit_of_measure_id).await?;
        let code = input.code.clone();

        let created = raw_material::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            unit_cost: Set(input.unit_cost),
            unit_of_measure_id: Set(input.unit_of_measure_id),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| ServiceError::from_write_error(e, &format!("Raw material {}", code)))?;

        info!(id = created.id, code = %created.code, "raw material created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_raw_material(&self, id: i32) -> Result<raw_material::Model, ServiceError> {
        find_raw_material(&*self.db, id).await
    }

    #[instrument(skip(self))]
    pub async fn list_raw_materials(
        &self,
        filter: CatalogFilter,
    ) -> Result<Vec<raw_material::Model>, ServiceError> {
        let mut query = raw_material::Entity::find();
        if let Some(term) = filter.search_term() {
            query = query.filter(
                Condition::any()
                    .add(raw_material::Column::Code.contains(term))
                    .add(raw_material::Column::Name.contains(term)),
            );
        }
        if let Some(active) = filter.active {
            query = query.filter(raw_material::Column::Active.eq(active));
        }

        query
            .order_by_asc(raw_material::Column::Code)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Updates a raw material. A new unit cost or active flag marks every
    /// formula and product using it stale.
    #[instrument(skip(self))]
    pub async fn update_raw_material(
        &self,
        id: i32,
        update: MaterialUpdate,
    ) -> Result<raw_material::Model, ServiceError> {
        update.validate()?;
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let existing = find_raw_material(&txn, id).await?;
        ensure_unit(&txn, update.unit_of_measure_id).await?;

        let affects_cost = update.unit_cost.map_or(false, |c| c != existing.unit_cost)
            || update.active.map_or(false, |a| a != existing.active);

        let mut model: raw_material::ActiveModel = existing.into();
        if let Some(code) = update.code {
            model.code = Set(code);
        }
        if let Some(name) = update.name {
            model.name = Set(name);
        }
        if let Some(unit_cost) = update.unit_cost {
            model.unit_cost = Set(unit_cost);
        }
        if let Some(uom) = update.unit_of_measure_id {
            model.unit_of_measure_id = Set(Some(uom));
        }
        if let Some(active) = update.active {
            model.active = Set(active);
        }

        let updated = model
            .update(&txn)
            .await
            .map_err(|e| ServiceError::from_write_error(e, "Raw material code"))?;

        if affects_cost {
            let users = raw_material_users(&txn, id).await?;
            self.settle(&txn, users).await?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, affects_cost, "raw material updated");
        Ok(updated)
    }

    /// Deletes a raw material. Composition lines that point at it stay in
    /// place and surface as dangling references on the next rollup.
    #[instrument(skip(self))]
    pub async fn delete_raw_material(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        find_raw_material(&txn, id).await?;
        raw_material::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let users = raw_material_users(&txn, id).await?;
        self.settle(&txn, users).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, "raw material deleted");
        Ok(())
    }

    // Labeling materials

    #[instrument(skip(self))]
    pub async fn create_labeling_material(
        &self,
        input: NewMaterial,
    ) -> Result<labeling_material::Model, ServiceError> {
        input.validate()?;
        let code = input.code.clone();

        let created = labeling_material::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            unit_cost: Set(input.unit_cost),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write_error(e, &format!("Labeling material {}", code)))?;

        info!(id = created.id, code = %created.code, "labeling material created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_labeling_material(
        &self,
        id: i32,
    ) -> Result<labeling_material::Model, ServiceError> {
        find_labeling_material(&*self.db, id).await
    }

    #[instrument(skip(self))]
    pub async fn list_labeling_materials(
        &self,
        filter: CatalogFilter,
    ) -> Result<Vec<labeling_material::Model>, ServiceError> {
        let mut query = labeling_material::Entity::find();
        if let Some(term) = filter.search_term() {
            query = query.filter(
                Condition::any()
                    .add(labeling_material::Column::Code.contains(term))
                    .add(labeling_material::Column::Name.contains(term)),
            );
        }
        if let Some(active) = filter.active {
            query = query.filter(labeling_material::Column::Active.eq(active));
        }

        query
            .order_by_asc(labeling_material::Column::Code)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn update_labeling_material(
        &self,
        id: i32,
        update: MaterialUpdate,
    ) -> Result<labeling_material::Model, ServiceError> {
        update.validate()?;
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let existing = find_labeling_material(&txn, id).await?;
        let affects_cost = update.unit_cost.map_or(false, |c| c != existing.unit_cost)
            || update.active.map_or(false, |a| a != existing.active);

        let mut model: labeling_material::ActiveModel = existing.into();
        if let Some(code) = update.code {
            model.code = Set(code);
        }
        if let Some(name) = update.name {
            model.name = Set(name);
        }
        if let Some(unit_cost) = update.unit_cost {
            model.unit_cost = Set(unit_cost);
        }
        if let Some(active) = update.active {
            model.active = Set(active);
        }

        let updated = model
            .update(&txn)
            .await
            .map_err(|e| ServiceError::from_write_error(e, "Labeling material code"))?;

        if affects_cost {
            let users = labeling_material_users(&txn, id).await?;
            self.settle(&txn, users).await?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, affects_cost, "labeling material updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_labeling_material(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        find_labeling_material(&txn, id).await?;
        labeling_material::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let users = labeling_material_users(&txn, id).await?;
        self.settle(&txn, users).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, "labeling material deleted");
        Ok(())
    }

    // Formulas

    #[instrument(skip(self))]
    pub async fn create_formula(&self, input: NewFormula) -> Result<formula::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        ensure_unit(db, input.unit_of_measure_id).await?;
        let code = input.code.clone();

        let created = formula::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            unit_of_measure_id: Set(input.unit_of_measure_id),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| ServiceError::from_write_error(e, &format!("Formula {}", code)))?;

        info!(id = created.id, code = %created.code, "formula created");
        Ok(created)
    }

    /// Formula with its current composition.
    #[instrument(skip(self))]
    pub async fn get_formula(&self, id: i32) -> Result<FormulaDetail, ServiceError> {
        let db = &*self.db;
        let formula = find_formula(db, id).await?;
        let composition = load_composition(db, id, EntityKind::Formula).await?;
        Ok(FormulaDetail {
            formula,
            composition: composition.lines,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_formulas(
        &self,
        filter: CatalogFilter,
    ) -> Result<Vec<formula::Model>, ServiceError> {
        let mut query = formula::Entity::find();
        if let Some(term) = filter.search_term() {
            query = query.filter(
                Condition::any()
                    .add(formula::Column::Code.contains(term))
                    .add(formula::Column::Name.contains(term)),
            );
        }
        if let Some(active) = filter.active {
            query = query.filter(formula::Column::Active.eq(active));
        }

        query
            .order_by_asc(formula::Column::Code)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Updates formula metadata. Toggling `active` marks the composites
    /// embedding it stale, since they price inactive formulas as dangling.
    #[instrument(skip(self))]
    pub async fn update_formula(
        &self,
        id: i32,
        update: FormulaUpdate,
    ) -> Result<formula::Model, ServiceError> {
        update.validate()?;
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let existing = find_formula(&txn, id).await?;
        ensure_unit(&txn, update.unit_of_measure_id).await?;
        let active_changed = update.active.map_or(false, |a| a != existing.active);

        let mut model: formula::ActiveModel = existing.into();
        if let Some(code) = update.code {
            model.code = Set(code);
        }
        if let Some(name) = update.name {
            model.name = Set(name);
        }
        if let Some(uom) = update.unit_of_measure_id {
            model.unit_of_measure_id = Set(Some(uom));
        }
        if let Some(active) = update.active {
            model.active = Set(active);
        }

        let updated = model
            .update(&txn)
            .await
            .map_err(|e| ServiceError::from_write_error(e, "Formula code"))?;

        if active_changed {
            let graph = DependencyGraph::load(&txn).await?;
            let parents = graph.parents_of(CostNode::Formula(id));
            self.engine.settle(&txn, &graph, parents).await?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, "formula updated");
        Ok(updated)
    }

    /// Deletes a formula and its own composition. Lines in other formulas or
    /// products that used it are left dangling.
    #[instrument(skip(self))]
    pub async fn delete_formula(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        find_formula(&txn, id).await?;
        let graph = DependencyGraph::load(&txn).await?;
        let parents = graph.parents_of(CostNode::Formula(id));

        formula_raw_material::Entity::delete_many()
            .filter(formula_raw_material::Column::FormulaId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        formula_nested_formula::Entity::delete_many()
            .filter(formula_nested_formula::Column::ParentFormulaId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        formula::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        self.engine.settle(&txn, &graph, parents).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, "formula deleted");
        Ok(())
    }

    // Products

    #[instrument(skip(self))]
    pub async fn create_product(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let created = product::ActiveModel {
            name: Set(input.name),
            client_id: Set(input.client_id),
            zone_id: Set(input.zone_id),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(id = created.id, name = %created.name, "product created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i32) -> Result<ProductDetail, ServiceError> {
        let db = &*self.db;
        let product = product::Entity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(EntityKind::Product, id))?;
        let composition = load_composition(db, id, EntityKind::Product).await?;
        Ok(ProductDetail {
            product,
            composition: composition.lines,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: CatalogFilter,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = product::Entity::find();
        if let Some(term) = filter.search_term() {
            query = query.filter(product::Column::Name.contains(term));
        }
        if let Some(active) = filter.active {
            query = query.filter(product::Column::Active.eq(active));
        }
        if let Some(client_id) = filter.client_id {
            query = query.filter(product::Column::ClientId.eq(client_id));
        }
        if let Some(zone_id) = filter.zone_id {
            query = query.filter(product::Column::ZoneId.eq(zone_id));
        }

        query
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: i32,
        update: ProductUpdate,
    ) -> Result<product::Model, ServiceError> {
        update.validate()?;
        let db = &*self.db;

        let existing = product::Entity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(EntityKind::Product, id))?;

        let mut model: product::ActiveModel = existing.into();
        if let Some(name) = update.name {
            model.name = Set(name);
        }
        if let Some(client_id) = update.client_id {
            model.client_id = Set(Some(client_id));
        }
        if let Some(zone_id) = update.zone_id {
            model.zone_id = Set(Some(zone_id));
        }
        if let Some(active) = update.active {
            model.active = Set(active);
        }

        let updated = model.update(db).await.map_err(ServiceError::db_error)?;
        info!(id, "product updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        product::Entity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(EntityKind::Product, id))?;

        product_formula::Entity::delete_many()
            .filter(product_formula::Column::ProductId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        product_raw_material::Entity::delete_many()
            .filter(product_raw_material::Column::ProductId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        product_labeling_material::Entity::delete_many()
            .filter(product_labeling_material::Column::ProductId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        product::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(id, "product deleted");
        Ok(())
    }

    async fn settle<C>(&self, conn: &C, users: BTreeSet<CostNode>) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        if users.is_empty() {
            return Ok(());
        }
        let graph = DependencyGraph::load(conn).await?;
        self.engine.settle(conn, &graph, users).await?;
        Ok(())
    }
}

async fn ensure_unit<C>(conn: &C, unit_id: Option<i32>) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let Some(unit_id) = unit_id else {
        return Ok(());
    };
    let exists = unit_of_measure::Entity::find_by_id(unit_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .is_some();
    if !exists {
        return Err(ServiceError::ValidationError(format!(
            "Unit of measure {} does not exist",
            unit_id
        )));
    }
    Ok(())
}

async fn find_raw_material<C>(conn: &C, id: i32) -> Result<raw_material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    raw_material::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Raw material {} not found", id)))
}

async fn find_labeling_material<C>(
    conn: &C,
    id: i32,
) -> Result<labeling_material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    labeling_material::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Labeling material {} not found", id)))
}

async fn find_formula<C>(conn: &C, id: i32) -> Result<formula::Model, ServiceError>
where
    C: ConnectionTrait,
{
    formula::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| not_found(EntityKind::Formula, id))
}

/// Formulas and products with a line pointing at the raw material.
async fn raw_material_users<C>(conn: &C, id: i32) -> Result<BTreeSet<CostNode>, ServiceError>
where
    C: ConnectionTrait,
{
    let formulas: Vec<i32> = formula_raw_material::Entity::find()
        .select_only()
        .column(formula_raw_material::Column::FormulaId)
        .filter(formula_raw_material::Column::RawMaterialId.eq(id))
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    let products: Vec<i32> = product_raw_material::Entity::find()
        .select_only()
        .column(product_raw_material::Column::ProductId)
        .filter(product_raw_material::Column::RawMaterialId.eq(id))
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(formulas
        .into_iter()
        .map(CostNode::Formula)
        .chain(products.into_iter().map(CostNode::Product))
        .collect())
}

async fn labeling_material_users<C>(conn: &C, id: i32) -> Result<BTreeSet<CostNode>, ServiceError>
where
    C: ConnectionTrait,
{
    let products: Vec<i32> = product_labeling_material::Entity::find()
        .select_only()
        .column(product_labeling_material::Column::ProductId)
        .filter(product_labeling_material::Column::LabelingMaterialId.eq(id))
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(products.into_iter().map(CostNode::Product).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_unit_cost_fails_validation() {
        let input = NewMaterial {
            code: "RM-1".into(),
            name: "Aloe".into(),
            unit_cost: dec!(-0.01),
            unit_of_measure_id: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn zero_unit_cost_is_allowed() {
        let input = NewMaterial {
            code: "RM-1".into(),
            name: "Water".into(),
            unit_cost: Decimal::ZERO,
            unit_of_measure_id: None,
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn empty_code_fails_validation() {
        let input = NewFormula {
            code: String::new(),
            name: "Base Mix".into(),
            unit_of_measure_id: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn blank_search_is_ignored() {
        let filter = CatalogFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(filter.search_term(), None);

        let filter = CatalogFilter {
            search: Some(" aloe ".into()),
            ..Default::default()
        };
        assert_eq!(filter.search_term(), Some("aloe"));
    }
}
