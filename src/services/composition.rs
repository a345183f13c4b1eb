use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use tracing::{info, instrument, warn};

use crate::{
    entities::{
        formula, formula_nested_formula, formula_raw_material, labeling_material, product,
        product_formula, product_labeling_material, product_raw_material, raw_material,
    },
    errors::ServiceError,
    services::{
        cost_rollup::{not_found, ComponentKind, CostRollup, CostRollupEngine, EntityKind},
        dependency_graph::{CostNode, DependencyGraph},
    },
};

/// The five kinds of composition line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentSlot {
    FormulaRawMaterial,
    FormulaNestedFormula,
    ProductFormula,
    ProductRawMaterial,
    ProductLabelingMaterial,
}

impl ComponentSlot {
    pub fn owner_kind(&self) -> EntityKind {
        match self {
            Self::FormulaRawMaterial | Self::FormulaNestedFormula => EntityKind::Formula,
            Self::ProductFormula | Self::ProductRawMaterial | Self::ProductLabelingMaterial => {
                EntityKind::Product
            }
        }
    }

    pub fn component_kind(&self) -> ComponentKind {
        match self {
            Self::FormulaRawMaterial | Self::ProductRawMaterial => ComponentKind::RawMaterial,
            Self::FormulaNestedFormula | Self::ProductFormula => ComponentKind::Formula,
            Self::ProductLabelingMaterial => ComponentKind::LabelingMaterial,
        }
    }

    /// Resolves the URL segment used under `/formulas/:id/` or `/products/:id/`.
    pub fn from_segment(owner: EntityKind, segment: &str) -> Result<Self, ServiceError> {
        let slot = match (owner, segment) {
            (EntityKind::Formula, "raw-materials") => Self::FormulaRawMaterial,
            (EntityKind::Formula, "formulas") => Self::FormulaNestedFormula,
            (EntityKind::Product, "formulas") => Self::ProductFormula,
            (EntityKind::Product, "raw-materials") => Self::ProductRawMaterial,
            (EntityKind::Product, "labeling-materials") => Self::ProductLabelingMaterial,
            _ => {
                return Err(ServiceError::NotFound(format!(
                    "{} has no component collection '{}'",
                    owner, segment
                )))
            }
        };
        Ok(slot)
    }
}

/// A composition line, independent of the table it lives in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositionLine {
    pub line_id: i32,
    pub slot: ComponentSlot,
    pub component_id: i32,
    pub quantity: Decimal,
    pub partial_cost: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct Composition {
    pub owner_id: i32,
    pub kind: EntityKind,
    pub lines: Vec<CompositionLine>,
}

/// Result of a composition mutation.
#[derive(Clone, Debug, Serialize)]
pub struct CompositionChange {
    pub line: CompositionLine,
    /// Owner plus every composite that embeds it; all were marked stale.
    pub affected: Vec<CostNode>,
    /// Rollups run by automatic propagation, leaves first. Empty in manual mode.
    pub recomputed: Vec<CostRollup>,
}

/// Owner id plus the line as stored.
struct StoredLine {
    owner_id: i32,
    line: CompositionLine,
}

/// Edits formula and product compositions.
#[derive(Clone)]
pub struct CompositionService {
    db: Arc<DatabaseConnection>,
    engine: Arc<CostRollupEngine>,
}

impl CompositionService {
    pub fn new(db: Arc<DatabaseConnection>, engine: Arc<CostRollupEngine>) -> Self {
        Self { db, engine }
    }

    /// Adds a line to a formula or product.
    #[instrument(skip(self))]
    pub async fn add_component(
        &self,
        owner_id: i32,
        slot: ComponentSlot,
        component_id: i32,
        quantity: Decimal,
    ) -> Result<CompositionChange, ServiceError> {
        ensure_positive(quantity)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        ensure_active_owner(&txn, slot.owner_kind(), owner_id).await?;
        ensure_active_component(&txn, slot.component_kind(), component_id).await?;

        if slot == ComponentSlot::FormulaNestedFormula {
            let graph = DependencyGraph::load(&txn).await?;
            if graph.would_create_cycle(owner_id, component_id) {
                warn!(owner_id, component_id, "rejected cyclic formula nesting");
                return Err(ServiceError::CycleDetected(format!(
                    "Formula {} cannot nest formula {}: formula {} already contains it",
                    owner_id, component_id, component_id
                )));
            }
        }

        let line = insert_line(&txn, slot, owner_id, component_id, quantity).await?;

        let graph = DependencyGraph::load(&txn).await?;
        let owner = CostNode::new(slot.owner_kind(), owner_id);
        let recomputed = self.engine.settle(&txn, &graph, [owner]).await?;
        let affected = graph.closure_of([owner]).into_iter().collect();

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(owner_id, %slot, line_id = line.line_id, component_id, "component added");
        Ok(CompositionChange {
            line,
            affected,
            recomputed,
        })
    }

    /// Changes the quantity of an existing line.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        owner_id: i32,
        slot: ComponentSlot,
        line_id: i32,
        quantity: Decimal,
    ) -> Result<CompositionChange, ServiceError> {
        ensure_positive(quantity)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let mut line = owned_line(&txn, slot, owner_id, line_id).await?;
        set_line_quantity(&txn, slot, line_id, quantity).await?;
        line.quantity = quantity;

        let (affected, recomputed) = self.settle_owner(&txn, slot, owner_id).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(owner_id, %slot, line_id, %quantity, "component quantity updated");
        Ok(CompositionChange {
            line,
            affected,
            recomputed,
        })
    }

    /// Deletes a line from a formula or product.
    #[instrument(skip(self))]
    pub async fn remove_component(
        &self,
        owner_id: i32,
        slot: ComponentSlot,
        line_id: i32,
    ) -> Result<CompositionChange, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let line = owned_line(&txn, slot, owner_id, line_id).await?;
        delete_line(&txn, slot, line_id).await?;

        let (affected, recomputed) = self.settle_owner(&txn, slot, owner_id).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(owner_id, %slot, line_id, "component removed");
        Ok(CompositionChange {
            line,
            affected,
            recomputed,
        })
    }

    /// Lists the current lines of a formula or product.
    #[instrument(skip(self))]
    pub async fn composition(
        &self,
        owner_id: i32,
        kind: EntityKind,
    ) -> Result<Composition, ServiceError> {
        let db = &*self.db;
        ensure_owner(db, kind, owner_id).await?;
        load_composition(db, owner_id, kind).await
    }

    async fn settle_owner<C>(
        &self,
        conn: &C,
        slot: ComponentSlot,
        owner_id: i32,
    ) -> Result<(Vec<CostNode>, Vec<CostRollup>), ServiceError>
    where
        C: ConnectionTrait,
    {
        let graph = DependencyGraph::load(conn).await?;
        let owner = CostNode::new(slot.owner_kind(), owner_id);
        let recomputed = self.engine.settle(conn, &graph, [owner]).await?;
        Ok((graph.closure_of([owner]).into_iter().collect(), recomputed))
    }
}

fn ensure_positive(quantity: Decimal) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Quantity must be greater than zero, got {}",
            quantity
        )));
    }
    Ok(())
}

/// Fails with `NotFound` unless the formula or product exists; returns its active flag.
async fn ensure_owner<C>(conn: &C, kind: EntityKind, id: i32) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    let active = match kind {
        EntityKind::Formula => formula::Entity::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|f| f.active),
        EntityKind::Product => product::Entity::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|p| p.active),
    };
    active.ok_or_else(|| not_found(kind, id))
}

async fn ensure_active_owner<C>(conn: &C, kind: EntityKind, id: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if !ensure_owner(conn, kind, id).await? {
        return Err(ServiceError::InvalidOperation(format!(
            "{} {} is inactive",
            kind, id
        )));
    }
    Ok(())
}

async fn ensure_active_component<C>(
    conn: &C,
    kind: ComponentKind,
    id: i32,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let active = match kind {
        ComponentKind::RawMaterial => raw_material::Entity::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|m| m.active),
        ComponentKind::LabelingMaterial => labeling_material::Entity::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|m| m.active),
        ComponentKind::Formula => formula::Entity::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|f| f.active),
    };

    match active {
        Some(true) => Ok(()),
        Some(false) => Err(ServiceError::InvalidOperation(format!(
            "{} {} is inactive",
            kind, id
        ))),
        None => Err(ServiceError::NotFound(format!("{} {} not found", kind, id))),
    }
}

async fn insert_line<C>(
    conn: &C,
    slot: ComponentSlot,
    owner_id: i32,
    component_id: i32,
    quantity: Decimal,
) -> Result<CompositionLine, ServiceError>
where
    C: ConnectionTrait,
{
    let line_id = match slot {
        ComponentSlot::FormulaRawMaterial => {
            formula_raw_material::ActiveModel {
                formula_id: Set(owner_id),
                raw_material_id: Set(component_id),
                quantity: Set(quantity),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?
            .id
        }
        ComponentSlot::FormulaNestedFormula => {
            formula_nested_formula::ActiveModel {
                parent_formula_id: Set(owner_id),
                child_formula_id: Set(component_id),
                quantity: Set(quantity),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?
            .id
        }
        ComponentSlot::ProductFormula => {
            product_formula::ActiveModel {
                product_id: Set(owner_id),
                formula_id: Set(component_id),
                quantity: Set(quantity),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?
            .id
        }
        ComponentSlot::ProductRawMaterial => {
            product_raw_material::ActiveModel {
                product_id: Set(owner_id),
                raw_material_id: Set(component_id),
                quantity: Set(quantity),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?
            .id
        }
        ComponentSlot::ProductLabelingMaterial => {
            product_labeling_material::ActiveModel {
                product_id: Set(owner_id),
                labeling_material_id: Set(component_id),
                quantity: Set(quantity),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?
            .id
        }
    };

    Ok(CompositionLine {
        line_id,
        slot,
        component_id,
        quantity,
        partial_cost: Decimal::ZERO,
    })
}

async fn find_line<C>(
    conn: &C,
    slot: ComponentSlot,
    line_id: i32,
) -> Result<Option<StoredLine>, ServiceError>
where
    C: ConnectionTrait,
{
    let stored = match slot {
        ComponentSlot::FormulaRawMaterial => formula_raw_material::Entity::find_by_id(line_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|l| StoredLine {
                owner_id: l.formula_id,
                line: CompositionLine {
                    line_id: l.id,
                    slot,
                    component_id: l.raw_material_id,
                    quantity: l.quantity,
                    partial_cost: l.partial_cost,
                },
            }),
        ComponentSlot::FormulaNestedFormula => formula_nested_formula::Entity::find_by_id(line_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|l| StoredLine {
                owner_id: l.parent_formula_id,
                line: CompositionLine {
                    line_id: l.id,
                    slot,
                    component_id: l.child_formula_id,
                    quantity: l.quantity,
                    partial_cost: l.partial_cost,
                },
            }),
        ComponentSlot::ProductFormula => product_formula::Entity::find_by_id(line_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|l| StoredLine {
                owner_id: l.product_id,
                line: CompositionLine {
                    line_id: l.id,
                    slot,
                    component_id: l.formula_id,
                    quantity: l.quantity,
                    partial_cost: l.partial_cost,
                },
            }),
        ComponentSlot::ProductRawMaterial => product_raw_material::Entity::find_by_id(line_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|l| StoredLine {
                owner_id: l.product_id,
                line: CompositionLine {
                    line_id: l.id,
                    slot,
                    component_id: l.raw_material_id,
                    quantity: l.quantity,
                    partial_cost: l.partial_cost,
                },
            }),
        ComponentSlot::ProductLabelingMaterial => {
            product_labeling_material::Entity::find_by_id(line_id)
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?
                .map(|l| StoredLine {
                    owner_id: l.product_id,
                    line: CompositionLine {
                        line_id: l.id,
                        slot,
                        component_id: l.labeling_material_id,
                        quantity: l.quantity,
                        partial_cost: l.partial_cost,
                    },
                })
        }
    };
    Ok(stored)
}

/// Loads a line and checks it belongs to `owner_id`.
async fn owned_line<C>(
    conn: &C,
    slot: ComponentSlot,
    owner_id: i32,
    line_id: i32,
) -> Result<CompositionLine, ServiceError>
where
    C: ConnectionTrait,
{
    ensure_owner(conn, slot.owner_kind(), owner_id).await?;

    let stored = find_line(conn, slot, line_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Composition line {} not found", line_id)))?;

    if stored.owner_id != owner_id {
        return Err(ServiceError::InvalidOperation(format!(
            "Composition line {} does not belong to {} {}",
            line_id,
            slot.owner_kind(),
            owner_id
        )));
    }
    Ok(stored.line)
}

async fn set_line_quantity<C>(
    conn: &C,
    slot: ComponentSlot,
    line_id: i32,
    quantity: Decimal,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let result = match slot {
        ComponentSlot::FormulaRawMaterial => {
            formula_raw_material::Entity::update_many()
                .col_expr(formula_raw_material::Column::Quantity, Expr::value(quantity))
                .col_expr(formula_raw_material::Column::UpdatedAt, Expr::value(now))
                .filter(formula_raw_material::Column::Id.eq(line_id))
                .exec(conn)
                .await
        }
        ComponentSlot::FormulaNestedFormula => {
            formula_nested_formula::Entity::update_many()
                .col_expr(formula_nested_formula::Column::Quantity, Expr::value(quantity))
                .col_expr(formula_nested_formula::Column::UpdatedAt, Expr::value(now))
                .filter(formula_nested_formula::Column::Id.eq(line_id))
                .exec(conn)
                .await
        }
        ComponentSlot::ProductFormula => {
            product_formula::Entity::update_many()
                .col_expr(product_formula::Column::Quantity, Expr::value(quantity))
                .col_expr(product_formula::Column::UpdatedAt, Expr::value(now))
                .filter(product_formula::Column::Id.eq(line_id))
                .exec(conn)
                .await
        }
        ComponentSlot::ProductRawMaterial => {
            product_raw_material::Entity::update_many()
                .col_expr(product_raw_material::Column::Quantity, Expr::value(quantity))
                .col_expr(product_raw_material::Column::UpdatedAt, Expr::value(now))
                .filter(product_raw_material::Column::Id.eq(line_id))
                .exec(conn)
                .await
        }
        ComponentSlot::ProductLabelingMaterial => {
            product_labeling_material::Entity::update_many()
                .col_expr(product_labeling_material::Column::Quantity, Expr::value(quantity))
                .col_expr(product_labeling_material::Column::UpdatedAt, Expr::value(now))
                .filter(product_labeling_material::Column::Id.eq(line_id))
                .exec(conn)
                .await
        }
    };
    result.map_err(ServiceError::db_error)?;
    Ok(())
}

async fn delete_line<C>(conn: &C, slot: ComponentSlot, line_id: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let result = match slot {
        ComponentSlot::FormulaRawMaterial => {
            formula_raw_material::Entity::delete_by_id(line_id)
                .exec(conn)
                .await
        }
        ComponentSlot::FormulaNestedFormula => {
            formula_nested_formula::Entity::delete_by_id(line_id)
                .exec(conn)
                .await
        }
        ComponentSlot::ProductFormula => product_formula::Entity::delete_by_id(line_id).exec(conn).await,
        ComponentSlot::ProductRawMaterial => {
            product_raw_material::Entity::delete_by_id(line_id)
                .exec(conn)
                .await
        }
        ComponentSlot::ProductLabelingMaterial => {
            product_labeling_material::Entity::delete_by_id(line_id)
                .exec(conn)
                .await
        }
    };
    result.map_err(ServiceError::db_error)?;
    Ok(())
}

/// Reads every line of a formula or product, grouped by slot.
pub(crate) async fn load_composition<C>(
    conn: &C,
    owner_id: i32,
    kind: EntityKind,
) -> Result<Composition, ServiceError>
where
    C: ConnectionTrait,
{
    let mut lines = Vec::new();

    match kind {
        EntityKind::Formula => {
            let raw = formula_raw_material::Entity::find()
                .filter(formula_raw_material::Column::FormulaId.eq(owner_id))
                .order_by_asc(formula_raw_material::Column::Id)
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?;
            lines.extend(raw.into_iter().map(|l| CompositionLine {
                line_id: l.id,
                slot: ComponentSlot::FormulaRawMaterial,
                component_id: l.raw_material_id,
                quantity: l.quantity,
                partial_cost: l.partial_cost,
            }));

            let nested = formula_nested_formula::Entity::find()
                .filter(formula_nested_formula::Column::ParentFormulaId.eq(owner_id))
                .order_by_asc(formula_nested_formula::Column::Id)
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?;
            lines.extend(nested.into_iter().map(|l| CompositionLine {
                line_id: l.id,
                slot: ComponentSlot::FormulaNestedFormula,
                component_id: l.child_formula_id,
                quantity: l.quantity,
                partial_cost: l.partial_cost,
            }));
        }
        EntityKind::Product => {
            let formulas = product_formula::Entity::find()
                .filter(product_formula::Column::ProductId.eq(owner_id))
                .order_by_asc(product_formula::Column::Id)
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?;
            lines.extend(formulas.into_iter().map(|l| CompositionLine {
                line_id: l.id,
                slot: ComponentSlot::ProductFormula,
                component_id: l.formula_id,
                quantity: l.quantity,
                partial_cost: l.partial_cost,
            }));

            let raw = product_raw_material::Entity::find()
                .filter(product_raw_material::Column::ProductId.eq(owner_id))
                .order_by_asc(product_raw_material::Column::Id)
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?;
            lines.extend(raw.into_iter().map(|l| CompositionLine {
                line_id: l.id,
                slot: ComponentSlot::ProductRawMaterial,
                component_id: l.raw_material_id,
                quantity: l.quantity,
                partial_cost: l.partial_cost,
            }));

            let labels = product_labeling_material::Entity::find()
                .filter(product_labeling_material::Column::ProductId.eq(owner_id))
                .order_by_asc(product_labeling_material::Column::Id)
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?;
            lines.extend(labels.into_iter().map(|l| CompositionLine {
                line_id: l.id,
                slot: ComponentSlot::ProductLabelingMaterial,
                component_id: l.labeling_material_id,
                quantity: l.quantity,
                partial_cost: l.partial_cost,
            }));
        }
    }

    Ok(Composition {
        owner_id,
        kind,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(EntityKind::Formula, "raw-materials", ComponentSlot::FormulaRawMaterial)]
    #[case(EntityKind::Formula, "formulas", ComponentSlot::FormulaNestedFormula)]
    #[case(EntityKind::Product, "formulas", ComponentSlot::ProductFormula)]
    #[case(EntityKind::Product, "raw-materials", ComponentSlot::ProductRawMaterial)]
    #[case(
        EntityKind::Product,
        "labeling-materials",
        ComponentSlot::ProductLabelingMaterial
    )]
    fn slot_from_segment(
        #[case] owner: EntityKind,
        #[case] segment: &str,
        #[case] expected: ComponentSlot,
    ) {
        let slot = ComponentSlot::from_segment(owner, segment).unwrap();
        assert_eq!(slot, expected);
        assert_eq!(slot.owner_kind(), owner);
    }

    #[test]
    fn formulas_have_no_labeling_slot() {
        assert_matches!(
            ComponentSlot::from_segment(EntityKind::Formula, "labeling-materials"),
            Err(ServiceError::NotFound(_))
        );
    }

    #[test]
    fn every_slot_maps_to_a_component_kind() {
        let labeling: Vec<_> = ComponentSlot::iter()
            .filter(|s| s.component_kind() == ComponentKind::LabelingMaterial)
            .collect();
        assert_eq!(labeling, vec![ComponentSlot::ProductLabelingMaterial]);
    }

    #[rstest]
    #[case(Decimal::ZERO)]
    #[case(Decimal::NEGATIVE_ONE)]
    fn non_positive_quantities_are_rejected(#[case] quantity: Decimal) {
        assert_matches!(
            ensure_positive(quantity),
            Err(ServiceError::ValidationError(_))
        );
    }
}
