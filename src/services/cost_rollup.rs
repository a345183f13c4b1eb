//! Bill-of-materials cost rollup.
//!
//! A rollup reads one composite's direct composition, prices every line
//! against the component's current unit cost (or stored total, for nested
//! formulas), writes the partial costs back and persists the new total.
//! It never descends into children: a nested formula contributes whatever
//! total it had when its own rollup last ran. Callers that need the whole
//! chain fresh use [`CostRollupEngine::recompute_with_dependents`] or
//! [`CostRollupEngine::recompute_all`], which walk the dependency graph
//! leaves first.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{AppConfig, DanglingPolicy, PropagationMode},
    entities::{
        formula, formula_nested_formula, formula_raw_material, labeling_material, product,
        product_formula, product_labeling_material, product_raw_material, raw_material,
    },
    errors::ServiceError,
    services::dependency_graph::{CostNode, DependencyGraph},
};

/// Kind of composite a rollup applies to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Formula,
    Product,
}

/// What a composition line points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    RawMaterial,
    Formula,
    LabelingMaterial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissingReason {
    Deleted,
    Inactive,
}

/// A composition line whose component could not be priced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissingReference {
    pub line_id: i32,
    pub component: ComponentKind,
    pub component_id: i32,
    pub reason: MissingReason,
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} references {} {} which is {}",
            self.line_id, self.component, self.component_id, self.reason
        )
    }
}

impl std::error::Error for MissingReference {}

/// One priced composition line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostLine {
    pub line_id: i32,
    pub component: ComponentKind,
    pub component_id: i32,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub partial_cost: Decimal,
}

/// Product cost split. `ms` is the overhead part.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductBreakdown {
    pub mp: Decimal,
    pub me: Decimal,
    pub ms: Decimal,
    pub mp_percentage: Decimal,
    pub me_percentage: Decimal,
    pub ms_percentage: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct CostRollup {
    pub entity_id: i32,
    pub kind: EntityKind,
    pub total_cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ProductBreakdown>,
    pub lines: Vec<CostLine>,
    pub dangling: Vec<MissingReference>,
    /// Nested formulas that were themselves stale when read. A rollup with
    /// stale inputs leaves its own `cost_stale` raised.
    pub stale_inputs: Vec<i32>,
}

/// Tuning for the engine, derived from [`AppConfig`].
#[derive(Clone, Debug)]
pub struct CostingOptions {
    pub overhead_rate: Decimal,
    pub cost_scale: u32,
    pub dangling_policy: DanglingPolicy,
    pub propagation: PropagationMode,
}

impl Default for CostingOptions {
    fn default() -> Self {
        Self {
            overhead_rate: dec!(0.05),
            cost_scale: 4,
            dangling_policy: DanglingPolicy::default(),
            propagation: PropagationMode::default(),
        }
    }
}

impl TryFrom<&AppConfig> for CostingOptions {
    type Error = ServiceError;

    fn try_from(cfg: &AppConfig) -> Result<Self, Self::Error> {
        // Display on f64 yields the shortest round-tripping form, so 0.05 stays 0.05.
        let overhead_rate = Decimal::from_str(&cfg.overhead_rate.to_string()).map_err(|e| {
            ServiceError::ConfigurationError(format!(
                "overhead_rate {} is not a decimal: {}",
                cfg.overhead_rate, e
            ))
        })?;

        Ok(Self {
            overhead_rate,
            cost_scale: cfg.cost_scale,
            dangling_policy: cfg.dangling_reference_policy,
            propagation: cfg.cost_propagation,
        })
    }
}

/// Rounds a persisted amount.
pub fn round_cost(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity * unit_cost`, rounded.
pub fn line_cost(quantity: Decimal, unit_cost: Decimal, scale: u32) -> Result<Decimal, ServiceError> {
    quantity
        .checked_mul(unit_cost)
        .map(|value| round_cost(value, scale))
        .ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "Cost overflow multiplying {} by {}",
                quantity, unit_cost
            ))
        })
}

/// Running sum of line partials.
fn add_cost(sum: Decimal, partial: Decimal) -> Result<Decimal, ServiceError> {
    sum.checked_add(partial).ok_or_else(|| {
        ServiceError::InvalidOperation(format!("Cost overflow adding {} to {}", partial, sum))
    })
}

/// Splits a product cost into its material, packaging and overhead parts.
pub fn product_breakdown(
    mp: Decimal,
    me: Decimal,
    overhead_rate: Decimal,
    scale: u32,
) -> Result<(ProductBreakdown, Decimal), ServiceError> {
    let overflow = || ServiceError::InvalidOperation("Product cost overflow".to_string());

    let mp = round_cost(mp, scale);
    let me = round_cost(me, scale);
    let ms = round_cost(
        mp.checked_mul(me)
            .and_then(|v| v.checked_mul(overhead_rate))
            .ok_or_else(overflow)?,
        scale,
    );
    let cost = mp
        .checked_add(me)
        .and_then(|v| v.checked_add(ms))
        .ok_or_else(overflow)?;

    let share = |part: Decimal| {
        if cost.is_zero() {
            Decimal::ZERO
        } else {
            round_cost(part / cost * Decimal::ONE_HUNDRED, scale)
        }
    };

    Ok((
        ProductBreakdown {
            mp,
            me,
            ms,
            mp_percentage: share(mp),
            me_percentage: share(me),
            ms_percentage: share(ms),
        },
        cost,
    ))
}

/// Collects priced lines for one rollup and applies the dangling policy.
struct LineLedger<'a> {
    options: &'a CostingOptions,
    lines: Vec<CostLine>,
    dangling: Vec<MissingReference>,
}

impl<'a> LineLedger<'a> {
    fn new(options: &'a CostingOptions) -> Self {
        Self {
            options,
            lines: Vec::new(),
            dangling: Vec::new(),
        }
    }

    /// Prices one line and returns its partial cost.
    fn price(
        &mut self,
        line_id: i32,
        component: ComponentKind,
        component_id: i32,
        quantity: Decimal,
        unit_cost: Result<Decimal, MissingReason>,
    ) -> Result<Decimal, ServiceError> {
        let (unit_cost, partial_cost) = match unit_cost {
            Ok(unit_cost) => (
                unit_cost,
                line_cost(quantity, unit_cost, self.options.cost_scale)?,
            ),
            Err(reason) => {
                let missing = MissingReference {
                    line_id,
                    component,
                    component_id,
                    reason,
                };
                if self.options.dangling_policy == DanglingPolicy::Fail {
                    return Err(ServiceError::DanglingReference(missing));
                }
                warn!(%missing, "excluding dangling component from rollup");
                self.dangling.push(missing);
                (Decimal::ZERO, Decimal::ZERO)
            }
        };

        self.lines.push(CostLine {
            line_id,
            component,
            component_id,
            quantity,
            unit_cost,
            partial_cost,
        });
        Ok(partial_cost)
    }
}

fn material_price(found: Option<(Decimal, bool)>) -> Result<Decimal, MissingReason> {
    match found {
        Some((unit_cost, true)) => Ok(unit_cost),
        Some((_, false)) => Err(MissingReason::Inactive),
        None => Err(MissingReason::Deleted),
    }
}

/// Overwrites a line's `partial_cost` when it differs from the stored value.
async fn store_partial<E, C>(
    conn: &C,
    id_column: E::Column,
    partial_column: E::Column,
    updated_column: E::Column,
    line_id: i32,
    stored: Decimal,
    partial: Decimal,
) -> Result<(), ServiceError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    if stored == partial {
        return Ok(());
    }

    E::update_many()
        .col_expr(partial_column, Expr::value(partial))
        .col_expr(updated_column, Expr::value(Utc::now()))
        .filter(id_column.eq(line_id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

/// Raises `cost_stale` on every listed formula and product.
pub async fn mark_stale<C>(conn: &C, nodes: &BTreeSet<CostNode>) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let formula_ids: Vec<i32> = nodes
        .iter()
        .filter(|n| n.kind() == EntityKind::Formula)
        .map(CostNode::id)
        .collect();
    let product_ids: Vec<i32> = nodes
        .iter()
        .filter(|n| n.kind() == EntityKind::Product)
        .map(CostNode::id)
        .collect();

    if !formula_ids.is_empty() {
        formula::Entity::update_many()
            .col_expr(formula::Column::CostStale, Expr::value(true))
            .filter(formula::Column::Id.is_in(formula_ids))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    }
    if !product_ids.is_empty() {
        product::Entity::update_many()
            .col_expr(product::Column::CostStale, Expr::value(true))
            .filter(product::Column::Id.is_in(product_ids))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    }

    debug!(count = nodes.len(), "marked costs stale");
    Ok(())
}

/// Computes and persists derived costs for formulas and products.
#[derive(Clone)]
pub struct CostRollupEngine {
    db: Arc<DatabaseConnection>,
    options: CostingOptions,
}

impl CostRollupEngine {
    pub fn new(db: Arc<DatabaseConnection>, options: CostingOptions) -> Self {
        Self { db, options }
    }

    pub fn options(&self) -> &CostingOptions {
        &self.options
    }

    /// Recomputes one formula or product from its direct composition.
    ///
    /// Runs in its own transaction. Composites that embed this one keep
    /// their cached totals until they are recomputed themselves.
    #[instrument(skip(self))]
    pub async fn recompute_cost(
        &self,
        entity_id: i32,
        kind: EntityKind,
    ) -> Result<CostRollup, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let rollup = self.recompute_in(&txn, entity_id, kind).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            entity_id,
            %kind,
            total_cost = %rollup.total_cost,
            "cost recomputed"
        );
        Ok(rollup)
    }

    /// Recomputes on an existing connection or transaction.
    pub async fn recompute_in<C>(
        &self,
        conn: &C,
        entity_id: i32,
        kind: EntityKind,
    ) -> Result<CostRollup, ServiceError>
    where
        C: ConnectionTrait,
    {
        let started = Instant::now();
        let result = match kind {
            EntityKind::Formula => self.recompute_formula(conn, entity_id).await,
            EntityKind::Product => self.recompute_product(conn, entity_id).await,
        };

        match &result {
            Ok(rollup) => {
                counter!("herbax_costing.rollups", 1, "kind" => kind.to_string());
                if !rollup.dangling.is_empty() {
                    counter!(
                        "herbax_costing.dangling_references",
                        rollup.dangling.len() as u64
                    );
                }
            }
            Err(_) => counter!("herbax_costing.rollup_failures", 1, "kind" => kind.to_string()),
        }
        histogram!(
            "herbax_costing.rollup_duration_seconds",
            started.elapsed().as_secs_f64()
        );

        result
    }

    /// Recomputes an entity and every composite that embeds it, leaves first,
    /// in a single transaction.
    #[instrument(skip(self))]
    pub async fn recompute_with_dependents(
        &self,
        entity_id: i32,
        kind: EntityKind,
    ) -> Result<Vec<CostRollup>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let graph = DependencyGraph::load(&txn).await?;
        let node = CostNode::new(kind, entity_id);
        if !graph.contains(node) {
            return Err(not_found(kind, entity_id));
        }

        let rollups = self.recompute_nodes(&txn, &graph, graph.closure_of([node])).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(entity_id, %kind, recomputed = rollups.len(), "costs propagated");
        Ok(rollups)
    }

    /// Recomputes every formula and product, leaves first, in a single transaction.
    #[instrument(skip(self))]
    pub async fn recompute_all(&self) -> Result<Vec<CostRollup>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let graph = DependencyGraph::load(&txn).await?;
        let rollups = self
            .recompute_nodes(&txn, &graph, graph.nodes().clone())
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(recomputed = rollups.len(), "full cost graph recomputed");
        Ok(rollups)
    }

    /// Marks `changed` and their ancestors stale; in automatic mode also
    /// recomputes them in dependency order.
    pub async fn settle<C, I>(
        &self,
        conn: &C,
        graph: &DependencyGraph,
        changed: I,
    ) -> Result<Vec<CostRollup>, ServiceError>
    where
        C: ConnectionTrait,
        I: IntoIterator<Item = CostNode>,
    {
        let affected = graph.closure_of(changed);
        if affected.is_empty() {
            return Ok(Vec::new());
        }

        mark_stale(conn, &affected).await?;

        match self.options.propagation {
            PropagationMode::Manual => Ok(Vec::new()),
            PropagationMode::Automatic => self.recompute_nodes(conn, graph, affected).await,
        }
    }

    async fn recompute_nodes<C>(
        &self,
        conn: &C,
        graph: &DependencyGraph,
        nodes: BTreeSet<CostNode>,
    ) -> Result<Vec<CostRollup>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let order = graph.topological_order(&nodes)?;
        let mut rollups = Vec::with_capacity(order.len());
        for node in order {
            rollups.push(self.recompute_in(conn, node.id(), node.kind()).await?);
        }
        Ok(rollups)
    }

    async fn recompute_formula<C>(
        &self,
        conn: &C,
        formula_id: i32,
    ) -> Result<CostRollup, ServiceError>
    where
        C: ConnectionTrait,
    {
        let formula = formula::Entity::find_by_id(formula_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(EntityKind::Formula, formula_id))?;

        let scale = self.options.cost_scale;
        let mut ledger = LineLedger::new(&self.options);
        let mut stale_inputs = Vec::new();
        let mut total = Decimal::ZERO;

        let raw_lines = formula_raw_material::Entity::find()
            .filter(formula_raw_material::Column::FormulaId.eq(formula_id))
            .order_by_asc(formula_raw_material::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let materials = raw_material_prices(conn, raw_lines.iter().map(|l| l.raw_material_id)).await?;

        for line in raw_lines {
            let partial = ledger.price(
                line.id,
                ComponentKind::RawMaterial,
                line.raw_material_id,
                line.quantity,
                material_price(materials.get(&line.raw_material_id).copied()),
            )?;
            store_partial::<formula_raw_material::Entity, _>(
                conn,
                formula_raw_material::Column::Id,
                formula_raw_material::Column::PartialCost,
                formula_raw_material::Column::UpdatedAt,
                line.id,
                round_cost(line.partial_cost, scale),
                partial,
            )
            .await?;
            total = add_cost(total, partial)?;
        }

        let nested_lines = formula_nested_formula::Entity::find()
            .filter(formula_nested_formula::Column::ParentFormulaId.eq(formula_id))
            .order_by_asc(formula_nested_formula::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let children = formula_totals(conn, nested_lines.iter().map(|l| l.child_formula_id)).await?;

        for line in nested_lines {
            let child = children.get(&line.child_formula_id);
            if let Some(child) = child.filter(|c| c.cost_stale) {
                warn!(
                    formula_id,
                    child_formula_id = child.id,
                    "nested formula cost is stale; using its cached total"
                );
                stale_inputs.push(child.id);
            }
            let partial = ledger.price(
                line.id,
                ComponentKind::Formula,
                line.child_formula_id,
                line.quantity,
                material_price(child.map(|c| (c.total_cost, c.active))),
            )?;
            store_partial::<formula_nested_formula::Entity, _>(
                conn,
                formula_nested_formula::Column::Id,
                formula_nested_formula::Column::PartialCost,
                formula_nested_formula::Column::UpdatedAt,
                line.id,
                round_cost(line.partial_cost, scale),
                partial,
            )
            .await?;
            total = add_cost(total, partial)?;
        }

        let total = round_cost(total, scale);
        let mut active: formula::ActiveModel = formula.into();
        active.total_cost = Set(total);
        active.cost_stale = Set(!stale_inputs.is_empty());
        active.cost_updated_at = Set(Some(Utc::now()));
        active.update(conn).await.map_err(ServiceError::db_error)?;

        debug!(formula_id, %total, lines = ledger.lines.len(), "formula rollup persisted");

        Ok(CostRollup {
            entity_id: formula_id,
            kind: EntityKind::Formula,
            total_cost: total,
            breakdown: None,
            lines: ledger.lines,
            dangling: ledger.dangling,
            stale_inputs,
        })
    }

    async fn recompute_product<C>(
        &self,
        conn: &C,
        product_id: i32,
    ) -> Result<CostRollup, ServiceError>
    where
        C: ConnectionTrait,
    {
        let product = product::Entity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(EntityKind::Product, product_id))?;

        let scale = self.options.cost_scale;
        let mut ledger = LineLedger::new(&self.options);
        let mut stale_inputs = Vec::new();
        let mut mp = Decimal::ZERO;
        let mut me = Decimal::ZERO;

        let formula_lines = product_formula::Entity::find()
            .filter(product_formula::Column::ProductId.eq(product_id))
            .order_by_asc(product_formula::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let formulas = formula_totals(conn, formula_lines.iter().map(|l| l.formula_id)).await?;

        for line in formula_lines {
            let used = formulas.get(&line.formula_id);
            if let Some(used) = used.filter(|f| f.cost_stale) {
                warn!(
                    product_id,
                    formula_id = used.id,
                    "formula cost is stale; using its cached total"
                );
                stale_inputs.push(used.id);
            }
            let partial = ledger.price(
                line.id,
                ComponentKind::Formula,
                line.formula_id,
                line.quantity,
                material_price(used.map(|f| (f.total_cost, f.active))),
            )?;
            store_partial::<product_formula::Entity, _>(
                conn,
                product_formula::Column::Id,
                product_formula::Column::PartialCost,
                product_formula::Column::UpdatedAt,
                line.id,
                round_cost(line.partial_cost, scale),
                partial,
            )
            .await?;
            mp = add_cost(mp, partial)?;
        }

        let raw_lines = product_raw_material::Entity::find()
            .filter(product_raw_material::Column::ProductId.eq(product_id))
            .order_by_asc(product_raw_material::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let materials = raw_material_prices(conn, raw_lines.iter().map(|l| l.raw_material_id)).await?;

        for line in raw_lines {
            let partial = ledger.price(
                line.id,
                ComponentKind::RawMaterial,
                line.raw_material_id,
                line.quantity,
                material_price(materials.get(&line.raw_material_id).copied()),
            )?;
            store_partial::<product_raw_material::Entity, _>(
                conn,
                product_raw_material::Column::Id,
                product_raw_material::Column::PartialCost,
                product_raw_material::Column::UpdatedAt,
                line.id,
                round_cost(line.partial_cost, scale),
                partial,
            )
            .await?;
            mp = add_cost(mp, partial)?;
        }

        let labeling_lines = product_labeling_material::Entity::find()
            .filter(product_labeling_material::Column::ProductId.eq(product_id))
            .order_by_asc(product_labeling_material::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let labels =
            labeling_material_prices(conn, labeling_lines.iter().map(|l| l.labeling_material_id))
                .await?;

        for line in labeling_lines {
            let partial = ledger.price(
                line.id,
                ComponentKind::LabelingMaterial,
                line.labeling_material_id,
                line.quantity,
                material_price(labels.get(&line.labeling_material_id).copied()),
            )?;
            store_partial::<product_labeling_material::Entity, _>(
                conn,
                product_labeling_material::Column::Id,
                product_labeling_material::Column::PartialCost,
                product_labeling_material::Column::UpdatedAt,
                line.id,
                round_cost(line.partial_cost, scale),
                partial,
            )
            .await?;
            me = add_cost(me, partial)?;
        }

        let (breakdown, cost) = product_breakdown(mp, me, self.options.overhead_rate, scale)?;

        let mut active: product::ActiveModel = product.into();
        active.mp = Set(breakdown.mp);
        active.me = Set(breakdown.me);
        active.ms = Set(breakdown.ms);
        active.mp_percentage = Set(breakdown.mp_percentage);
        active.me_percentage = Set(breakdown.me_percentage);
        active.ms_percentage = Set(breakdown.ms_percentage);
        active.cost = Set(cost);
        active.cost_stale = Set(!stale_inputs.is_empty());
        active.cost_updated_at = Set(Some(Utc::now()));
        active.update(conn).await.map_err(ServiceError::db_error)?;

        debug!(product_id, %cost, lines = ledger.lines.len(), "product rollup persisted");

        Ok(CostRollup {
            entity_id: product_id,
            kind: EntityKind::Product,
            total_cost: cost,
            breakdown: Some(breakdown),
            lines: ledger.lines,
            dangling: ledger.dangling,
            stale_inputs,
        })
    }
}

pub(crate) fn not_found(kind: EntityKind, id: i32) -> ServiceError {
    match kind {
        EntityKind::Formula => ServiceError::NotFound(format!("Formula {} not found", id)),
        EntityKind::Product => ServiceError::NotFound(format!("Product {} not found", id)),
    }
}

async fn raw_material_prices<C, I>(
    conn: &C,
    ids: I,
) -> Result<HashMap<i32, (Decimal, bool)>, ServiceError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i32>,
{
    let ids: BTreeSet<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = raw_material::Entity::find()
        .filter(raw_material::Column::Id.is_in(ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(rows
        .into_iter()
        .map(|m| (m.id, (m.unit_cost, m.active)))
        .collect())
}

async fn labeling_material_prices<C, I>(
    conn: &C,
    ids: I,
) -> Result<HashMap<i32, (Decimal, bool)>, ServiceError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i32>,
{
    let ids: BTreeSet<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = labeling_material::Entity::find()
        .filter(labeling_material::Column::Id.is_in(ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(rows
        .into_iter()
        .map(|m| (m.id, (m.unit_cost, m.active)))
        .collect())
}

async fn formula_totals<C, I>(
    conn: &C,
    ids: I,
) -> Result<HashMap<i32, formula::Model>, ServiceError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i32>,
{
    let ids: BTreeSet<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = formula::Entity::find()
        .filter(formula::Column::Id.is_in(ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(rows.into_iter().map(|f| (f.id, f)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn line_cost_rounds_half_away_from_zero() {
        assert_eq!(line_cost(dec!(3), dec!(0.00005), 4).unwrap(), dec!(0.0002));
        assert_eq!(line_cost(dec!(2), dec!(1.50), 4).unwrap(), dec!(3.00));
    }

    #[test]
    fn line_cost_reports_overflow() {
        assert_matches!(
            line_cost(Decimal::MAX, dec!(2), 4),
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[test]
    fn add_cost_reports_overflow() {
        assert_eq!(add_cost(dec!(1.25), dec!(2)).unwrap(), dec!(3.25));
        assert_matches!(
            add_cost(dec!(50000000000000000000000000000), dec!(50000000000000000000000000000)),
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[test]
    fn product_breakdown_applies_overhead_to_mp_times_me() {
        let (b, cost) = product_breakdown(dec!(10), dec!(2), dec!(0.05), 4).unwrap();
        assert_eq!(b.ms, dec!(1));
        assert_eq!(cost, dec!(13));
        assert_eq!(b.mp_percentage, dec!(76.9231));
        assert_eq!(b.me_percentage, dec!(15.3846));
        assert_eq!(b.ms_percentage, dec!(7.6923));
    }

    #[test]
    fn empty_product_has_zero_shares() {
        let (b, cost) = product_breakdown(Decimal::ZERO, Decimal::ZERO, dec!(0.05), 4).unwrap();
        assert!(cost.is_zero());
        assert!(b.mp_percentage.is_zero());
        assert!(b.me_percentage.is_zero());
        assert!(b.ms_percentage.is_zero());
    }

    #[test]
    fn ledger_excludes_missing_component_by_default() {
        let options = CostingOptions::default();
        let mut ledger = LineLedger::new(&options);

        let partial = ledger
            .price(7, ComponentKind::RawMaterial, 3, dec!(2), Err(MissingReason::Deleted))
            .unwrap();

        assert!(partial.is_zero());
        assert_eq!(ledger.dangling.len(), 1);
        assert_eq!(ledger.lines[0].partial_cost, Decimal::ZERO);
    }

    #[test]
    fn ledger_fails_on_missing_component_when_strict() {
        let options = CostingOptions {
            dangling_policy: DanglingPolicy::Fail,
            ..Default::default()
        };
        let mut ledger = LineLedger::new(&options);

        assert_matches!(
            ledger.price(7, ComponentKind::LabelingMaterial, 3, dec!(2), Err(MissingReason::Inactive)),
            Err(ServiceError::DanglingReference(MissingReference { line_id: 7, reason: MissingReason::Inactive, .. }))
        );
    }

    #[test]
    fn options_follow_app_config() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        cfg.overhead_rate = 0.05;
        cfg.cost_scale = 2;
        cfg.cost_propagation = PropagationMode::Automatic;

        let options = CostingOptions::try_from(&cfg).unwrap();
        assert_eq!(options.overhead_rate, dec!(0.05));
        assert_eq!(options.cost_scale, 2);
        assert_eq!(options.propagation, PropagationMode::Automatic);
    }

    #[test]
    fn entity_kind_parses_from_path_segment() {
        assert_eq!("formula".parse::<EntityKind>().unwrap(), EntityKind::Formula);
        assert_eq!("product".parse::<EntityKind>().unwrap(), EntityKind::Product);
        assert!("widget".parse::<EntityKind>().is_err());
    }

    proptest! {
        #[test]
        fn product_cost_is_sum_of_parts(
            mp in 0i64..1_000_000,
            me in 0i64..1_000_000,
            rate in 0u32..=100,
        ) {
            let mp = Decimal::new(mp, 2);
            let me = Decimal::new(me, 2);
            let rate = Decimal::new(i64::from(rate), 2);

            let (b, cost) = product_breakdown(mp, me, rate, 4).unwrap();
            prop_assert_eq!(cost, b.mp + b.me + b.ms);
            prop_assert!(b.ms >= Decimal::ZERO);

            if !cost.is_zero() {
                let shares = b.mp_percentage + b.me_percentage + b.ms_percentage;
                prop_assert!((shares - Decimal::ONE_HUNDRED).abs() <= dec!(0.001));
            }
        }

        #[test]
        fn line_cost_is_exact_at_two_decimals(
            quantity in 0i64..100_000,
            unit in 0i64..100_000,
        ) {
            let q = Decimal::new(quantity, 1);
            let u = Decimal::new(unit, 1);
            prop_assert_eq!(line_cost(q, u, 4).unwrap(), q * u);
        }
    }
}
