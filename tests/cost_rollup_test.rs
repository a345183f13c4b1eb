//! Cost rollup behaviour against a real (in-memory SQLite) database.
//!
//! Covers:
//! - Leaf and nested formula totals
//! - Idempotence and the empty-composition boundary
//! - Dangling references under both policies
//! - Single-entity recompute not touching embedding composites
//! - Product breakdown (mp / me / ms)
//! - Dependency-ordered propagation and full recompute

mod common;

use assert_matches::assert_matches;
use common::{options, seed_blend, Harness};
use herbax_costing::{
    config::{DanglingPolicy, PropagationMode},
    entities::formula_raw_material,
    errors::ServiceError,
    services::{
        catalog::MaterialUpdate,
        composition::ComponentSlot,
        cost_rollup::{ComponentKind, EntityKind, MissingReason},
    },
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

#[tokio::test]
async fn leaf_formula_total_is_sum_of_quantity_times_unit_cost() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    let rollup = h
        .engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(rollup.total_cost, dec!(6.00));
    assert_eq!(rollup.lines.len(), 2);
    assert!(rollup.dangling.is_empty());

    let stored = h.formula_row(blend.base_mix).await;
    assert_eq!(stored.total_cost.round_dp(4), dec!(6.00));
    assert!(!stored.cost_stale);
    assert!(stored.cost_updated_at.is_some());

    let line_a = formula_raw_material::Entity::find_by_id(blend.line_a)
        .one(&*h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line_a.partial_cost.round_dp(4), dec!(3.00));
}

#[tokio::test]
async fn nested_formula_counts_child_total_once() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    h.engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();
    let rollup = h
        .engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(rollup.total_cost, dec!(18.00));
    assert_eq!(rollup.lines.len(), 1);
    assert_eq!(rollup.lines[0].component, ComponentKind::Formula);
    assert_eq!(rollup.lines[0].unit_cost.round_dp(4), dec!(6.00));
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(18.00));
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    let first = h
        .engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();
    let second = h
        .engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(first.total_cost, second.total_cost);
    let partials = |r: &herbax_costing::services::cost_rollup::CostRollup| {
        r.lines.iter().map(|l| l.partial_cost).collect::<Vec<_>>()
    };
    assert_eq!(partials(&first), partials(&second));
}

#[tokio::test]
async fn empty_formula_costs_zero() {
    let h = Harness::new().await;
    let empty = h.formula("F-EMPTY", "Empty").await;

    let rollup = h
        .engine
        .recompute_cost(empty, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(rollup.total_cost, Decimal::ZERO);
    assert!(rollup.lines.is_empty());
    assert_eq!(h.formula_total(empty).await, Decimal::ZERO);
}

#[tokio::test]
async fn unknown_entity_is_not_found() {
    let h = Harness::new().await;

    assert_matches!(
        h.engine.recompute_cost(999, EntityKind::Formula).await,
        Err(ServiceError::NotFound(msg)) if msg.contains("999")
    );
    assert_matches!(
        h.engine.recompute_cost(999, EntityKind::Product).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn deleted_raw_material_contributes_zero() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    h.catalog.delete_raw_material(blend.raw_b).await.unwrap();

    let rollup = h
        .engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(rollup.total_cost, dec!(3.00));
    assert_eq!(rollup.dangling.len(), 1);
    let missing = &rollup.dangling[0];
    assert_eq!(missing.line_id, blend.line_b);
    assert_eq!(missing.component_id, blend.raw_b);
    assert_eq!(missing.reason, MissingReason::Deleted);

    let line_b = formula_raw_material::Entity::find_by_id(blend.line_b)
        .one(&*h.db)
        .await
        .unwrap()
        .expect("join row is left in place");
    assert_eq!(line_b.partial_cost, Decimal::ZERO);
}

#[tokio::test]
async fn inactive_raw_material_is_reported_as_inactive() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    h.catalog
        .update_raw_material(
            blend.raw_a,
            MaterialUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let rollup = h
        .engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(rollup.total_cost, dec!(3.00));
    assert_eq!(rollup.dangling[0].reason, MissingReason::Inactive);
}

#[tokio::test]
async fn strict_policy_fails_and_leaves_store_untouched() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    h.engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    // Line A now prices at 6.00, but B is gone so the rollup must not commit.
    h.composition
        .update_quantity(
            blend.base_mix,
            ComponentSlot::FormulaRawMaterial,
            blend.line_a,
            dec!(4),
        )
        .await
        .unwrap();
    h.catalog.delete_raw_material(blend.raw_b).await.unwrap();

    let strict = h.engine_with(options(PropagationMode::Manual, DanglingPolicy::Fail));
    assert_matches!(
        strict.recompute_cost(blend.base_mix, EntityKind::Formula).await,
        Err(ServiceError::DanglingReference(missing)) if missing.line_id == blend.line_b
    );

    assert_eq!(h.formula_total(blend.base_mix).await, dec!(6.00));
    let line_a = formula_raw_material::Entity::find_by_id(blend.line_a)
        .one(&*h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line_a.partial_cost.round_dp(4), dec!(3.00));
    assert!(h.formula_row(blend.base_mix).await.cost_stale);
}

#[tokio::test]
async fn editing_child_does_not_update_parent_until_parent_is_recomputed() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    h.engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();
    h.engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();

    let raw_c = h.raw_material("RM-C", dec!(2.00)).await;
    h.add(blend.base_mix, ComponentSlot::FormulaRawMaterial, raw_c, dec!(1))
        .await;
    h.engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(h.formula_total(blend.base_mix).await, dec!(8.00));
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(18.00));
    assert!(h.formula_row(blend.final_blend).await.cost_stale);

    h.engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(24.00));
    assert!(!h.formula_row(blend.final_blend).await.cost_stale);
}

#[tokio::test]
async fn stale_child_is_reported_as_stale_input() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    // Base Mix was never recomputed after its lines were added.
    let rollup = h
        .engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();

    assert_eq!(rollup.stale_inputs, vec![blend.base_mix]);
    assert_eq!(rollup.total_cost, Decimal::ZERO);
}

#[tokio::test]
async fn parent_rolled_up_from_stale_child_stays_stale() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    h.engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();
    h.engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    // Final Blend still holds the total it computed from Base Mix's old 0.
    let parent = h.formula_row(blend.final_blend).await;
    assert_eq!(parent.total_cost.round_dp(4), Decimal::ZERO);
    assert!(parent.cost_stale);
    assert!(!h.formula_row(blend.base_mix).await.cost_stale);

    let rollup = h
        .engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();
    assert!(rollup.stale_inputs.is_empty());
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(18.00));
    assert!(!h.formula_row(blend.final_blend).await.cost_stale);
}

#[tokio::test]
async fn product_using_stale_formula_stays_stale() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    let product = h.product("Blend Jar").await;
    h.add(product, ComponentSlot::ProductFormula, blend.base_mix, dec!(1))
        .await;

    let rollup = h
        .engine
        .recompute_cost(product, EntityKind::Product)
        .await
        .unwrap();

    assert_eq!(rollup.stale_inputs, vec![blend.base_mix]);
    assert!(h.product_row(product).await.cost_stale);
}

#[tokio::test]
async fn summing_huge_lines_fails_instead_of_overflowing() {
    let h = Harness::new().await;
    let huge = dec!(50000000000000000000000000000);
    let first = h.raw_material("RM-HUGE-1", huge).await;
    let second = h.raw_material("RM-HUGE-2", huge).await;
    let formula = h.formula("F-HUGE", "Huge").await;
    h.add(formula, ComponentSlot::FormulaRawMaterial, first, dec!(1))
        .await;
    h.add(formula, ComponentSlot::FormulaRawMaterial, second, dec!(1))
        .await;

    assert_matches!(
        h.engine.recompute_cost(formula, EntityKind::Formula).await,
        Err(ServiceError::InvalidOperation(msg)) if msg.contains("overflow")
    );
    assert_eq!(h.formula_total(formula).await, Decimal::ZERO);
    assert!(h.formula_row(formula).await.cost_stale);
}

#[tokio::test]
async fn product_breakdown_splits_material_packaging_and_overhead() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    h.engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    let bottle = h.labeling_material("LB-BOTTLE", dec!(0.50)).await;
    let label = h.labeling_material("LB-LABEL", dec!(0.25)).await;
    let product = h.product("Herbal Tonic 500ml").await;

    h.add(product, ComponentSlot::ProductFormula, blend.base_mix, dec!(2))
        .await;
    h.add(product, ComponentSlot::ProductRawMaterial, blend.raw_b, dec!(1))
        .await;
    h.add(product, ComponentSlot::ProductLabelingMaterial, bottle, dec!(1))
        .await;
    h.add(product, ComponentSlot::ProductLabelingMaterial, label, dec!(2))
        .await;

    let rollup = h
        .engine
        .recompute_cost(product, EntityKind::Product)
        .await
        .unwrap();

    let breakdown = rollup.breakdown.expect("products carry a breakdown");
    assert_eq!(breakdown.mp, dec!(15.00));
    assert_eq!(breakdown.me, dec!(1.00));
    assert_eq!(breakdown.ms, dec!(0.75));
    assert_eq!(rollup.total_cost, dec!(16.75));
    assert_eq!(breakdown.mp_percentage, dec!(89.5522));
    assert_eq!(breakdown.me_percentage, dec!(5.9701));
    assert_eq!(breakdown.ms_percentage, dec!(4.4776));

    let stored = h.product_row(product).await;
    assert_eq!(stored.mp.round_dp(4), dec!(15.00));
    assert_eq!(stored.me.round_dp(4), dec!(1.00));
    assert_eq!(stored.ms.round_dp(4), dec!(0.75));
    assert_eq!(stored.cost.round_dp(4), dec!(16.75));
    assert_eq!(stored.mp_percentage.round_dp(4), dec!(89.5522));
    assert!(!stored.cost_stale);
}

#[tokio::test]
async fn product_without_packaging_has_no_overhead() {
    let h = Harness::new().await;
    let raw = h.raw_material("RM-1", dec!(4.00)).await;
    let product = h.product("Capsules").await;
    h.add(product, ComponentSlot::ProductRawMaterial, raw, dec!(2))
        .await;

    let rollup = h
        .engine
        .recompute_cost(product, EntityKind::Product)
        .await
        .unwrap();

    let breakdown = rollup.breakdown.unwrap();
    assert_eq!(breakdown.ms, Decimal::ZERO);
    assert_eq!(rollup.total_cost, dec!(8.00));
    assert_eq!(breakdown.mp_percentage, dec!(100));
}

#[tokio::test]
async fn propagation_recomputes_ancestors_leaves_first() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    let product = h.product("Blend Jar").await;
    h.add(product, ComponentSlot::ProductFormula, blend.final_blend, dec!(1))
        .await;

    let rollups = h
        .engine
        .recompute_with_dependents(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();

    let order: Vec<(EntityKind, i32)> = rollups.iter().map(|r| (r.kind, r.entity_id)).collect();
    assert_eq!(
        order,
        vec![
            (EntityKind::Formula, blend.base_mix),
            (EntityKind::Formula, blend.final_blend),
            (EntityKind::Product, product),
        ]
    );
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(18.00));
    assert_eq!(h.product_row(product).await.mp.round_dp(4), dec!(18.00));
    assert!(rollups.iter().all(|r| r.stale_inputs.is_empty()));
}

#[tokio::test]
async fn propagation_of_unknown_entity_is_not_found() {
    let h = Harness::new().await;
    assert_matches!(
        h.engine
            .recompute_with_dependents(42, EntityKind::Formula)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn recompute_all_settles_every_cost() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    let standalone = h.formula("F-SOLO", "Solo").await;

    let rollups = h.engine.recompute_all().await.unwrap();

    assert_eq!(rollups.len(), 3);
    assert_eq!(h.formula_total(blend.base_mix).await, dec!(6.00));
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(18.00));
    assert_eq!(h.formula_total(standalone).await, Decimal::ZERO);
    assert!(!h.formula_row(blend.final_blend).await.cost_stale);
}
