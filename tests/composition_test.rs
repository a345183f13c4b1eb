mod common;

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use common::{options, seed_blend, Harness};
use herbax_costing::{
    config::{DanglingPolicy, PropagationMode},
    errors::ServiceError,
    services::{
        catalog::{FormulaUpdate, MaterialUpdate, NewMaterial},
        composition::ComponentSlot,
        cost_rollup::EntityKind,
        dependency_graph::CostNode,
    },
};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[rstest]
#[case(dec!(0))]
#[case(dec!(-1))]
#[tokio::test]
async fn non_positive_quantity_is_rejected(#[case] quantity: Decimal) {
    let h = Harness::new().await;
    let raw = h.raw_material("RM-1", dec!(1)).await;
    let formula = h.formula("F-1", "Toner").await;

    assert_matches!(
        h.composition
            .add_component(formula, ComponentSlot::FormulaRawMaterial, raw, quantity)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    let composition = h
        .composition
        .composition(formula, EntityKind::Formula)
        .await
        .unwrap();
    assert!(composition.lines.is_empty());
}

#[tokio::test]
async fn missing_component_is_not_found() {
    let h = Harness::new().await;
    let formula = h.formula("F-1", "Toner").await;

    assert_matches!(
        h.composition
            .add_component(formula, ComponentSlot::FormulaRawMaterial, 404, dec!(1))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn missing_owner_is_not_found() {
    let h = Harness::new().await;
    let raw = h.raw_material("RM-1", dec!(1)).await;

    assert_matches!(
        h.composition
            .add_component(77, ComponentSlot::ProductRawMaterial, raw, dec!(1))
            .await,
        Err(ServiceError::NotFound(msg)) if msg.contains("77")
    );
}

#[tokio::test]
async fn inactive_component_cannot_be_added() {
    let h = Harness::new().await;
    let raw = h.raw_material("RM-1", dec!(1)).await;
    let formula = h.formula("F-1", "Toner").await;
    h.catalog
        .update_raw_material(
            raw,
            MaterialUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_matches!(
        h.composition
            .add_component(formula, ComponentSlot::FormulaRawMaterial, raw, dec!(1))
            .await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
async fn inactive_owner_cannot_gain_lines() {
    let h = Harness::new().await;
    let raw = h.raw_material("RM-1", dec!(1)).await;
    let formula = h.formula("F-1", "Toner").await;
    h.catalog
        .update_formula(
            formula,
            FormulaUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_matches!(
        h.composition
            .add_component(formula, ComponentSlot::FormulaRawMaterial, raw, dec!(1))
            .await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
async fn formula_cannot_contain_itself() {
    let h = Harness::new().await;
    let formula = h.formula("F-1", "Toner").await;

    assert_matches!(
        h.composition
            .add_component(formula, ComponentSlot::FormulaNestedFormula, formula, dec!(1))
            .await,
        Err(ServiceError::CycleDetected(_))
    );
}

#[tokio::test]
async fn transitive_nesting_cycle_is_rejected() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    let outer = h.formula("F-OUTER", "Outer").await;
    h.add(outer, ComponentSlot::FormulaNestedFormula, blend.final_blend, dec!(1))
        .await;

    // Base Mix -> Outer would close Outer -> Final Blend -> Base Mix.
    assert_matches!(
        h.composition
            .add_component(
                blend.base_mix,
                ComponentSlot::FormulaNestedFormula,
                outer,
                dec!(1)
            )
            .await,
        Err(ServiceError::CycleDetected(_))
    );

    let composition = h
        .composition
        .composition(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();
    assert_eq!(composition.lines.len(), 2);
}

#[tokio::test]
async fn mutation_marks_owner_and_ancestors_stale() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    let product = h.product("Blend Jar").await;
    h.add(product, ComponentSlot::ProductFormula, blend.final_blend, dec!(1))
        .await;
    h.engine.recompute_all().await.unwrap();
    assert!(!h.formula_row(blend.final_blend).await.cost_stale);

    let change = h
        .composition
        .update_quantity(
            blend.base_mix,
            ComponentSlot::FormulaRawMaterial,
            blend.line_a,
            dec!(3),
        )
        .await
        .unwrap();

    assert_eq!(change.line.quantity, dec!(3));
    assert!(change.recomputed.is_empty());
    let affected: BTreeSet<CostNode> = change.affected.into_iter().collect();
    let expected: BTreeSet<CostNode> = [
        CostNode::Formula(blend.base_mix),
        CostNode::Formula(blend.final_blend),
        CostNode::Product(product),
    ]
    .into_iter()
    .collect();
    assert_eq!(affected, expected);

    assert!(h.formula_row(blend.base_mix).await.cost_stale);
    assert!(h.formula_row(blend.final_blend).await.cost_stale);
    assert!(h.product_row(product).await.cost_stale);
    // Manual mode leaves the cached totals alone.
    assert_eq!(h.formula_total(blend.base_mix).await, dec!(6.00));
}

#[tokio::test]
async fn automatic_mode_recomputes_ancestors_immediately() {
    let h = Harness::with_options(options(
        PropagationMode::Automatic,
        DanglingPolicy::ExcludeAndWarn,
    ))
    .await;
    let blend = seed_blend(&h).await;

    assert_eq!(h.formula_total(blend.base_mix).await, dec!(6.00));
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(18.00));

    let change = h
        .composition
        .update_quantity(
            blend.final_blend,
            ComponentSlot::FormulaNestedFormula,
            blend.nested_line,
            dec!(2),
        )
        .await
        .unwrap();

    assert_eq!(change.recomputed.len(), 1);
    assert_eq!(change.recomputed[0].total_cost, dec!(12.00));
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(12.00));
    assert!(!h.formula_row(blend.final_blend).await.cost_stale);
}

#[tokio::test]
async fn automatic_mode_follows_material_price_changes() {
    let h = Harness::with_options(options(
        PropagationMode::Automatic,
        DanglingPolicy::ExcludeAndWarn,
    ))
    .await;
    let blend = seed_blend(&h).await;

    h.catalog
        .update_raw_material(
            blend.raw_a,
            MaterialUpdate {
                unit_cost: Some(dec!(2.50)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(h.formula_total(blend.base_mix).await, dec!(8.00));
    assert_eq!(h.formula_total(blend.final_blend).await, dec!(24.00));
}

#[tokio::test]
async fn material_price_change_marks_users_stale() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    h.engine.recompute_all().await.unwrap();

    h.catalog
        .update_raw_material(
            blend.raw_b,
            MaterialUpdate {
                unit_cost: Some(dec!(4.00)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(h.formula_row(blend.base_mix).await.cost_stale);
    assert!(h.formula_row(blend.final_blend).await.cost_stale);
    assert_eq!(h.formula_total(blend.base_mix).await, dec!(6.00));
}

#[tokio::test]
async fn renaming_material_does_not_mark_users_stale() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    h.engine.recompute_all().await.unwrap();

    h.catalog
        .update_raw_material(
            blend.raw_b,
            MaterialUpdate {
                name: Some("Witch hazel extract".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!h.formula_row(blend.base_mix).await.cost_stale);
}

#[tokio::test]
async fn line_addressed_through_wrong_owner_is_rejected() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;
    let other = h.formula("F-OTHER", "Other").await;

    assert_matches!(
        h.composition
            .update_quantity(other, ComponentSlot::FormulaRawMaterial, blend.line_a, dec!(5))
            .await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        h.composition
            .remove_component(other, ComponentSlot::FormulaRawMaterial, blend.line_a)
            .await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        h.composition
            .remove_component(blend.base_mix, ComponentSlot::FormulaRawMaterial, 9_999)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn removed_line_no_longer_contributes() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    let change = h
        .composition
        .remove_component(blend.base_mix, ComponentSlot::FormulaRawMaterial, blend.line_b)
        .await
        .unwrap();
    assert_eq!(change.line.component_id, blend.raw_b);

    let composition = h
        .composition
        .composition(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();
    assert_eq!(composition.lines.len(), 1);
    assert_eq!(composition.lines[0].line_id, blend.line_a);

    let rollup = h
        .engine
        .recompute_cost(blend.base_mix, EntityKind::Formula)
        .await
        .unwrap();
    assert_eq!(rollup.total_cost, dec!(3.00));
}

#[tokio::test]
async fn composition_of_missing_owner_is_not_found() {
    let h = Harness::new().await;
    assert_matches!(
        h.composition.composition(5, EntityKind::Product).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn duplicate_material_code_conflicts() {
    let h = Harness::new().await;
    h.raw_material("RM-ALOE", dec!(1)).await;

    let duplicate = h
        .catalog
        .create_raw_material(NewMaterial {
            code: "RM-ALOE".into(),
            name: "Aloe again".into(),
            unit_cost: dec!(2),
            unit_of_measure_id: None,
        })
        .await;
    assert_matches!(duplicate, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn deleting_formula_leaves_parent_line_dangling() {
    let h = Harness::new().await;
    let blend = seed_blend(&h).await;

    h.catalog.delete_formula(blend.base_mix).await.unwrap();
    assert!(h.formula_row(blend.final_blend).await.cost_stale);

    let rollup = h
        .engine
        .recompute_cost(blend.final_blend, EntityKind::Formula)
        .await
        .unwrap();
    assert_eq!(rollup.total_cost, Decimal::ZERO);
    assert_eq!(rollup.dangling.len(), 1);
    assert_eq!(rollup.dangling[0].line_id, blend.nested_line);
}
