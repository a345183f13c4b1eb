//! Database entities.
//!
//! Catalog entities (`unit_of_measure`, `raw_material`, `labeling_material`)
//! are leaves of the cost graph. `formula` and `product` own composition
//! lines whose `partial_cost` is maintained by the rollup engine.

pub mod formula;
pub mod formula_nested_formula;
pub mod formula_raw_material;
pub mod labeling_material;
pub mod product;
pub mod product_formula;
pub mod product_labeling_material;
pub mod product_raw_material;
pub mod raw_material;
pub mod unit_of_measure;
