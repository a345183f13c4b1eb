// Cost engine
pub mod cost_rollup;
pub mod dependency_graph;

// Catalog and composition management
pub mod catalog;
pub mod composition;
