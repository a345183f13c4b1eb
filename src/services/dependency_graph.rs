use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use sea_orm::{ConnectionTrait, EntityTrait, QuerySelect};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    entities::{formula, formula_nested_formula, product, product_formula},
    errors::ServiceError,
    services::cost_rollup::EntityKind,
};

/// A composite whose cost is derived from its composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CostNode {
    Formula(i32),
    Product(i32),
}

impl CostNode {
    pub fn new(kind: EntityKind, id: i32) -> Self {
        match kind {
            EntityKind::Formula => CostNode::Formula(id),
            EntityKind::Product => CostNode::Product(id),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            CostNode::Formula(_) => EntityKind::Formula,
            CostNode::Product(_) => EntityKind::Product,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            CostNode::Formula(id) | CostNode::Product(id) => *id,
        }
    }
}

impl fmt::Display for CostNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Composition edges between formulas and products.
///
/// An edge `parent -> child` means `parent` embeds `child` (a formula nesting
/// another formula, or a product using a formula). Materials are leaves and
/// are not part of the graph.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<CostNode>,
    parents: BTreeMap<CostNode, BTreeSet<CostNode>>,
    children: BTreeMap<CostNode, BTreeSet<CostNode>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from every formula, product and embedding row.
    ///
    /// Rows pointing at a formula that no longer exists are skipped; the
    /// rollup reports those as dangling references.
    #[instrument(skip(conn))]
    pub async fn load<C>(conn: &C) -> Result<Self, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut graph = Self::new();

        let formula_ids: Vec<i32> = formula::Entity::find()
            .select_only()
            .column(formula::Column::Id)
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        for id in formula_ids {
            graph.add_node(CostNode::Formula(id));
        }

        let product_ids: Vec<i32> = product::Entity::find()
            .select_only()
            .column(product::Column::Id)
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        for id in product_ids {
            graph.add_node(CostNode::Product(id));
        }

        let nested: Vec<(i32, i32)> = formula_nested_formula::Entity::find()
            .select_only()
            .column(formula_nested_formula::Column::ParentFormulaId)
            .column(formula_nested_formula::Column::ChildFormulaId)
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        for (parent, child) in nested {
            graph.link_known(CostNode::Formula(parent), CostNode::Formula(child));
        }

        let used: Vec<(i32, i32)> = product_formula::Entity::find()
            .select_only()
            .column(product_formula::Column::ProductId)
            .column(product_formula::Column::FormulaId)
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        for (product_id, formula_id) in used {
            graph.link_known(CostNode::Product(product_id), CostNode::Formula(formula_id));
        }

        debug!(nodes = graph.nodes.len(), "dependency graph loaded");
        Ok(graph)
    }

    pub fn add_node(&mut self, node: CostNode) {
        self.nodes.insert(node);
    }

    /// Records that `parent` embeds `child`, adding both nodes if needed.
    pub fn add_edge(&mut self, parent: CostNode, child: CostNode) {
        self.nodes.insert(parent);
        self.nodes.insert(child);
        self.parents.entry(child).or_default().insert(parent);
        self.children.entry(parent).or_default().insert(child);
    }

    fn link_known(&mut self, parent: CostNode, child: CostNode) {
        if self.nodes.contains(&parent) && self.nodes.contains(&child) {
            self.add_edge(parent, child);
        }
    }

    pub fn contains(&self, node: CostNode) -> bool {
        self.nodes.contains(&node)
    }

    pub fn nodes(&self) -> &BTreeSet<CostNode> {
        &self.nodes
    }

    /// Composites that embed `node` directly.
    pub fn parents_of(&self, node: CostNode) -> BTreeSet<CostNode> {
        self.parents.get(&node).cloned().unwrap_or_default()
    }

    /// Every composite that embeds `node`, directly or transitively.
    /// `node` itself is only included when it sits on a cycle.
    pub fn ancestors_of(&self, node: CostNode) -> BTreeSet<CostNode> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<CostNode> = VecDeque::from([node]);

        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.parents.get(&current) {
                for parent in parents {
                    if seen.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }
        }

        seen
    }

    /// `nodes` plus all of their ancestors.
    pub fn closure_of<I>(&self, nodes: I) -> BTreeSet<CostNode>
    where
        I: IntoIterator<Item = CostNode>,
    {
        let mut closure = BTreeSet::new();
        for node in nodes {
            closure.insert(node);
            closure.extend(self.ancestors_of(node));
        }
        closure
    }

    /// Whether letting formula `parent` nest formula `child` would close a loop.
    pub fn would_create_cycle(&self, parent: i32, child: i32) -> bool {
        parent == child
            || self
                .ancestors_of(CostNode::Formula(parent))
                .contains(&CostNode::Formula(child))
    }

    /// Orders `subset` so every node comes after the nodes it embeds.
    ///
    /// Edges leaving the subset are ignored. Ties are broken by node order,
    /// formulas before products, lower ids first.
    pub fn topological_order(
        &self,
        subset: &BTreeSet<CostNode>,
    ) -> Result<Vec<CostNode>, ServiceError> {
        let mut pending: BTreeMap<CostNode, usize> = subset
            .iter()
            .map(|node| {
                let inside = self
                    .children
                    .get(node)
                    .map(|children| children.iter().filter(|c| subset.contains(c)).count())
                    .unwrap_or(0);
                (*node, inside)
            })
            .collect();

        let mut ready: BTreeSet<CostNode> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut order = Vec::with_capacity(subset.len());
        while let Some(node) = ready.pop_first() {
            pending.remove(&node);
            order.push(node);

            if let Some(parents) = self.parents.get(&node) {
                for parent in parents.iter().filter(|p| subset.contains(p)) {
                    if let Some(count) = pending.get_mut(parent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(*parent);
                        }
                    }
                }
            }
        }

        if !pending.is_empty() {
            let stuck: Vec<String> = pending.keys().map(ToString::to_string).collect();
            return Err(ServiceError::CycleDetected(format!(
                "Composition cycle among {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn f(id: i32) -> CostNode {
        CostNode::Formula(id)
    }

    fn p(id: i32) -> CostNode {
        CostNode::Product(id)
    }

    /// base (1) <- blend (2) <- deluxe (3), and product 10 uses blend and base.
    fn sample() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_edge(f(2), f(1));
        graph.add_edge(f(3), f(2));
        graph.add_edge(p(10), f(2));
        graph.add_edge(p(10), f(1));
        graph.add_node(f(4));
        graph
    }

    #[test]
    fn ancestors_are_transitive() {
        let graph = sample();
        assert_eq!(
            graph.ancestors_of(f(1)),
            BTreeSet::from([f(2), f(3), p(10)])
        );
        assert_eq!(graph.ancestors_of(f(3)), BTreeSet::new());
        assert_eq!(graph.ancestors_of(f(4)), BTreeSet::new());
    }

    #[test]
    fn self_nesting_is_a_cycle() {
        assert!(sample().would_create_cycle(4, 4));
    }

    #[test]
    fn transitive_nesting_is_a_cycle() {
        let graph = sample();
        // 1 is embedded by 3 through 2, so 1 may not embed 3.
        assert!(graph.would_create_cycle(1, 3));
        assert!(graph.would_create_cycle(1, 2));
        assert!(!graph.would_create_cycle(3, 1));
        assert!(!graph.would_create_cycle(4, 1));
    }

    #[test]
    fn topological_order_is_leaves_first() {
        let graph = sample();
        let order = graph.topological_order(graph.nodes()).unwrap();
        assert_eq!(order, vec![f(1), f(2), f(3), f(4), p(10)]);
    }

    #[test]
    fn topological_order_respects_subset() {
        let graph = sample();
        let subset = graph.closure_of([f(2)]);
        assert_eq!(subset, BTreeSet::from([f(2), f(3), p(10)]));
        assert_eq!(
            graph.topological_order(&subset).unwrap(),
            vec![f(2), f(3), p(10)]
        );
    }

    #[test]
    fn stored_cycle_is_reported() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(f(1), f(2));
        graph.add_edge(f(2), f(1));
        graph.add_node(f(3));
        assert_matches!(
            graph.topological_order(graph.nodes()),
            Err(ServiceError::CycleDetected(msg)) if msg.contains("formula 1")
        );
    }

    #[test]
    fn node_display_names_kind() {
        assert_eq!(p(7).to_string(), "product 7");
        assert_eq!(CostNode::new(EntityKind::Formula, 3), f(3));
    }

    proptest! {
        // Edges only ever point from a higher id to a lower one, so the graph is acyclic.
        #[test]
        fn order_places_children_before_parents(
            edges in prop::collection::vec((1i32..30, 1i32..30), 0..60)
        ) {
            let mut graph = DependencyGraph::new();
            for (a, b) in edges {
                if a > b {
                    graph.add_edge(f(a), f(b));
                }
            }

            let order = graph.topological_order(graph.nodes()).unwrap();
            prop_assert_eq!(order.len(), graph.nodes().len());

            let position: BTreeMap<CostNode, usize> =
                order.iter().enumerate().map(|(i, n)| (*n, i)).collect();
            for node in graph.nodes() {
                for parent in graph.parents_of(*node) {
                    prop_assert!(position[node] < position[&parent]);
                }
            }
        }

        #[test]
        fn accepted_edges_never_close_a_cycle(
            edges in prop::collection::vec((1i32..12, 1i32..12), 0..40)
        ) {
            let mut graph = DependencyGraph::new();
            for (parent, child) in edges {
                if !graph.would_create_cycle(parent, child) {
                    graph.add_edge(f(parent), f(child));
                }
            }
            prop_assert!(graph.topological_order(graph.nodes()).is_ok());
        }
    }
}
