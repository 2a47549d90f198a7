//! Property-based tests for type propagation
//!
//! Random constraint graphs are solved and compared against a naive
//! round-robin fixpoint, which is the least closed assignment by construction.

use dfir_devirt::features::devirtualization::domain::{CgNodeId, ConstraintGraph};
use dfir_devirt::features::devirtualization::infrastructure::{is_closed, Condensation, TypePropagation};
use dfir_devirt::features::devirtualization::TypeBitSet;
use proptest::prelude::*;
use std::rc::Rc;

const MAX_TYPE: u32 = 70;

/// Edge list of a random graph: sources first, then ordinary nodes
#[derive(Debug, Clone)]
struct RandomGraph {
    sources: Vec<u32>,
    ordinary: usize,
    direct: Vec<(usize, usize)>,
    casts: Vec<(usize, usize, Vec<u32>)>,
}

impl RandomGraph {
    fn build(&self) -> ConstraintGraph {
        let mut graph = ConstraintGraph::new();
        for &ty in &self.sources {
            graph.add_source(ty, None);
        }
        for _ in 0..self.ordinary {
            graph.add_ordinary(None);
        }
        let target = |index: usize| CgNodeId((self.sources.len() + index % self.ordinary) as u32);
        let any = |index: usize| CgNodeId((index % (self.sources.len() + self.ordinary)) as u32);
        for &(from, to) in &self.direct {
            graph.add_edge(any(from), target(to));
        }
        for (from, to, suitable) in &self.casts {
            let suitable: TypeBitSet = suitable.iter().copied().collect();
            graph.add_cast_edge(any(*from), target(*to), Rc::new(suitable));
        }
        graph
    }
}

fn random_graph() -> impl Strategy<Value = RandomGraph> {
    (
        prop::collection::vec(0..MAX_TYPE, 1..8),
        1usize..24,
        prop::collection::vec((0usize..64, 0usize..64), 0..48),
        prop::collection::vec(
            (0usize..64, 0usize..64, prop::collection::vec(0..MAX_TYPE, 0..12)),
            0..16,
        ),
    )
        .prop_map(|(sources, ordinary, direct, casts)| RandomGraph {
            sources,
            ordinary,
            direct,
            casts,
        })
}

/// Round-robin relaxation until nothing changes
fn naive_fixpoint(graph: &ConstraintGraph) -> Vec<TypeBitSet> {
    let mut types: Vec<TypeBitSet> = graph.node_ids().map(|id| graph.node(id).types.clone()).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for id in graph.node_ids() {
            let node = graph.node(id);
            let current = types[id.index()].clone();
            for to in &node.direct_edges {
                changed |= types[to.index()].union_with(&current);
            }
            for edge in &node.cast_edges {
                let passed = current.intersection(&edge.suitable_types);
                changed |= types[edge.node.index()].union_with(&passed);
            }
        }
    }
    types
}

fn assignment(graph: &ConstraintGraph) -> Vec<TypeBitSet> {
    graph.node_ids().map(|id| graph.node(id).types.clone()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_solution_is_the_least_closed_assignment(layout in random_graph()) {
        let mut graph = layout.build();
        let expected = naive_fixpoint(&graph);
        TypePropagation::new().solve(&mut graph).unwrap();

        prop_assert!(is_closed(&graph));
        prop_assert_eq!(assignment(&graph), expected);
    }

    #[test]
    fn prop_solving_twice_changes_nothing(layout in random_graph()) {
        let mut graph = layout.build();
        TypePropagation::new().solve(&mut graph).unwrap();
        let first = assignment(&graph);
        TypePropagation::new().solve(&mut graph).unwrap();
        prop_assert_eq!(assignment(&graph), first);
    }

    #[test]
    fn prop_bad_edge_order_does_not_matter(layout in random_graph()) {
        let mut sorted = layout.build();
        let mut unsorted = layout.build();
        TypePropagation::new().with_sorted_bad_edges(true).solve(&mut sorted).unwrap();
        TypePropagation::new().with_sorted_bad_edges(false).solve(&mut unsorted).unwrap();
        prop_assert_eq!(assignment(&sorted), assignment(&unsorted));
    }

    #[test]
    fn prop_strongly_connected_nodes_agree(layout in random_graph()) {
        let mut graph = layout.build();
        TypePropagation::new().solve(&mut graph).unwrap();
        for component in &Condensation::build(&graph).components {
            let first = &graph.node(component[0]).types;
            for &member in &component[1..] {
                prop_assert_eq!(&graph.node(member).types, first);
            }
        }
    }

    #[test]
    fn prop_condensation_is_topological(layout in random_graph()) {
        let graph = layout.build();
        let condensation = Condensation::build(&graph);
        let mut position = vec![0usize; graph.len()];
        for (index, component) in condensation.components.iter().enumerate() {
            for member in component {
                position[member.index()] = index;
            }
        }
        for from in graph.node_ids() {
            for to in &graph.node(from).direct_edges {
                prop_assert!(position[from.index()] <= position[to.index()]);
            }
        }
    }

    #[test]
    fn prop_union_and_intersection_agree_with_membership(
        a in prop::collection::vec(0..200u32, 0..40),
        b in prop::collection::vec(0..200u32, 0..40),
    ) {
        let left: TypeBitSet = a.iter().copied().collect();
        let right: TypeBitSet = b.iter().copied().collect();
        let mut union = left.clone();
        union.union_with(&right);
        let intersection = left.intersection(&right);
        let difference = left.difference(&right);

        for id in 0..200u32 {
            let (in_left, in_right) = (left.contains(id), right.contains(id));
            prop_assert_eq!(union.contains(id), in_left || in_right);
            prop_assert_eq!(intersection.contains(id), in_left && in_right);
            prop_assert_eq!(difference.contains(id), in_left && !in_right);
        }
        prop_assert!(intersection.is_subset(&left));
        prop_assert!(left.is_subset(&union));
        prop_assert_eq!(union.len(), left.len() + right.len() - intersection.len());
    }

    #[test]
    fn prop_union_reports_growth(
        a in prop::collection::vec(0..130u32, 0..20),
        b in prop::collection::vec(0..130u32, 0..20),
    ) {
        let mut left: TypeBitSet = a.iter().copied().collect();
        let right: TypeBitSet = b.iter().copied().collect();
        let grows = !right.is_subset(&left);
        prop_assert_eq!(left.union_with(&right), grows);
        prop_assert!(!left.union_with(&right));
    }
}
