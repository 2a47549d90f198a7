//! Type propagation over the constraint graph
//!
//! 1. Condense direct edges and number components in topological order.
//! 2. One forward sweep: each component takes the union of what flows in along
//!    direct edges and along cast edges coming from earlier components.
//! 3. Cast edges pointing to an earlier component ("bad" edges) are iterated
//!    to a fixpoint, pushing only the missing types further.
//!
//! The result is the least assignment closed under every edge.

use super::condensation::Condensation;
use crate::errors::{DevirtError, Result};
use crate::features::devirtualization::domain::{CgNodeId, ConstraintGraph, TypeBitSet};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverStats {
    pub scc_count: usize,
    pub cyclic_sccs: usize,
    pub largest_scc: usize,
    pub bad_edges: usize,
    pub fixpoint_rounds: usize,
}

pub struct TypePropagation {
    sort_bad_edges: bool,
}

impl Default for TypePropagation {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePropagation {
    pub fn new() -> Self {
        Self {
            sort_bad_edges: true,
        }
    }

    pub fn with_sorted_bad_edges(mut self, sort: bool) -> Self {
        self.sort_bad_edges = sort;
        self
    }

    pub fn solve(&self, graph: &mut ConstraintGraph) -> Result<SolverStats> {
        for id in graph.node_ids() {
            let node = graph.node(id);
            if node.is_source() && node.has_incoming_edges() {
                return Err(DevirtError::internal(format!(
                    "Source node #{} has incoming edges",
                    id.0
                )));
            }
        }

        let condensation = Condensation::build(graph);
        let priorities = condensation.priorities(graph.len());
        for id in graph.node_ids() {
            graph.node_mut(id).priority = priorities[id.index()];
        }

        forward_sweep(graph, &condensation);

        let mut bad_edges: Vec<(CgNodeId, CgNodeId, Rc<TypeBitSet>)> = Vec::new();
        for id in graph.node_ids() {
            let node = graph.node(id);
            for edge in &node.cast_edges {
                if graph.node(edge.node).priority < node.priority {
                    bad_edges.push((id, edge.node, Rc::clone(&edge.suitable_types)));
                }
            }
        }
        if self.sort_bad_edges {
            bad_edges.sort_by_key(|(_, to, _)| graph.node(*to).priority);
        }

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (from, to, suitable) in &bad_edges {
                let mut missing = graph.node(*from).types.difference(&graph.node(*to).types);
                missing.intersect_with(suitable);
                if !missing.is_empty() {
                    changed = true;
                    propagate(graph, *to, missing);
                }
            }
            if !changed {
                break;
            }
        }

        let stats = SolverStats {
            scc_count: condensation.len(),
            cyclic_sccs: condensation.cycle_count(),
            largest_scc: condensation.largest(),
            bad_edges: bad_edges.len(),
            fixpoint_rounds: rounds,
        };
        debug!(?stats, "Type propagation finished");
        Ok(stats)
    }
}

fn forward_sweep(graph: &mut ConstraintGraph, condensation: &Condensation) {
    for component in &condensation.components {
        if let [single] = component.as_slice() {
            if graph.node(*single).is_source() {
                continue;
            }
        }
        let mut types = TypeBitSet::new();
        for &member in component {
            let node = graph.node(member);
            for &from in &node.reversed_direct_edges {
                types.union_with(&graph.node(from).types);
            }
            for edge in &node.reversed_cast_edges {
                let source = graph.node(edge.node);
                if source.priority < node.priority {
                    types.union_with(&source.types.intersection(&edge.suitable_types));
                }
            }
        }
        for &member in component {
            graph.node_mut(member).types.union_with(&types);
        }
    }
}

/// Add `types` to `start` and push whatever is missing downstream
fn propagate(graph: &mut ConstraintGraph, start: CgNodeId, types: TypeBitSet) {
    let mut stack = vec![(start, types)];
    while let Some((id, types)) = stack.pop() {
        graph.node_mut(id).types.union_with(&types);
        let node = graph.node(id);
        for &to in &node.direct_edges {
            let missing = types.difference(&graph.node(to).types);
            if !missing.is_empty() {
                stack.push((to, missing));
            }
        }
        for edge in &node.cast_edges {
            let mut missing = types.difference(&graph.node(edge.node).types);
            missing.intersect_with(&edge.suitable_types);
            if !missing.is_empty() {
                stack.push((edge.node, missing));
            }
        }
    }
}

/// True if every edge's constraint holds in the current assignment
pub fn is_closed(graph: &ConstraintGraph) -> bool {
    graph.node_ids().all(|id| {
        let node = graph.node(id);
        node.direct_edges
            .iter()
            .all(|to| node.types.is_subset(&graph.node(*to).types))
            && node.cast_edges.iter().all(|edge| {
                node.types
                    .intersection(&edge.suitable_types)
                    .is_subset(&graph.node(edge.node).types)
            })
    })
}
