//! Condensation of the constraint graph
//!
//! Strongly connected components over direct edges, listed in topological
//! order: every direct edge between two components goes from an earlier one
//! to a later one. Cast edges are not part of the condensation; the solver
//! handles the ones that point backwards separately.

use crate::features::devirtualization::domain::{CgNodeId, ConstraintGraph};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

#[derive(Debug, Clone, Default)]
pub struct Condensation {
    /// Components in topological order
    pub components: Vec<Vec<CgNodeId>>,
}

impl Condensation {
    pub fn build(graph: &ConstraintGraph) -> Self {
        let mut digraph: DiGraph<(), ()> = DiGraph::with_capacity(graph.len(), graph.direct_edge_count());
        for _ in graph.node_ids() {
            digraph.add_node(());
        }
        for from in graph.node_ids() {
            for to in &graph.node(from).direct_edges {
                digraph.add_edge(NodeIndex::new(from.index()), NodeIndex::new(to.index()), ());
            }
        }

        // tarjan_scc yields components in reverse topological order
        let mut components: Vec<Vec<CgNodeId>> = tarjan_scc(&digraph)
            .into_iter()
            .map(|scc| scc.into_iter().map(|n| CgNodeId(n.index() as u32)).collect())
            .collect();
        components.reverse();
        Self { components }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components with more than one node
    pub fn cycle_count(&self) -> usize {
        self.components.iter().filter(|c| c.len() > 1).count()
    }

    pub fn largest(&self) -> usize {
        self.components.iter().map(|c| c.len()).max().unwrap_or(0)
    }

    /// Component index of every node
    pub fn priorities(&self, node_count: usize) -> Vec<u32> {
        let mut priorities = vec![0u32; node_count];
        for (index, component) in self.components.iter().enumerate() {
            for node in component {
                priorities[node.index()] = index as u32;
            }
        }
        priorities
    }
}
