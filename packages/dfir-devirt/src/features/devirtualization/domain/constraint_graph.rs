//! Constraint graph of the devirtualization analysis
//!
//! Every node holds the set of concrete types that may flow into it. Sources
//! seed a single type; direct edges copy sets forward; cast edges copy only
//! the types a cast lets through.

use super::type_bitset::TypeBitSet;
use crate::features::dfir::domain::{FunctionId, TypeId};
use std::rc::Rc;

/// Index of a node in the [`ConstraintGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CgNodeId(pub u32);

impl CgNodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgNodeKind {
    /// Seeds exactly one concrete type
    Source { type_id: u32 },
    Ordinary,
}

/// Edge filtered by the set of types a cast admits
#[derive(Debug, Clone)]
pub struct CastEdge {
    pub node: CgNodeId,
    pub suitable_types: Rc<TypeBitSet>,
}

#[derive(Debug, Clone)]
pub struct CgNode {
    pub kind: CgNodeKind,
    pub name: Option<String>,
    pub direct_edges: Vec<CgNodeId>,
    pub reversed_direct_edges: Vec<CgNodeId>,
    pub cast_edges: Vec<CastEdge>,
    pub reversed_cast_edges: Vec<CastEdge>,
    pub types: TypeBitSet,
    /// Position of the node's component in topological order
    pub priority: u32,
}

impl CgNode {
    fn new(kind: CgNodeKind, name: Option<String>) -> Self {
        let types = match kind {
            CgNodeKind::Source { type_id } => TypeBitSet::singleton(type_id),
            CgNodeKind::Ordinary => TypeBitSet::new(),
        };
        Self {
            kind,
            name,
            direct_edges: Vec::new(),
            reversed_direct_edges: Vec::new(),
            cast_edges: Vec::new(),
            reversed_cast_edges: Vec::new(),
            types,
            priority: 0,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self.kind, CgNodeKind::Source { .. })
    }

    pub fn has_incoming_edges(&self) -> bool {
        !self.reversed_direct_edges.is_empty() || !self.reversed_cast_edges.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintGraph {
    nodes: Vec<CgNode>,
}

impl ConstraintGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: CgNode) -> CgNodeId {
        let id = CgNodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn add_source(&mut self, type_id: u32, name: Option<String>) -> CgNodeId {
        self.push(CgNode::new(CgNodeKind::Source { type_id }, name))
    }

    pub fn add_ordinary(&mut self, name: Option<String>) -> CgNodeId {
        self.push(CgNode::new(CgNodeKind::Ordinary, name))
    }

    /// Types of `from` flow into `to`
    pub fn add_edge(&mut self, from: CgNodeId, to: CgNodeId) {
        self.nodes[from.index()].direct_edges.push(to);
        self.nodes[to.index()].reversed_direct_edges.push(from);
    }

    /// Types of `from` that are in `suitable_types` flow into `to`
    pub fn add_cast_edge(&mut self, from: CgNodeId, to: CgNodeId, suitable_types: Rc<TypeBitSet>) {
        self.nodes[from.index()].cast_edges.push(CastEdge {
            node: to,
            suitable_types: Rc::clone(&suitable_types),
        });
        self.nodes[to.index()]
            .reversed_cast_edges
            .push(CastEdge { node: from, suitable_types });
    }

    #[inline]
    pub fn node(&self, id: CgNodeId) -> &CgNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: CgNodeId) -> &mut CgNode {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = CgNodeId> {
        (0..self.nodes.len() as u32).map(CgNodeId)
    }

    pub fn direct_edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.direct_edges.len()).sum()
    }

    pub fn cast_edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.cast_edges.len()).sum()
    }

    /// One line per node with its outgoing edges
    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in self.node_ids() {
            let node = self.node(id);
            let label = node.name.as_deref().unwrap_or("");
            let kind = match node.kind {
                CgNodeKind::Source { type_id } => format!("Source({})", type_id),
                CgNodeKind::Ordinary => "Ordinary".to_string(),
            };
            out.push_str(&format!("    #{} {} {}", id.0, kind, label));
            for to in &node.direct_edges {
                out.push_str(&format!(" -> #{}", to.0));
            }
            for edge in &node.cast_edges {
                out.push_str(&format!(" -> #{} as {:?}", edge.node.0, edge.suitable_types));
            }
            out.push('\n');
        }
        out
    }
}

/// Constraint nodes standing for a function's interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConstraints {
    pub parameters: Vec<CgNodeId>,
    pub returns: CgNodeId,
}

/// Receiver of a virtual call and the implementations each receiver type selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCallReceiver {
    pub receiver: CgNodeId,
    pub candidates: Vec<(TypeId, FunctionId)>,
    pub caller: FunctionId,
}
