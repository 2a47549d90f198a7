//! DFIR functions

use super::node::{Dispatch, Edge, Node, NodeId};
use super::symbols::{FunctionId, SymbolArena};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody {
    pub nodes: Vec<Node>,
    /// Synthetic variable merging every returned value
    pub returns: NodeId,
    /// Synthetic variable merging every thrown value
    pub throws: NodeId,
}

impl FunctionBody {
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges().len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub symbol: FunctionId,
    pub body: FunctionBody,
}

impl Function {
    /// Virtual call nodes of the body
    pub fn virtual_calls(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.body
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_virtual_call())
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Human-readable dump of the body, one node per line
    pub fn render(&self, arena: &SymbolArena) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "FUNCTION {}", arena.function_display(self.symbol));
        for id in self.body.node_ids() {
            let _ = writeln!(out, "    #{}: {}", id.0, render_node(self.body.node(id), arena));
        }
        let _ = writeln!(out, "    Returns: #{}", self.body.returns.0);
        let _ = writeln!(out, "    Throws: #{}", self.body.throws.0);
        out
    }
}

fn render_edge(edge: &Edge, arena: &SymbolArena) -> String {
    match edge.cast_to {
        None => format!("#{}", edge.node.0),
        Some(ty) => format!("#{} as {}", edge.node.0, arena.type_display(ty)),
    }
}

fn render_edges(edges: &[Edge], arena: &SymbolArena) -> String {
    edges
        .iter()
        .map(|e| render_edge(e, arena))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_node(node: &Node, arena: &SymbolArena) -> String {
    match node {
        Node::Parameter { index } => format!("Param({})", index),
        Node::Const { ty } => format!("Const({})", arena.type_display(*ty)),
        Node::StaticCall { call, .. } | Node::NewObject { call, .. } => format!(
            "{}({}; {})",
            node.kind_name(),
            arena.function_display(call.callee),
            render_edges(&call.arguments, arena)
        ),
        Node::VirtualCall {
            call,
            receiver_type,
            dispatch,
        } => {
            let selector = match dispatch {
                Dispatch::Vtable { index } => format!("slot {}", index),
                Dispatch::Itable { method_hash } => format!("hash {:x}", method_hash),
            };
            format!(
                "{}({}; {}; receiver {}; {})",
                node.kind_name(),
                arena.function_display(call.callee),
                selector,
                arena.type_display(*receiver_type),
                render_edges(&call.arguments, arena)
            )
        }
        Node::Singleton { ty, .. } => format!("Singleton({})", arena.type_display(*ty)),
        Node::AllocInstance { ty } => format!("AllocInstance({})", arena.type_display(*ty)),
        Node::FieldRead { receiver, field } => format!(
            "FieldRead({}; {})",
            field.name.as_deref().unwrap_or("?"),
            receiver.map(|r| render_edge(&r, arena)).unwrap_or_default()
        ),
        Node::FieldWrite {
            receiver,
            field,
            value,
        } => format!(
            "FieldWrite({}; {}; {})",
            field.name.as_deref().unwrap_or("?"),
            receiver.map(|r| render_edge(&r, arena)).unwrap_or_default(),
            render_edge(value, arena)
        ),
        Node::ArrayRead { array, index } => format!(
            "ArrayRead({}[{}])",
            render_edge(array, arena),
            render_edge(index, arena)
        ),
        Node::ArrayWrite {
            array,
            index,
            value,
        } => format!(
            "ArrayWrite({}[{}] = {})",
            render_edge(array, arena),
            render_edge(index, arena),
            render_edge(value, arena)
        ),
        Node::Variable { values, kind, .. } => {
            format!("Variable({:?}; {})", kind, render_edges(values, arena))
        }
    }
}
