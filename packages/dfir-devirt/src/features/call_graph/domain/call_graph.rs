//! Call graph over DFIR functions
//!
//! Nodes are function symbols; each node owns the call sites of its body
//! together with the function every site may dispatch to. A virtual call
//! site appears once per possible target.

use crate::features::dfir::domain::{FunctionId, NodeId};
use std::collections::BTreeMap;

/// A call node inside its caller's body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallRef {
    pub caller: FunctionId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub call: CallRef,
    pub is_virtual: bool,
    /// Function the site dispatches to along this edge
    pub actual_callee: FunctionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallGraphNode {
    pub symbol: FunctionId,
    pub call_sites: Vec<CallSite>,
}

impl CallGraphNode {
    pub fn new(symbol: FunctionId) -> Self {
        Self {
            symbol,
            call_sites: Vec::new(),
        }
    }

    /// Distinct callees in first-seen order
    pub fn callees(&self) -> Vec<FunctionId> {
        let mut callees: Vec<FunctionId> = Vec::with_capacity(self.call_sites.len());
        for site in &self.call_sites {
            if !callees.contains(&site.actual_callee) {
                callees.push(site.actual_callee);
            }
        }
        callees
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub direct_edges: BTreeMap<FunctionId, CallGraphNode>,
    /// Callers of every present node; only edges between present nodes
    pub reversed_edges: BTreeMap<FunctionId, Vec<FunctionId>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, function: FunctionId) -> bool {
        self.direct_edges.contains_key(&function)
    }

    /// Register a node if absent; returns true when it was added
    pub fn add_node(&mut self, function: FunctionId) -> bool {
        if self.direct_edges.contains_key(&function) {
            return false;
        }
        self.direct_edges
            .insert(function, CallGraphNode::new(function));
        true
    }

    /// Append a call site to its caller, registering the caller if needed
    pub fn add_edge(&mut self, site: CallSite) {
        self.direct_edges
            .entry(site.call.caller)
            .or_insert_with(|| CallGraphNode::new(site.call.caller))
            .call_sites
            .push(site);
    }

    /// Recompute `reversed_edges` as the transpose of `direct_edges`
    pub fn rebuild_reversed(&mut self) {
        let mut reversed: BTreeMap<FunctionId, Vec<FunctionId>> = self
            .direct_edges
            .keys()
            .map(|&f| (f, Vec::new()))
            .collect();
        for (&caller, node) in &self.direct_edges {
            for callee in node.callees() {
                if let Some(callers) = reversed.get_mut(&callee) {
                    if !callers.contains(&caller) {
                        callers.push(caller);
                    }
                }
            }
        }
        self.reversed_edges = reversed;
    }

    pub fn callees(&self, function: FunctionId) -> Vec<FunctionId> {
        self.direct_edges
            .get(&function)
            .map(|n| n.callees())
            .unwrap_or_default()
    }

    pub fn callers(&self, function: FunctionId) -> &[FunctionId] {
        self.reversed_edges
            .get(&function)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.direct_edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.direct_edges.values().map(|n| n.call_sites.len()).sum()
    }

    pub fn virtual_edge_count(&self) -> usize {
        self.direct_edges
            .values()
            .flat_map(|n| n.call_sites.iter())
            .filter(|s| s.is_virtual)
            .count()
    }
}
