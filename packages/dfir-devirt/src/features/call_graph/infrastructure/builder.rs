//! Call graph construction
//!
//! Depth-first walk from the root set over DFIR bodies. Static calls add one
//! edge to their callee. A virtual call adds one edge per implementation it
//! may dispatch to: the callees of a previous devirtualization result when one
//! is available, otherwise the slot implementations of every instantiable
//! inheritor of the receiver type.

use crate::errors::Result;
use crate::features::call_graph::domain::{CallGraph, CallRef, CallSite};
use crate::features::devirtualization::domain::{DevirtualizationResult, VirtualCallId};
use crate::features::devirtualization::infrastructure::TypeHierarchy;
use crate::features::dfir::domain::{Call, DfgProgram, Dispatch, FunctionId, Node, NodeId, TypeId};
use std::time::Instant;
use tracing::{debug, info};

pub struct CallGraphBuilder<'a> {
    program: DfgProgram<'a>,
    hierarchy: &'a TypeHierarchy,
    devirtualized: Option<&'a DevirtualizationResult>,
    goto_external: bool,
    graph: CallGraph,
    stack: Vec<FunctionId>,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(
        program: DfgProgram<'a>,
        hierarchy: &'a TypeHierarchy,
        devirtualized: Option<&'a DevirtualizationResult>,
        goto_external: bool,
    ) -> Self {
        Self {
            program,
            hierarchy,
            devirtualized,
            goto_external,
            graph: CallGraph::new(),
            stack: Vec::new(),
        }
    }

    pub fn build(mut self, roots: &[FunctionId]) -> Result<CallGraph> {
        let start = Instant::now();
        for &root in roots {
            self.reach(root);
        }
        while let Some(function) = self.stack.pop() {
            self.visit(function)?;
        }
        self.graph.rebuild_reversed();

        info!(
            roots = roots.len(),
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            virtual_edges = self.graph.virtual_edge_count(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Built call graph"
        );
        Ok(self.graph)
    }

    /// Register `function`, scheduling its body when it should be expanded
    fn reach(&mut self, function: FunctionId) {
        if !self.graph.add_node(function) {
            return;
        }
        let has_body = self.program.function(function).is_some();
        if has_body && (self.goto_external || self.program.is_local(function)) {
            self.stack.push(function);
        }
    }

    fn visit(&mut self, caller: FunctionId) -> Result<()> {
        let Some(function) = self.program.function(caller) else {
            return Ok(());
        };
        for (index, node) in function.body.nodes.iter().enumerate() {
            let call = CallRef {
                caller,
                node: NodeId(index as u32),
            };
            match node {
                Node::StaticCall { call: c, .. } | Node::NewObject { call: c, .. } => {
                    let callee = self.program.resolve_function(c.callee);
                    self.add_edge(call, callee, false);
                }
                Node::VirtualCall {
                    call: c,
                    receiver_type,
                    dispatch,
                } => self.virtual_call(call, c, *receiver_type, *dispatch)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn virtual_call(&mut self, site: CallRef, call: &Call, receiver_type: TypeId, dispatch: Dispatch) -> Result<()> {
        let id = VirtualCallId {
            function: site.caller,
            node: site.node,
        };
        if let Some(devirtualized) = self.devirtualized.and_then(|r| r.get(&id)) {
            let is_virtual = devirtualized.possible_callees.len() > 1;
            for callee in &devirtualized.possible_callees {
                let target = self.program.resolve_function(callee.callee);
                self.add_edge(site, target, is_virtual);
            }
            return Ok(());
        }

        let receiver = self.program.resolve_type(receiver_type);
        if receiver == TypeId::VIRTUAL {
            debug!(
                caller = %self.program.arena.function_display(site.caller),
                node = site.node.0,
                "Virtual receiver, call left unresolved"
            );
            // Declared callee stays a leaf: its body is never expanded
            let callee = self.program.resolve_function(call.callee);
            self.graph.add_node(callee);
            self.graph.add_edge(CallSite {
                call: site,
                is_virtual: true,
                actual_callee: callee,
            });
            return Ok(());
        }

        let inheritors = self.hierarchy.inheritors_of(receiver);
        for &inheritor in inheritors.iter() {
            if self.program.arena.ty(inheritor).is_abstract {
                continue;
            }
            let implementation = self.program.dispatch_target(inheritor, dispatch)?;
            let target = self.program.resolve_function(implementation);
            self.add_edge(site, target, true);
        }
        Ok(())
    }

    fn add_edge(&mut self, call: CallRef, callee: FunctionId, is_virtual: bool) {
        self.graph.add_edge(CallSite {
            call,
            is_virtual,
            actual_callee: callee,
        });
        self.reach(callee);
    }
}
