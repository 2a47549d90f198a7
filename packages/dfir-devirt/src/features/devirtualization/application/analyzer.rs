//! Devirtualization analysis
//!
//! Runs the whole pipeline over one program view:
//! instantiation search → constraint graph → type propagation → extraction.
//!
//! # Usage
//! ```text
//! let program = DfgProgram::new(&module, &external, &arena);
//! let analyzer = DevirtualizationAnalyzer::new(program, &config);
//! let (result, stats) = analyzer.analyze()?;
//! for (id, site) in &result.sites {
//!     if let Some(callee) = site.single_callee() { /* direct call */ }
//! }
//! ```

use crate::config::DevirtConfig;
use crate::errors::{DevirtError, Result};
use crate::features::call_graph::infrastructure::{all_global_initializers, compute_root_set};
use crate::features::devirtualization::domain::{
    DevirtualizationResult, DevirtualizedCallSite, DevirtualizedCallee, VirtualCallId,
};
use crate::features::devirtualization::infrastructure::{
    ConstraintGraphBuilder, ConstraintSystem, InstantiatedTypes, InstantiationSearcher,
    TypeHierarchy, TypePropagation,
};
use crate::features::dfir::domain::DfgProgram;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Statistics of one analysis run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevirtStats {
    pub functions_analyzed: usize,
    pub instantiated_types: usize,
    pub constraint_nodes: usize,
    pub direct_edges: usize,
    pub cast_edges: usize,
    pub scc_count: usize,
    pub cyclic_sccs: usize,
    pub largest_scc: usize,
    pub bad_edges: usize,
    pub fixpoint_rounds: usize,

    /// Virtual call sites with a receiver record
    pub virtual_call_sites: usize,
    /// Sites whose receiver set is closed (no `Virtual`)
    pub devirtualized_sites: usize,
    pub monomorphic_sites: usize,
    pub polymorphic_sites: usize,

    pub duration_search_ms: f64,
    pub duration_build_ms: f64,
    pub duration_solve_ms: f64,
    pub duration_total_ms: f64,
}

pub struct DevirtualizationAnalyzer<'a> {
    program: DfgProgram<'a>,
    config: &'a DevirtConfig,
    hierarchy: TypeHierarchy,
}

impl<'a> DevirtualizationAnalyzer<'a> {
    pub fn new(program: DfgProgram<'a>, config: &'a DevirtConfig) -> Self {
        let hierarchy = TypeHierarchy::new(&program);
        Self {
            program,
            config,
            hierarchy,
        }
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn analyze(&self) -> Result<(DevirtualizationResult, DevirtStats)> {
        let total = Instant::now();
        let program = self.program;
        let mut stats = DevirtStats::default();

        let start = Instant::now();
        let instantiated =
            InstantiationSearcher::new(program, &self.hierarchy, self.config.output_kind).search()?;
        stats.duration_search_ms = start.elapsed().as_secs_f64() * 1000.0;
        stats.instantiated_types = instantiated.len();

        let start = Instant::now();
        let mut system = self.build_constraints(&instantiated)?;
        stats.duration_build_ms = start.elapsed().as_secs_f64() * 1000.0;
        stats.functions_analyzed = system.built_functions.len();
        stats.constraint_nodes = system.graph.len();
        stats.direct_edges = system.graph.direct_edge_count();
        stats.cast_edges = system.graph.cast_edge_count();
        stats.virtual_call_sites = system.receivers.len();

        if self.config.dump_constraint_graph {
            trace!(graph = %system.graph.render(), "Constraint graph before propagation");
        }

        let start = Instant::now();
        let solver = TypePropagation::new().with_sorted_bad_edges(self.config.sort_bad_edges);
        let solver_stats = solver.solve(&mut system.graph)?;
        stats.duration_solve_ms = start.elapsed().as_secs_f64() * 1000.0;
        stats.scc_count = solver_stats.scc_count;
        stats.cyclic_sccs = solver_stats.cyclic_sccs;
        stats.largest_scc = solver_stats.largest_scc;
        stats.bad_edges = solver_stats.bad_edges;
        stats.fixpoint_rounds = solver_stats.fixpoint_rounds;

        if self.config.dump_constraint_graph {
            trace!(graph = %system.graph.render(), "Constraint graph after propagation");
        }

        let result = extract_result(program, &system, &instantiated)?;
        stats.devirtualized_sites = result.sites.len();
        stats.monomorphic_sites = result.monomorphic_count();
        stats.polymorphic_sites = result.polymorphic_count();
        stats.duration_total_ms = total.elapsed().as_secs_f64() * 1000.0;

        info!(
            module = %program.module.name,
            output_kind = ?self.config.output_kind,
            functions = stats.functions_analyzed,
            instantiated = stats.instantiated_types,
            nodes = stats.constraint_nodes,
            sccs = stats.scc_count,
            virtual_call_sites = stats.virtual_call_sites,
            monomorphic = stats.monomorphic_sites,
            polymorphic = stats.polymorphic_sites,
            duration_ms = stats.duration_total_ms,
            "Devirtualization analysis finished"
        );
        Ok((result, stats))
    }

    /// Non-initializer roots first, then every global initializer
    fn build_constraints(&self, instantiated: &InstantiatedTypes) -> Result<ConstraintSystem> {
        let program = self.program;
        let roots = compute_root_set(&program, self.config.output_kind)?;
        let mut builder = ConstraintGraphBuilder::new(
            program,
            &self.hierarchy,
            instantiated,
            self.config.output_kind,
            self.config.take_names,
        );
        for &root in &roots {
            if !program.arena.function(root).is_global_initializer() {
                builder.build_root(root)?;
            }
        }
        for initializer in all_global_initializers(&program) {
            builder.build_root(initializer)?;
        }
        Ok(builder.finish())
    }
}

/// Read the verdict of every recorded virtual call off the solved graph
pub fn extract_result(
    program: DfgProgram,
    system: &ConstraintSystem,
    instantiated: &InstantiatedTypes,
) -> Result<DevirtualizationResult> {
    let arena = program.arena;
    let nothing_type = program
        .module
        .symbol_table
        .nothing_type
        .map(|t| program.resolve_type(t));
    let mut sites = BTreeMap::new();

    for &symbol in &system.built_functions {
        let function = program.function(symbol).ok_or_else(|| {
            DevirtError::UnknownFunction(arena.function_display(symbol).to_string())
        })?;
        for (node, call) in function.virtual_calls() {
            let id = VirtualCallId {
                function: symbol,
                node,
            };
            let Some(receiver) = system.receivers.get(&id) else {
                continue;
            };
            let types = &system.graph.node(receiver.receiver).types;
            if types.contains(0) {
                debug!(
                    caller = %arena.function_display(symbol),
                    node = node.0,
                    "Receiver may be virtual, call left as is"
                );
                continue;
            }

            let mut possible_callees = Vec::with_capacity(types.len());
            for type_id in types.iter() {
                let ty = instantiated.type_of(type_id).ok_or_else(|| {
                    DevirtError::internal(format!("Unknown type id {} in receiver set", type_id))
                })?;
                if Some(ty) == nothing_type {
                    continue;
                }
                let callee = receiver
                    .candidates
                    .iter()
                    .find(|(candidate, _)| *candidate == ty)
                    .map(|&(_, callee)| callee)
                    .ok_or_else(|| {
                        DevirtError::internal(format!(
                            "No candidate for receiver {} at #{} of {}",
                            arena.type_display(ty),
                            node.0,
                            arena.function_display(symbol)
                        ))
                    })?;
                if matches!(arena.function(callee).symbol_table_index(), Some(index) if index < 0) {
                    return Err(DevirtError::internal(format!(
                        "{} is dispatched to but has no function table slot",
                        arena.function_display(callee)
                    )));
                }
                possible_callees.push(DevirtualizedCallee {
                    receiver_type: ty,
                    callee,
                });
            }

            debug!(
                caller = %arena.function_display(symbol),
                node = node.0,
                callees = possible_callees.len(),
                "Devirtualized call site"
            );
            sites.insert(
                id,
                DevirtualizedCallSite {
                    call_site: call.as_call().and_then(|c| c.call_site),
                    possible_callees,
                },
            );
        }
    }

    Ok(DevirtualizationResult {
        instantiated_types: instantiated.as_slice().to_vec(),
        sites,
    })
}
