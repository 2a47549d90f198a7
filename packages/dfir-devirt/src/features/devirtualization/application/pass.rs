//! Devirtualization pass driver
//!
//! Module DFIR → library DFIR → analysis → call graph → optional rewrite.
//! Any error aborts the whole pass; the program IR is only mutated once the
//! analysis has fully succeeded.

use super::analyzer::{DevirtStats, DevirtualizationAnalyzer};
use super::rewriter::{CallSiteRewriter, RewriteStats};
use crate::config::DevirtConfig;
use crate::errors::Result;
use crate::features::call_graph::domain::CallGraph;
use crate::features::call_graph::infrastructure::{compute_root_set, CallGraphBuilder};
use crate::features::devirtualization::domain::DevirtualizationResult;
use crate::features::dfir::domain::{DfgProgram, ExternalModulesDfg, LibraryBlob, ModuleDfg, SymbolArena};
use crate::features::dfir::infrastructure::{DfgSerializer, ModuleDfgBuilder};
use crate::features::program_ir::domain::IrModule;
use std::time::Instant;
use tracing::info;

/// Everything one pass run produced
///
/// Function and type ids in `result` and `call_graph` index into `arena`.
#[derive(Debug)]
pub struct DevirtualizationOutcome {
    pub result: DevirtualizationResult,
    pub stats: DevirtStats,
    pub call_graph: CallGraph,
    pub rewrite: Option<RewriteStats>,
    pub module: ModuleDfg,
    pub external: ExternalModulesDfg,
    pub arena: SymbolArena,
}

pub struct DevirtualizationPass;

impl DevirtualizationPass {
    pub fn run(ir: &mut IrModule, libraries: &[LibraryBlob], config: &DevirtConfig) -> Result<DevirtualizationOutcome> {
        let start = Instant::now();
        config.validate()?;

        let mut arena = SymbolArena::new();
        let module = ModuleDfgBuilder::build(ir, &mut arena, config)?;
        let external = DfgSerializer::deserialize(libraries, &mut arena)?;

        let (result, stats, call_graph) = {
            let program = DfgProgram::new(&module, &external, &arena);
            let analyzer = DevirtualizationAnalyzer::new(program, config);
            let (result, stats) = analyzer.analyze()?;
            let roots = compute_root_set(&program, config.output_kind)?;
            let call_graph =
                CallGraphBuilder::new(program, analyzer.hierarchy(), Some(&result), config.goto_external)
                    .build(&roots)?;
            (result, stats, call_graph)
        };

        let rewrite = if config.rewrite_monomorphic {
            Some(CallSiteRewriter::new(&module, &arena).rewrite(ir, &result)?)
        } else {
            None
        };

        info!(
            module = %ir.name,
            libraries = libraries.len(),
            call_graph_nodes = call_graph.node_count(),
            call_graph_edges = call_graph.edge_count(),
            rewritten = rewrite.map(|r| r.rewritten).unwrap_or(0),
            duration_ms = start.elapsed().as_millis() as u64,
            "Devirtualization pass finished"
        );
        Ok(DevirtualizationOutcome {
            result,
            stats,
            call_graph,
            rewrite,
            module,
            external,
            arena,
        })
    }
}
