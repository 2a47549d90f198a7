/*
 * DFIR Devirt - Interprocedural Devirtualization
 *
 * Feature-First Architecture:
 * - shared/      : Structural hashing
 * - config/      : Presets + YAML configuration
 * - features/    : Vertical slices (program_ir → dfir → call_graph → devirtualization)
 *
 * Pipeline:
 * - Program IR lowered to a flow-insensitive data-flow IR (DFIR)
 * - Dependency DFIR loaded from versioned binary blobs
 * - Rapid Type Analysis + constraint-graph type propagation
 * - Monomorphic virtual calls rewritten into direct calls
 */

#![allow(clippy::too_many_arguments)] // Builders thread many tables through
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared utilities
pub mod shared;

/// Feature modules (program IR → DFIR → call graph → devirtualization)
pub mod features;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{DevirtConfig, OutputKind, Preset};
pub use errors::{DevirtError, Result};
pub use features::call_graph::{CallGraph, CallGraphBuilder};
pub use features::devirtualization::{
    DevirtStats, DevirtualizationAnalyzer, DevirtualizationOutcome, DevirtualizationPass,
    DevirtualizationResult, DevirtualizedCallSite, DevirtualizedCallee, VirtualCallId,
};
pub use features::dfir::{DfgProgram, DfgSerializer, LibraryBlob, ModuleDfgBuilder, SymbolArena};
pub use features::program_ir::{IrModule, IrModuleBuilder};
