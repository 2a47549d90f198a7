//! # Interprocedural Devirtualization
//!
//! Proves which implementations a virtual call can reach and binds
//! monomorphic calls statically:
//! - **Rapid Type Analysis**: classes that can actually be instantiated,
//!   searched from the entry point or collected conservatively for libraries
//! - **Constraint graph**: flow-insensitive points-to graph over DFIR with
//!   direct and cast (type-filtered) edges
//! - **Propagation**: SCC condensation, one topological sweep, then a
//!   fixpoint over backward cast edges on fixed-width type bitsets
//!
//! ## Usage
//! ```text
//! use dfir_devirt::features::devirtualization::DevirtualizationPass;
//!
//! let outcome = DevirtualizationPass::run(&mut ir, &libraries, &DevirtConfig::default())?;
//! println!("{} monomorphic sites", outcome.stats.monomorphic_sites);
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    CallSiteRewriter, DevirtStats, DevirtualizationAnalyzer, DevirtualizationOutcome,
    DevirtualizationPass, RewriteStats,
};
pub use domain::{
    DevirtualizationResult, DevirtualizedCallSite, DevirtualizedCallee, TypeBitSet, VirtualCallId,
};
#[doc(hidden)]
pub use infrastructure::{
    Condensation, ConstraintGraphBuilder, InstantiatedTypes, InstantiationSearcher, TypeHierarchy,
    TypePropagation,
};
