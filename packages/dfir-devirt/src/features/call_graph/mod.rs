//! Call graph over DFIR functions
//!
//! Built from the analysis roots, optionally refined by a previous
//! devirtualization result.

pub mod domain;
pub mod infrastructure;

pub use domain::{CallGraph, CallGraphNode, CallRef, CallSite};
pub use infrastructure::{compute_root_set, CallGraphBuilder};
