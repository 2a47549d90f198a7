//! Data-flow IR
//!
//! A flow-insensitive summary of every function: which values flow into
//! which, through calls, fields and arrays. Built from the program IR for the
//! module being compiled and loaded from serialized blobs for its dependencies.

pub mod domain;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::{DfgSerializer, FunctionDfgBuilder, ModuleDfgBuilder, SymbolTable};
