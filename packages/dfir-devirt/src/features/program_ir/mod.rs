//! Program IR
//!
//! The tree-shaped intermediate representation the devirtualization pass reads
//! from and rewrites. Declarations and expressions are stored in arenas inside
//! [`IrModule`](domain::IrModule) and refer to each other by index.

pub mod domain;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::{IrModuleBuilder, VtableLayout, VtableLayouts};
