//! Vertical slices, leaves first:
//! program IR → DFIR → call graph → devirtualization

pub mod call_graph;
pub mod devirtualization;
pub mod dfir;
pub mod program_ir;
