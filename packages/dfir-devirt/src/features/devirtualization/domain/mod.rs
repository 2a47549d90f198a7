//! Devirtualization domain model

pub mod constraint_graph;
pub mod result;
pub mod type_bitset;

pub use constraint_graph::{
    CastEdge, CgNode, CgNodeId, CgNodeKind, ConstraintGraph, FunctionConstraints, VirtualCallReceiver,
};
pub use result::{DevirtualizationResult, DevirtualizedCallSite, DevirtualizedCallee, VirtualCallId};
pub use type_bitset::TypeBitSet;
