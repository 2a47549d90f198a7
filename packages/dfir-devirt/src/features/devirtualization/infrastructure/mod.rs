//! Devirtualization infrastructure: hierarchy, instantiation search,
//! constraint graph construction and the solver

pub mod condensation;
pub mod constraint_builder;
pub mod instantiation_search;
pub mod propagation;
pub mod type_hierarchy;

pub use condensation::Condensation;
pub use constraint_builder::{ConstraintGraphBuilder, ConstraintSystem};
pub use instantiation_search::{InstantiatedTypes, InstantiationSearcher};
pub use propagation::{is_closed, SolverStats, TypePropagation};
pub use type_hierarchy::TypeHierarchy;
