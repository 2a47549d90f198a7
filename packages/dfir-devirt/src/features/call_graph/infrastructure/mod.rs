pub mod builder;
pub mod root_set;

pub use builder::CallGraphBuilder;
pub use root_set::{all_global_initializers, compute_root_set, module_global_initializers};
