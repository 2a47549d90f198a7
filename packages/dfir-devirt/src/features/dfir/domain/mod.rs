//! DFIR domain model
//!
//! Flow-insensitive data-flow IR: per-function node arenas referring to
//! shared type and function symbols.

pub mod function;
pub mod module;
pub mod node;
pub mod symbols;

pub use function::{Function, FunctionBody};
pub use module::{DeclRef, DfgProgram, ExternalModulesDfg, LibraryBlob, ModuleDfg, ModuleSymbolTable};
pub use node::{Call, Dispatch, Edge, Field, Node, NodeId, VariableKind};
pub use symbols::{
    DfirType, ExternalAnnotations, FunctionAttributes, FunctionId, FunctionParameter,
    FunctionSymbol, FunctionSymbolKind, ModuleId, ModuleInfo, SymbolArena, TypeId, TypeKind,
};
