//! DFIR construction and serialization

pub mod element_finder;
pub mod function_builder;
pub mod module_builder;
pub mod serializer;
pub mod symbol_table;
pub mod value_extractor;
pub mod variable_values;

pub use function_builder::FunctionDfgBuilder;
pub use module_builder::ModuleDfgBuilder;
pub use serializer::{DfgSerializer, DFIR_FORMAT_VERSION};
pub use symbol_table::SymbolTable;
pub use value_extractor::{ExpressionValuesExtractor, Leaf, Value};
pub use variable_values::VariableValues;
