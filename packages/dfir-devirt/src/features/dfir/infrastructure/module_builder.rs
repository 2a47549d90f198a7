//! DFIR construction for a whole compilation unit

use super::function_builder::FunctionDfgBuilder;
use super::symbol_table::SymbolTable;
use crate::config::DevirtConfig;
use crate::errors::Result;
use crate::features::dfir::domain::{DeclRef, ModuleDfg, SymbolArena};
use crate::features::program_ir::domain::{IrModule, Origin};
use crate::features::program_ir::infrastructure::VtableLayouts;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

pub struct ModuleDfgBuilder;

impl ModuleDfgBuilder {
    /// Build DFIR for every local function with a body and every global field initializer
    pub fn build(module: &IrModule, arena: &mut SymbolArena, config: &DevirtConfig) -> Result<ModuleDfg> {
        let start = Instant::now();
        let layouts = VtableLayouts::compute(module);
        let mut symbols = SymbolTable::new(module, &layouts, arena, config.take_names);
        symbols.populate();

        let mut declarations = Vec::new();
        for function in module.function_ids() {
            let ir = module.function(function);
            if ir.body.is_some() && ir.origin == Origin::Local {
                declarations.push(DeclRef::Function(function));
            }
        }
        for field in module.field_ids() {
            let ir = module.field(field);
            if ir.is_global() && ir.initializer.is_some() && ir.origin == Origin::Local {
                declarations.push(DeclRef::FieldInitializer(field));
            }
        }

        let mut functions = BTreeMap::new();
        let mut nodes = 0usize;
        for declaration in declarations {
            let function = FunctionDfgBuilder::build(&mut symbols, declaration)?;
            nodes += function.body.nodes.len();
            functions.insert(function.symbol, function);
        }

        let symbol_table = symbols.finish();
        info!(
            module = %module.name,
            functions = functions.len(),
            nodes,
            types = symbol_table.types.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Built module DFIR"
        );
        Ok(ModuleDfg {
            name: module.name.clone(),
            functions,
            symbol_table,
        })
    }
}
