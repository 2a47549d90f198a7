//! Entry points of the analysis
//!
//! An executable is analysed from its entry point and the global
//! initializers of the module. A library may be entered through any exported
//! function and through any virtual slot of its declared types.

use crate::config::OutputKind;
use crate::errors::{DevirtError, Result};
use crate::features::dfir::domain::{DfgProgram, FunctionId};
use rustc_hash::FxHashSet;

pub fn compute_root_set(program: &DfgProgram, output_kind: OutputKind) -> Result<Vec<FunctionId>> {
    let mut roots = Vec::new();
    let mut seen: FxHashSet<FunctionId> = FxHashSet::default();
    let mut add = |f: FunctionId, roots: &mut Vec<FunctionId>| {
        if seen.insert(f) {
            roots.push(f);
        }
    };

    match output_kind {
        OutputKind::Program => {
            let entry_point = program
                .entry_point()
                .ok_or_else(|| DevirtError::MissingEntryPoint(program.module.name.clone()))?;
            add(entry_point, &mut roots);
            for function in module_global_initializers(program) {
                add(function, &mut roots);
            }
        }
        OutputKind::Library => {
            let arena = program.arena;
            for &function in program.module.functions.keys() {
                if arena.function(function).is_public() {
                    add(function, &mut roots);
                }
            }
            for &ty in &program.module.symbol_table.types {
                let declared = arena.ty(ty);
                if !declared.is_declared() {
                    continue;
                }
                let mut slots: Vec<FunctionId> = declared.vtable.clone();
                let mut itable: Vec<(u64, FunctionId)> =
                    declared.itable.iter().map(|(&h, &f)| (h, f)).collect();
                itable.sort_unstable();
                slots.extend(itable.into_iter().map(|(_, f)| f));
                for function in slots {
                    if arena.function(function).is_declared() && program.is_local(function) {
                        add(function, &mut roots);
                    }
                }
            }
        }
    }
    Ok(roots)
}

/// Global initializers with a body in the module, in symbol order
pub fn module_global_initializers(program: &DfgProgram) -> Vec<FunctionId> {
    program
        .module
        .functions
        .keys()
        .copied()
        .filter(|&f| program.arena.function(f).is_global_initializer())
        .collect()
}

/// Global initializers of the module and of every library
pub fn all_global_initializers(program: &DfgProgram) -> Vec<FunctionId> {
    program
        .all_functions()
        .map(|f| f.symbol)
        .filter(|&f| program.arena.function(f).is_global_initializer())
        .collect()
}
