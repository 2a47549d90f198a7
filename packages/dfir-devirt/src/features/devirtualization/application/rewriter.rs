//! Rewriting monomorphic virtual calls into direct calls

use crate::errors::{DevirtError, Result};
use crate::features::devirtualization::domain::{DevirtualizationResult, DevirtualizedCallee};
use crate::features::dfir::domain::{DeclRef, FunctionId, ModuleDfg, SymbolArena};
use crate::features::program_ir::domain::{DirectCallTarget, ExprId, ExprKind, IrFunctionId, IrModule};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub rewritten: usize,
    /// Single-callee sites whose callee is an unresolved external
    pub skipped_external: usize,
    /// Sites already bound by an earlier run
    pub already_direct: usize,
}

pub struct CallSiteRewriter<'a> {
    module: &'a ModuleDfg,
    arena: &'a SymbolArena,
    /// Library functions referenced by the module, by structural hash
    library_functions: FxHashMap<u64, IrFunctionId>,
}

impl<'a> CallSiteRewriter<'a> {
    pub fn new(module: &'a ModuleDfg, arena: &'a SymbolArena) -> Self {
        let mut library_functions = FxHashMap::default();
        for (&symbol, declaration) in &module.symbol_table.declarations {
            let function = arena.function(symbol);
            if let (DeclRef::Function(ir), true, Some(hash)) =
                (declaration, function.is_external(), function.hash())
            {
                library_functions.insert(hash, *ir);
            }
        }
        Self {
            module,
            arena,
            library_functions,
        }
    }

    /// Bind every monomorphic call of the module to its only callee
    pub fn rewrite(&self, ir: &mut IrModule, result: &DevirtualizationResult) -> Result<RewriteStats> {
        let mut stats = RewriteStats::default();
        for (id, site) in &result.sites {
            if !self.module.functions.contains_key(&id.function) {
                continue;
            }
            let (Some(expr), Some(callee)) = (site.call_site, site.single_callee()) else {
                continue;
            };
            if !self.arena.function(callee.callee).is_declared() {
                stats.skipped_external += 1;
                continue;
            }
            let target = self.direct_target(callee)?;
            if self.bind(ir, expr, target)? {
                stats.rewritten += 1;
            } else {
                stats.already_direct += 1;
            }
        }
        info!(
            module = %ir.name,
            rewritten = stats.rewritten,
            skipped_external = stats.skipped_external,
            "Rewrote monomorphic call sites"
        );
        Ok(stats)
    }

    fn direct_target(&self, callee: DevirtualizedCallee) -> Result<DirectCallTarget> {
        let symbol = self.arena.function(callee.callee);
        let function = self.ir_function(callee.callee)?;
        let module = symbol.module.ok_or_else(|| {
            DevirtError::internal(format!(
                "{} has no owning module",
                self.arena.function_display(callee.callee)
            ))
        })?;
        let index = match symbol.symbol_table_index() {
            Some(index) if index >= 0 => index as u32,
            _ => {
                return Err(DevirtError::internal(format!(
                    "{} has no function table slot",
                    self.arena.function_display(callee.callee)
                )))
            }
        };
        Ok(DirectCallTarget {
            function,
            module: self.arena.module(module).name.clone(),
            function_table_index: index,
        })
    }

    /// Program IR declaration of a module function or a referenced library function
    fn ir_function(&self, symbol: FunctionId) -> Result<IrFunctionId> {
        match self.module.symbol_table.declaration(symbol) {
            Some(DeclRef::Function(function)) => return Ok(function),
            Some(DeclRef::FieldInitializer(_)) => {
                return Err(DevirtError::internal(format!(
                    "Field initializer {} is not callable",
                    self.arena.function_display(symbol)
                )))
            }
            None => {}
        }
        self.arena
            .function(symbol)
            .hash()
            .and_then(|hash| self.library_functions.get(&hash).copied())
            .ok_or_else(|| DevirtError::UnknownFunction(self.arena.function_display(symbol).to_string()))
    }

    /// Returns false if the call was already direct
    fn bind(&self, ir: &mut IrModule, expr: ExprId, target: DirectCallTarget) -> Result<bool> {
        let expression = ir.expr_mut(expr);
        let call = match &expression.kind {
            ExprKind::Call(call) => call.clone(),
            ExprKind::DirectCall { .. } => return Ok(false),
            other => {
                return Err(DevirtError::unsupported(
                    expr.0,
                    format!("call site is a {}", other.name()),
                ))
            }
        };
        debug!(expr = expr.0, target = ?target.function, "Bound call site");
        expression.kind = ExprKind::DirectCall { call, target };
        Ok(true)
    }
}
