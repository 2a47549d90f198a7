//! Custom assertions over devirtualization outcomes

use dfir_devirt::features::dfir::FunctionId;
use dfir_devirt::features::program_ir::{ExprId, ExprKind, IrFunctionId, IrModule};
use dfir_devirt::{DevirtualizationOutcome, DevirtualizedCallSite};

/// Result entry recorded for the program IR call `site`
pub fn site_of(outcome: &DevirtualizationOutcome, site: ExprId) -> Option<&DevirtualizedCallSite> {
    outcome
        .result
        .sites
        .values()
        .find(|entry| entry.call_site == Some(site))
}

/// DFIR symbol of a module function
pub fn symbol_of(outcome: &DevirtualizationOutcome, function: IrFunctionId) -> FunctionId {
    outcome
        .module
        .symbol_table
        .function_of(function)
        .unwrap_or_else(|| panic!("{function:?} has no DFIR symbol"))
}

/// Sorted callees of the entry recorded for `site`
pub fn callees_of(outcome: &DevirtualizationOutcome, site: ExprId) -> Vec<FunctionId> {
    let entry = site_of(outcome, site).unwrap_or_else(|| panic!("no result entry for {site:?}"));
    let mut callees: Vec<_> = entry.possible_callees.iter().map(|c| c.callee).collect();
    callees.sort();
    callees
}

/// Assert that `site` was rewritten into a direct call of `target`
pub fn assert_direct_call(ir: &IrModule, site: ExprId, target: IrFunctionId) {
    match &ir.expr(site).kind {
        ExprKind::DirectCall { target: bound, .. } => assert_eq!(
            bound.function, target,
            "call site {site:?} bound to {:?}, expected {target:?}",
            bound.function
        ),
        other => panic!("call site {site:?} is still a {}", other.name()),
    }
}

/// Assert that `site` is still dispatched at run time
pub fn assert_virtual_call(ir: &IrModule, site: ExprId) {
    assert!(
        matches!(ir.expr(site).kind, ExprKind::Call(_)),
        "call site {site:?} was rewritten to a {}",
        ir.expr(site).kind.name()
    );
}
