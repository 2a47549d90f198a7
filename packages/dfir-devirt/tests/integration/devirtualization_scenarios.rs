//! End-to-end devirtualization scenarios
//!
//! Each test builds a program IR module, runs the whole pass and inspects the
//! result table, the call graph and the rewritten IR.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use dfir_devirt::shared::local_hash;
use dfir_devirt::{DevirtConfig, DevirtError, DevirtualizationPass, OutputKind, Preset};
use pretty_assertions::assert_eq;

fn program_config() -> DevirtConfig {
    DevirtConfig::default().output_kind(OutputKind::Program)
}

fn library_config() -> DevirtConfig {
    DevirtConfig::default().output_kind(OutputKind::Library)
}

// ═══════════════════════════════════════════════════════════════════════════
// Program output
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_single_subtype_becomes_direct_call() {
    let mut scenario = shapes_program(&["Circle"]);
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &program_config()).unwrap();

    let circle_area = symbol_of(&outcome, scenario.implementations[0]);
    assert_eq!(callees_of(&outcome, scenario.site), vec![circle_area]);
    assert_eq!(outcome.stats.monomorphic_sites, 1);
    assert_eq!(outcome.stats.polymorphic_sites, 0);
    assert_direct_call(&scenario.ir, scenario.site, scenario.implementations[0]);

    let main = symbol_of(&outcome, scenario.caller);
    assert!(outcome.call_graph.callees(main).contains(&circle_area));
}

#[test]
fn test_two_subtypes_stay_polymorphic() {
    let mut scenario = shapes_program(&["Circle", "Square"]);
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &program_config()).unwrap();

    let mut expected: Vec<_> = scenario
        .implementations
        .iter()
        .map(|&f| symbol_of(&outcome, f))
        .collect();
    expected.sort();
    assert_eq!(callees_of(&outcome, scenario.site), expected);
    assert_eq!(outcome.stats.polymorphic_sites, 1);
    assert_eq!(outcome.rewrite.map(|r| r.rewritten), Some(0));
    assert_virtual_call(&scenario.ir, scenario.site);

    let main = symbol_of(&outcome, scenario.caller);
    let callees = outcome.call_graph.callees(main);
    for callee in &expected {
        assert!(callees.contains(callee));
    }
}

#[test]
fn test_program_without_entry_point_is_rejected() {
    let mut scenario = library_entry(true);
    let err = DevirtualizationPass::run(&mut scenario.ir, &[], &program_config()).unwrap_err();
    assert!(matches!(err, DevirtError::MissingEntryPoint(_)));
    assert!(!err.is_internal());
    assert_virtual_call(&scenario.ir, scenario.site);
}

#[test]
fn test_receiver_survives_unchecked_generic_cast() {
    let mut scenario = generic_cast_program();
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &program_config()).unwrap();

    let circle_area = symbol_of(&outcome, scenario.implementations[0]);
    assert_eq!(callees_of(&outcome, scenario.site), vec![circle_area]);
    let main = symbol_of(&outcome, scenario.caller);
    assert!(outcome.call_graph.callees(main).contains(&circle_area));
    assert!(outcome.call_graph.contains(circle_area));
}

#[test]
fn test_receiver_survives_cast_to_opaque_class() {
    let mut scenario = opaque_cast_program();
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &program_config()).unwrap();

    let circle_area = symbol_of(&outcome, scenario.implementations[0]);
    assert_eq!(callees_of(&outcome, scenario.site), vec![circle_area]);
    assert_direct_call(&scenario.ir, scenario.site, scenario.implementations[0]);
    assert!(outcome.call_graph.contains(circle_area));
}

#[test]
fn test_no_site_is_devirtualized_to_nothing() {
    for mut scenario in [generic_cast_program(), opaque_cast_program(), shapes_program(&["Circle"])] {
        let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &program_config()).unwrap();
        for (id, site) in &outcome.result.sites {
            assert!(!site.possible_callees.is_empty(), "{id:?} has no callee");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Library output
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_open_parameter_is_left_virtual() {
    let mut scenario = library_entry(false);
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &library_config()).unwrap();

    assert!(site_of(&outcome, scenario.site).is_none());
    assert_eq!(outcome.stats.devirtualized_sites, 0);
    assert_virtual_call(&scenario.ir, scenario.site);
}

#[test]
fn test_final_parameter_is_monomorphic() {
    let mut scenario = library_entry(true);
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &library_config()).unwrap();

    let circle_area = symbol_of(&outcome, scenario.implementations[1]);
    assert_eq!(callees_of(&outcome, scenario.site), vec![circle_area]);
    assert_direct_call(&scenario.ir, scenario.site, scenario.implementations[1]);
}

#[test]
fn test_library_result_covers_program_result() {
    let scenario = shapes_program(&["Circle", "Square"]);

    let mut program_ir = scenario.ir.clone();
    let program = DevirtualizationPass::run(&mut program_ir, &[], &program_config()).unwrap();
    let mut library_ir = scenario.ir.clone();
    let library = DevirtualizationPass::run(&mut library_ir, &[], &library_config()).unwrap();

    assert!(library.result.instantiated_types.len() >= program.result.instantiated_types.len());
    for entry in program.result.sites.values() {
        let Some(site) = entry.call_site else { continue };
        // An absent library entry means the site stays virtual, which covers everything
        if site_of(&library, site).is_some() {
            assert!(callees_of(&library, site).len() >= callees_of(&program, site).len());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Dependencies
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_library_object_flows_into_program() {
    let library = shape_library();
    let mut app = cross_module_program();
    let outcome =
        DevirtualizationPass::run(&mut app.ir, &[library.blob.clone()], &program_config()).unwrap();

    // `make()` only ever returns a `lib.Shape`
    let library_callees = callees_of(&outcome, app.library_site);
    assert_eq!(library_callees.len(), 1);
    let callee = outcome.arena.function(library_callees[0]);
    let owner = callee.module.expect("library function has an owning module");
    assert_eq!(outcome.arena.module(owner).name, "lib");

    let square_area = symbol_of(&outcome, app.square_area);
    assert_eq!(callees_of(&outcome, app.local_site), vec![square_area]);
    assert_direct_call(&app.ir, app.local_site, app.square_area);
    assert_eq!(outcome.rewrite.map(|r| r.rewritten), Some(2));
}

#[test]
fn test_dependency_bodies_join_the_call_graph() {
    let library = shape_library();
    let mut app = cross_module_program();
    let outcome = DevirtualizationPass::run(&mut app.ir, &[library.blob], &program_config()).unwrap();

    let make = outcome.external.public_functions[&local_hash("make/0")];
    assert!(outcome.external.function_dfgs.contains_key(&make));
    assert!(outcome.call_graph.contains(make));

    let main = symbol_of(&outcome, app.main);
    assert!(outcome.call_graph.callees(main).contains(&make));
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_presets_agree_on_the_result() {
    let mut reference = None;
    for preset in [Preset::Fast, Preset::Balanced, Preset::Thorough] {
        let mut scenario = shapes_program(&["Circle", "Square"]);
        let config = DevirtConfig::from_preset(preset).output_kind(OutputKind::Program);
        let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &config).unwrap();
        let callees = callees_of(&outcome, scenario.site).len();
        match reference {
            None => reference = Some(callees),
            Some(expected) => assert_eq!(callees, expected, "{preset:?} disagrees"),
        }
    }
}

#[test]
fn test_rewrite_disabled_keeps_virtual_calls() {
    let mut scenario = shapes_program(&["Circle"]);
    let config = program_config().rewrite_monomorphic(false);
    let outcome = DevirtualizationPass::run(&mut scenario.ir, &[], &config).unwrap();

    assert_eq!(outcome.result.monomorphic_count(), 1);
    assert!(outcome.rewrite.is_none());
    assert_virtual_call(&scenario.ir, scenario.site);
}

#[test]
fn test_chain_of_interface_calls() {
    let mut ir = interface_chain(8);
    let outcome = DevirtualizationPass::run(&mut ir, &[], &program_config()).unwrap();

    assert_eq!(outcome.stats.virtual_call_sites, 8);
    assert_eq!(outcome.result.monomorphic_count(), 8);
    assert_eq!(outcome.rewrite.map(|r| r.rewritten), Some(8));
}
