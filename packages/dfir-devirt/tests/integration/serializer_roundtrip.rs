//! Serialized DFIR read back by a later compilation
//!
//! A module's DFIR is written with its own arena and loaded into a fresh one;
//! node kinds and edge topology of every function must survive.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use dfir_devirt::features::dfir::Function;
use dfir_devirt::shared::local_hash;
use dfir_devirt::{DevirtConfig, DevirtError, DfgSerializer, LibraryBlob, ModuleDfgBuilder, SymbolArena};
use pretty_assertions::assert_eq;

/// Node kind plus the nodes it reads, in body order
fn shape(function: &Function) -> Vec<(String, Vec<u32>)> {
    function
        .body
        .nodes
        .iter()
        .map(|node| {
            let kind = format!("{node:?}");
            let kind = kind.split([' ', '{', '(']).next().unwrap_or_default().to_string();
            let mut inputs: Vec<u32> = node.edges().iter().map(|e| e.node.0).collect();
            inputs.sort_unstable();
            (kind, inputs)
        })
        .collect()
}

fn written(scenario: &Scenario) -> (Vec<u8>, Vec<Vec<(String, Vec<u32>)>>) {
    let mut arena = SymbolArena::new();
    let config = DevirtConfig::default().take_names(true);
    let dfg = ModuleDfgBuilder::build(&scenario.ir, &mut arena, &config).unwrap();
    let shapes = dfg.functions.values().map(shape).collect();
    (DfgSerializer::serialize(&dfg, &arena).unwrap(), shapes)
}

#[test]
fn test_bodies_survive_a_roundtrip() {
    let scenario = shapes_program(&["Circle", "Square"]);
    let (bytes, mut expected) = written(&scenario);

    let mut arena = SymbolArena::new();
    let external = DfgSerializer::deserialize(&[LibraryBlob::new("app", bytes)], &mut arena).unwrap();
    let mut loaded: Vec<_> = external.function_dfgs.values().map(shape).collect();

    expected.sort();
    loaded.sort();
    assert_eq!(loaded, expected);
}

#[test]
fn test_public_declarations_are_merged_by_hash() {
    let library = shape_library();
    let mut arena = SymbolArena::new();
    let blobs = [library.blob.clone(), library.blob];
    let external = DfgSerializer::deserialize(&blobs, &mut arena).unwrap();

    let shape = external.public_types[&local_hash("lib.Shape")];
    assert_eq!(
        external.all_types.iter().filter(|&&ty| ty == shape).count(),
        1,
        "the same public type loaded twice must map to one symbol"
    );
    assert!(external.public_functions.contains_key(&local_hash("make/0")));
    assert!(external.public_functions.contains_key(&local_hash("lib.Shape.area/0")));
}

#[test]
fn test_blob_is_deterministic() {
    let scenario = shapes_program(&["Circle"]);
    let (first, _) = written(&scenario);
    let (second, _) = written(&scenario);
    assert_eq!(first, second);
}

#[test]
fn test_incompatible_version_is_rejected() {
    let scenario = shapes_program(&["Circle"]);
    let (mut bytes, _) = written(&scenario);
    bytes[0..4].copy_from_slice(&7u32.to_le_bytes());

    let mut arena = SymbolArena::new();
    let err = DfgSerializer::deserialize(&[LibraryBlob::new("app", bytes)], &mut arena).unwrap_err();
    match err {
        DevirtError::VersionMismatch { library, found, .. } => {
            assert_eq!(library, "app");
            assert_eq!(found, 7);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_corrupted_payload_is_rejected() {
    let scenario = shapes_program(&["Circle"]);
    let (bytes, _) = written(&scenario);

    for cut in [8, bytes.len() / 2, bytes.len() - 1] {
        let mut truncated = bytes[..cut].to_vec();
        // Keep the header consistent so the payload itself is parsed
        let length = (truncated.len() - 8) as u32;
        truncated[4..8].copy_from_slice(&length.to_le_bytes());

        let mut arena = SymbolArena::new();
        let err = DfgSerializer::deserialize(&[LibraryBlob::new("app", truncated)], &mut arena).unwrap_err();
        assert!(matches!(err, DevirtError::Format { .. }), "cut at {cut}: {err}");
    }
}
