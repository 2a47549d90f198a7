//! Property-based tests for the devirtualization configuration
//!
//! - Roundtrip: from_yaml_str(to_yaml(x)) == x
//! - Validity: only the dump-without-names combination is rejected
//! - Overrides: an override always wins over the preset

use dfir_devirt::config::*;
use proptest::prelude::*;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::io::Write;
use tempfile::NamedTempFile;

fn preset_of(index: u8) -> Preset {
    match index % 3 {
        0 => Preset::Fast,
        1 => Preset::Balanced,
        _ => Preset::Thorough,
    }
}

fn config_of(flags: [bool; 6]) -> DevirtConfig {
    let [library, goto_external, take_names, dump, rewrite, sort] = flags;
    DevirtConfig::default()
        .output_kind(if library { OutputKind::Library } else { OutputKind::Program })
        .goto_external(goto_external)
        .take_names(take_names)
        .dump_constraint_graph(dump)
        .rewrite_monomorphic(rewrite)
        .sort_bad_edges(sort)
}

// ============================================================================
// QuickCheck Tests
// ============================================================================

#[quickcheck]
fn qc_validation_rejects_only_unnamed_dumps(take_names: bool, dump: bool, library: bool) -> bool {
    let config = config_of([library, false, take_names, dump, true, true]);
    config.validate().is_ok() == (take_names || !dump)
}

#[quickcheck]
fn qc_yaml_roundtrip(library: bool, goto_external: bool, take_names: bool, rewrite: bool, sort: bool) -> bool {
    let config = config_of([library, goto_external, take_names, take_names, rewrite, sort]);
    let Ok(yaml) = config.to_yaml() else {
        return false;
    };
    DevirtConfig::from_yaml_str(&yaml).map(|c| c == config).unwrap_or(false)
}

#[quickcheck]
fn qc_unsupported_versions_are_rejected(version: u32) -> TestResult {
    if SUPPORTED_VERSIONS.contains(&version) {
        return TestResult::discard();
    }
    let yaml = format!("version: {version}\npreset: fast\n");
    TestResult::from_bool(matches!(
        DevirtConfig::from_yaml_str(&yaml),
        Err(ConfigError::UnsupportedVersion { found, .. }) if found == version
    ))
}

#[quickcheck]
fn qc_preset_file_loading(preset_index: u8) -> TestResult {
    let preset = preset_of(preset_index);
    let mut file = match NamedTempFile::new() {
        Ok(file) => file,
        Err(_) => return TestResult::discard(),
    };
    if writeln!(file, "version: 1\npreset: {}", preset.as_str()).is_err() {
        return TestResult::failed();
    }
    match DevirtConfig::from_yaml_file(file.path()) {
        Ok(config) => TestResult::from_bool(config == DevirtConfig::from_preset(preset)),
        Err(_) => TestResult::failed(),
    }
}

// ============================================================================
// Proptest
// ============================================================================

proptest! {
    #[test]
    fn prop_override_wins_over_preset(
        preset_index in 0u8..3,
        rewrite in any::<bool>(),
        goto_external in any::<bool>(),
    ) {
        let preset = preset_of(preset_index);
        let yaml = format!(
            "version: 1\npreset: {}\noverrides:\n  rewrite_monomorphic: {}\n  goto_external: {}\n",
            preset.as_str(),
            rewrite,
            goto_external,
        );
        let config = DevirtConfig::from_yaml_str(&yaml).unwrap();
        let base = DevirtConfig::from_preset(preset);

        prop_assert_eq!(config.rewrite_monomorphic, rewrite);
        prop_assert_eq!(config.goto_external, goto_external);
        prop_assert_eq!(config.output_kind, base.output_kind);
        prop_assert_eq!(config.sort_bad_edges, base.sort_bad_edges);
    }

    #[test]
    fn prop_unknown_preset_names_fail(name in "custom_[a-z]{1,8}") {
        let yaml = format!("version: 1\npreset: {name}\n");
        let is_unknown_preset = matches!(
            DevirtConfig::from_yaml_str(&yaml),
            Err(ConfigError::UnknownPreset(_))
        );
        prop_assert!(is_unknown_preset);
    }
}

#[test]
fn test_missing_version_is_reported() {
    let err = DevirtConfig::from_yaml_str("preset: fast\n").unwrap_err();
    assert!(matches!(err, ConfigError::MissingVersion));
}

#[test]
fn test_unknown_override_is_rejected() {
    let yaml = "version: 1\npreset: fast\noverrides:\n  max_depth: 3\n";
    assert!(matches!(DevirtConfig::from_yaml_str(yaml), Err(ConfigError::Yaml(_))));
}
