//! Configuration I/O (YAML loading)

use super::devirt_config::{DevirtConfig, OutputKind};
use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema versions this crate can read
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1)
    pub version: Option<u32>,

    /// Base preset
    pub preset: String,

    /// Fine-grained overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<DevirtOverrides>,
}

/// Field-level overrides on top of a preset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevirtOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_kind: Option<OutputKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto_external: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_names: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_constraint_graph: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_monomorphic: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_bad_edges: Option<bool>,
}

impl DevirtOverrides {
    fn apply(&self, mut config: DevirtConfig) -> DevirtConfig {
        if let Some(v) = self.output_kind {
            config.output_kind = v;
        }
        if let Some(v) = self.goto_external {
            config.goto_external = v;
        }
        if let Some(v) = self.take_names {
            config.take_names = v;
        }
        if let Some(v) = self.dump_constraint_graph {
            config.dump_constraint_graph = v;
        }
        if let Some(v) = self.rewrite_monomorphic {
            config.rewrite_monomorphic = v;
        }
        if let Some(v) = self.sort_bad_edges {
            config.sort_bad_edges = v;
        }
        config
    }
}

impl DevirtConfig {
    /// Parse and validate a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(yaml)?;
        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let base = DevirtConfig::from_preset(Preset::from_str(&file.preset)?);
        let config = match &file.overrides {
            Some(overrides) => overrides.apply(base),
            None => base,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Export as YAML, every field written as an override of the balanced preset
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            preset: Preset::Balanced.as_str().to_string(),
            overrides: Some(DevirtOverrides {
                output_kind: Some(self.output_kind),
                goto_external: Some(self.goto_external),
                take_names: Some(self.take_names),
                dump_constraint_graph: Some(self.dump_constraint_graph),
                rewrite_monomorphic: Some(self.rewrite_monomorphic),
                sort_bad_edges: Some(self.sort_bad_edges),
            }),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_yaml_roundtrip() {
        let config = DevirtConfig::from_preset(Preset::Thorough).output_kind(OutputKind::Library);

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("output_kind: library"));
        assert_eq!(DevirtConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_loading() {
        let yaml_content = r#"
version: 1
preset: fast
overrides:
  goto_external: true
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml_content.as_bytes()).unwrap();

        let config = DevirtConfig::from_yaml_file(file.path()).unwrap();
        assert!(config.goto_external);
        assert!(!config.rewrite_monomorphic);
    }

    #[test]
    fn test_missing_version() {
        let err = DevirtConfig::from_yaml_str("preset: fast\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVersion));
    }

    #[test]
    fn test_unsupported_version() {
        let err = DevirtConfig::from_yaml_str("version: 9\npreset: fast\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 9, .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "version: 1\npreset: fast\noverrides:\n  max_depth: 3\n";
        assert!(matches!(
            DevirtConfig::from_yaml_str(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_invalid_override_combination() {
        let yaml = "version: 1\npreset: fast\noverrides:\n  dump_constraint_graph: true\n";
        assert!(matches!(
            DevirtConfig::from_yaml_str(yaml),
            Err(ConfigError::Conflict { .. })
        ));
    }
}
