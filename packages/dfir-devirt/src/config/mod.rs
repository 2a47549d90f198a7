//! Configuration of the devirtualization pass
//!
//! Two levels:
//! - Preset: `DevirtConfig::from_preset(Preset::Balanced)`
//! - YAML: versioned schema with per-field overrides on top of a preset
//!
//! ```rust,ignore
//! use dfir_devirt::config::{DevirtConfig, OutputKind, Preset};
//!
//! let config = DevirtConfig::from_preset(Preset::Thorough)
//!     .output_kind(OutputKind::Library);
//! config.validate()?;
//!
//! let config = DevirtConfig::from_yaml_file("devirt.yaml")?;
//! ```

pub mod devirt_config;
pub mod error;
pub mod io;
pub mod preset;

// Re-exports
pub use devirt_config::{DevirtConfig, OutputKind};
pub use error::{ConfigError, ConfigResult};
pub use io::{ConfigFileV1, DevirtOverrides, SUPPORTED_VERSIONS};
pub use preset::Preset;
