//! Devirtualization pass configuration

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use serde::{Deserialize, Serialize};

/// What the compilation unit produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Executable with a known entry point; instantiations are searched from it
    Program,

    /// Library with unknown future callers; instantiations are collected conservatively
    Library,
}

/// Configuration of the devirtualization pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevirtConfig {
    /// Program or library compilation
    pub output_kind: OutputKind,

    /// Follow calls into dependency-library bodies when building the call graph
    pub goto_external: bool,

    /// Keep names of types, functions and constraint nodes for debug output
    pub take_names: bool,

    /// Trace-log the whole constraint graph (requires `take_names`)
    pub dump_constraint_graph: bool,

    /// Rewrite monomorphic call sites into direct calls
    pub rewrite_monomorphic: bool,

    /// Sort bad edges by target priority before the fixpoint
    pub sort_bad_edges: bool,
}

impl DevirtConfig {
    /// Build a configuration from a preset
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                output_kind: OutputKind::Program,
                goto_external: false,
                take_names: false,
                dump_constraint_graph: false,
                rewrite_monomorphic: false,
                sort_bad_edges: true,
            },
            Preset::Balanced => Self {
                output_kind: OutputKind::Program,
                goto_external: false,
                take_names: false,
                dump_constraint_graph: false,
                rewrite_monomorphic: true,
                sort_bad_edges: true,
            },
            Preset::Thorough => Self {
                output_kind: OutputKind::Program,
                goto_external: true,
                take_names: true,
                dump_constraint_graph: false,
                rewrite_monomorphic: true,
                sort_bad_edges: true,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dump_constraint_graph && !self.take_names {
            return Err(ConfigError::conflict(
                "dump_constraint_graph is set but take_names is off",
                "enable take_names or disable dump_constraint_graph",
            ));
        }
        Ok(())
    }

    /// Builder: Set output_kind
    pub fn output_kind(mut self, v: OutputKind) -> Self {
        self.output_kind = v;
        self
    }

    /// Builder: Set goto_external
    pub fn goto_external(mut self, v: bool) -> Self {
        self.goto_external = v;
        self
    }

    /// Builder: Set take_names
    pub fn take_names(mut self, v: bool) -> Self {
        self.take_names = v;
        self
    }

    /// Builder: Set dump_constraint_graph
    pub fn dump_constraint_graph(mut self, v: bool) -> Self {
        self.dump_constraint_graph = v;
        self
    }

    /// Builder: Set rewrite_monomorphic
    pub fn rewrite_monomorphic(mut self, v: bool) -> Self {
        self.rewrite_monomorphic = v;
        self
    }

    /// Builder: Set sort_bad_edges
    pub fn sort_bad_edges(mut self, v: bool) -> Self {
        self.sort_bad_edges = v;
        self
    }

    pub fn is_library(&self) -> bool {
        self.output_kind == OutputKind::Library
    }
}

impl Default for DevirtConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}
