//! Error types for dfir-devirt
//!
//! Internal invariant violations are reported as errors and propagated to the
//! pass driver, which aborts the phase. Unresolvable information (opaque
//! receivers, unknown externals) is never an error: the analysis falls back to
//! `Virtual` instead.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for devirtualization operations
#[derive(Debug, Error)]
pub enum DevirtError {
    /// Internal invariant violation (compiler bug)
    #[error("Internal error: {0}")]
    Internal(String),

    /// The DFIR builder met an expression shape it cannot translate
    #[error("Unsupported expression #{expr}: {description}")]
    UnsupportedExpression { expr: u32, description: String },

    /// A callee has no DFIR body in the module nor in any dependency
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// An exported type could not be resolved against dependency DFIR
    #[error("Unable to resolve exported type {hash:#018x}")]
    UnresolvedType { hash: u64 },

    /// Malformed serialized DFIR
    #[error("Malformed DFIR blob '{library}': {reason}")]
    Format { library: String, reason: String },

    /// Serialized DFIR written by an incompatible version
    #[error("DFIR blob '{library}' has version {found}, expected {expected}")]
    VersionMismatch {
        library: String,
        found: u32,
        expected: u32,
    },

    /// Program output requested but the module has no entry point
    #[error("Program output requires an entry point in module '{0}'")]
    MissingEntryPoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DevirtError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        DevirtError::Internal(msg.into())
    }

    /// Create a format error for a library blob
    pub fn format(library: impl Into<String>, reason: impl Into<String>) -> Self {
        DevirtError::Format {
            library: library.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported-expression error
    pub fn unsupported(expr: u32, description: impl Into<String>) -> Self {
        DevirtError::UnsupportedExpression {
            expr,
            description: description.into(),
        }
    }

    /// True for errors that signal a compiler bug rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            DevirtError::Internal(_)
                | DevirtError::UnsupportedExpression { .. }
                | DevirtError::UnknownFunction(_)
        )
    }
}

/// Result type alias for devirtualization operations
pub type Result<T> = std::result::Result<T, DevirtError>;
