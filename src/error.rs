//! Error types with actionable diagnostics.
//!
//! Every variant names the offending value and carries a hint line so a
//! failing recipe can be fixed without reading the source.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pruning operations.
pub type Result<T> = std::result::Result<T, PruneError>;

/// Errors raised by mask creation, scheduling, and sensitivity analysis.
#[derive(Error, Debug)]
pub enum PruneError {
    /// Invalid or contradictory schedule, mask-type, or recipe configuration.
    #[error("Invalid pruning configuration: {0}\n  → Check the modifier fields in the recipe")]
    Config(String),

    /// A parameter name or pattern matched nothing in the engine.
    #[error("Parameter not found: {name}\n  → Check the `params` entry against the model's parameter names")]
    ParameterNotFound { name: String },

    /// A lifecycle method was called out of order.
    #[error("Illegal state: {0}\n  → Call initialize() once before updates and never after finalize()")]
    IllegalState(String),

    /// Opaque failure reported by the tensor engine.
    #[error("Tensor engine error: {0}")]
    Engine(String),

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error in {path:?}: {message}")]
    Serialization { path: Option<PathBuf>, message: String },
}

impl PruneError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        PruneError::Config(message.into())
    }

    /// Shorthand for a missing parameter.
    pub fn parameter_not_found(name: impl Into<String>) -> Self {
        PruneError::ParameterNotFound { name: name.into() }
    }

    /// Shorthand for a lifecycle violation.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        PruneError::IllegalState(message.into())
    }

    /// Shorthand for an engine failure.
    pub fn engine(message: impl Into<String>) -> Self {
        PruneError::Engine(message.into())
    }

    /// Whether this error was raised by configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(self, PruneError::Config(_))
    }
}
