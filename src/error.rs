//! Error types.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the network boundary, the formula arena and the engine.
///
/// `NotFound`, `InvalidState`, `InvalidNetwork`, `InvalidDistribution` and
/// `InvalidTopology` are raised before anything is mutated, so the caller may
/// simply retry with corrected input. `InternalConsistency` means a topology
/// precondition was violated or an internal constructor was misused; the
/// current operation is aborted and the engine should be considered unusable.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown variable '{0}'")]
    NotFound(String),

    #[error("variable '{node}' has no state '{state}'")]
    InvalidState { node: String, state: String },

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("invalid distribution for '{node}': {reason}")]
    InvalidDistribution { node: String, reason: String },

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::InternalConsistency(message.into())
    }

    pub(crate) fn distribution(node: &str, reason: impl Into<String>) -> Self {
        Error::InvalidDistribution {
            node: node.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error leaves the engine in a usable state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InternalConsistency(_))
    }
}
