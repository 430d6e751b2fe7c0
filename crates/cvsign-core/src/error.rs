//! Error types for the descriptor model and normalization.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Normalisation algorithm is not known.
    #[error("unknown normalisation algorithm {name:?}")]
    UnknownNormalisation { name: String },

    /// A rule was applied to a value of the wrong shape.
    #[error("invalid normalization rule at {path}: {reason}")]
    InvalidRule { path: String, reason: String },

    /// Serialization failed.
    #[error("serialization failed: {message}")]
    Serialization { message: String },

    /// Descriptor could not be decoded.
    #[error("invalid component descriptor: {message}")]
    Decode { message: String },

    /// Two elements of one list share name and extra identity.
    #[error("duplicate {kind} identity {identity}")]
    IdentityConflict { kind: String, identity: String },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::Decode {
            message: err.to_string(),
        }
    }
}

impl CoreError {
    /// True if the error reports an unknown algorithm.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CoreError::UnknownNormalisation { .. })
    }
}
