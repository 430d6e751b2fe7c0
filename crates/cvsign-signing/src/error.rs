//! Error types for digesting, signing and verification.

use cvsign_core::CoreError;

/// Error classes callers usually branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Mismatch,
    InvalidConfiguration,
    Unsupported,
    Other,
}

/// Signing errors.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// Registry entry, key, resource or component version not found.
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    /// Element has no digest and digests are not updated.
    #[error("no digest found for {element}")]
    MissingDigest { element: String },

    /// No signature to verify.
    #[error("failed to determine signature info: no signature found")]
    NoSignature,

    /// Verification without a name but several signatures.
    #[error("failed to determine signature info: multiple signatures found ({}), no name given", .names.join(", "))]
    AmbiguousSignature { names: Vec<String> },

    /// Calculated digest differs from the recorded one.
    #[error("calculated {element_kind} digest ({calculated}) mismatches existing digest ({existing}) for {element}")]
    DigestMismatch {
        element_kind: &'static str,
        element: String,
        calculated: String,
        existing: String,
    },

    /// Component digest differs from the digest stored in a signature.
    #[error("signature digest ({signed}) does not match found digest ({calculated})")]
    SignatureDigestMismatch { signed: String, calculated: String },

    /// Nested digest snapshot does not match the recomputed graph.
    #[error("nested digest for {component} does not match: {reason}")]
    NestedDigestMismatch { component: String, reason: String },

    /// Certificate chain or issuer constraint not satisfied.
    #[error("issuer mismatch in public key certificate: {reason}")]
    IssuerMismatch { reason: String },

    /// Cryptographic verification failed.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid { reason: String },

    /// Option combination or key setup is not usable.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Unknown algorithm or access kind.
    #[error("unsupported {kind} {name:?}")]
    Unsupported { kind: String, name: String },

    /// Component version reached again on the active path.
    #[error("component version cycle detected: {path}")]
    Cycle { path: String },

    /// Reference could not be resolved.
    #[error("failed resolving component reference {reference}: {source}")]
    Resolve {
        reference: String,
        #[source]
        source: Box<SigningError>,
    },

    /// Error annotated with the component version path it occurred on.
    #[error("{path}: {source}")]
    Context {
        path: String,
        #[source]
        source: Box<SigningError>,
    },

    /// Key, certificate or signature material could not be processed.
    #[error("crypto error: {message}")]
    Crypto { message: String },

    /// Descriptor model or normalization error.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SigningError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn unsupported(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Unsupported {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn crypto(message: impl std::fmt::Display) -> Self {
        Self::Crypto {
            message: message.to_string(),
        }
    }

    /// Annotate with a component version path unless already annotated.
    pub fn in_context(self, path: &str) -> Self {
        match self {
            e @ Self::Context { .. } => e,
            e => Self::Context {
                path: path.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// The innermost error, looking through path annotations.
    pub fn root_cause(&self) -> &SigningError {
        match self {
            Self::Context { source, .. } | Self::Resolve { source, .. } => source.root_cause(),
            e => e,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            Self::NotFound { .. } | Self::MissingDigest { .. } | Self::NoSignature => {
                ErrorKind::NotFound
            }
            Self::DigestMismatch { .. }
            | Self::SignatureDigestMismatch { .. }
            | Self::NestedDigestMismatch { .. }
            | Self::IssuerMismatch { .. }
            | Self::SignatureInvalid { .. } => ErrorKind::Mismatch,
            Self::InvalidConfig { .. } | Self::AmbiguousSignature { .. } => {
                ErrorKind::InvalidConfiguration
            }
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Core(e) if e.is_unsupported() => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}

/// Result type for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;
