//! Process-level signing configuration.

use std::path::PathBuf;

use cvsign_core::NormalisationAlgorithm;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SigningResult;
use crate::hasher::SHA256;
use crate::keys::KeyRegistry;
use crate::options::{DigestMode, SigningOptions};
use crate::registry::HandlerRegistry;
use crate::store::VerifiedStore;

/// Defaults for signing runs started by a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Hash algorithm for new digests.
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,

    /// Normalisation algorithm for new component digests.
    #[serde(default = "default_normalisation")]
    pub normalisation: String,

    /// `local` or `top`.
    #[serde(default = "default_digest_mode")]
    pub digest_mode: String,

    /// PEM file with trusted root certificates.
    #[serde(default)]
    pub root_certs: Option<PathBuf>,

    /// Verified store file.
    #[serde(default)]
    pub verified_store: Option<PathBuf>,
}

fn default_hash_algorithm() -> String {
    SHA256.to_string()
}

fn default_normalisation() -> String {
    NormalisationAlgorithm::default().as_str().to_string()
}

fn default_digest_mode() -> String {
    DigestMode::default().as_str().to_string()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: default_hash_algorithm(),
            normalisation: default_normalisation(),
            digest_mode: default_digest_mode(),
            root_certs: None,
            verified_store: None,
        }
    }
}

impl SigningConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CVSIGN_HASH_ALGORITHM` | Hash algorithm (default `SHA-256`) |
    /// | `CVSIGN_NORMALISATION` | Normalisation (default `jsonNormalisation/v3`) |
    /// | `CVSIGN_DIGEST_MODE` | `local` (default) or `top` |
    /// | `CVSIGN_ROOT_CERTS` | PEM file with root certificates |
    /// | `CVSIGN_VERIFIED_STORE` | Verified store file |
    pub fn from_env() -> Self {
        Self {
            hash_algorithm: std::env::var("CVSIGN_HASH_ALGORITHM")
                .unwrap_or_else(|_| default_hash_algorithm()),
            normalisation: std::env::var("CVSIGN_NORMALISATION")
                .unwrap_or_else(|_| default_normalisation()),
            digest_mode: std::env::var("CVSIGN_DIGEST_MODE")
                .unwrap_or_else(|_| default_digest_mode()),
            root_certs: std::env::var_os("CVSIGN_ROOT_CERTS").map(PathBuf::from),
            verified_store: std::env::var_os("CVSIGN_VERIFIED_STORE").map(PathBuf::from),
        }
    }

    pub fn with_hash_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.hash_algorithm = algorithm.into();
        self
    }

    pub fn with_normalisation(mut self, algorithm: NormalisationAlgorithm) -> Self {
        self.normalisation = algorithm.as_str().to_string();
        self
    }

    pub fn with_digest_mode(mut self, mode: DigestMode) -> Self {
        self.digest_mode = mode.as_str().to_string();
        self
    }

    pub fn with_root_certs(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_certs = Some(path.into());
        self
    }

    pub fn with_verified_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.verified_store = Some(path.into());
        self
    }

    /// Options with the default handlers, configured root certificates and
    /// verified store. Meant for the outermost entry point of a process.
    pub fn default_options(&self) -> SigningResult<SigningOptions> {
        let registry = HandlerRegistry::with_defaults();
        let keys = KeyRegistry::new();
        if let Some(path) = &self.root_certs {
            let pem = std::fs::read_to_string(path)?;
            let n = keys.add_root_certificates_pem(&pem)?;
            debug!(path = %path.display(), count = n, "loaded root certificates");
        }

        let mut opts = SigningOptions::new()
            .registry(registry)
            .keys(keys)
            .hash_algorithm(&self.hash_algorithm)?
            .normalisation(self.normalisation.parse()?)
            .digest_mode(self.digest_mode.parse()?);
        if let Some(path) = &self.verified_store {
            opts = opts.verified_store(VerifiedStore::open(path)?);
        }
        Ok(opts)
    }
}
