//! Options for digesting, signing and verifying component versions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cvsign_core::descriptor::ComponentDescriptor;
use cvsign_core::NormalisationAlgorithm;

use crate::access::ComponentResolver;
use crate::certs::DistinguishedName;
use crate::digester::DigesterRegistry;
use crate::error::{SigningError, SigningResult};
use crate::hasher::{Hasher, Sha256Hasher};
use crate::keys::KeyRegistry;
use crate::registry::HandlerRegistry;
use crate::signer::Signer;
use crate::store::VerifiedStore;
use crate::timestamp::TimestampAuthority;

/// Where digests of referenced component versions are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestMode {
    /// On each reference element.
    #[default]
    Local,
    /// In the `nestedDigests` snapshot of the signed root.
    Top,
}

impl DigestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Top => "top",
        }
    }

    /// Mode a descriptor was digested with, if its shape tells.
    pub fn infer(cd: &ComponentDescriptor) -> Option<Self> {
        if cd.nested_digests.is_some() {
            return Some(Self::Top);
        }
        if cd.component.references.iter().any(|r| r.digest.is_some()) {
            return Some(Self::Local);
        }
        None
    }
}

impl fmt::Display for DigestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestMode {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "top" => Ok(Self::Top),
            other => Err(SigningError::unsupported("digest mode", other)),
        }
    }
}

/// Configuration of one signing or verification run.
///
/// ```
/// use cvsign_signing::options::SigningOptions;
///
/// let opts = SigningOptions::new().verify_digests().update();
/// assert!(opts.complete().is_ok());
/// ```
#[derive(Clone)]
pub struct SigningOptions {
    pub(crate) signer: Option<Arc<dyn Signer>>,
    pub(crate) signature_name: Option<String>,
    pub(crate) verify_signature: bool,
    pub(crate) verify_digests: bool,
    pub(crate) update: bool,
    pub(crate) recursive: bool,
    pub(crate) digest_mode: Option<DigestMode>,
    pub(crate) hasher: Arc<dyn Hasher>,
    pub(crate) normalisation: NormalisationAlgorithm,
    pub(crate) issuer: Option<DistinguishedName>,
    pub(crate) resolver: Option<Arc<dyn ComponentResolver>>,
    pub(crate) skip_access_types: BTreeSet<String>,
    pub(crate) verified_store: Option<VerifiedStore>,
    pub(crate) tsa: Option<Arc<dyn TimestampAuthority>>,
    pub(crate) keys: KeyRegistry,
    pub(crate) registry: HandlerRegistry,
    pub(crate) digesters: DigesterRegistry,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SigningOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningOptions")
            .field("signer", &self.signer.as_ref().map(|s| s.algorithm().to_string()))
            .field("signature_name", &self.signature_name)
            .field("verify_signature", &self.verify_signature)
            .field("verify_digests", &self.verify_digests)
            .field("update", &self.update)
            .field("recursive", &self.recursive)
            .field("digest_mode", &self.digest_mode)
            .field("hasher", &self.hasher.algorithm())
            .field("normalisation", &self.normalisation)
            .field("issuer", &self.issuer)
            .field("skip_access_types", &self.skip_access_types)
            .finish_non_exhaustive()
    }
}

impl SigningOptions {
    /// Plain digest calculation with SHA-256 and `jsonNormalisation/v3`.
    pub fn new() -> Self {
        Self {
            signer: None,
            signature_name: None,
            verify_signature: false,
            verify_digests: false,
            update: false,
            recursive: false,
            digest_mode: None,
            hasher: Arc::new(Sha256Hasher),
            normalisation: NormalisationAlgorithm::default(),
            issuer: None,
            resolver: None,
            skip_access_types: BTreeSet::new(),
            verified_store: None,
            tsa: None,
            keys: KeyRegistry::new(),
            registry: HandlerRegistry::with_defaults(),
            digesters: DigesterRegistry::new(),
        }
    }

    /// Sign under `name`. Signing implies updating the descriptor.
    pub fn sign(mut self, signer: Arc<dyn Signer>, name: impl Into<String>) -> Self {
        self.signer = Some(signer);
        self.signature_name = Some(name.into());
        self.update = true;
        self
    }

    /// Sign under `name` with a registered signature algorithm.
    pub fn sign_with(self, algorithm: &str, name: impl Into<String>) -> SigningResult<Self> {
        let signer = self.registry.require_signer(algorithm)?;
        Ok(self.sign(signer, name))
    }

    /// Signature to verify (or replace), by name.
    pub fn signature_name(mut self, name: impl Into<String>) -> Self {
        self.signature_name = Some(name.into());
        self
    }

    pub fn verify_signature(mut self) -> Self {
        self.verify_signature = true;
        self
    }

    /// Recompute existing digests and fail on mismatch.
    pub fn verify_digests(mut self) -> Self {
        self.verify_digests = true;
        self
    }

    /// Write computed digests back to the component versions.
    pub fn update(mut self) -> Self {
        self.update = true;
        self
    }

    /// Sign referenced component versions, too.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn digest_mode(mut self, mode: DigestMode) -> Self {
        self.digest_mode = Some(mode);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Use a registered hash algorithm.
    pub fn hash_algorithm(self, algorithm: &str) -> SigningResult<Self> {
        let hasher = self.registry.require_hasher(algorithm)?;
        Ok(self.hasher(hasher))
    }

    pub fn normalisation(mut self, algorithm: NormalisationAlgorithm) -> Self {
        self.normalisation = algorithm;
        self
    }

    /// Constraint for the subject of certificates used to sign or verify.
    pub fn issuer(mut self, issuer: DistinguishedName) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ComponentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Mark resources with this access kind as excluded from signatures.
    pub fn skip_access_type(mut self, kind: impl Into<String>) -> Self {
        self.skip_access_types.insert(kind.into());
        self
    }

    pub fn verified_store(mut self, store: VerifiedStore) -> Self {
        self.verified_store = Some(store);
        self
    }

    pub fn timestamp_authority(mut self, tsa: Arc<dyn TimestampAuthority>) -> Self {
        self.tsa = Some(tsa);
        self
    }

    pub fn keys(mut self, keys: KeyRegistry) -> Self {
        self.keys = keys;
        self
    }

    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn digesters(mut self, digesters: DigesterRegistry) -> Self {
        self.digesters = digesters;
        self
    }

    pub fn is_signing(&self) -> bool {
        self.signer.is_some()
    }

    pub fn key_registry(&self) -> &KeyRegistry {
        &self.keys
    }

    pub fn handler_registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn store(&self) -> Option<&VerifiedStore> {
        self.verified_store.as_ref()
    }

    /// Check the option combination.
    pub fn complete(&self) -> SigningResult<()> {
        if self.signer.is_some() {
            let name = self
                .signature_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| SigningError::config("signature name required for signing"))?;
            if self.keys.private_key(name).is_none() {
                return Err(SigningError::config(format!(
                    "no private key found for signature {name:?}"
                )));
            }
        }
        if self.recursive && self.signer.is_none() {
            return Err(SigningError::config("recursive requires signing"));
        }
        if self.verify_signature && self.signature_name.as_deref() == Some("") {
            return Err(SigningError::config("empty signature name"));
        }
        Ok(())
    }
}
