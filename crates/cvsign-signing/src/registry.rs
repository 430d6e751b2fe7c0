//! Registry of signers, verifiers and hashers by algorithm name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::ed25519::Ed25519SignatureHandler;
use crate::error::{SigningError, SigningResult};
use crate::hasher::{Hasher, NoDigestHasher, Sha256Hasher, Sha512Hasher};
use crate::rsassa::RsaSignatureHandler;
use crate::signer::{Signer, Verifier};

#[derive(Default)]
struct HandlerRegistryInner {
    signers: HashMap<String, Arc<dyn Signer>>,
    verifiers: HashMap<String, Arc<dyn Verifier>>,
    hashers: HashMap<String, Arc<dyn Hasher>>,
}

/// Algorithm handlers.
///
/// Clones share the same underlying registry.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<HandlerRegistryInner>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("signers", &self.signer_names())
            .field("hashers", &self.hasher_names())
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in RSA, ED25519 and hash handlers.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_signature_handler(RsaSignatureHandler::pkcs1v15());
        registry.register_signature_handler(RsaSignatureHandler::pss());
        registry.register_signature_handler(Ed25519SignatureHandler);
        registry.register_hasher(Sha256Hasher);
        registry.register_hasher(Sha512Hasher);
        registry.register_hasher(NoDigestHasher);
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, HandlerRegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HandlerRegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_signer(&self, signer: impl Signer + 'static) {
        let name = signer.algorithm().to_string();
        debug!(algorithm = %name, "registering signer");
        self.write().signers.insert(name, Arc::new(signer));
    }

    pub fn register_verifier(&self, verifier: impl Verifier + 'static) {
        let name = verifier.algorithm().to_string();
        debug!(algorithm = %name, "registering verifier");
        self.write().verifiers.insert(name, Arc::new(verifier));
    }

    /// Register a handler as both signer and verifier.
    pub fn register_signature_handler<H>(&self, handler: H)
    where
        H: Signer + Verifier + Clone + 'static,
    {
        self.register_signer(handler.clone());
        self.register_verifier(handler);
    }

    pub fn register_hasher(&self, hasher: impl Hasher + 'static) {
        let name = hasher.algorithm().to_string();
        debug!(algorithm = %name, "registering hasher");
        self.write().hashers.insert(name, Arc::new(hasher));
    }

    pub fn signer(&self, algorithm: &str) -> Option<Arc<dyn Signer>> {
        self.read().signers.get(algorithm).cloned()
    }

    pub fn verifier(&self, algorithm: &str) -> Option<Arc<dyn Verifier>> {
        self.read().verifiers.get(algorithm).cloned()
    }

    pub fn hasher(&self, algorithm: &str) -> Option<Arc<dyn Hasher>> {
        self.read().hashers.get(algorithm).cloned()
    }

    pub fn require_signer(&self, algorithm: &str) -> SigningResult<Arc<dyn Signer>> {
        self.signer(algorithm)
            .ok_or_else(|| SigningError::unsupported("signature algorithm", algorithm))
    }

    pub fn require_verifier(&self, algorithm: &str) -> SigningResult<Arc<dyn Verifier>> {
        self.verifier(algorithm)
            .ok_or_else(|| SigningError::unsupported("signature algorithm", algorithm))
    }

    pub fn require_hasher(&self, algorithm: &str) -> SigningResult<Arc<dyn Hasher>> {
        self.hasher(algorithm)
            .ok_or_else(|| SigningError::unsupported("hash algorithm", algorithm))
    }

    pub fn signer_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().signers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn hasher_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().hashers.keys().cloned().collect();
        names.sort();
        names
    }
}
