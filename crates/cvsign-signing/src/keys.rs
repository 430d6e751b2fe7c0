//! Key material and the key registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use der::Encode;
use ed25519_dalek::{SigningKey, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;
use x509_cert::Certificate;

use crate::certs::{self, DistinguishedName};
use crate::error::{SigningError, SigningResult};

/// A private signing key.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(Box<RsaPrivateKey>),
    Ed25519(SigningKey),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => f.write_str("PrivateKey::Rsa(..)"),
            Self::Ed25519(_) => f.write_str("PrivateKey::Ed25519(..)"),
        }
    }
}

impl PrivateKey {
    /// Generate an RSA key.
    pub fn generate_rsa(bits: usize) -> SigningResult<Self> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits).map_err(SigningError::crypto)?;
        Ok(Self::Rsa(Box::new(key)))
    }

    pub fn generate_ed25519() -> Self {
        Self::Ed25519(SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Parse a PKCS#8 (RSA or Ed25519) or PKCS#1 (RSA) PEM key.
    pub fn from_pem(pem: &str) -> SigningResult<Self> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::Rsa(Box::new(key)));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(Box::new(key)));
        }
        SigningKey::from_pkcs8_pem(pem)
            .map(Self::Ed25519)
            .map_err(|_| SigningError::crypto("unsupported private key format"))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }
}

/// A public verification key.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

impl PublicKey {
    /// Parse an SPKI (RSA or Ed25519) or PKCS#1 (RSA) PEM key.
    pub fn from_pem(pem: &str) -> SigningResult<Self> {
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        VerifyingKey::from_public_key_pem(pem)
            .map(Self::Ed25519)
            .map_err(|_| SigningError::crypto("unsupported public key format"))
    }

    /// Parse a DER encoded SPKI structure.
    pub fn from_der(der: &[u8]) -> SigningResult<Self> {
        if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            return Ok(Self::Rsa(key));
        }
        VerifyingKey::from_public_key_der(der)
            .map(Self::Ed25519)
            .map_err(|_| SigningError::crypto("unsupported public key algorithm"))
    }

    /// Key of the certificate subject.
    pub fn from_certificate(cert: &Certificate) -> SigningResult<Self> {
        let der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(SigningError::crypto)?;
        Self::from_der(&der)
    }

    pub fn to_der(&self) -> SigningResult<Vec<u8>> {
        let doc = match self {
            Self::Rsa(key) => key.to_public_key_der(),
            Self::Ed25519(key) => key.to_public_key_der(),
        }
        .map_err(SigningError::crypto)?;
        Ok(doc.into_vec())
    }

    pub fn to_pem(&self) -> SigningResult<String> {
        match self {
            Self::Rsa(key) => key.to_public_key_pem(LineEnding::LF),
            Self::Ed25519(key) => key.to_public_key_pem(LineEnding::LF),
        }
        .map_err(SigningError::crypto)
    }
}

/// What a signature name maps to for verification.
#[derive(Debug, Clone)]
pub enum PublicKeyMaterial {
    Key(PublicKey),
    /// Leaf-first certificate chain; the leaf carries the key.
    Certificates(Vec<Certificate>),
}

impl PublicKeyMaterial {
    /// Parse a PEM key or certificate chain.
    pub fn from_pem(pem: &str) -> SigningResult<Self> {
        if pem.contains("-----BEGIN CERTIFICATE-----") {
            return Ok(Self::Certificates(certs::load_pem_chain(pem.as_bytes())?));
        }
        PublicKey::from_pem(pem).map(Self::Key)
    }
}

impl From<PublicKey> for PublicKeyMaterial {
    fn from(key: PublicKey) -> Self {
        Self::Key(key)
    }
}

#[derive(Default)]
struct KeyRegistryInner {
    public_keys: HashMap<String, PublicKeyMaterial>,
    private_keys: HashMap<String, PrivateKey>,
    issuers: HashMap<String, DistinguishedName>,
    root_certificates: Vec<Certificate>,
}

/// Keys, certificate chains and root certificates by signature name.
///
/// Clones share the same underlying registry.
#[derive(Clone, Default)]
pub struct KeyRegistry {
    inner: Arc<RwLock<KeyRegistryInner>>,
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("KeyRegistry")
            .field("public_keys", &inner.public_keys.len())
            .field("private_keys", &inner.private_keys.len())
            .field("root_certificates", &inner.root_certificates.len())
            .finish()
    }
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, KeyRegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, KeyRegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_public_key(&self, name: impl Into<String>, key: impl Into<PublicKeyMaterial>) {
        let name = name.into();
        debug!(name = %name, "registering public key");
        self.write().public_keys.insert(name, key.into());
    }

    pub fn register_private_key(&self, name: impl Into<String>, key: PrivateKey) {
        let name = name.into();
        debug!(name = %name, "registering private key");
        self.write().private_keys.insert(name, key);
    }

    /// Issuer recorded in signatures created under `name`.
    pub fn register_issuer(&self, name: impl Into<String>, issuer: DistinguishedName) {
        self.write().issuers.insert(name.into(), issuer);
    }

    pub fn add_root_certificate(&self, cert: Certificate) {
        self.write().root_certificates.push(cert);
    }

    pub fn add_root_certificates_pem(&self, pem: &str) -> SigningResult<usize> {
        let chain = certs::load_pem_chain(pem.as_bytes())?;
        let n = chain.len();
        self.write().root_certificates.extend(chain);
        debug!(count = n, "added root certificates");
        Ok(n)
    }

    pub fn public_key(&self, name: &str) -> Option<PublicKeyMaterial> {
        self.read().public_keys.get(name).cloned()
    }

    pub fn private_key(&self, name: &str) -> Option<PrivateKey> {
        self.read().private_keys.get(name).cloned()
    }

    pub fn issuer(&self, name: &str) -> Option<DistinguishedName> {
        self.read().issuers.get(name).cloned()
    }

    pub fn root_certificates(&self) -> Vec<Certificate> {
        self.read().root_certificates.clone()
    }

    /// Private key for `name` plus the validated certificate chain to embed,
    /// if one is registered.
    pub fn signing_material(
        &self,
        name: &str,
        issuer: Option<&DistinguishedName>,
    ) -> SigningResult<(PrivateKey, Option<Vec<Certificate>>)> {
        let private = self
            .private_key(name)
            .ok_or_else(|| SigningError::not_found("private key", name))?;
        match self.public_key(name) {
            Some(PublicKeyMaterial::Certificates(chain)) => {
                certs::verify_chain(&chain, &self.root_certificates(), issuer)?;
                let leaf = PublicKey::from_certificate(&chain[0])?;
                if leaf != private.public_key() {
                    return Err(SigningError::config(format!(
                        "certificate for {name:?} does not match private key"
                    )));
                }
                Ok((private, Some(chain)))
            }
            Some(PublicKeyMaterial::Key(key)) => {
                if key != private.public_key() {
                    return Err(SigningError::config(format!(
                        "public key for {name:?} does not match private key"
                    )));
                }
                Ok((private, None))
            }
            None => Ok((private, None)),
        }
    }

    /// Public key to verify a signature with.
    ///
    /// A registered key wins. Otherwise the certificate chain embedded in the
    /// signature is validated against the root certificates and `issuer`.
    pub fn verification_key(
        &self,
        name: &str,
        embedded: &[Certificate],
        signature_issuer: Option<&str>,
        issuer: Option<&DistinguishedName>,
    ) -> SigningResult<PublicKey> {
        let chain = match self.public_key(name) {
            Some(PublicKeyMaterial::Key(key)) => return Ok(key),
            Some(PublicKeyMaterial::Certificates(chain)) => chain,
            None if !embedded.is_empty() => embedded.to_vec(),
            None => return Err(SigningError::not_found("public key", name)),
        };
        certs::verify_chain(&chain, &self.root_certificates(), issuer)?;
        if let Some(recorded) = signature_issuer {
            let recorded: DistinguishedName = recorded.parse()?;
            recorded
                .check(&certs::subject(&chain[0]))
                .map_err(|reason| SigningError::IssuerMismatch { reason })?;
        }
        PublicKey::from_certificate(&chain[0])
    }
}
