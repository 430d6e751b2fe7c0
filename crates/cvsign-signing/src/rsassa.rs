//! RSA signature handlers (PKCS#1 v1.5 and PSS).

use cvsign_core::descriptor::SignatureSpec;
use rsa::{Pkcs1v15Sign, Pss};
use sha2::{Sha256, Sha512};

use crate::error::{SigningError, SigningResult};
use crate::hasher::{SHA256, SHA512};
use crate::keys::{PrivateKey, PublicKey};
use crate::signer::{
    decode_digest, decode_signature, encode_signature, Signer, SigningContext, VerificationContext,
    Verifier,
};

pub const RSASSA_PKCS1_V1_5: &str = "RSASSA-PKCS1-V1_5";
pub const RSASSA_PSS: &str = "RSASSA-PSS";

/// Media type of hex encoded RSA signatures.
pub const MEDIA_TYPE_RSA: &str = "application/vnd.ocm.signature.rsa";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Pkcs1v15,
    Pss,
}

/// RSA signer and verifier for one padding scheme.
#[derive(Debug, Clone, Copy)]
pub struct RsaSignatureHandler {
    scheme: Scheme,
}

impl RsaSignatureHandler {
    pub fn pkcs1v15() -> Self {
        Self {
            scheme: Scheme::Pkcs1v15,
        }
    }

    pub fn pss() -> Self {
        Self { scheme: Scheme::Pss }
    }
}

impl Signer for RsaSignatureHandler {
    fn algorithm(&self) -> &str {
        match self.scheme {
            Scheme::Pkcs1v15 => RSASSA_PKCS1_V1_5,
            Scheme::Pss => RSASSA_PSS,
        }
    }

    fn sign(&self, digest: &str, ctx: &SigningContext<'_>) -> SigningResult<SignatureSpec> {
        let PrivateKey::Rsa(key) = ctx.private_key else {
            return Err(SigningError::config(format!(
                "{} requires an RSA private key",
                Signer::algorithm(self)
            )));
        };
        let hashed = decode_digest(digest)?;
        let mut rng = rand::thread_rng();
        let signature = match (self.scheme, ctx.hash_algorithm) {
            (Scheme::Pkcs1v15, SHA256) => key.sign(Pkcs1v15Sign::new::<Sha256>(), &hashed),
            (Scheme::Pkcs1v15, SHA512) => key.sign(Pkcs1v15Sign::new::<Sha512>(), &hashed),
            (Scheme::Pss, SHA256) => key.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &hashed),
            (Scheme::Pss, SHA512) => key.sign_with_rng(&mut rng, Pss::new::<Sha512>(), &hashed),
            (_, other) => return Err(SigningError::unsupported("hash algorithm", other)),
        }
        .map_err(SigningError::crypto)?;
        encode_signature(Signer::algorithm(self), &signature, MEDIA_TYPE_RSA, ctx)
    }
}

impl Verifier for RsaSignatureHandler {
    fn algorithm(&self) -> &str {
        Signer::algorithm(self)
    }

    fn verify(
        &self,
        digest: &str,
        signature: &SignatureSpec,
        ctx: &VerificationContext<'_>,
    ) -> SigningResult<()> {
        let PublicKey::Rsa(key) = ctx.public_key else {
            return Err(SigningError::config(format!(
                "{} requires an RSA public key",
                Signer::algorithm(self)
            )));
        };
        let hashed = decode_digest(digest)?;
        let decoded = decode_signature(signature)?;
        let sig = &decoded.bytes;
        match (self.scheme, ctx.hash_algorithm) {
            (Scheme::Pkcs1v15, SHA256) => key.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, sig),
            (Scheme::Pkcs1v15, SHA512) => key.verify(Pkcs1v15Sign::new::<Sha512>(), &hashed, sig),
            (Scheme::Pss, SHA256) => key.verify(Pss::new::<Sha256>(), &hashed, sig),
            (Scheme::Pss, SHA512) => key.verify(Pss::new::<Sha512>(), &hashed, sig),
            (_, other) => return Err(SigningError::unsupported("hash algorithm", other)),
        }
        .map_err(|e| SigningError::SignatureInvalid {
            reason: e.to_string(),
        })
    }
}
