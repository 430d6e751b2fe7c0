//! ED25519 signature handler.

use cvsign_core::descriptor::SignatureSpec;
use ed25519_dalek::{Signature, Signer as _, Verifier as _};

use crate::error::{SigningError, SigningResult};
use crate::keys::{PrivateKey, PublicKey};
use crate::signer::{
    decode_digest, decode_signature, encode_signature, Signer, SigningContext, VerificationContext,
    Verifier,
};

pub const ED25519: &str = "ED25519";
pub const MEDIA_TYPE_ED25519: &str = "application/vnd.ocm.signature.ed25519";

/// Signs the raw digest bytes with an Ed25519 key.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519SignatureHandler;

impl Signer for Ed25519SignatureHandler {
    fn algorithm(&self) -> &str {
        ED25519
    }

    fn sign(&self, digest: &str, ctx: &SigningContext<'_>) -> SigningResult<SignatureSpec> {
        let PrivateKey::Ed25519(key) = ctx.private_key else {
            return Err(SigningError::config("ED25519 requires an Ed25519 private key"));
        };
        let signature = key.sign(&decode_digest(digest)?);
        encode_signature(ED25519, &signature.to_bytes(), MEDIA_TYPE_ED25519, ctx)
    }
}

impl Verifier for Ed25519SignatureHandler {
    fn algorithm(&self) -> &str {
        ED25519
    }

    fn verify(
        &self,
        digest: &str,
        signature: &SignatureSpec,
        ctx: &VerificationContext<'_>,
    ) -> SigningResult<()> {
        let PublicKey::Ed25519(key) = ctx.public_key else {
            return Err(SigningError::config("ED25519 requires an Ed25519 public key"));
        };
        let decoded = decode_signature(signature)?;
        let invalid = |e: ed25519_dalek::SignatureError| SigningError::SignatureInvalid {
            reason: e.to_string(),
        };
        let sig = Signature::from_slice(&decoded.bytes).map_err(invalid)?;
        key.verify(&decode_digest(digest)?, &sig).map_err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_tamper() {
        let key = PrivateKey::generate_ed25519();
        let public = key.public_key();
        let digest = "00".repeat(32);
        let spec = Ed25519SignatureHandler
            .sign(
                &digest,
                &SigningContext {
                    hash_algorithm: "SHA-256",
                    private_key: &key,
                    certificates: None,
                    issuer: None,
                },
            )
            .unwrap();
        assert_eq!(spec.algorithm, ED25519);
        assert_eq!(spec.media_type, MEDIA_TYPE_ED25519);

        let ctx = VerificationContext {
            hash_algorithm: "SHA-256",
            public_key: &public,
        };
        Ed25519SignatureHandler.verify(&digest, &spec, &ctx).unwrap();
        assert!(Ed25519SignatureHandler
            .verify(&"01".repeat(32), &spec, &ctx)
            .is_err());
    }
}
