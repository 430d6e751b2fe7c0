//! Signer and verifier abstractions.

use cvsign_core::descriptor::SignatureSpec;
use x509_cert::Certificate;

use crate::certs::{self, DistinguishedName};
use crate::error::{SigningError, SigningResult};
use crate::keys::{PrivateKey, PublicKey};
use crate::pem;

/// Media type of PEM signatures carrying a certificate chain.
pub const MEDIA_TYPE_PEM: &str = "application/x-pem-file";

/// Inputs for creating a signature over a digest.
#[derive(Debug)]
pub struct SigningContext<'a> {
    /// Hash algorithm the digest was computed with.
    pub hash_algorithm: &'a str,
    pub private_key: &'a PrivateKey,
    /// Validated leaf-first chain to embed into the signature.
    pub certificates: Option<&'a [Certificate]>,
    /// Issuer to record if no chain is embedded.
    pub issuer: Option<&'a DistinguishedName>,
}

/// Inputs for verifying a signature over a digest.
#[derive(Debug)]
pub struct VerificationContext<'a> {
    pub hash_algorithm: &'a str,
    pub public_key: &'a PublicKey,
}

/// Creates signatures for one algorithm.
pub trait Signer: Send + Sync {
    fn algorithm(&self) -> &str;

    /// Sign a hex encoded digest.
    fn sign(&self, digest: &str, ctx: &SigningContext<'_>) -> SigningResult<SignatureSpec>;
}

/// Verifies signatures of one algorithm.
pub trait Verifier: Send + Sync {
    fn algorithm(&self) -> &str;

    /// Verify a signature over a hex encoded digest.
    fn verify(
        &self,
        digest: &str,
        signature: &SignatureSpec,
        ctx: &VerificationContext<'_>,
    ) -> SigningResult<()>;
}

/// Raw signature bytes plus any certificates embedded with them.
#[derive(Debug, Clone)]
pub struct DecodedSignature {
    pub bytes: Vec<u8>,
    pub certificates: Vec<Certificate>,
}

/// Build the signature spec for raw signature bytes.
///
/// With a certificate chain the value is rendered as PEM and the issuer is
/// taken from the leaf, otherwise the value is hex encoded under
/// `media_type`.
pub fn encode_signature(
    algorithm: &str,
    bytes: &[u8],
    media_type: &str,
    ctx: &SigningContext<'_>,
) -> SigningResult<SignatureSpec> {
    match ctx.certificates.filter(|c| !c.is_empty()) {
        Some(chain) => Ok(SignatureSpec {
            algorithm: algorithm.to_string(),
            value: pem::signature_to_pem(algorithm, bytes, chain)?,
            media_type: MEDIA_TYPE_PEM.to_string(),
            issuer: Some(certs::subject(&chain[0]).to_string()),
        }),
        None => Ok(SignatureSpec {
            algorithm: algorithm.to_string(),
            value: hex::encode(bytes),
            media_type: media_type.to_string(),
            issuer: ctx.issuer.map(ToString::to_string),
        }),
    }
}

/// Decode a signature value according to its media type.
pub fn decode_signature(spec: &SignatureSpec) -> SigningResult<DecodedSignature> {
    if spec.media_type == MEDIA_TYPE_PEM {
        let decoded = pem::signature_from_pem(&spec.value)?;
        if let Some(alg) = &decoded.algorithm {
            if alg != &spec.algorithm {
                return Err(SigningError::SignatureInvalid {
                    reason: format!(
                        "PEM signature algorithm {alg:?} does not match {:?}",
                        spec.algorithm
                    ),
                });
            }
        }
        return Ok(DecodedSignature {
            bytes: decoded.signature,
            certificates: decoded.certificates,
        });
    }
    let bytes = hex::decode(&spec.value).map_err(|e| SigningError::SignatureInvalid {
        reason: format!("invalid signature encoding: {e}"),
    })?;
    Ok(DecodedSignature {
        bytes,
        certificates: Vec::new(),
    })
}

pub(crate) fn decode_digest(digest: &str) -> SigningResult<Vec<u8>> {
    hex::decode(digest).map_err(|e| SigningError::crypto(format!("invalid digest {digest:?}: {e}")))
}
