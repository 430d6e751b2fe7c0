//! PEM rendering of signatures with embedded certificate chains.
//!
//! ```text
//! -----BEGIN SIGNATURE-----
//! Signature Algorithm: RSASSA-PKCS1-V1_5
//!
//! <base64>
//! -----END SIGNATURE-----
//! -----BEGIN CERTIFICATE-----
//! ...
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use x509_cert::Certificate;

use crate::certs;
use crate::error::{SigningError, SigningResult};

pub const SIGNATURE_PEM_TYPE: &str = "SIGNATURE";
const ALGORITHM_HEADER: &str = "Signature Algorithm";
const LINE_WIDTH: usize = 64;

/// Decoded PEM signature.
#[derive(Debug, Clone)]
pub struct PemSignature {
    pub algorithm: Option<String>,
    pub signature: Vec<u8>,
    pub certificates: Vec<Certificate>,
}

pub fn signature_to_pem(
    algorithm: &str,
    signature: &[u8],
    chain: &[Certificate],
) -> SigningResult<String> {
    let mut out = format!("-----BEGIN {SIGNATURE_PEM_TYPE}-----\n");
    out.push_str(&format!("{ALGORITHM_HEADER}: {algorithm}\n\n"));
    let encoded = STANDARD.encode(signature);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {SIGNATURE_PEM_TYPE}-----\n"));
    out.push_str(&certs::to_pem_chain(chain)?);
    Ok(out)
}

pub fn signature_from_pem(data: &str) -> SigningResult<PemSignature> {
    let begin = format!("-----BEGIN {SIGNATURE_PEM_TYPE}-----");
    let end = format!("-----END {SIGNATURE_PEM_TYPE}-----");
    let start = data
        .find(&begin)
        .ok_or_else(|| SigningError::crypto("no signature block found in PEM data"))?;
    let body_start = start + begin.len();
    let stop = data[body_start..]
        .find(&end)
        .map(|i| body_start + i)
        .ok_or_else(|| SigningError::crypto("unterminated signature block"))?;

    let mut algorithm = None;
    let mut content = String::new();
    let mut in_headers = true;
    for line in data[body_start..stop].lines().map(str::trim) {
        if in_headers {
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                if key.trim() == ALGORITHM_HEADER {
                    algorithm = Some(value.trim().to_string());
                }
                continue;
            }
            in_headers = false;
        }
        content.push_str(line);
    }
    let signature = STANDARD.decode(content).map_err(SigningError::crypto)?;

    let rest = &data[stop + end.len()..];
    let certificates = if rest.contains("-----BEGIN CERTIFICATE-----") {
        certs::load_pem_chain(rest.as_bytes())?
    } else {
        Vec::new()
    };

    Ok(PemSignature {
        algorithm,
        signature,
        certificates,
    })
}
