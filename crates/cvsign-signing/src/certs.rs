//! X.509 certificate chains and distinguished names.
//!
//! Chains are ordered leaf first. A chain is trusted if walking issuer links
//! from the leaf reaches a certificate signed by (or identical to) one of the
//! configured root certificates. Every certificate must be inside its
//! validity period and every issuing certificate must be a CA.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use der::asn1::SetOfVec;
use der::oid::ObjectIdentifier;
use der::{Any, Decode, Encode, EncodePem, Tag};
use rand::RngCore;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::Certificate;

use crate::error::{SigningError, SigningResult};
use crate::keys::PublicKey;

const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_STREET: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_POSTAL_CODE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.17");
const OID_BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");

const OID_SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

const MAX_CHAIN_DEPTH: usize = 10;

/// Subset of a distinguished name used for issuer matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: Option<String>,
    pub country: Vec<String>,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub locality: Vec<String>,
    pub province: Vec<String>,
    pub street_address: Vec<String>,
    pub postal_code: Vec<String>,
}

impl DistinguishedName {
    pub fn common_name(name: impl Into<String>) -> Self {
        Self {
            common_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country.push(country.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization.push(org.into());
        self
    }

    /// Read the supported attributes of an X.509 name.
    pub fn from_name(name: &Name) -> Self {
        let mut dn = Self::default();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let Ok(value) = std::str::from_utf8(atv.value.value()) else {
                    continue;
                };
                let value = value.to_string();
                match atv.oid {
                    OID_CN => dn.common_name = Some(value),
                    OID_C => dn.country.push(value),
                    OID_O => dn.organization.push(value),
                    OID_OU => dn.organizational_unit.push(value),
                    OID_L => dn.locality.push(value),
                    OID_ST => dn.province.push(value),
                    OID_STREET => dn.street_address.push(value),
                    OID_POSTAL_CODE => dn.postal_code.push(value),
                    _ => {}
                }
            }
        }
        dn
    }

    /// Encode as an X.509 name.
    pub fn to_name(&self) -> SigningResult<Name> {
        let mut rdns = Vec::new();
        for (oid, values) in self.attributes_in_sequence_order() {
            if values.is_empty() {
                continue;
            }
            let mut atvs = Vec::new();
            for v in values {
                atvs.push(AttributeTypeAndValue {
                    oid,
                    value: Any::new(Tag::Utf8String, v.as_bytes()).map_err(SigningError::crypto)?,
                });
            }
            rdns.push(RelativeDistinguishedName(
                SetOfVec::try_from(atvs).map_err(SigningError::crypto)?,
            ));
        }
        Ok(RdnSequence(rdns))
    }

    fn attributes_in_sequence_order(&self) -> Vec<(ObjectIdentifier, Vec<&str>)> {
        fn list(v: &[String]) -> Vec<&str> {
            v.iter().map(String::as_str).collect()
        }
        vec![
            (OID_C, list(&self.country)),
            (OID_O, list(&self.organization)),
            (OID_OU, list(&self.organizational_unit)),
            (OID_L, list(&self.locality)),
            (OID_ST, list(&self.province)),
            (OID_STREET, list(&self.street_address)),
            (OID_POSTAL_CODE, list(&self.postal_code)),
            (OID_CN, self.common_name.iter().map(String::as_str).collect()),
        ]
    }

    /// Check that `actual` satisfies this name used as a constraint.
    ///
    /// The common name must be equal, every other requested attribute value
    /// must be present.
    pub fn check(&self, actual: &DistinguishedName) -> Result<(), String> {
        if let Some(cn) = &self.common_name {
            if actual.common_name.as_ref() != Some(cn) {
                return Err(format!("common name {cn:?} is invalid"));
            }
        }
        let groups: [(&str, &[String], &[String]); 7] = [
            ("country", &self.country, &actual.country),
            ("organization", &self.organization, &actual.organization),
            (
                "organizational unit",
                &self.organizational_unit,
                &actual.organizational_unit,
            ),
            ("locality", &self.locality, &actual.locality),
            ("province", &self.province, &actual.province),
            ("street address", &self.street_address, &actual.street_address),
            ("postal code", &self.postal_code, &actual.postal_code),
        ];
        for (what, wanted, present) in groups {
            for w in wanted {
                if !present.contains(w) {
                    return Err(format!("{what} {w:?} not found"));
                }
            }
        }
        Ok(())
    }
}

const KEYS: [(&str, ObjectIdentifier); 8] = [
    ("CN", OID_CN),
    ("POSTALCODE", OID_POSTAL_CODE),
    ("STREET", OID_STREET),
    ("ST", OID_ST),
    ("L", OID_L),
    ("OU", OID_OU),
    ("O", OID_O),
    ("C", OID_C),
];

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut attrs = self.attributes_in_sequence_order();
        attrs.reverse();
        let mut sep = "";
        for (oid, values) in attrs {
            if values.is_empty() {
                continue;
            }
            let key = KEYS.iter().find(|(_, o)| *o == oid).map_or("", |(k, _)| k);
            f.write_str(sep)?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str("+")?;
                }
                write!(f, "{key}={}", escape_value(v))?;
            }
            sep = ",";
        }
        Ok(())
    }
}

fn escape_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split at unescaped `sep`, removing escapes.
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            cur.push(c);
            if let Some(n) = chars.next() {
                cur.push(n);
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    parts.push(cur);
    parts
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(n) = chars.next() {
                out.push(n);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl FromStr for DistinguishedName {
    type Err = SigningError;

    /// Parse `CN=name,O=org,C=DE+C=US` (a plain name is taken as common name).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains('=') {
            return Ok(Self::common_name(unescape(s)));
        }
        let mut dn = Self::default();
        for rdn in split_unescaped(s, ',') {
            for atv in split_unescaped(&rdn, '+') {
                let (key, value) = atv.split_once('=').ok_or_else(|| {
                    SigningError::config(format!("invalid distinguished name {s:?}"))
                })?;
                let value = unescape(value.trim());
                match key.trim().to_ascii_uppercase().as_str() {
                    "CN" => dn.common_name = Some(value),
                    "C" => dn.country.push(value),
                    "O" => dn.organization.push(value),
                    "OU" => dn.organizational_unit.push(value),
                    "L" => dn.locality.push(value),
                    "ST" => dn.province.push(value),
                    "STREET" => dn.street_address.push(value),
                    "POSTALCODE" => dn.postal_code.push(value),
                    other => {
                        return Err(SigningError::unsupported(
                            "distinguished name attribute",
                            other,
                        ))
                    }
                }
            }
        }
        Ok(dn)
    }
}

/// Subject of a certificate.
pub fn subject(cert: &Certificate) -> DistinguishedName {
    DistinguishedName::from_name(&cert.tbs_certificate.subject)
}

/// Parse one or more PEM encoded certificates.
pub fn load_pem_chain(data: &[u8]) -> SigningResult<Vec<Certificate>> {
    Certificate::load_pem_chain(data).map_err(SigningError::crypto)
}

/// Encode certificates as concatenated PEM blocks.
pub fn to_pem_chain(chain: &[Certificate]) -> SigningResult<String> {
    let mut out = String::new();
    for cert in chain {
        out.push_str(
            &cert
                .to_pem(der::pem::LineEnding::LF)
                .map_err(SigningError::crypto)?,
        );
    }
    Ok(out)
}

fn mismatch(reason: impl Into<String>) -> SigningError {
    SigningError::IssuerMismatch {
        reason: reason.into(),
    }
}

fn check_validity(cert: &Certificate, now: Duration) -> SigningResult<()> {
    let validity = &cert.tbs_certificate.validity;
    if now < validity.not_before.to_unix_duration() || now > validity.not_after.to_unix_duration()
    {
        return Err(mismatch(format!(
            "certificate {:?} is not valid at this time",
            subject(cert).to_string()
        )));
    }
    Ok(())
}

fn is_ca(cert: &Certificate) -> bool {
    cert.tbs_certificate
        .extensions
        .iter()
        .flatten()
        .filter(|ext| ext.extn_id == OID_BASIC_CONSTRAINTS)
        .filter_map(|ext| BasicConstraints::from_der(ext.extn_value.as_bytes()).ok())
        .any(|bc| bc.ca)
}

fn is_self_signed(cert: &Certificate) -> bool {
    cert.tbs_certificate.issuer == cert.tbs_certificate.subject
}

/// Verify that `cert` was signed by the key of `issuer`.
pub fn verify_signed_by(cert: &Certificate, issuer: &Certificate) -> SigningResult<()> {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Err(mismatch("issuer name does not match issuing certificate"));
    }
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(SigningError::crypto)?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| SigningError::crypto("certificate signature has unused bits"))?;
    let key = PublicKey::from_certificate(issuer)?;
    let oid = cert.signature_algorithm.oid;
    let ok = match (&key, oid) {
        (PublicKey::Rsa(k), OID_SHA256_WITH_RSA) => {
            use sha2::Digest;
            k.verify(
                rsa::Pkcs1v15Sign::new::<Sha256>(),
                &Sha256::digest(&tbs),
                signature,
            )
            .is_ok()
        }
        (PublicKey::Rsa(k), OID_SHA512_WITH_RSA) => {
            use sha2::Digest;
            k.verify(
                rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
                &sha2::Sha512::digest(&tbs),
                signature,
            )
            .is_ok()
        }
        (PublicKey::Ed25519(k), OID_ED25519) => {
            use ed25519_dalek::Verifier as _;
            ed25519_dalek::Signature::from_slice(signature)
                .map(|sig| k.verify(&tbs, &sig).is_ok())
                .unwrap_or(false)
        }
        (_, oid) => {
            return Err(SigningError::unsupported(
                "certificate signature algorithm",
                oid.to_string(),
            ))
        }
    };
    if !ok {
        return Err(mismatch(format!(
            "certificate {:?} not signed by {:?}",
            subject(cert).to_string(),
            subject(issuer).to_string()
        )));
    }
    Ok(())
}

/// Validate a leaf-first chain against root certificates and an optional
/// subject constraint for the leaf.
pub fn verify_chain(
    chain: &[Certificate],
    roots: &[Certificate],
    constraint: Option<&DistinguishedName>,
) -> SigningResult<()> {
    let leaf = chain
        .first()
        .ok_or_else(|| SigningError::crypto("empty certificate chain"))?;
    if roots.is_empty() {
        return Err(SigningError::config(
            "no root certificates configured for certificate validation",
        ));
    }
    let now = Duration::from_secs(chrono::Utc::now().timestamp().max(0) as u64);
    for cert in chain {
        check_validity(cert, now)?;
    }

    let mut current = leaf;
    let mut anchored = false;
    for _ in 0..MAX_CHAIN_DEPTH {
        if roots.iter().any(|r| r == current) {
            anchored = true;
            break;
        }
        let by_root = roots.iter().any(|r| {
            r.tbs_certificate.subject == current.tbs_certificate.issuer
                && is_ca(r)
                && check_validity(r, now).is_ok()
                && verify_signed_by(current, r).is_ok()
        });
        if by_root {
            anchored = true;
            break;
        }
        if is_self_signed(current) {
            break;
        }
        let Some(next) = chain[1..]
            .iter()
            .find(|c| c.tbs_certificate.subject == current.tbs_certificate.issuer)
        else {
            break;
        };
        if !is_ca(next) {
            return Err(mismatch(format!(
                "issuing certificate {:?} is no CA",
                subject(next).to_string()
            )));
        }
        verify_signed_by(current, next)?;
        current = next;
    }
    if !anchored {
        return Err(mismatch(
            "certificate chain is not rooted in a trusted root certificate",
        ));
    }

    if let Some(constraint) = constraint {
        constraint.check(&subject(leaf)).map_err(mismatch)?;
    }
    Ok(())
}

/// Certificate profile for [`create_certificate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateKind {
    /// Intermediate CA.
    Intermediate,
    /// Signing certificate.
    Signing,
}

fn serial_number() -> SigningResult<SerialNumber> {
    let mut bytes = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    SerialNumber::new(&bytes).map_err(SigningError::crypto)
}

fn spki(key: &PublicKey) -> SigningResult<SubjectPublicKeyInfoOwned> {
    SubjectPublicKeyInfoOwned::from_der(&key.to_der()?).map_err(SigningError::crypto)
}

/// Create a self-signed root CA certificate.
pub fn create_root_certificate(
    subject: &DistinguishedName,
    key: &RsaPrivateKey,
    valid_for: Duration,
) -> SigningResult<Certificate> {
    let public = PublicKey::Rsa(key.to_public_key());
    let signer = RsaSigningKey::<Sha256>::new(key.clone());
    let builder = CertificateBuilder::new(
        Profile::Root,
        serial_number()?,
        Validity::from_now(valid_for).map_err(SigningError::crypto)?,
        subject.to_name()?,
        spki(&public)?,
        &signer,
    )
    .map_err(SigningError::crypto)?;
    builder
        .build::<rsa::pkcs1v15::Signature>()
        .map_err(SigningError::crypto)
}

/// Create a certificate for `public_key` issued by an RSA CA.
pub fn create_certificate(
    kind: CertificateKind,
    subject: &DistinguishedName,
    public_key: &PublicKey,
    issuer: &Certificate,
    issuer_key: &RsaPrivateKey,
    valid_for: Duration,
) -> SigningResult<Certificate> {
    let issuer_name = issuer.tbs_certificate.subject.clone();
    let profile = match kind {
        CertificateKind::Intermediate => Profile::SubCA {
            issuer: issuer_name,
            path_len_constraint: None,
        },
        CertificateKind::Signing => Profile::Leaf {
            issuer: issuer_name,
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
    };
    let signer = RsaSigningKey::<Sha256>::new(issuer_key.clone());
    let builder = CertificateBuilder::new(
        profile,
        serial_number()?,
        Validity::from_now(valid_for).map_err(SigningError::crypto)?,
        subject.to_name()?,
        spki(public_key)?,
        &signer,
    )
    .map_err(SigningError::crypto)?;
    builder
        .build::<rsa::pkcs1v15::Signature>()
        .map_err(SigningError::crypto)
}
