//! Digest, signature and nested digest records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::elements::ExtraIdentity;
use super::NameVersion;

/// Hash algorithm marking a digest as intentionally absent.
pub const NO_DIGEST: &str = "NO-DIGEST";

/// Normalisation marker for elements excluded from signatures.
pub const EXCLUDE_FROM_SIGNATURE: &str = "EXCLUDE-FROM-SIGNATURE";

/// A `(hashAlgorithm, normalisationAlgorithm, value)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigestSpec {
    #[serde(rename = "hashAlgorithm")]
    pub hash_algorithm: String,
    #[serde(rename = "normalisationAlgorithm")]
    pub normalisation_algorithm: String,
    pub value: String,
}

impl DigestSpec {
    pub fn new(
        hash_algorithm: impl Into<String>,
        normalisation_algorithm: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            hash_algorithm: hash_algorithm.into(),
            normalisation_algorithm: normalisation_algorithm.into(),
            value: value.into(),
        }
    }

    /// Marker for elements deliberately left out of signatures.
    pub fn excluded() -> Self {
        Self::new(NO_DIGEST, EXCLUDE_FROM_SIGNATURE, NO_DIGEST)
    }

    /// True for the excluded marker or an empty value.
    pub fn is_excluded(&self) -> bool {
        self.value.is_empty() || self.normalisation_algorithm == EXCLUDE_FROM_SIGNATURE
    }

    /// True if both digests use the same hash and normalisation algorithm.
    pub fn same_type(&self, other: &DigestSpec) -> bool {
        self.hash_algorithm == other.hash_algorithm
            && self.normalisation_algorithm == other.normalisation_algorithm
    }
}

impl fmt::Display for DigestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}[{}]",
            self.hash_algorithm, self.value, self.normalisation_algorithm
        )
    }
}

/// Cryptographic part of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub algorithm: String,
    pub value: String,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// Trusted timestamp over a signed digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampSpec {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Named signature of a component version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub digest: DigestSpec,
    pub signature: SignatureSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampSpec>,
}

/// Digest of a single resource inside a nested digest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedResourceDigest {
    pub name: String,
    pub version: String,
    #[serde(
        default,
        rename = "extraIdentity",
        skip_serializing_if = "ExtraIdentity::is_empty"
    )]
    pub extra_identity: ExtraIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestSpec>,
}

impl fmt::Display for NestedResourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}[", self.name, self.version)?;
        let mut sep = "";
        for (k, v) in &self.extra_identity {
            write!(f, "{sep}{k}={v}")?;
            sep = ",";
        }
        f.write_str("]: ")?;
        match &self.digest {
            Some(d) => write!(f, "{d}"),
            None => f.write_str("<none>"),
        }
    }
}

/// Aggregate and resource digests of one transitively referenced component version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedComponentDigests {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestSpec>,
    #[serde(default, rename = "resourceDigests", skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<NestedResourceDigest>,
}

impl NestedComponentDigests {
    pub fn key(&self) -> NameVersion {
        NameVersion::new(self.name.clone(), self.version.clone())
    }
}

impl fmt::Display for NestedComponentDigests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: ", self.name, self.version)?;
        match &self.digest {
            Some(d) => writeln!(f, "{d}")?,
            None => writeln!(f, "<none>")?,
        }
        for r in &self.resources {
            writeln!(f, "  {r}")?;
        }
        Ok(())
    }
}

/// Snapshot of all transitively referenced component version digests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedDigests(pub Vec<NestedComponentDigests>);

impl NestedDigests {
    pub fn lookup(&self, name: &str, version: &str) -> Option<&NestedComponentDigests> {
        self.0.iter().find(|n| n.name == name && n.version == version)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NestedDigests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.0 {
            write!(f, "{n}")?;
        }
        Ok(())
    }
}
