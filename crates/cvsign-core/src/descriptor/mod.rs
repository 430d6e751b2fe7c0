//! Component descriptor data model.
//!
//! A descriptor is serialized in the `v2` schema layout:
//!
//! ```yaml
//! meta:
//!   schemaVersion: v2
//! component:
//!   name: acme.org/app
//!   version: 1.0.0
//!   provider: acme
//!   repositoryContexts: []
//!   resources: [...]
//!   sources: [...]
//!   componentReferences: [...]
//! signatures: [...]
//! nestedDigests: [...]
//! ```

mod digest;
mod elements;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use digest::{
    DigestSpec, NestedComponentDigests, NestedDigests, NestedResourceDigest, Signature,
    SignatureSpec, TimestampSpec, EXCLUDE_FROM_SIGNATURE, NO_DIGEST,
};
pub use elements::{
    AccessSpec, ElementMeta, ExtraIdentity, Identity, Label, Provider, Reference, Resource,
    ResourceRelation, Source, SourceRef, ACCESS_NONE,
};

use crate::error::{CoreError, CoreResult};

/// Default schema version written for new descriptors.
pub const SCHEMA_VERSION_V2: &str = "v2";

/// Identity of a component version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameVersion {
    pub name: String,
    pub version: String,
}

impl NameVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for NameVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(CoreError::Decode {
                message: format!("invalid component version key {s:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V2.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub version: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, rename = "repositoryContexts")]
    pub repository_contexts: Vec<Value>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default, rename = "componentReferences")]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Versioned, signable description of a component version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    #[serde(default)]
    pub meta: Metadata,
    pub component: ComponentSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
    #[serde(
        default,
        rename = "nestedDigests",
        skip_serializing_if = "Option::is_none"
    )]
    pub nested_digests: Option<NestedDigests>,
}

impl ComponentDescriptor {
    /// Create an empty descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            meta: Metadata::default(),
            component: ComponentSpec {
                name: name.into(),
                version: version.into(),
                provider: Provider::new(provider),
                labels: Vec::new(),
                repository_contexts: Vec::new(),
                sources: Vec::new(),
                references: Vec::new(),
                resources: Vec::new(),
            },
            signatures: Vec::new(),
            nested_digests: None,
        }
    }

    /// Decode from YAML (JSON is accepted as a YAML subset).
    pub fn from_yaml(data: &str) -> CoreResult<Self> {
        let cd: Self = serde_yaml::from_str(data)?;
        cd.validate_versioned_identities()?;
        Ok(cd)
    }

    pub fn from_json(data: &[u8]) -> CoreResult<Self> {
        let cd: Self = serde_json::from_slice(data).map_err(|e| CoreError::Decode {
            message: e.to_string(),
        })?;
        cd.validate_versioned_identities()?;
        Ok(cd)
    }

    /// Elements sharing an identity must at least differ in version; legacy
    /// descriptors are told apart by version defaulting.
    pub fn validate_versioned_identities(&self) -> CoreResult<()> {
        check_unique("resource", self.component.resources.iter().map(|r| &r.meta), true)?;
        check_unique("source", self.component.sources.iter().map(|s| &s.meta), true)?;
        check_unique(
            "reference",
            self.component.references.iter().map(|r| &r.meta),
            true,
        )
    }

    pub fn to_yaml(&self) -> CoreResult<String> {
        serde_yaml::to_string(self).map_err(|e| CoreError::Serialization {
            message: e.to_string(),
        })
    }

    /// Generic JSON tree of the descriptor, as fed into normalization.
    pub fn to_value(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn version(&self) -> &str {
        &self.component.version
    }

    pub fn key(&self) -> NameVersion {
        NameVersion::new(self.component.name.clone(), self.component.version.clone())
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    /// Replace the signature with the same name in place, or append it.
    pub fn upsert_signature(&mut self, signature: Signature) {
        match self.signatures.iter_mut().find(|s| s.name == signature.name) {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    pub fn resource_index(&self, identity: &Identity) -> Option<usize> {
        self.component
            .resources
            .iter()
            .position(|r| &r.meta.identity() == identity)
    }

    /// Check that `(name, extraIdentity)` is unique within each element list.
    pub fn validate_identities(&self) -> CoreResult<()> {
        check_unique("resource", self.component.resources.iter().map(|r| &r.meta), false)?;
        check_unique("source", self.component.sources.iter().map(|s| &s.meta), false)?;
        check_unique(
            "reference",
            self.component.references.iter().map(|r| &r.meta),
            false,
        )
    }
}

fn check_unique<'a>(
    kind: &str,
    metas: impl Iterator<Item = &'a ElementMeta>,
    with_version: bool,
) -> CoreResult<()> {
    let mut seen = HashSet::new();
    for meta in metas {
        let id = meta.identity();
        let version = with_version.then(|| meta.version.clone());
        if !seen.insert((id.clone(), version)) {
            return Err(CoreError::IdentityConflict {
                kind: kind.to_string(),
                identity: id.to_string(),
            });
        }
    }
    Ok(())
}
