//! Resources, sources, references and their shared element metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::digest::DigestSpec;

/// Access kind marking elements without content.
pub const ACCESS_NONE: &str = "none";

/// Additional identity attributes disambiguating elements with equal names.
pub type ExtraIdentity = BTreeMap<String, String>;

/// Full identity of an element: its name plus the extra identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub BTreeMap<String, String>);

impl Identity {
    /// Identity consisting only of a name.
    pub fn named(name: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), name.into());
        Self(map)
    }

    /// Add an identity attribute.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").map(String::as_str)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for (k, v) in &self.0 {
            write!(f, "{sep}{k:?}={v:?}")?;
            sep = ",";
        }
        Ok(())
    }
}

/// A label attached to a component or element.
///
/// Only labels with `signing: true` contribute to descriptor digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub signing: bool,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            version: None,
            signing: false,
        }
    }

    /// Mark the label as signature relevant.
    pub fn signing(mut self) -> Self {
        self.signing = true;
        self
    }
}

/// Metadata shared by resources, sources and references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMeta {
    pub name: String,
    pub version: String,
    #[serde(
        default,
        rename = "extraIdentity",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub extra_identity: ExtraIdentity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

impl ElementMeta {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn identity(&self) -> Identity {
        let mut id = Identity::named(self.name.clone());
        for (k, v) in &self.extra_identity {
            id.0.insert(k.clone(), v.clone());
        }
        id
    }
}

/// Access specification: a typed, otherwise opaque attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl AccessSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Access spec for elements without content.
    pub fn none() -> Self {
        Self::new(ACCESS_NONE)
    }

    /// Access spec for a blob stored alongside the component version.
    pub fn local_blob(reference: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::new("localBlob")
            .with("localReference", reference.into())
            .with("mediaType", media_type.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_none(&self) -> bool {
        self.kind == ACCESS_NONE
    }

    /// String attribute lookup.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRelation {
    #[default]
    Local,
    External,
}

/// Reference from a resource to the sources it was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(
        default,
        rename = "identitySelector",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub identity_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// A content-bearing artifact of a component version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub relation: ResourceRelation,
    #[serde(default, rename = "srcRefs", skip_serializing_if = "Vec::is_empty")]
    pub src_refs: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestSpec>,
}

impl Resource {
    pub fn new(meta: ElementMeta, kind: impl Into<String>, access: AccessSpec) -> Self {
        Self {
            meta,
            kind: kind.into(),
            relation: ResourceRelation::Local,
            src_refs: Vec::new(),
            access: Some(access),
            digest: None,
        }
    }

    /// True if the resource has no content to digest.
    pub fn has_no_content(&self) -> bool {
        self.access.as_ref().map_or(true, AccessSpec::is_none)
    }
}

/// Source an element was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestSpec>,
}

impl Source {
    pub fn new(meta: ElementMeta, kind: impl Into<String>, access: AccessSpec) -> Self {
        Self {
            meta,
            kind: kind.into(),
            access: Some(access),
            digest: None,
        }
    }
}

/// Edge to another component version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(rename = "componentName")]
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestSpec>,
}

impl Reference {
    pub fn new(name: impl Into<String>, component: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            meta: ElementMeta::new(name, version),
            component_name: component.into(),
            digest: None,
        }
    }
}

/// Component provider.
///
/// Serialized as a plain string unless it carries labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provider {
    pub name: String,
    pub labels: Vec<Label>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ProviderObject {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<Label>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderRepr {
    Name(String),
    Object(ProviderObject),
}

impl Serialize for Provider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.labels.is_empty() {
            serializer.serialize_str(&self.name)
        } else {
            ProviderObject {
                name: self.name.clone(),
                labels: self.labels.clone(),
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ProviderRepr::deserialize(deserializer)? {
            ProviderRepr::Name(name) => Provider::new(name),
            ProviderRepr::Object(p) => Provider {
                name: p.name,
                labels: p.labels,
            },
        })
    }
}
