//! Component descriptor normalisation algorithms.
//!
//! | Algorithm              | Back-end | Identity defaulting |
//! |------------------------|----------|---------------------|
//! | `jsonNormalisation/v1` | entry    | yes                 |
//! | `jsonNormalisation/v2` | JCS      | yes                 |
//! | `jsonNormalisation/v3` | JCS      | no                  |
//!
//! All algorithms ignore `repositoryContexts`, `signatures`, `nestedDigests`,
//! access specifications and labels without `signing: true`. Resources without
//! content (access `none`) never contribute a digest.

mod defaulting;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

pub use defaulting::{default_version_identities, DefaultedIdentity};

use crate::descriptor::{ComponentDescriptor, ACCESS_NONE};
use crate::error::{CoreError, CoreResult};
use crate::normalize::{signing_labels, strip_field_for_access_types, Normalization, Rule};

pub const JSON_NORMALISATION_V1: &str = "jsonNormalisation/v1";
pub const JSON_NORMALISATION_V2: &str = "jsonNormalisation/v2";
pub const JSON_NORMALISATION_V3: &str = "jsonNormalisation/v3";

/// Descriptor normalisation algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NormalisationAlgorithm {
    JsonV1,
    JsonV2,
    #[default]
    JsonV3,
}

impl NormalisationAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonV1 => JSON_NORMALISATION_V1,
            Self::JsonV2 => JSON_NORMALISATION_V2,
            Self::JsonV3 => JSON_NORMALISATION_V3,
        }
    }

    fn backend(self) -> Normalization {
        match self {
            Self::JsonV1 => Normalization::Entry,
            Self::JsonV2 | Self::JsonV3 => Normalization::Jcs,
        }
    }

    /// Whether duplicate identities are told apart by version defaulting.
    pub fn applies_defaulting(self) -> bool {
        !matches!(self, Self::JsonV3)
    }

    /// Check the element identities a descriptor must have to be digested
    /// with this algorithm. Normalization itself does not reject duplicates.
    pub fn check_identities(self, cd: &ComponentDescriptor) -> CoreResult<()> {
        if self.applies_defaulting() {
            cd.validate_versioned_identities()
        } else {
            cd.validate_identities()
        }
    }

    /// Canonical bytes of a descriptor.
    pub fn normalize(self, cd: &ComponentDescriptor) -> CoreResult<Vec<u8>> {
        let mut cd = cd.clone();
        if self.applies_defaulting() {
            default_version_identities(&mut cd);
        }
        let mut value = cd.to_value()?;
        let rule = match self {
            Self::JsonV1 => v1_rules(),
            Self::JsonV2 | Self::JsonV3 => {
                provider_as_object(&mut value);
                v2_rules()
            }
        };
        self.backend().normalize(&value, &rule)
    }
}

impl fmt::Display for NormalisationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalisationAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            JSON_NORMALISATION_V1 => Ok(Self::JsonV1),
            JSON_NORMALISATION_V2 => Ok(Self::JsonV2),
            JSON_NORMALISATION_V3 => Ok(Self::JsonV3),
            other => Err(CoreError::UnknownNormalisation {
                name: other.to_string(),
            }),
        }
    }
}

/// Normalize a descriptor with a named algorithm.
pub fn normalize(cd: &ComponentDescriptor, algorithm: &str) -> CoreResult<Vec<u8>> {
    algorithm.parse::<NormalisationAlgorithm>()?.normalize(cd)
}

fn element_labels() -> Rule {
    Rule::map_excludes().field("labels", Some(signing_labels()))
}

fn resources(base: Rule) -> Rule {
    Rule::dynamic_array(
        None,
        Some(strip_field_for_access_types("digest", &[ACCESS_NONE])),
        base.exclude("access")
            .exclude("srcRefs")
            .field("labels", Some(signing_labels())),
    )
}

fn v1_rules() -> Rule {
    Rule::map_excludes()
        .field(
            "component",
            Some(
                Rule::map_excludes()
                    .exclude("repositoryContexts")
                    .exclude("sources")
                    .field("labels", Some(signing_labels()))
                    .field("provider", Some(element_labels()))
                    .field(
                        "resources",
                        Some(
                            Rule::defaulted(resources(Rule::map_excludes()))
                                .enforce_null("extraIdentity"),
                        ),
                    )
                    .field(
                        "componentReferences",
                        Some(Rule::array(element_labels())),
                    ),
            ),
        )
        .exclude("signatures")
        .exclude("nestedDigests")
}

fn v2_rules() -> Rule {
    Rule::map_excludes()
        .exclude("meta")
        .field(
            "component",
            Some(
                Rule::map_excludes()
                    .exclude("repositoryContexts")
                    .field("labels", Some(signing_labels()))
                    .field("provider", Some(element_labels()))
                    .field("resources", Some(resources(Rule::map_excludes())))
                    .field(
                        "sources",
                        Some(Rule::array(
                            element_labels().exclude("access").exclude("digest"),
                        )),
                    )
                    .field(
                        "componentReferences",
                        Some(Rule::array(element_labels())),
                    ),
            ),
        )
        .exclude("signatures")
        .exclude("nestedDigests")
}

/// The JCS algorithms always render the provider as an object.
fn provider_as_object(value: &mut Value) {
    let Some(provider) = value.pointer_mut("/component/provider") else {
        return;
    };
    if let Value::String(name) = provider {
        let mut obj = Map::new();
        obj.insert("name".to_string(), Value::String(std::mem::take(name)));
        *provider = Value::Object(obj);
    }
}
