//! Legacy extra-identity defaulting.
//!
//! Older tooling accepted lists with several elements of the same name and
//! no extra identity, telling them apart by version only. For
//! `jsonNormalisation/v1` and `/v2` such elements get their version copied
//! into the extra identity (all but the last occurrence) before hashing.

use tracing::warn;

use crate::descriptor::{ComponentDescriptor, ElementMeta};

/// Element whose identity was changed by defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultedIdentity {
    pub kind: &'static str,
    pub index: usize,
    pub name: String,
    pub version: String,
}

/// Apply version defaulting to resources, sources and references.
pub fn default_version_identities(cd: &mut ComponentDescriptor) -> Vec<DefaultedIdentity> {
    let mut out = Vec::new();
    default_list(
        "resource",
        cd.component.resources.iter_mut().map(|r| &mut r.meta),
        &mut out,
    );
    default_list(
        "source",
        cd.component.sources.iter_mut().map(|s| &mut s.meta),
        &mut out,
    );
    default_list(
        "reference",
        cd.component.references.iter_mut().map(|r| &mut r.meta),
        &mut out,
    );
    for d in &out {
        warn!(
            component = %cd.key(),
            kind = d.kind,
            index = d.index,
            name = %d.name,
            version = %d.version,
            "defaulted version into extra identity of duplicate element"
        );
    }
    out
}

fn default_list<'a>(
    kind: &'static str,
    metas: impl Iterator<Item = &'a mut ElementMeta>,
    out: &mut Vec<DefaultedIdentity>,
) {
    let mut metas: Vec<&mut ElementMeta> = metas.collect();
    for i in 0..metas.len() {
        let conflicts = (i + 1..metas.len()).any(|j| {
            metas[j].name == metas[i].name && metas[j].extra_identity == metas[i].extra_identity
        });
        if conflicts && !metas[i].extra_identity.contains_key("version") {
            let version = metas[i].version.clone();
            metas[i]
                .extra_identity
                .insert("version".to_string(), version.clone());
            out.push(DefaultedIdentity {
                kind,
                index: i,
                name: metas[i].name.clone(),
                version,
            });
        }
    }
}
