//! Resource content digesters.
//!
//! A digester implements one resource normalisation algorithm. The generic
//! blob digester hashes the raw artifact bytes and serves as the fallback
//! for every artifact type.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use cvsign_core::descriptor::{DigestSpec, ACCESS_NONE};
use tracing::debug;

use crate::access::AccessMethod;
use crate::error::{SigningError, SigningResult};
use crate::hasher::{hex_digest_reader, Hasher};
use crate::registry::HandlerRegistry;

pub const GENERIC_BLOB_DIGEST_V1: &str = "genericBlobDigest/v1";

/// Computes resource digests for one normalisation algorithm.
pub trait ResourceDigester: Send + Sync {
    fn normalisation_algorithm(&self) -> &str;

    /// Digest the artifact, `None` if the digester cannot handle it.
    fn determine_digest(
        &self,
        resource_type: &str,
        access: &dyn AccessMethod,
        hasher: &dyn Hasher,
    ) -> SigningResult<Option<DigestSpec>>;
}

/// Hashes the raw blob.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericBlobDigester;

impl ResourceDigester for GenericBlobDigester {
    fn normalisation_algorithm(&self) -> &str {
        GENERIC_BLOB_DIGEST_V1
    }

    fn determine_digest(
        &self,
        _resource_type: &str,
        access: &dyn AccessMethod,
        hasher: &dyn Hasher,
    ) -> SigningResult<Option<DigestSpec>> {
        let reader = access.open()?;
        let value = hex_digest_reader(hasher, reader)?;
        Ok(Some(DigestSpec::new(
            hasher.algorithm(),
            GENERIC_BLOB_DIGEST_V1,
            value,
        )))
    }
}

struct DigesterRegistryInner {
    by_normalisation: HashMap<String, Arc<dyn ResourceDigester>>,
    by_artifact_type: HashMap<String, Vec<String>>,
}

/// Digesters by normalisation algorithm and preferred artifact types.
///
/// Clones share the same underlying registry.
#[derive(Clone)]
pub struct DigesterRegistry {
    inner: Arc<RwLock<DigesterRegistryInner>>,
}

impl Default for DigesterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DigesterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = inner.by_normalisation.keys().collect();
        names.sort();
        f.debug_struct("DigesterRegistry")
            .field("digesters", &names)
            .finish()
    }
}

impl DigesterRegistry {
    /// Registry containing the generic blob digester.
    pub fn new() -> Self {
        let mut by_normalisation: HashMap<String, Arc<dyn ResourceDigester>> = HashMap::new();
        by_normalisation.insert(GENERIC_BLOB_DIGEST_V1.to_string(), Arc::new(GenericBlobDigester));
        Self {
            inner: Arc::new(RwLock::new(DigesterRegistryInner {
                by_normalisation,
                by_artifact_type: HashMap::new(),
            })),
        }
    }

    /// Register a digester, preferred for the given artifact types.
    pub fn register(&self, digester: Arc<dyn ResourceDigester>, artifact_types: &[&str]) {
        let name = digester.normalisation_algorithm().to_string();
        debug!(normalisation = %name, artifact_types = ?artifact_types, "registering digester");
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for kind in artifact_types {
            let names = inner.by_artifact_type.entry((*kind).to_string()).or_default();
            if !names.contains(&name) {
                names.push(name.clone());
            }
        }
        inner.by_normalisation.insert(name, digester);
    }

    pub fn get(&self, normalisation: &str) -> Option<Arc<dyn ResourceDigester>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_normalisation
            .get(normalisation)
            .cloned()
    }

    fn preferred(&self, resource_type: &str) -> Vec<Arc<dyn ResourceDigester>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_artifact_type
            .get(resource_type)
            .into_iter()
            .flatten()
            .filter_map(|n| inner.by_normalisation.get(n).cloned())
            .collect()
    }

    /// Digest a resource.
    ///
    /// With a declared digest the declared algorithms are used. Otherwise
    /// digesters preferred for the artifact type are tried before the
    /// generic blob digester. Access `none` yields no digest.
    pub fn determine_digest(
        &self,
        resource_type: &str,
        access: &dyn AccessMethod,
        hasher: &dyn Hasher,
        hashers: &HandlerRegistry,
        declared: Option<&DigestSpec>,
    ) -> SigningResult<Option<DigestSpec>> {
        if access.kind() == ACCESS_NONE {
            return Ok(None);
        }
        if let Some(declared) = declared {
            let digester = self.get(&declared.normalisation_algorithm).ok_or_else(|| {
                SigningError::unsupported("resource digester", &declared.normalisation_algorithm)
            })?;
            let hasher = hashers.require_hasher(&declared.hash_algorithm)?;
            return digester.determine_digest(resource_type, access, hasher.as_ref());
        }
        for digester in self.preferred(resource_type) {
            if let Some(digest) = digester.determine_digest(resource_type, access, hasher)? {
                return Ok(Some(digest));
            }
        }
        GenericBlobDigester.determine_digest(resource_type, access, hasher)
    }
}
