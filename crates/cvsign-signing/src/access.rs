//! Access to component versions and their artifact content.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, PoisonError, RwLock};

use cvsign_core::descriptor::{
    AccessSpec, ComponentDescriptor, ElementMeta, NameVersion, Resource, ACCESS_NONE,
};
use tracing::debug;

use crate::error::{ErrorKind, SigningError, SigningResult};
use crate::hasher::{hash_bytes, Sha256Hasher};

pub const ACCESS_LOCAL_BLOB: &str = "localBlob";

/// Opened access specification of an artifact.
pub trait AccessMethod {
    fn kind(&self) -> &str;

    fn media_type(&self) -> Option<&str> {
        None
    }

    /// Stream the artifact content.
    fn open(&self) -> SigningResult<Box<dyn Read + '_>>;
}

/// A component version with its descriptor and artifact access.
pub trait ComponentVersionAccess {
    fn descriptor(&self) -> &ComponentDescriptor;

    fn descriptor_mut(&mut self) -> &mut ComponentDescriptor;

    fn access_method(&self, spec: &AccessSpec) -> SigningResult<Box<dyn AccessMethod + '_>>;

    /// Persist the current descriptor.
    fn update(&mut self) -> SigningResult<()>;
}

/// Looks up component versions by name and version.
pub trait ComponentResolver: Send + Sync {
    fn lookup_component_version(
        &self,
        name: &str,
        version: &str,
    ) -> SigningResult<Box<dyn ComponentVersionAccess>>;
}

/// Tries resolvers in order.
///
/// A not-found result moves on to the next resolver; other errors abort.
#[derive(Clone, Default)]
pub struct CompoundResolver {
    resolvers: Vec<Arc<dyn ComponentResolver>>,
}

impl CompoundResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn ComponentResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl ComponentResolver for CompoundResolver {
    fn lookup_component_version(
        &self,
        name: &str,
        version: &str,
    ) -> SigningResult<Box<dyn ComponentVersionAccess>> {
        for resolver in &self.resolvers {
            match resolver.lookup_component_version(name, version) {
                Ok(cv) => return Ok(cv),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SigningError::not_found(
            "component version",
            NameVersion::new(name, version).to_string(),
        ))
    }
}

/// Access `none`: the element has no content.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneAccess;

impl AccessMethod for NoneAccess {
    fn kind(&self) -> &str {
        ACCESS_NONE
    }

    fn open(&self) -> SigningResult<Box<dyn Read + '_>> {
        Err(SigningError::unsupported("content access", ACCESS_NONE))
    }
}

/// Blob stored alongside the component version.
#[derive(Debug, Clone)]
pub struct LocalBlobAccess {
    data: Arc<Vec<u8>>,
    media_type: Option<String>,
}

impl AccessMethod for LocalBlobAccess {
    fn kind(&self) -> &str {
        ACCESS_LOCAL_BLOB
    }

    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    fn open(&self) -> SigningResult<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self.data.as_slice())))
    }
}

#[derive(Clone)]
struct StoredVersion {
    descriptor: ComponentDescriptor,
    blobs: HashMap<String, Arc<Vec<u8>>>,
}

/// Repository keeping component versions and local blobs in memory.
///
/// Clones share the same content.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    versions: Arc<RwLock<HashMap<NameVersion, StoredVersion>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a component version, keeping its blobs.
    pub fn add_component_version(&self, descriptor: ComponentDescriptor) {
        let key = descriptor.key();
        debug!(component = %key, "adding component version");
        let mut versions = self.versions.write().unwrap_or_else(PoisonError::into_inner);
        match versions.get_mut(&key) {
            Some(stored) => stored.descriptor = descriptor,
            None => {
                versions.insert(
                    key,
                    StoredVersion {
                        descriptor,
                        blobs: HashMap::new(),
                    },
                );
            }
        }
    }

    /// Store a local blob of an existing component version.
    pub fn add_blob(
        &self,
        key: &NameVersion,
        reference: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> SigningResult<()> {
        let mut versions = self.versions.write().unwrap_or_else(PoisonError::into_inner);
        let stored = versions
            .get_mut(key)
            .ok_or_else(|| SigningError::not_found("component version", key.to_string()))?;
        stored.blobs.insert(reference.into(), Arc::new(data.into()));
        Ok(())
    }

    /// Add a resource with `localBlob` access holding `data`.
    pub fn add_local_resource(
        &self,
        key: &NameVersion,
        meta: ElementMeta,
        kind: &str,
        media_type: &str,
        data: impl Into<Vec<u8>>,
    ) -> SigningResult<()> {
        let data = data.into();
        let reference = format!("sha256:{}", hex::encode(hash_bytes(&Sha256Hasher, &data)));
        self.add_blob(key, reference.clone(), data)?;
        let mut versions = self.versions.write().unwrap_or_else(PoisonError::into_inner);
        let stored = versions
            .get_mut(key)
            .ok_or_else(|| SigningError::not_found("component version", key.to_string()))?;
        stored.descriptor.component.resources.push(Resource::new(
            meta,
            kind,
            AccessSpec::local_blob(reference, media_type),
        ));
        Ok(())
    }

    /// Current descriptor of a stored component version.
    pub fn descriptor(&self, key: &NameVersion) -> Option<ComponentDescriptor> {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|s| s.descriptor.clone())
    }

    pub fn lookup(&self, name: &str, version: &str) -> SigningResult<MemoryComponentVersion> {
        let key = NameVersion::new(name, version);
        let stored = self
            .versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| SigningError::not_found("component version", key.to_string()))?;
        Ok(MemoryComponentVersion {
            repository: self.clone(),
            descriptor: stored.descriptor,
            blobs: stored.blobs,
        })
    }
}

impl ComponentResolver for InMemoryRepository {
    fn lookup_component_version(
        &self,
        name: &str,
        version: &str,
    ) -> SigningResult<Box<dyn ComponentVersionAccess>> {
        Ok(Box::new(self.lookup(name, version)?))
    }
}

/// Component version looked up from an [`InMemoryRepository`].
pub struct MemoryComponentVersion {
    repository: InMemoryRepository,
    descriptor: ComponentDescriptor,
    blobs: HashMap<String, Arc<Vec<u8>>>,
}

impl ComponentVersionAccess for MemoryComponentVersion {
    fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut ComponentDescriptor {
        &mut self.descriptor
    }

    fn access_method(&self, spec: &AccessSpec) -> SigningResult<Box<dyn AccessMethod + '_>> {
        match spec.kind.as_str() {
            ACCESS_NONE => Ok(Box::new(NoneAccess)),
            ACCESS_LOCAL_BLOB => {
                let reference = spec
                    .attribute("localReference")
                    .ok_or_else(|| SigningError::config("localBlob access without localReference"))?;
                let data = self
                    .blobs
                    .get(reference)
                    .cloned()
                    .ok_or_else(|| SigningError::not_found("blob", reference))?;
                Ok(Box::new(LocalBlobAccess {
                    data,
                    media_type: spec.attribute("mediaType").map(str::to_string),
                }))
            }
            other => Err(SigningError::unsupported("access method", other)),
        }
    }

    fn update(&mut self) -> SigningResult<()> {
        debug!(component = %self.descriptor.key(), "updating component version");
        self.repository
            .add_component_version(self.descriptor.clone());
        Ok(())
    }
}
