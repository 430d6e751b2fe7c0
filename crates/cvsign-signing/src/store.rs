//! Verified store: descriptors whose signatures have been verified.
//!
//! Persisted as YAML:
//!
//! ```yaml
//! componentVersions:
//!   acme.org/a:v1:
//!     signatures: [acme]
//!     descriptor: { ... }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cvsign_core::descriptor::{ComponentDescriptor, DigestSpec, Identity, NameVersion};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SigningError, SigningResult};

/// One verified component version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Sorted, unique names of verified signatures.
    #[serde(default)]
    pub signatures: Vec<String>,
    pub descriptor: ComponentDescriptor,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageDescriptor {
    #[serde(rename = "componentVersions", default)]
    component_versions: BTreeMap<String, StorageEntry>,
}

#[derive(Debug, Default)]
struct StoreInner {
    path: Option<PathBuf>,
    entries: BTreeMap<String, StorageEntry>,
}

/// Verified store, in memory or backed by a file.
///
/// Clones share the same content.
#[derive(Debug, Clone, Default)]
pub struct VerifiedStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl VerifiedStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store. A missing file yields an empty store,
    /// a missing directory is an error.
    pub fn open(path: impl AsRef<Path>) -> SigningResult<Self> {
        let store = Self {
            inner: Arc::new(Mutex::new(StoreInner {
                path: Some(path.as_ref().to_path_buf()),
                entries: BTreeMap::new(),
            })),
        };
        store.load()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Record a descriptor verified with the given signatures.
    ///
    /// An identical stored descriptor keeps its signature names and gains the
    /// new ones, a different one is replaced.
    pub fn add(&self, cd: &ComponentDescriptor, signatures: &[&str]) {
        let key = cd.key().to_string();
        let mut inner = self.lock();
        let entry = inner
            .entries
            .entry(key.clone())
            .and_modify(|e| {
                if &e.descriptor != cd {
                    e.descriptor = cd.clone();
                    e.signatures.clear();
                }
            })
            .or_insert_with(|| StorageEntry {
                signatures: Vec::new(),
                descriptor: cd.clone(),
            });
        entry
            .signatures
            .extend(signatures.iter().map(|s| (*s).to_string()));
        entry.signatures.sort();
        entry.signatures.dedup();
        debug!(component = %key, signatures = ?entry.signatures, "added to verified store");
    }

    pub fn remove(&self, key: &NameVersion) -> bool {
        self.lock().entries.remove(&key.to_string()).is_some()
    }

    pub fn get(&self, key: &NameVersion) -> Option<ComponentDescriptor> {
        self.get_entry(key).map(|e| e.descriptor)
    }

    pub fn get_entry(&self, key: &NameVersion) -> Option<StorageEntry> {
        self.lock().entries.get(&key.to_string()).cloned()
    }

    /// Digest of the resource with the given identity.
    pub fn get_resource_digest(&self, key: &NameVersion, identity: &Identity) -> Option<DigestSpec> {
        let inner = self.lock();
        let cd = &inner.entries.get(&key.to_string())?.descriptor;
        let index = cd.resource_index(identity)?;
        cd.component.resources[index].digest.clone()
    }

    pub fn get_resource_digest_by_index(&self, key: &NameVersion, index: usize) -> Option<DigestSpec> {
        self.lock()
            .entries
            .get(&key.to_string())?
            .descriptor
            .component
            .resources
            .get(index)?
            .digest
            .clone()
    }

    /// Keys of all stored component versions, sorted.
    pub fn entries(&self) -> Vec<NameVersion> {
        self.lock()
            .entries
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Replace the content with the persisted state.
    pub fn load(&self) -> SigningResult<()> {
        let mut inner = self.lock();
        let Some(path) = inner.path.clone() else {
            return Ok(());
        };
        check_directory(&path)?;
        if !path.exists() {
            debug!(path = %path.display(), "verified store file does not exist yet");
            inner.entries.clear();
            return Ok(());
        }
        let data = fs::read_to_string(&path)?;
        let stored: StorageDescriptor = if data.trim().is_empty() {
            StorageDescriptor::default()
        } else {
            serde_yaml::from_str(&data)?
        };
        info!(
            path = %path.display(),
            entries = stored.component_versions.len(),
            "loaded verified store"
        );
        inner.entries = stored.component_versions;
        Ok(())
    }

    /// Write the content to the store file.
    pub fn save(&self) -> SigningResult<()> {
        let inner = self.lock();
        let Some(path) = inner.path.clone() else {
            return Ok(());
        };
        check_directory(&path)?;
        let data = serde_yaml::to_string(&StorageDescriptor {
            component_versions: inner.entries.clone(),
        })?;
        write_private(&path, data.as_bytes())?;
        info!(path = %path.display(), entries = inner.entries.len(), "saved verified store");
        Ok(())
    }
}

fn check_directory(path: &Path) -> SigningResult<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => Err(SigningError::not_found(
            "verified store directory",
            dir.display().to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
