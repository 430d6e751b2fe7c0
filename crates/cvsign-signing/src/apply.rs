//! Digest calculation, signing and verification of component version graphs.
//!
//! [`apply`] walks a component version and, depth first, everything it
//! references. Per component version it
//!
//! 1. digests resources (fatal on mismatch) and sources (best effort),
//! 2. resolves references and digests them recursively,
//! 3. normalizes the descriptor and hashes it,
//! 4. verifies or creates the requested signature,
//! 5. writes digests and signatures back if updating.
//!
//! Component versions go to the verified store only when the root call
//! succeeds, and only if their signature was verified or created, or their
//! digest matched a recorded reference or nested digest.
//!
//! In [`DigestMode::Local`] reference digests are stored on the reference
//! elements. In [`DigestMode::Top`] they are collected into the
//! `nestedDigests` snapshot of the root and reference digests are dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cvsign_core::descriptor::{
    ComponentDescriptor, DigestSpec, Identity, NameVersion, NestedComponentDigests, NestedDigests,
    NestedResourceDigest, Reference, Signature,
};
use cvsign_core::NormalisationAlgorithm;
use tracing::{debug, info, warn};

use crate::access::ComponentVersionAccess;
use crate::error::{ErrorKind, SigningError, SigningResult};
use crate::hasher::{hash_bytes, Hasher};
use crate::options::{DigestMode, SigningOptions};
use crate::printer::Printer;
use crate::signer::{decode_signature, SigningContext, VerificationContext};

/// Result of processing one component version.
#[derive(Debug, Clone)]
struct Applied {
    digest: DigestSpec,
    entry: NestedComponentDigests,
    nested: BTreeMap<NameVersion, NestedComponentDigests>,
}

/// Verified store candidate of one root call.
#[derive(Debug)]
struct Pending {
    descriptor: ComponentDescriptor,
    signatures: Vec<String>,
    /// Signature verified or created, or digest matched a recorded one.
    checked: bool,
}

/// State shared by the component versions processed in one batch.
///
/// Results are cached per component version so shared dependencies are
/// processed once. The active path detects reference cycles.
#[derive(Debug, Default)]
pub struct WalkingState {
    closure: HashMap<NameVersion, Applied>,
    active: Vec<NameVersion>,
    pending: BTreeMap<NameVersion, Pending>,
}

impl WalkingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest computed for a processed component version.
    pub fn digest(&self, key: &NameVersion) -> Option<&DigestSpec> {
        self.closure.get(key).map(|a| &a.digest)
    }

    /// Processed component versions, sorted.
    pub fn visited(&self) -> Vec<NameVersion> {
        let mut keys: Vec<_> = self.closure.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn record(
        &mut self,
        key: NameVersion,
        descriptor: ComponentDescriptor,
        signatures: Vec<String>,
        checked: bool,
    ) {
        let entry = self.pending.entry(key).or_insert_with(|| Pending {
            descriptor: descriptor.clone(),
            signatures: Vec::new(),
            checked: false,
        });
        entry.descriptor = descriptor;
        entry.signatures.extend(signatures);
        entry.checked |= checked;
    }

    fn mark_checked(&mut self, key: &NameVersion) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.checked = true;
        }
    }

    fn history(&self) -> String {
        self.active
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("->")
    }
}

/// Per component version settings.
#[derive(Clone)]
struct Level {
    hasher: Arc<dyn Hasher>,
    normalisation: NormalisationAlgorithm,
    sign: bool,
    verify_signature: bool,
    root: bool,
}

impl Level {
    fn same_type(&self, digest: &DigestSpec) -> bool {
        digest.hash_algorithm == self.hasher.algorithm()
            && digest.normalisation_algorithm == self.normalisation.as_str()
    }
}

struct Walk<'a, 'p> {
    opts: &'a SigningOptions,
    printer: Option<&'a mut (dyn Printer + 'p)>,
    state: &'a mut WalkingState,
    mode: DigestMode,
}

/// Digest, sign and/or verify a component version and its references.
///
/// Returns the digest of `cv`. Without a `state` a fresh one is used.
pub fn apply(
    printer: Option<&mut dyn Printer>,
    state: Option<&mut WalkingState>,
    cv: &mut dyn ComponentVersionAccess,
    opts: &SigningOptions,
) -> SigningResult<DigestSpec> {
    opts.complete()?;
    let mut local = WalkingState::new();
    let state = state.unwrap_or(&mut local);
    let mode = opts
        .digest_mode
        .or_else(|| DigestMode::infer(cv.descriptor()))
        .unwrap_or_default();
    debug!(component = %cv.descriptor().key(), mode = %mode, "applying signing options");

    let mut walk = Walk {
        opts,
        printer,
        state,
        mode,
    };
    let level = Level {
        hasher: opts.hasher.clone(),
        normalisation: opts.normalisation,
        sign: opts.signer.is_some(),
        verify_signature: opts.verify_signature,
        root: true,
    };
    let result = walk.apply(cv, level);
    let pending = std::mem::take(&mut walk.state.pending);
    let applied = result?;
    if let Some(store) = &opts.verified_store {
        for (key, p) in pending {
            if !p.checked {
                debug!(component = %key, "digest not checked, not added to verified store");
                continue;
            }
            let names: Vec<&str> = p.signatures.iter().map(String::as_str).collect();
            store.add(&p.descriptor, &names);
        }
    }
    Ok(applied.digest)
}

/// Sign a component version under `name`.
pub fn sign_component_version(
    cv: &mut dyn ComponentVersionAccess,
    name: &str,
    opts: SigningOptions,
) -> SigningResult<DigestSpec> {
    let opts = if opts.signer.is_some() {
        opts.signature_name(name)
    } else {
        opts.sign_with(crate::rsassa::RSASSA_PKCS1_V1_5, name)?
    };
    apply(None, None, cv, &opts)
}

/// Verify the signature `name` of a component version.
pub fn verify_component_version(
    cv: &mut dyn ComponentVersionAccess,
    name: &str,
    opts: SigningOptions,
) -> SigningResult<DigestSpec> {
    let opts = opts.signature_name(name).verify_signature();
    apply(None, None, cv, &opts)
}

fn select_signature(cd: &ComponentDescriptor, name: Option<&str>) -> SigningResult<Signature> {
    match name {
        Some(name) => cd
            .signature(name)
            .cloned()
            .ok_or_else(|| SigningError::not_found("signature", name)),
        None => match cd.signatures.as_slice() {
            [] => Err(SigningError::NoSignature),
            [only] => Ok(only.clone()),
            many => Err(SigningError::AmbiguousSignature {
                names: many.iter().map(|s| s.name.clone()).collect(),
            }),
        },
    }
}

fn reference_key(r: &Reference) -> NameVersion {
    NameVersion::new(&r.component_name, &r.meta.version)
}

fn element_label(name: &str, version: &str, identity: &Identity) -> String {
    if identity.0.len() > 1 {
        format!("{name}:{version} ({identity})")
    } else {
        format!("{name}:{version}")
    }
}

impl Walk<'_, '_> {
    fn print(&mut self, line: String) {
        if let Some(p) = self.printer.as_deref_mut() {
            let gap = "  ".repeat(self.state.active.len().saturating_sub(1));
            p.print_line(&format!("{gap}{line}"));
        }
    }

    fn apply(
        &mut self,
        cv: &mut dyn ComponentVersionAccess,
        level: Level,
    ) -> SigningResult<Applied> {
        let key = cv.descriptor().key();
        self.state.active.push(key.clone());
        let result = self.apply_component(cv, &level);
        let path = self.state.history();
        self.state.active.pop();
        let applied = result.map_err(|e| e.in_context(&path))?;
        self.state.closure.insert(key, applied.clone());
        Ok(applied)
    }

    fn hasher(&self, algorithm: &str) -> SigningResult<Arc<dyn Hasher>> {
        self.opts.registry.require_hasher(algorithm)
    }

    fn nested_level(&self, parent: &Level, declared: Option<&DigestSpec>) -> SigningResult<Level> {
        let (hasher, normalisation) = match declared {
            Some(d) => (
                self.hasher(&d.hash_algorithm)?,
                d.normalisation_algorithm.parse::<NormalisationAlgorithm>()?,
            ),
            None => (parent.hasher.clone(), parent.normalisation),
        };
        Ok(Level {
            hasher,
            normalisation,
            sign: parent.sign && self.opts.recursive,
            verify_signature: false,
            root: false,
        })
    }

    fn apply_component(
        &mut self,
        cv: &mut dyn ComponentVersionAccess,
        level: &Level,
    ) -> SigningResult<Applied> {
        let key = cv.descriptor().key();
        let history = self.state.history();
        self.print(format!("applying to version \"{key}\"[{history}]..."));
        let mut cd = cv.descriptor().clone();

        let to_verify = if level.verify_signature {
            match select_signature(&cd, self.opts.signature_name.as_deref()) {
                Ok(sig) => Some(sig),
                Err(e) if level.sign && e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };
        let (hasher, normalisation) = match &to_verify {
            Some(sig) => (
                self.hasher(&sig.digest.hash_algorithm)?,
                sig.digest
                    .normalisation_algorithm
                    .parse::<NormalisationAlgorithm>()?,
            ),
            None => (level.hasher.clone(), level.normalisation),
        };
        let level = Level {
            hasher: hasher.clone(),
            normalisation,
            ..level.clone()
        };
        normalisation.check_identities(&cd)?;

        let resource_digests = self.digest_resources(cv, &mut cd, &level)?;
        self.digest_sources(cv, &mut cd);
        let nested = self.digest_references(&mut cd, &level)?;

        if self.mode == DigestMode::Top && (level.root || level.sign) {
            if level.sign || to_verify.is_none() {
                cd.nested_digests = Some(NestedDigests(nested.values().cloned().collect()));
            }
        } else if self.mode == DigestMode::Local {
            cd.nested_digests = None;
        }

        let normalized = normalisation.normalize(&cd)?;
        let digest = DigestSpec::new(
            hasher.algorithm(),
            normalisation.as_str(),
            hex::encode(hash_bytes(hasher.as_ref(), &normalized)),
        );
        debug!(component = %key, digest = %digest, "computed component digest");

        let mut signature_names = Vec::new();
        if let Some(sig) = &to_verify {
            self.verify(&key, sig, &digest)?;
            signature_names.push(sig.name.clone());
        } else if level.sign {
            let name = self.sign(&key, &mut cd, &digest, hasher.as_ref())?;
            signature_names.push(name);
        }

        if self.opts.update {
            *cv.descriptor_mut() = cd.clone();
            cv.update()?;
        }

        if self.opts.verified_store.is_some()
            && (self.opts.verify_signature || self.opts.signer.is_some())
        {
            let checked = to_verify.is_some() || level.sign;
            self.state.record(key.clone(), cd.clone(), signature_names, checked);
        }

        Ok(Applied {
            entry: NestedComponentDigests {
                name: key.name.clone(),
                version: key.version.clone(),
                digest: Some(digest.clone()),
                resources: resource_digests,
            },
            digest,
            nested,
        })
    }

    fn digest_resources(
        &mut self,
        cv: &dyn ComponentVersionAccess,
        cd: &mut ComponentDescriptor,
        level: &Level,
    ) -> SigningResult<Vec<NestedResourceDigest>> {
        let mut digests = Vec::new();
        for i in 0..cd.component.resources.len() {
            let res = &cd.component.resources[i];
            let Some(access) = res.access.clone().filter(|a| !a.is_none()) else {
                continue;
            };
            let identity = res.meta.identity();
            let label = element_label(&res.meta.name, &res.meta.version, &identity);
            let existing = res.digest.clone();

            let digest = if self.opts.skip_access_types.contains(&access.kind) {
                DigestSpec::excluded()
            } else if existing.as_ref().is_some_and(DigestSpec::is_excluded) {
                debug!(resource = %label, "resource excluded from signature");
                continue;
            } else if existing.is_some() && !self.opts.verify_digests {
                existing.clone().unwrap_or_else(DigestSpec::excluded)
            } else {
                if existing.is_none() && !self.opts.update && level.verify_signature {
                    return Err(SigningError::MissingDigest {
                        element: format!("resource {label}"),
                    });
                }
                let method = cv.access_method(&access)?;
                let calculated = self.opts.digesters.determine_digest(
                    &res.kind,
                    method.as_ref(),
                    level.hasher.as_ref(),
                    &self.opts.registry,
                    existing.as_ref(),
                )?;
                let Some(calculated) = calculated else {
                    continue;
                };
                if let Some(existing) = &existing {
                    if existing != &calculated {
                        return Err(SigningError::DigestMismatch {
                            element_kind: "resource",
                            element: label,
                            calculated: calculated.to_string(),
                            existing: existing.to_string(),
                        });
                    }
                }
                debug!(resource = %label, digest = %calculated, "determined resource digest");
                calculated
            };

            self.print(format!("  resource {i}:  {identity}: digest {digest}"));
            let res = &mut cd.component.resources[i];
            res.digest = Some(digest.clone());
            digests.push(NestedResourceDigest {
                name: res.meta.name.clone(),
                version: res.meta.version.clone(),
                extra_identity: res.meta.extra_identity.clone(),
                digest: Some(digest),
            });
        }
        Ok(digests)
    }

    /// Best effort: failures are reported, never fatal.
    fn digest_sources(&mut self, cv: &dyn ComponentVersionAccess, cd: &mut ComponentDescriptor) {
        for i in 0..cd.component.sources.len() {
            let src = &cd.component.sources[i];
            let Some(access) = src.access.clone().filter(|a| !a.is_none()) else {
                continue;
            };
            let existing = src.digest.clone();
            let wanted = match &existing {
                Some(d) if d.is_excluded() => false,
                Some(_) => self.opts.verify_digests,
                None => self.opts.update,
            };
            if !wanted {
                continue;
            }
            let identity = src.meta.identity();
            let kind = src.kind.clone();
            let result = cv.access_method(&access).and_then(|method| {
                self.opts.digesters.determine_digest(
                    &kind,
                    method.as_ref(),
                    self.opts.hasher.as_ref(),
                    &self.opts.registry,
                    existing.as_ref(),
                )
            });
            match result {
                Ok(Some(calculated)) => {
                    if let Some(existing) = existing.filter(|e| e != &calculated) {
                        warn!(source = %identity, calculated = %calculated, existing = %existing, "source digest mismatch");
                        self.print(format!(
                            "  source {i}:  {identity}: digest mismatch ({calculated} != {existing})"
                        ));
                        continue;
                    }
                    cd.component.sources[i].digest = Some(calculated);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(source = %identity, error = %e, "cannot digest source");
                    self.print(format!("  source {i}:  {identity}: {e}"));
                }
            }
        }
    }

    fn digest_references(
        &mut self,
        cd: &mut ComponentDescriptor,
        level: &Level,
    ) -> SigningResult<BTreeMap<NameVersion, NestedComponentDigests>> {
        let mut nested = BTreeMap::new();
        let recorded = match self.mode {
            DigestMode::Top if level.root => cd.nested_digests.clone(),
            _ => None,
        };
        let use_recorded = recorded.is_some() && !self.opts.verify_digests && !level.sign;

        for i in 0..cd.component.references.len() {
            let r = cd.component.references[i].clone();
            let rkey = reference_key(&r);
            match self.mode {
                DigestMode::Local => {
                    let needed = r.digest.is_none()
                        || self.opts.verify_digests
                        || (level.sign && self.opts.recursive);
                    if !needed {
                        if let Some(d) = &r.digest {
                            self.print(format!("  reference {i}:  {rkey}: digest {d}"));
                        }
                        continue;
                    }
                    if r.digest.is_none() {
                        self.print(format!("  no digest found for \"{rkey}\""));
                    }
                    let nested_level = self.nested_level(level, r.digest.as_ref())?;
                    let applied = self.resolve_and_apply(&r, &rkey, nested_level)?;
                    if let Some(existing) = &r.digest {
                        if existing != &applied.digest {
                            return Err(SigningError::DigestMismatch {
                                element_kind: "reference",
                                element: format!("{}[{rkey}]", r.meta.name),
                                calculated: applied.digest.to_string(),
                                existing: existing.to_string(),
                            });
                        }
                        self.state.mark_checked(&rkey);
                    }
                    self.print(format!("  reference {i}:  {rkey}: digest {}", applied.digest));
                    cd.component.references[i].digest = Some(applied.digest);
                }
                DigestMode::Top => {
                    cd.component.references[i].digest = None;
                    if use_recorded {
                        if let Some(entry) = recorded.as_ref().and_then(|n| n.lookup(&rkey.name, &rkey.version)) {
                            if let Some(d) = &entry.digest {
                                self.print(format!("  reference {i}:  {rkey}: digest {d}"));
                            }
                            continue;
                        }
                    }
                    let nested_level = self.nested_level(level, None)?;
                    let applied = self.resolve_and_apply(&r, &rkey, nested_level)?;
                    self.print(format!("  reference {i}:  {rkey}: digest {}", applied.digest));
                    nested.insert(rkey, applied.entry);
                    nested.extend(applied.nested);
                }
            }
        }

        if let Some(recorded) = recorded {
            if self.opts.verify_digests && !level.sign {
                compare_nested(&recorded, &nested)?;
                for key in nested.keys() {
                    self.state.mark_checked(key);
                }
            } else if use_recorded {
                nested.extend(recorded.0.into_iter().map(|e| (e.key(), e)));
            }
        }
        Ok(nested)
    }

    fn resolve_and_apply(
        &mut self,
        r: &Reference,
        rkey: &NameVersion,
        level: Level,
    ) -> SigningResult<Applied> {
        if self.state.active.contains(rkey) {
            return Err(SigningError::Cycle {
                path: format!("{}->{rkey}", self.state.history()),
            });
        }
        if let Some(done) = self.state.closure.get(rkey) {
            if level.same_type(&done.digest) {
                debug!(component = %rkey, "reusing digest of processed component version");
                return Ok(done.clone());
            }
        }
        let resolver = self
            .opts
            .resolver
            .clone()
            .ok_or_else(|| SigningError::config("no resolver configured for component references"))?;
        let mut nested_cv = resolver
            .lookup_component_version(&rkey.name, &rkey.version)
            .map_err(|e| SigningError::Resolve {
                reference: format!("{}[{rkey}]", r.meta.name),
                source: Box::new(e),
            })?;
        self.apply(nested_cv.as_mut(), level)
    }

    fn verify(&self, key: &NameVersion, sig: &Signature, digest: &DigestSpec) -> SigningResult<()> {
        if sig.digest.value != digest.value {
            return Err(SigningError::SignatureDigestMismatch {
                signed: sig.digest.value.clone(),
                calculated: digest.value.clone(),
            });
        }
        let verifier = self.opts.registry.require_verifier(&sig.signature.algorithm)?;
        let embedded = decode_signature(&sig.signature)?.certificates;
        let public_key = self.opts.keys.verification_key(
            &sig.name,
            &embedded,
            sig.signature.issuer.as_deref(),
            self.opts.issuer.as_ref(),
        )?;
        verifier.verify(
            &digest.value,
            &sig.signature,
            &VerificationContext {
                hash_algorithm: &sig.digest.hash_algorithm,
                public_key: &public_key,
            },
        )?;
        info!(component = %key, signature = %sig.name, algorithm = %sig.signature.algorithm, "signature verified");
        Ok(())
    }

    fn sign(
        &self,
        key: &NameVersion,
        cd: &mut ComponentDescriptor,
        digest: &DigestSpec,
        hasher: &dyn Hasher,
    ) -> SigningResult<String> {
        let (Some(signer), Some(name)) = (&self.opts.signer, &self.opts.signature_name) else {
            return Err(SigningError::config("signing requested without signer"));
        };
        let (private_key, chain) = self
            .opts
            .keys
            .signing_material(name, self.opts.issuer.as_ref())?;
        let issuer = self.opts.keys.issuer(name);
        let spec = signer.sign(
            &digest.value,
            &SigningContext {
                hash_algorithm: hasher.algorithm(),
                private_key: &private_key,
                certificates: chain.as_deref(),
                issuer: issuer.as_ref(),
            },
        )?;
        let timestamp = match &self.opts.tsa {
            Some(tsa) => Some(tsa.timestamp(digest)?),
            None => None,
        };
        cd.upsert_signature(Signature {
            name: name.clone(),
            digest: digest.clone(),
            signature: spec,
            timestamp,
        });
        info!(component = %key, signature = %name, algorithm = %signer.algorithm(), "component version signed");
        Ok(name.clone())
    }
}

fn compare_nested(
    recorded: &NestedDigests,
    calculated: &BTreeMap<NameVersion, NestedComponentDigests>,
) -> SigningResult<()> {
    for (key, entry) in calculated {
        let Some(found) = recorded.lookup(&key.name, &key.version) else {
            return Err(SigningError::NestedDigestMismatch {
                component: key.to_string(),
                reason: "missing in recorded nested digests".to_string(),
            });
        };
        if found.digest != entry.digest {
            return Err(SigningError::NestedDigestMismatch {
                component: key.to_string(),
                reason: format!(
                    "recorded {} but calculated {}",
                    found.digest.as_ref().map(ToString::to_string).unwrap_or_default(),
                    entry.digest.as_ref().map(ToString::to_string).unwrap_or_default(),
                ),
            });
        }
        if found.resources != entry.resources {
            return Err(SigningError::NestedDigestMismatch {
                component: key.to_string(),
                reason: "resource digests differ".to_string(),
            });
        }
    }
    Ok(())
}
