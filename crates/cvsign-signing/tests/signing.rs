//! End-to-end digesting, signing and verification scenarios.

use std::sync::Arc;

use cvsign_core::descriptor::{
    AccessSpec, ComponentDescriptor, DigestSpec, ElementMeta, Label, NameVersion, Reference,
    Resource, Source,
};
use cvsign_signing::access::InMemoryRepository;
use cvsign_signing::ed25519::Ed25519SignatureHandler;
use cvsign_signing::keys::{KeyRegistry, PrivateKey};
use cvsign_signing::printer::{Printer, StringPrinter};
use cvsign_signing::rsassa::RsaSignatureHandler;
use cvsign_signing::{
    apply, DigestMode, ErrorKind, SigningError, SigningOptions, VerifiedStore, WalkingState,
};

const TESTDATA_DIGEST: &str = "810ff2fb242a5dee4220f2cb0e6a519891fb67f2f828a6cab4ef8894633b1f50";

fn nv(name: &str) -> NameVersion {
    NameVersion::new(name, "v1")
}

/// Add `name:v1` with a `testdata` resource and references to `refs`.
fn add_component(repo: &InMemoryRepository, name: &str, refs: &[&str]) {
    let mut cd = ComponentDescriptor::new(name, "v1", "acme");
    for (i, r) in refs.iter().enumerate() {
        cd.component
            .references
            .push(Reference::new(format!("ref{i}"), *r, "v1"));
    }
    repo.add_component_version(cd);
    repo.add_local_resource(
        &nv(name),
        ElementMeta::new("testdata", "v1"),
        "PlainText",
        "text/plain",
        "testdata",
    )
    .unwrap();
}

fn ed25519_keys(name: &str) -> KeyRegistry {
    let keys = KeyRegistry::new();
    let key = PrivateKey::generate_ed25519();
    keys.register_public_key(name, key.public_key());
    keys.register_private_key(name, key);
    keys
}

fn signing(repo: &InMemoryRepository, keys: &KeyRegistry) -> SigningOptions {
    SigningOptions::new()
        .keys(keys.clone())
        .resolver(Arc::new(repo.clone()))
        .sign(Arc::new(Ed25519SignatureHandler), "acme")
}

fn verifying(repo: &InMemoryRepository, keys: &KeyRegistry) -> SigningOptions {
    SigningOptions::new()
        .keys(keys.clone())
        .resolver(Arc::new(repo.clone()))
        .signature_name("acme")
        .verify_signature()
}

fn run(repo: &InMemoryRepository, name: &str, opts: &SigningOptions) -> Result<DigestSpec, SigningError> {
    let mut cv = repo.lookup(name, "v1").unwrap();
    apply(None, None, &mut cv, opts)
}

#[test]
fn test_flat_digest() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);

    let mut printer = StringPrinter::new();
    let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
    let p: &mut dyn Printer = &mut printer;
    let digest = apply(Some(p), None, &mut cv, &SigningOptions::new().update()).unwrap();
    assert_eq!(digest.hash_algorithm, "SHA-256");
    assert_eq!(digest.normalisation_algorithm, "jsonNormalisation/v3");

    let cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    let res_digest = cd.component.resources[0].digest.clone().unwrap();
    assert_eq!(res_digest.value, TESTDATA_DIGEST);
    assert_eq!(res_digest.normalisation_algorithm, "genericBlobDigest/v1");

    let expected = format!(
        "applying to version \"acme.org/a:v1\"[acme.org/a:v1]...\n  resource 0:  \"name\"=\"testdata\": digest SHA-256:{TESTDATA_DIGEST}[genericBlobDigest/v1]\n"
    );
    assert_eq!(printer.output(), expected);
}

#[test]
fn test_digest_without_update_leaves_descriptor() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let first = run(&repo, "acme.org/a", &SigningOptions::new()).unwrap();
    assert!(repo.descriptor(&nv("acme.org/a")).unwrap().component.resources[0]
        .digest
        .is_none());
    let second = run(&repo, "acme.org/a", &SigningOptions::new().update()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_resource_digest_mismatch() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    run(&repo, "acme.org/a", &SigningOptions::new().update()).unwrap();

    let mut cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    let corrupted = "0".repeat(64);
    cd.component.resources[0].digest.as_mut().unwrap().value = corrupted.clone();
    repo.add_component_version(cd);

    let err = run(&repo, "acme.org/a", &SigningOptions::new().verify_digests()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mismatch);
    let msg = err.to_string();
    assert!(msg.starts_with("acme.org/a:v1: calculated resource digest"), "{msg}");
    assert!(msg.contains(TESTDATA_DIGEST), "{msg}");
    assert!(msg.contains(&corrupted), "{msg}");
    assert!(msg.ends_with("for testdata:v1"), "{msg}");
}

#[test]
fn test_sign_and_verify() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = ed25519_keys("acme");

    let signed = run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();
    let cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    assert_eq!(cd.signatures.len(), 1);
    assert_eq!(cd.signatures[0].digest, signed);
    assert_eq!(cd.signatures[0].signature.algorithm, "ED25519");

    let verified = run(&repo, "acme.org/a", &verifying(&repo, &keys)).unwrap();
    assert_eq!(signed, verified);
}

#[test]
fn test_tampered_descriptor_fails_verification() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = ed25519_keys("acme");
    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();

    let mut cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    cd.component
        .labels
        .push(Label::new("tampered", "yes").signing());
    repo.add_component_version(cd);

    let err = run(&repo, "acme.org/a", &verifying(&repo, &keys)).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SigningError::SignatureDigestMismatch { .. }
    ));
}

#[test]
fn test_volatile_label_does_not_break_signature() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = ed25519_keys("acme");
    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();

    let mut cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    cd.component.labels.push(Label::new("volatile", "yes"));
    repo.add_component_version(cd);

    assert!(run(&repo, "acme.org/a", &verifying(&repo, &keys)).is_ok());
}

#[test]
fn test_rsa_signing_is_idempotent() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = KeyRegistry::new();
    let key = PrivateKey::generate_rsa(1024).unwrap();
    keys.register_public_key("acme", key.public_key());
    keys.register_private_key("acme", key);
    let opts = SigningOptions::new()
        .keys(keys.clone())
        .sign(Arc::new(RsaSignatureHandler::pkcs1v15()), "acme");

    let first = run(&repo, "acme.org/a", &opts).unwrap();
    let first_cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    let second = run(&repo, "acme.org/a", &opts).unwrap();
    let second_cd = repo.descriptor(&nv("acme.org/a")).unwrap();

    assert_eq!(first, second);
    assert_eq!(second_cd.signatures.len(), 1);
    assert_eq!(first_cd.signatures, second_cd.signatures);
    assert_eq!(
        second_cd.signatures[0].signature.media_type,
        "application/vnd.ocm.signature.rsa"
    );

    let verify = SigningOptions::new()
        .keys(keys)
        .signature_name("acme")
        .verify_signature();
    assert_eq!(run(&repo, "acme.org/a", &verify).unwrap(), first);
}

#[test]
fn test_resign_with_other_name_appends() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = ed25519_keys("acme");
    let other = PrivateKey::generate_ed25519();
    keys.register_private_key("other", other);

    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();
    let opts = SigningOptions::new()
        .keys(keys.clone())
        .sign(Arc::new(Ed25519SignatureHandler), "other");
    run(&repo, "acme.org/a", &opts).unwrap();

    let names: Vec<_> = repo
        .descriptor(&nv("acme.org/a"))
        .unwrap()
        .signatures
        .iter()
        .map(|s| s.name.clone())
        .collect();
    assert_eq!(names, vec!["acme", "other"]);

    let err = run(
        &repo,
        "acme.org/a",
        &SigningOptions::new().keys(keys).verify_signature(),
    )
    .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SigningError::AmbiguousSignature { .. }
    ));
}

#[test]
fn test_no_signature() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let err = run(
        &repo,
        "acme.org/a",
        &SigningOptions::new().update().verify_signature(),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "acme.org/a:v1: failed to determine signature info: no signature found"
    );
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_missing_public_key() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = ed25519_keys("acme");
    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();

    let err = run(&repo, "acme.org/a", &verifying(&repo, &KeyRegistry::new())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains(r#"public key "acme" not found"#));
}

#[test]
fn test_wrong_public_key() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    run(&repo, "acme.org/a", &signing(&repo, &ed25519_keys("acme"))).unwrap();

    let err = run(&repo, "acme.org/a", &verifying(&repo, &ed25519_keys("acme"))).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SigningError::SignatureInvalid { .. }
    ));
}

#[test]
fn test_local_digest_mode() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");

    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).digest_mode(DigestMode::Local),
    )
    .unwrap();

    let a = repo.descriptor(&nv("acme.org/a")).unwrap();
    let b_digest = run(&repo, "acme.org/b", &SigningOptions::new()).unwrap();
    assert_eq!(a.component.references[0].digest.as_ref(), Some(&b_digest));
    assert!(a.nested_digests.is_none());

    let b = repo.descriptor(&nv("acme.org/b")).unwrap();
    assert!(b.component.resources[0].digest.is_some());
    assert!(b.signatures.is_empty());

    run(&repo, "acme.org/a", &verifying(&repo, &keys).verify_digests()).unwrap();
}

#[test]
fn test_top_digest_mode() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");

    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).digest_mode(DigestMode::Top),
    )
    .unwrap();

    let a = repo.descriptor(&nv("acme.org/a")).unwrap();
    assert!(a.component.references[0].digest.is_none());
    let nested = a.nested_digests.clone().unwrap();
    assert_eq!(nested.len(), 1);
    let b_entry = nested.lookup("acme.org/b", "v1").unwrap();
    let b_digest = run(&repo, "acme.org/b", &SigningOptions::new()).unwrap();
    assert_eq!(b_entry.digest.as_ref(), Some(&b_digest));
    assert_eq!(b_entry.resources.len(), 1);
    assert_eq!(
        b_entry.resources[0].digest.as_ref().unwrap().value,
        TESTDATA_DIGEST
    );

    // The recorded snapshot is enough, nothing needs to be resolved.
    let opts = SigningOptions::new()
        .keys(keys.clone())
        .signature_name("acme")
        .verify_signature();
    run(&repo, "acme.org/a", &opts).unwrap();

    run(&repo, "acme.org/a", &verifying(&repo, &keys).verify_digests()).unwrap();
}

#[test]
fn test_top_mode_detects_changed_dependency() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");
    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).digest_mode(DigestMode::Top),
    )
    .unwrap();

    let mut b = repo.descriptor(&nv("acme.org/b")).unwrap();
    b.component.labels.push(Label::new("changed", true).signing());
    repo.add_component_version(b);

    let err = run(&repo, "acme.org/a", &verifying(&repo, &keys).verify_digests()).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SigningError::NestedDigestMismatch { .. }
    ));
}

#[test]
fn test_local_mode_detects_changed_dependency() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");
    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();

    let mut b = repo.descriptor(&nv("acme.org/b")).unwrap();
    b.component.labels.push(Label::new("changed", true).signing());
    repo.add_component_version(b);

    let err = run(&repo, "acme.org/a", &verifying(&repo, &keys).verify_digests()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.starts_with("acme.org/a:v1: calculated reference digest"),
        "{msg}"
    );
    assert!(msg.ends_with("for ref0[acme.org/b:v1]"), "{msg}");
}

#[test]
fn test_failed_verification_leaves_store_untouched() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");
    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();

    let mut b = repo.descriptor(&nv("acme.org/b")).unwrap();
    b.component.labels.push(Label::new("changed", true).signing());
    repo.add_component_version(b);

    let store = VerifiedStore::in_memory();
    let opts = verifying(&repo, &keys)
        .verify_digests()
        .verified_store(store.clone());
    assert!(run(&repo, "acme.org/a", &opts).is_err());
    assert!(store.get(&nv("acme.org/b")).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_signing_stores_only_checked_versions() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");

    let store = VerifiedStore::in_memory();
    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).verified_store(store.clone()),
    )
    .unwrap();
    assert_eq!(store.entries(), vec![nv("acme.org/a")]);
    assert_eq!(
        store.get_entry(&nv("acme.org/a")).unwrap().signatures,
        vec!["acme"]
    );
}

#[test]
fn test_top_mode_store_after_nested_check() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");
    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).digest_mode(DigestMode::Top),
    )
    .unwrap();

    let store = VerifiedStore::in_memory();
    run(
        &repo,
        "acme.org/a",
        &verifying(&repo, &keys)
            .verify_digests()
            .verified_store(store.clone()),
    )
    .unwrap();
    assert_eq!(store.entries(), vec![nv("acme.org/a"), nv("acme.org/b")]);
}

#[test]
fn test_duplicate_identity_rejected() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    repo.add_local_resource(
        &nv("acme.org/a"),
        ElementMeta::new("testdata", "v1"),
        "PlainText",
        "text/plain",
        "other",
    )
    .unwrap();
    let keys = ed25519_keys("acme");

    let opts = signing(&repo, &keys).normalisation(cvsign_core::NormalisationAlgorithm::JsonV3);
    let err = run(&repo, "acme.org/a", &opts).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SigningError::Core(cvsign_core::CoreError::IdentityConflict { .. })
    ));
    assert!(repo.descriptor(&nv("acme.org/a")).unwrap().signatures.is_empty());
}

#[test]
fn test_switch_digest_mode() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");

    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).digest_mode(DigestMode::Top),
    )
    .unwrap();
    run(
        &repo,
        "acme.org/a",
        &signing(&repo, &keys).digest_mode(DigestMode::Local),
    )
    .unwrap();

    let a = repo.descriptor(&nv("acme.org/a")).unwrap();
    assert!(a.nested_digests.is_none());
    assert!(a.component.references[0].digest.is_some());
    run(&repo, "acme.org/a", &verifying(&repo, &keys)).unwrap();
}

#[test]
fn test_recursive_signing() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");

    run(&repo, "acme.org/a", &signing(&repo, &keys).recursive()).unwrap();

    let b = repo.descriptor(&nv("acme.org/b")).unwrap();
    assert_eq!(b.signatures.len(), 1);
    run(&repo, "acme.org/b", &verifying(&repo, &keys)).unwrap();
}

#[test]
fn test_missing_reference() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &["acme.org/missing"]);

    let err = run(
        &repo,
        "acme.org/a",
        &SigningOptions::new().resolver(Arc::new(repo.clone())),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"acme.org/a:v1: failed resolving component reference ref0[acme.org/missing:v1]: component version "acme.org/missing:v1" not found"#
    );
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_nested_error_carries_path() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &["acme.org/missing"]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);

    let err = run(
        &repo,
        "acme.org/a",
        &SigningOptions::new().resolver(Arc::new(repo.clone())),
    )
    .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("acme.org/a:v1->acme.org/b:v1: failed resolving component reference"));
}

#[test]
fn test_reference_cycle() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    add_component(&repo, "acme.org/b", &["acme.org/a"]);

    let err = run(
        &repo,
        "acme.org/a",
        &SigningOptions::new().resolver(Arc::new(repo.clone())),
    )
    .unwrap_err();
    assert!(matches!(err.root_cause(), SigningError::Cycle { .. }));
    assert!(err
        .to_string()
        .ends_with("component version cycle detected: acme.org/a:v1->acme.org/b:v1->acme.org/a:v1"));
}

#[test]
fn test_diamond_is_processed_once() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/d", &[]);
    add_component(&repo, "acme.org/b", &["acme.org/d"]);
    add_component(&repo, "acme.org/c", &["acme.org/d"]);
    add_component(&repo, "acme.org/a", &["acme.org/b", "acme.org/c"]);

    let mut printer = StringPrinter::new();
    let mut state = WalkingState::new();
    let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
    let p: &mut dyn Printer = &mut printer;
    apply(
        Some(p),
        Some(&mut state),
        &mut cv,
        &SigningOptions::new().resolver(Arc::new(repo.clone())),
    )
    .unwrap();

    assert_eq!(
        state.visited(),
        vec![
            nv("acme.org/a"),
            nv("acme.org/b"),
            nv("acme.org/c"),
            nv("acme.org/d")
        ]
    );
    let output = printer.output();
    assert_eq!(
        output
            .matches("applying to version \"acme.org/d:v1\"")
            .count(),
        1
    );
    assert!(output.contains("  no digest found for \"acme.org/b:v1\"\n"));
    assert!(output.contains(
        "    applying to version \"acme.org/d:v1\"[acme.org/a:v1->acme.org/b:v1->acme.org/d:v1]...\n"
    ));
    assert!(state.digest(&nv("acme.org/d")).is_some());
}

#[test]
fn test_skip_access_type() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let mut cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    cd.component.resources.push(Resource::new(
        ElementMeta::new("image", "v1"),
        "ociImage",
        AccessSpec::new("ociArtifact").with("imageReference", "ghcr.io/acme/image:v1"),
    ));
    repo.add_component_version(cd);

    let err = run(&repo, "acme.org/a", &SigningOptions::new().update()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    run(
        &repo,
        "acme.org/a",
        &SigningOptions::new().update().skip_access_type("ociArtifact"),
    )
    .unwrap();
    let cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    assert!(cd.component.resources[1].digest.as_ref().unwrap().is_excluded());

    // Excluded resources are not digested again.
    run(&repo, "acme.org/a", &SigningOptions::new().verify_digests()).unwrap();
}

#[test]
fn test_none_access_has_no_digest() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let mut cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    cd.component.resources.push(Resource::new(
        ElementMeta::new("nothing", "v1"),
        "PlainText",
        AccessSpec::none(),
    ));
    repo.add_component_version(cd);

    run(&repo, "acme.org/a", &SigningOptions::new().update()).unwrap();
    let cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    assert!(cd.component.resources[1].digest.is_none());
}

#[test]
fn test_source_failures_are_not_fatal() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let mut cd = repo.descriptor(&nv("acme.org/a")).unwrap();
    cd.component.sources.push(Source::new(
        ElementMeta::new("src", "v1"),
        "git",
        AccessSpec::new("gitHub").with("repoUrl", "github.com/acme/a"),
    ));
    repo.add_component_version(cd);

    let mut printer = StringPrinter::new();
    let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
    let p: &mut dyn Printer = &mut printer;
    apply(Some(p), None, &mut cv, &SigningOptions::new().update()).unwrap();
    assert!(printer
        .output()
        .contains(r#"  source 0:  "name"="src": unsupported access method "gitHub""#));
}

#[test]
fn test_verified_store_records_graph() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/b", &[]);
    add_component(&repo, "acme.org/a", &["acme.org/b"]);
    let keys = ed25519_keys("acme");
    run(&repo, "acme.org/a", &signing(&repo, &keys)).unwrap();

    let store = VerifiedStore::in_memory();
    run(
        &repo,
        "acme.org/a",
        &verifying(&repo, &keys)
            .verify_digests()
            .verified_store(store.clone()),
    )
    .unwrap();

    assert_eq!(store.entries(), vec![nv("acme.org/a"), nv("acme.org/b")]);
    let a = store.get_entry(&nv("acme.org/a")).unwrap();
    assert_eq!(a.signatures, vec!["acme"]);
    assert_eq!(a.descriptor, repo.descriptor(&nv("acme.org/a")).unwrap());
    assert!(store.get_entry(&nv("acme.org/b")).unwrap().signatures.is_empty());
}

#[test]
fn test_sha512_and_v2_normalisation() {
    let repo = InMemoryRepository::new();
    add_component(&repo, "acme.org/a", &[]);
    let keys = ed25519_keys("acme");
    let opts = signing(&repo, &keys)
        .hash_algorithm("SHA-512")
        .unwrap()
        .normalisation(cvsign_core::NormalisationAlgorithm::JsonV2);
    let digest = run(&repo, "acme.org/a", &opts).unwrap();
    assert_eq!(digest.hash_algorithm, "SHA-512");
    assert_eq!(digest.normalisation_algorithm, "jsonNormalisation/v2");
    assert_eq!(digest.value.len(), 128);

    // Verification follows the digest type recorded in the signature.
    assert_eq!(
        run(&repo, "acme.org/a", &verifying(&repo, &keys)).unwrap(),
        digest
    );
}
