//! Verified store persistence and signing log output.

use std::sync::{Arc, Mutex};

use cvsign_core::descriptor::{
    ComponentDescriptor, DigestSpec, ElementMeta, Identity, Label, NameVersion,
};
use cvsign_signing::access::InMemoryRepository;
use cvsign_signing::ed25519::Ed25519SignatureHandler;
use cvsign_signing::keys::{KeyRegistry, PrivateKey};
use cvsign_signing::{apply, SigningConfig, SigningOptions, VerifiedStore};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct MockWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MockWriter {
    type Writer = MockWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn setup_capture() -> (MockWriter, tracing::subscriber::DefaultGuard) {
    let writer = MockWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (writer, tracing::subscriber::set_default(subscriber))
}

fn signed_repository(keys: &KeyRegistry) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    let mut cd = ComponentDescriptor::new("acme.org/a", "v1", "acme");
    cd.component.labels.push(Label::new("team", "core").signing());
    repo.add_component_version(cd);
    repo.add_local_resource(
        &NameVersion::new("acme.org/a", "v1"),
        ElementMeta::new("testdata", "v1"),
        "PlainText",
        "text/plain",
        "testdata",
    )
    .unwrap();

    let opts = SigningOptions::new()
        .keys(keys.clone())
        .sign(Arc::new(Ed25519SignatureHandler), "acme");
    let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
    apply(None, None, &mut cv, &opts).unwrap();
    repo
}

fn keys() -> KeyRegistry {
    let keys = KeyRegistry::new();
    let key = PrivateKey::generate_ed25519();
    keys.register_public_key("acme", key.public_key());
    keys.register_private_key("acme", key);
    keys
}

#[test]
fn test_store_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verified.yaml");
    let keys = keys();
    let repo = signed_repository(&keys);
    let key = NameVersion::new("acme.org/a", "v1");

    let store = VerifiedStore::open(&path).unwrap();
    let opts = SigningOptions::new()
        .keys(keys)
        .signature_name("acme")
        .verify_signature()
        .verified_store(store.clone());
    let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
    apply(None, None, &mut cv, &opts).unwrap();
    let mut other = ComponentDescriptor::new("acme.org/b", "v2", "acme");
    other.component.labels.push(Label::new("stage", "test"));
    store.add(&other, &[]);
    store.save().unwrap();

    let reloaded = VerifiedStore::open(&path).unwrap();
    assert_eq!(
        reloaded.entries(),
        vec![key.clone(), NameVersion::new("acme.org/b", "v2")]
    );
    assert_eq!(reloaded.get_entry(&key), store.get_entry(&key));
    assert_eq!(reloaded.get(&key), repo.descriptor(&key));
    assert_eq!(reloaded.get(&other.key()), Some(other));
    assert_eq!(
        reloaded
            .get_resource_digest(&key, &Identity::named("testdata"))
            .map(|d: DigestSpec| d.value),
        Some("810ff2fb242a5dee4220f2cb0e6a519891fb67f2f828a6cab4ef8894633b1f50".to_string())
    );

    let data = std::fs::read_to_string(&path).unwrap();
    assert!(data.starts_with("componentVersions:"), "{data}");
}

#[test]
fn test_store_load_discards_unsaved_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = VerifiedStore::open(dir.path().join("verified.yaml")).unwrap();
    store.add(&ComponentDescriptor::new("acme.org/a", "v1", "acme"), &["acme"]);
    assert_eq!(store.len(), 1);
    store.load().unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_config_opens_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verified.yaml");
    let keys = keys();
    let repo = signed_repository(&keys);

    let opts = SigningConfig::default()
        .with_verified_store(&path)
        .default_options()
        .unwrap()
        .keys(keys)
        .signature_name("acme")
        .verify_signature();
    let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
    apply(None, None, &mut cv, &opts).unwrap();
    let store = opts.store().unwrap();
    assert_eq!(store.len(), 1);
    store.save().unwrap();
    assert!(path.exists());
}

#[test]
fn test_signing_logs() {
    let (writer, _guard) = setup_capture();
    let keys = keys();
    signed_repository(&keys);

    let output = String::from_utf8(writer.buf.lock().unwrap().clone()).unwrap();
    assert!(output.contains("component version signed"), "{output}");
    assert!(output.contains("component=acme.org/a:v1"), "{output}");
    assert!(output.contains("signature=acme"), "{output}");
    assert!(output.contains("determined resource digest"), "{output}");
}
