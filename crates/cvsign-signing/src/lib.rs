//! Digesting, signing and verification of component version graphs.
//!
//! This crate provides:
//! - Hashers, signers and verifiers in an explicit [`HandlerRegistry`]
//! - RSA (PKCS#1 v1.5, PSS) and ED25519 signatures, optionally carrying an
//!   X.509 certificate chain for keyless verification
//! - Resource digesters and component version access abstractions
//! - The recursive [`apply`] orchestrator with local and top digest modes
//! - A [`VerifiedStore`] of verified descriptors
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cvsign_core::descriptor::{ComponentDescriptor, ElementMeta, NameVersion};
//! use cvsign_signing::access::InMemoryRepository;
//! use cvsign_signing::ed25519::Ed25519SignatureHandler;
//! use cvsign_signing::keys::{KeyRegistry, PrivateKey};
//! use cvsign_signing::{sign_component_version, verify_component_version, SigningOptions};
//!
//! let repo = InMemoryRepository::new();
//! repo.add_component_version(ComponentDescriptor::new("acme.org/a", "v1", "acme"));
//! let key = NameVersion::new("acme.org/a", "v1");
//! repo.add_local_resource(&key, ElementMeta::new("testdata", "v1"), "PlainText", "text/plain", "testdata")
//!     .unwrap();
//!
//! let keys = KeyRegistry::new();
//! let private = PrivateKey::generate_ed25519();
//! keys.register_public_key("acme", private.public_key());
//! keys.register_private_key("acme", private);
//!
//! let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
//! let opts = SigningOptions::new()
//!     .keys(keys.clone())
//!     .sign(Arc::new(Ed25519SignatureHandler), "acme");
//! let signed = sign_component_version(&mut cv, "acme", opts).unwrap();
//!
//! let mut cv = repo.lookup("acme.org/a", "v1").unwrap();
//! let verified = verify_component_version(&mut cv, "acme", SigningOptions::new().keys(keys)).unwrap();
//! assert_eq!(signed, verified);
//! ```

pub mod access;
pub mod apply;
pub mod certs;
pub mod config;
pub mod digester;
pub mod ed25519;
mod error;
pub mod hasher;
pub mod keys;
pub mod options;
pub mod pem;
pub mod printer;
pub mod registry;
pub mod rsassa;
pub mod signer;
pub mod store;
pub mod timestamp;

pub use apply::{apply, sign_component_version, verify_component_version, WalkingState};
pub use config::SigningConfig;
pub use error::{ErrorKind, SigningError, SigningResult};
pub use options::{DigestMode, SigningOptions};
pub use registry::HandlerRegistry;
pub use store::VerifiedStore;
