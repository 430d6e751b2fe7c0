//! Hash functions keyed by algorithm name.

use std::io::Read;

use sha2::{Digest, Sha256, Sha512};

pub use cvsign_core::descriptor::NO_DIGEST;

pub const SHA256: &str = "SHA-256";
pub const SHA512: &str = "SHA-512";

/// Incremental hash computation.
pub trait HashState {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// A named hash function.
pub trait Hasher: Send + Sync {
    fn algorithm(&self) -> &str;
    fn create(&self) -> Box<dyn HashState>;
}

struct DigestState<D>(D);

impl<D: Digest> HashState for DigestState<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn algorithm(&self) -> &str {
        SHA256
    }

    fn create(&self) -> Box<dyn HashState> {
        Box::new(DigestState(Sha256::new()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha512Hasher;

impl Hasher for Sha512Hasher {
    fn algorithm(&self) -> &str {
        SHA512
    }

    fn create(&self) -> Box<dyn HashState> {
        Box::new(DigestState(Sha512::new()))
    }
}

/// Hasher for elements that are deliberately not digested.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDigestHasher;

struct NoState;

impl HashState for NoState {
    fn update(&mut self, _data: &[u8]) {}

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Vec::new()
    }
}

impl Hasher for NoDigestHasher {
    fn algorithm(&self) -> &str {
        NO_DIGEST
    }

    fn create(&self) -> Box<dyn HashState> {
        Box::new(NoState)
    }
}

/// Hash a byte slice.
pub fn hash_bytes(hasher: &dyn Hasher, data: &[u8]) -> Vec<u8> {
    let mut state = hasher.create();
    state.update(data);
    state.finalize()
}

/// Hash everything a reader yields, hex encoded.
pub fn hex_digest_reader<R: Read>(hasher: &dyn Hasher, mut reader: R) -> std::io::Result<String> {
    let mut state = hasher.create();
    let mut buf = [0_u8; 8192];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        state.update(&buf[..n]);
    }

    Ok(hex::encode(state.finalize()))
}
