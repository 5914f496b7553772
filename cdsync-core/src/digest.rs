//! Two independent SHA-256 accumulators, per design §4.6: one reset between
//! chunks to compute an [`ObjectId`], one monotone over the whole archive
//! byte stream.

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a chunk's bytes; the chunk's address in the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub [u8; 32]);

impl ObjectId {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(ObjectId(out))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Reusable per-chunk hasher. `reset()` between chunks avoids reallocating
/// the hash state the way the teacher's code reuses a single hasher object.
pub struct ObjectDigest(Sha256);

impl ObjectDigest {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn reset(&mut self) {
        self.0 = Sha256::new();
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Hash `bytes` in one shot, reusing (and resetting) this accumulator.
    pub fn digest_one_shot(&mut self, bytes: &[u8]) -> ObjectId {
        self.reset();
        self.0.update(bytes);
        let out = self.0.clone().finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&out);
        ObjectId(id)
    }
}

impl Default for ObjectDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// The whole-archive digest. Allocated lazily on first use, never reset.
#[derive(Default)]
pub struct ArchiveDigest(Option<Sha256>);

impl ArchiveDigest {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.get_or_insert_with(Sha256::new).update(bytes);
    }

    /// Current digest value. Does not consume or reset the accumulator.
    pub fn current(&self) -> ObjectId {
        let hasher = self.0.clone().unwrap_or_else(Sha256::new);
        let out = hasher.finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&out);
        ObjectId(id)
    }
}
