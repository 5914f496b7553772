use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::digest::ObjectId;
use crate::error::{CdsyncError, Result, classify_io};

use super::Store;

/// A directory-backed content-addressed blob store. Blobs are sharded
/// `blobs/<first-2-hex>/<64-hex>`, staged through a `tmp/` directory and
/// moved in atomically — the same layout `tvlfyi-tvix`'s
/// `SimpleFilesystemBlobService` uses, reimplemented synchronously since
/// the driver this store feeds is single-threaded and non-async.
///
/// Blobs are stored zstd-compressed on disk; `get`/`put` still operate on
/// the original bytes, so this is invisible to every invariant the driver
/// cares about (the stored bytes, once decompressed, are exactly what was
/// put in).
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("blobs")).map_err(classify_io)?;
        fs::create_dir_all(root.join("tmp")).map_err(classify_io)?;
        Ok(Self { root })
    }

    fn shard_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join("blobs").join(&hex[..2]).join(&hex)
    }
}

impl Store for LocalStore {
    fn get(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let path = self.shard_path(id);
        let compressed = fs::read(&path).map_err(classify_io)?;
        let plain = zstd::stream::decode_all(&compressed[..])
            .map_err(|e| CdsyncError::BadMessage(format!("corrupt object {id}: {e}")))?;
        Ok(plain)
    }

    fn put(&self, id: &ObjectId, bytes: &[u8]) -> Result<()> {
        let dest = self.shard_path(id);
        if dest.exists() {
            // Already present under this content address; nothing to do.
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(classify_io)?;
        }

        let compressed = zstd::stream::encode_all(bytes, 3).map_err(classify_io)?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(self.root.join("tmp")).map_err(classify_io)?;
        tmp.write_all(&compressed).map_err(classify_io)?;
        tmp.flush().map_err(classify_io)?;
        match tmp.persist(&dest) {
            Ok(_) => Ok(()),
            // Another put raced us to the same content address; the bytes
            // are identical by definition (same id), so this is fine.
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(classify_io(e.error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ObjectDigest;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut h = ObjectDigest::new();
        let id = h.digest_one_shot(b"hello world");
        store.put(&id, b"hello world").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"hello world");
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut h = ObjectDigest::new();
        let id = h.digest_one_shot(b"never written");
        assert!(matches!(store.get(&id), Err(CdsyncError::NotFound)));
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut h = ObjectDigest::new();
        let id = h.digest_one_shot(b"dup");
        store.put(&id, b"dup").unwrap();
        store.put(&id, b"dup").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"dup");
    }
}
