//! C1: content-addressed Blob Pool. Flat directory of files named by the
//! lowercase hex SHA-1 digest of their content. Writes are idempotent and
//! atomic with respect to crashes (write-to-temp-then-rename).

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct BlobPool {
    root: PathBuf,
}

impl BlobPool {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    fn tmp_path(&self) -> PathBuf {
        self.root.join(format!(".tmp-{}", uuid::Uuid::new_v4()))
    }

    pub fn exists(&self, digest: &str) -> bool {
        self.blob_path(digest).is_file()
    }

    pub fn get(&self, digest: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.blob_path(digest))?)
    }

    /// Hash `bytes`, and if the digest is absent, write it atomically.
    /// Returns the same digest on every call with identical content.
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let digest = hash_bytes(bytes);
        if !self.exists(&digest) {
            self.write_atomic(&digest, bytes)?;
        }
        Ok(digest)
    }

    /// Same as `put`, but streams the source file instead of holding the
    /// whole thing in memory.
    pub fn put_path(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 64 * 1024];
        let tmp = self.tmp_path();
        let mut tmp_file = File::create(&tmp)?;
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
            tmp_file.write_all(&buf[..read])?;
        }
        tmp_file.flush()?;
        drop(tmp_file);
        let digest = hex_digest(hasher);
        if self.exists(&digest) {
            fs::remove_file(&tmp)?;
        } else {
            fs::rename(&tmp, self.blob_path(&digest))?;
        }
        Ok(digest)
    }

    /// Copy an already-known blob's bytes into the pool under its digest,
    /// used by the Bundle Acceptor when importing extracted blobs. The
    /// caller supplies the digest the sender claimed; this re-hashes the
    /// bytes and fails with an integrity error on mismatch (§9, the
    /// implementers-SHOULD-re-hash recommendation).
    pub fn import_verified(&self, claimed_digest: &str, bytes: &[u8]) -> Result<()> {
        let actual = hash_bytes(bytes);
        if actual != claimed_digest {
            return Err(crate::error::DistriboxError::integrity(format!(
                "blob named {claimed_digest} actually hashes to {actual}"
            )));
        }
        if !self.exists(claimed_digest) {
            self.write_atomic(claimed_digest, bytes)?;
        }
        Ok(())
    }

    fn write_atomic(&self, digest: &str, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.tmp_path();
        fs::write(&tmp, bytes)?;
        match fs::rename(&tmp, self.blob_path(digest)) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                Err(err)
            }
        }
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha1) -> String {
    let result = hasher.finalize();
    let mut out = String::with_capacity(result.len() * 2);
    for byte in result {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_is_idempotent_and_content_addressed() -> Result<()> {
        let tmp = TempDir::new()?;
        let pool = BlobPool::open(tmp.path())?;
        let digest = pool.put(b"hello")?;
        assert_eq!(digest, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert!(pool.exists(&digest));
        let digest2 = pool.put(b"hello")?;
        assert_eq!(digest, digest2);
        assert_eq!(pool.get(&digest)?, b"hello");
        Ok(())
    }

    #[test]
    fn put_path_matches_put() -> Result<()> {
        let tmp = TempDir::new()?;
        let pool = BlobPool::open(tmp.path())?;
        let src = tmp.path().join("src.bin");
        fs::write(&src, b"streamed content")?;
        let digest = pool.put_path(&src)?;
        assert_eq!(digest, hash_bytes(b"streamed content"));
        assert_eq!(pool.get(&digest)?, b"streamed content");
        Ok(())
    }

    #[test]
    fn import_verified_rejects_digest_mismatch() -> Result<()> {
        let tmp = TempDir::new()?;
        let pool = BlobPool::open(tmp.path())?;
        let err = pool.import_verified("0000000000000000000000000000000000000", b"hello");
        assert!(err.is_err());
        assert!(!pool.exists("0000000000000000000000000000000000000"));
        Ok(())
    }

    #[test]
    fn get_missing_digest_errors() -> Result<()> {
        let tmp = TempDir::new()?;
        let pool = BlobPool::open(tmp.path())?;
        assert!(pool.get("deadbeef").is_err());
        Ok(())
    }
}
