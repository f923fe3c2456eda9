//! Content-addressed artifact cache.
//!
//! ```text
//! artifacts/
//! ├── objects/<2-hex prefix>/<sha256>.<ext>   # file contents
//! └── refs/<group>/<artifact>/<version>/<file> # digest of the object
//! ```
//!
//! Identical archives published under different coordinates share one
//! object. Every write goes through a temporary file and a rename, so a
//! crashed download never leaves a truncated entry behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::coordinate::ArtifactFile;

pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ref_path(&self, file: &ArtifactFile) -> PathBuf {
        self.root
            .join("refs")
            .join(&file.key.group)
            .join(&file.key.artifact)
            .join(file.version.as_str())
            .join(file.file_name())
    }

    fn object_path(&self, digest: &str, extension: &str) -> PathBuf {
        self.root
            .join("objects")
            .join(&digest[..2])
            .join(format!("{digest}.{extension}"))
    }

    /// Local location of a cached file, if present.
    pub fn get(&self, file: &ArtifactFile) -> Option<PathBuf> {
        let digest = fs::read_to_string(self.ref_path(file)).ok()?;
        let digest = digest.trim();
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let object = self.object_path(digest, &file.extension);
        object.is_file().then_some(object)
    }

    /// Store a file and return its local location.
    pub fn put(&self, file: &ArtifactFile, bytes: &[u8]) -> io::Result<PathBuf> {
        let digest = hex_digest(bytes);
        let object = self.object_path(&digest, &file.extension);
        if !object.is_file() {
            write_atomic(&object, bytes)?;
        }
        write_atomic(&self.ref_path(file), digest.as_bytes())?;
        Ok(object)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"))?;
    fs::create_dir_all(parent)?;

    let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::coordinate::ArtifactKey;
    use crate::resolve::version::Version;
    use tempfile::TempDir;

    fn jar(artifact: &str, version: &str) -> ArtifactFile {
        ArtifactFile {
            key: ArtifactKey::new("org.example", artifact),
            version: Version::new(version),
            classifier: None,
            extension: "jar".into(),
        }
    }

    #[test]
    fn test_put_then_get() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let cache = ArtifactCache::new(temp.path());
        let file = jar("lib", "1.0");

        assert!(cache.get(&file).is_none());
        let stored = cache.put(&file, b"PK\x03\x04 jar bytes").unwrap();
        assert_eq!(cache.get(&file), Some(stored.clone()));
        assert_eq!(fs::read(&stored).unwrap(), b"PK\x03\x04 jar bytes");
    }

    #[test]
    fn test_identical_content_shares_object() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let cache = ArtifactCache::new(temp.path());

        let a = cache.put(&jar("a", "1.0"), b"same").unwrap();
        let b = cache.put(&jar("b", "2.0"), b"same").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_corrupt_ref_is_a_miss() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let cache = ArtifactCache::new(temp.path());
        let file = jar("lib", "1.0");
        cache.put(&file, b"bytes").unwrap();

        fs::write(cache.ref_path(&file), "not-a-digest").unwrap();
        assert!(cache.get(&file).is_none());
    }

    #[test]
    fn test_hex_digest() {
        assert_eq!(
            hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
