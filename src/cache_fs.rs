//! Filesystem [`BlobStore`]: one `{source_id}.{hash}.json` file per entry.

use std::path::{Path, PathBuf};

use notegraph_core::cache::{BlobStore, CacheKey, CACHE_EXTENSION};
use notegraph_core::error::{Error, Result};

/// Cache entries stored as files in one directory.
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| Error::CacheIo {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.entry_name())
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::CacheIo { path, source }),
        }
    }

    /// Written to a temporary file first and renamed into place, so a crash
    /// never leaves a truncated entry under the final name.
    fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", key.entry_name()));
        std::fs::write(&tmp, bytes)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| Error::CacheIo { path, source })
    }

    fn remove_stale(&self, key: &CacheKey) -> Result<usize> {
        let prefix = key.source_prefix();
        let keep = key.entry_name();
        let suffix = format!(".{}", CACHE_EXTENSION);

        let entries = std::fs::read_dir(&self.dir).map_err(|source| Error::CacheIo {
            path: self.dir.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == keep || !name.starts_with(&prefix) || !name.ends_with(&suffix) {
                continue;
            }
            // `note_a.` must not match `note_a.b.<hash>.json` of another
            // source: the remainder has to be a bare hash.
            let hash = &name[prefix.len()..name.len() - suffix.len()];
            if hash.is_empty() || hash.contains('.') {
                continue;
            }
            let path = entry.path();
            std::fs::remove_file(&path).map_err(|source| Error::CacheIo { path, source })?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("storage")).unwrap();
        let key = CacheKey::new("note_a", "abc");

        assert_eq!(store.read(&key).unwrap(), None);
        store.write(&key, b"{}").unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(b"{}".to_vec()));
        assert!(store.dir().join("note_a.abc.json").exists());
    }

    #[test]
    fn remove_stale_only_touches_same_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path()).unwrap();

        store.write(&CacheKey::new("note_a", "old1"), b"1").unwrap();
        store.write(&CacheKey::new("note_a", "old2"), b"2").unwrap();
        store.write(&CacheKey::new("note_a", "new"), b"3").unwrap();
        store.write(&CacheKey::new("note_ab", "x"), b"4").unwrap();
        std::fs::write(tmp.path().join("unrelated.txt"), "keep").unwrap();

        let removed = store.remove_stale(&CacheKey::new("note_a", "new")).unwrap();
        assert_eq!(removed, 2);
        assert!(tmp.path().join("note_a.new.json").exists());
        assert!(tmp.path().join("note_ab.x.json").exists());
        assert!(tmp.path().join("unrelated.txt").exists());
        assert!(!tmp.path().join("note_a.old1.json").exists());
    }
}
