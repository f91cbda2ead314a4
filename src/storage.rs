// Persistence of the opaque session blob (the serialized cookie jar)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub trait SessionStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;
    fn save(&self, blob: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(blob) => {
                tracing::info!(path = %self.path.display(), "Cookie file found");
                Ok(Some(blob))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, blob: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename so a crash never leaves a truncated jar behind
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), bytes = blob.len(), "Saved session cookies");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("cookies.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_returns_same_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested/cookies.json"));
        store.save(b"[1,2,3]").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(&b"[1,2,3]"[..]));

        store.save(b"[]").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(&b"[]"[..]));
    }
}
