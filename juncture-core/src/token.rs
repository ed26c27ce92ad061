//! Persistence for the provider grant token.
//!
//! A single opaque string, surviving process restart, cleared only on
//! logout. Writes are atomic (temp file + rename).

use std::path::{Path, PathBuf};

use crate::error::JunctureResult;

const GRANT_FILE: &str = "nylas_grant";

/// Stores the opaque grant token under a fixed file name in the given
/// directory.
#[derive(Debug, Clone)]
pub struct GrantStore {
    dir: PathBuf,
}

impl GrantStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        GrantStore { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(GRANT_FILE)
    }

    pub fn load(&self) -> JunctureResult<Option<String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let token = std::fs::read_to_string(&path)?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub fn save(&self, token: &str) -> JunctureResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let temp = self.dir.join(format!("{GRANT_FILE}.tmp"));
        std::fs::write(&temp, token)?;
        std::fs::rename(&temp, self.path())?;
        Ok(())
    }

    pub fn clear(&self) -> JunctureResult<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = GrantStore::new(dir.path());

        assert_eq!(store.load().unwrap(), None);

        store.save("grant-abc123").unwrap();
        assert_eq!(store.load().unwrap(), Some("grant-abc123".to_string()));

        store.save("grant-replaced").unwrap();
        assert_eq!(store.load().unwrap(), Some("grant-replaced".to_string()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing again must not error.
        store.clear().unwrap();
    }
}
