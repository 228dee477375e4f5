use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key under which the session token is persisted.
pub const TOKEN_KEY: &str = "adminToken";

/// Capability answering whether a session token is currently stored.
pub trait SessionProvider: Send + Sync {
    /// Current token, or `None` when no session exists.
    fn token(&self) -> Option<String>;
}

impl<P: SessionProvider + ?Sized> SessionProvider for Arc<P> {
    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(rename = "adminToken", default)]
    admin_token: Option<String>,
}

/// Session token persisted as JSON on disk, re-read on every query.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read session {}", self.path.display()))?;
        let file: SessionFile = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse session {}", self.path.display()))?;
        Ok(normalize(file.admin_token))
    }
}

impl SessionProvider for FileSessionStore {
    fn token(&self) -> Option<String> {
        match self.read() {
            Ok(token) => token,
            Err(err) => {
                warn!("Ignoring unreadable session file: {err:#}");
                None
            }
        }
    }
}

/// In-memory token holder.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    token: Arc<RwLock<Option<String>>>,
}

impl MemorySessionStore {
    /// Store starting with the given token.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        store.set(Some(token.into()));
        store
    }

    /// Replace the held token.
    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

impl SessionProvider for MemorySessionStore {
    fn token(&self) -> Option<String> {
        normalize(self.token.read().clone())
    }
}

fn normalize(token: Option<String>) -> Option<String> {
    token.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_token_from_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"adminToken": "abc123"}"#)?;
        let store = FileSessionStore::new(&path);
        assert_eq!(store.token().as_deref(), Some("abc123"));

        fs::write(&path, r#"{"adminToken": "rotated"}"#)?;
        assert_eq!(store.token().as_deref(), Some("rotated"));
        Ok(())
    }

    #[test]
    fn absent_or_blank_tokens_mean_no_session() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);
        assert_eq!(store.token(), None);

        fs::write(&path, r#"{}"#)?;
        assert_eq!(store.token(), None);
        fs::write(&path, r#"{"adminToken": null}"#)?;
        assert_eq!(store.token(), None);
        fs::write(&path, r#"{"adminToken": "   "}"#)?;
        assert_eq!(store.token(), None);
        Ok(())
    }

    #[test]
    fn malformed_file_is_treated_as_absent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        fs::write(&path, "not json")?;
        assert_eq!(FileSessionStore::new(&path).token(), None);
        Ok(())
    }

    #[test]
    fn memory_store_tracks_updates() {
        let store = MemorySessionStore::default();
        assert_eq!(store.token(), None);
        store.set(Some("t".to_string()));
        assert_eq!(store.token().as_deref(), Some("t"));
        store.set(Some(String::new()));
        assert_eq!(store.token(), None);
    }
}
