//! Persisted session fields.
//!
//! Only the last topic and the credential survive between runs. Session
//! progress is never persisted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PracticeError, Result};

/// Fields remembered between sessions.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    /// Topic of the most recent session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_topic: Option<String>,
    /// Learner credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("last_topic", &self.last_topic)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of the remembered topic and credential.
pub trait SessionStore: Send + Sync {
    /// Loads the stored fields. A missing store yields empty fields.
    fn load(&self) -> Result<StoredSession>;
}

/// Session store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the fields, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the file cannot be written.
    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "session fields saved");
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<StoredSession> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredSession::default());
            }
            Err(e) => return Err(PracticeError::Io(e)),
        };

        serde_json::from_str(&contents)
            .map_err(|e| PracticeError::state_corrupted(&self.path, e.to_string()))
    }
}

/// In-memory session store.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    session: StoredSession,
}

impl MemorySessionStore {
    /// Creates a store holding the given fields.
    #[must_use]
    pub const fn new(session: StoredSession) -> Self {
        Self { session }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<StoredSession> {
        Ok(self.session.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let store = FileSessionStore::new("/nonexistent/practice/session.json");
        assert_eq!(store.load().unwrap(), StoredSession::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join("test_practice_store_roundtrip");
        let store = FileSessionStore::new(dir.join("nested").join("session.json"));
        let session = StoredSession {
            last_topic: Some("Dutch nouns".to_string()),
            api_key: Some("key".to_string()),
        };

        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), session);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("lastTopic"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let path = std::env::temp_dir().join("test_practice_store_corrupt.json");
        std::fs::write(&path, "{ broken").unwrap();

        let err = FileSessionStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PracticeError::StateFileCorrupted { .. }));
        assert!(err.is_fatal());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let session = StoredSession {
            last_topic: None,
            api_key: Some("sk-secret".to_string()),
        };
        assert!(!format!("{session:?}").contains("sk-secret"));
    }
}
