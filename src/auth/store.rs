//! Persisted credential slot
//!
//! The session lives under two fixed keys: the raw token and the user
//! snapshot returned at login. There is exactly one slot per process.

use super::types::UserProfile;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key holding the raw token
pub const TOKEN_KEY: &str = "token";
/// Key holding the user snapshot
pub const USER_KEY: &str = "user";

/// Credential store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Stored session is unreadable: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the slot holds data that will never decode
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt(_))
    }
}

/// What is kept between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Trait for the process-wide credential slot
///
/// Reads are synchronous: the initial check gates rendering and must not
/// suspend.
pub trait CredentialStore: Send + Sync {
    /// Read the stored session, if any
    ///
    /// Undecodable data is reported as `StoreError::Corrupt` so the caller
    /// can clear it.
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Replace the stored session
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Remove the stored session
    fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory slot, lost on exit
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: RwLock<Option<StoredSession>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(StoredSession {
                token: token.into(),
                user: None,
            })),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.slot.read().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *self.slot.write() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot.write() = None;
        Ok(())
    }
}

/// JSON file slot
///
/// The file holds a single object with the `token` and `user` keys.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a file store; parent directories are created on first save
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        decode_slot(&content).map(Some)
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Write atomically by writing to temp file first
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode a persisted slot
///
/// The token is required. A user snapshot that no longer decodes is dropped
/// with a warning; the token alone still carries the session.
fn decode_slot(content: &str) -> Result<StoredSession, StoreError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    let token = value
        .get(TOKEN_KEY)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StoreError::Corrupt(format!("missing `{}`", TOKEN_KEY)))?
        .to_string();

    let user = match value.get(USER_KEY) {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => match serde_json::from_value::<UserProfile>(raw.clone()) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unreadable user snapshot");
                None
            }
        },
    };

    Ok(StoredSession { token, user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use tempfile::tempdir;

    fn session() -> StoredSession {
        StoredSession {
            token: "h.p.s".to_string(),
            user: Some(UserProfile {
                id: "7".to_string(),
                email: "lan@example.com".to_string(),
                full_name: Some("Lan".to_string()),
                role: Role::Contributor,
                avatar: None,
            }),
        }
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = FileCredentialStore::new(&path);

        assert!(store.load().unwrap().is_none());
        store.save(&session()).unwrap();

        // A fresh instance sees the same slot
        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(session()));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get(TOKEN_KEY).is_some());
        assert!(raw.get(USER_KEY).is_some());

        reopened.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileCredentialStore::new(&path);

        for content in ["{not json", "", "{\"user\":null}", "{\"token\":\"  \"}"] {
            std::fs::write(&path, content).unwrap();
            let err = store.load().unwrap_err();
            assert!(err.is_corrupt(), "{content:?} gave {err:?}");
        }
    }

    #[test]
    fn test_bad_user_snapshot_keeps_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"token":"h.p.s","user":{"id":true}}"#).unwrap();

        let loaded = FileCredentialStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.token, "h.p.s");
        assert!(loaded.user.is_none());
    }
}
