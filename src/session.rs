//! Operator session storage.
//!
//! The dashboard keeps a small auth record for the signed-in operator. The
//! store is an explicit interface handed to whoever needs it, with an
//! in-memory implementation for tests and embedding, and a JSON file
//! implementation for tools that need the record to survive restarts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Persisted operator session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub email: String,
    pub is_authenticated: bool,
}

impl AuthRecord {
    /// Record for an operator that just signed in.
    pub fn signed_in(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            is_authenticated: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session file io error: {0}")]
    Io(#[from] io::Error),

    #[error("session record json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Get/set/clear access to the current [`AuthRecord`].
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Result<Option<AuthRecord>, SessionStoreError>;

    fn set(&self, record: &AuthRecord) -> Result<(), SessionStoreError>;

    fn clear(&self) -> Result<(), SessionStoreError>;

    /// True when a stored record exists and is marked authenticated.
    ///
    /// Unreadable stores count as signed out.
    fn is_authenticated(&self) -> bool {
        match self.get() {
            Ok(record) => record.is_some_and(|record| record.is_authenticated),
            Err(err) => {
                warn!(event = "session_store_read_failed", error = %err);
                false
            }
        }
    }
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    record: RwLock<Option<AuthRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<AuthRecord>, SessionStoreError> {
        Ok(self
            .record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, record: &AuthRecord) -> Result<(), SessionStoreError> {
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Session store backed by a single JSON file.
///
/// A missing file means no session. Writes replace the whole file.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<AuthRecord>, SessionStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn set(&self, record: &AuthRecord) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(record)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthRecord, FileSessionStore, MemorySessionStore, SessionStore};

    #[test]
    fn memory_store_set_get_clear() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get().expect("get"), None);
        assert!(!store.is_authenticated());

        store
            .set(&AuthRecord::signed_in("ops@example.com"))
            .expect("set");
        assert!(store.is_authenticated());
        assert_eq!(
            store.get().expect("get").map(|record| record.email),
            Some("ops@example.com".to_string())
        );

        store.clear().expect("clear");
        assert_eq!(store.get().expect("get"), None);
    }

    #[test]
    fn signed_out_record_is_not_authenticated() {
        let store = MemorySessionStore::new();
        store
            .set(&AuthRecord {
                email: "ops@example.com".to_string(),
                is_authenticated: false,
            })
            .expect("set");
        assert!(!store.is_authenticated());
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path().join("nested").join("auth.json"));

        assert_eq!(store.get().expect("missing file reads as none"), None);
        store
            .set(&AuthRecord::signed_in("ops@example.com"))
            .expect("set");

        let raw = std::fs::read_to_string(store.path()).expect("read file");
        assert!(raw.contains("\"isAuthenticated\":true"));

        let reopened = FileSessionStore::new(store.path());
        assert!(reopened.is_authenticated());

        reopened.clear().expect("clear");
        reopened.clear().expect("clear twice");
        assert_eq!(store.get().expect("get"), None);
    }

    #[test]
    fn corrupt_file_reports_error_and_reads_signed_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "{not json").expect("write");

        let store = FileSessionStore::new(&path);
        assert!(store.get().is_err());
        assert!(!store.is_authenticated());
    }
}
