//! Client Key-Value Stores
//!
//! Best-effort persistence for small pieces of client state (the session id,
//! the tab to restore after a restart). The server stays authoritative.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::error::{SessionError, SessionResult};

/// String key-value store shared by the identity provider and the view store
pub trait SessionStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> SessionResult<()>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> SessionResult<()>;
}

/// Store that lives for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> SessionResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SessionResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk
///
/// The whole file is loaded on open and rewritten on every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`
    ///
    /// A file that is not a JSON object of strings is moved aside to
    /// `<name>.corrupt` and the store starts empty. Only I/O failures are errors.
    pub fn open(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(SessionError::Parse { error, .. }) => {
                let aside = Self::corrupt_path(&path);
                tracing::warn!(
                    path = ?path,
                    moved_to = ?aside,
                    error = %error,
                    "Session store is unreadable, starting empty"
                );
                std::fs::rename(&path, &aside).map_err(|e| SessionError::Io {
                    path: path.clone(),
                    error: e.to_string(),
                })?;
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(path = ?path, keys = entries.len(), "Opened session store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn load(path: &Path) -> SessionResult<HashMap<String, String>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| SessionError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&content).map_err(|e| SessionError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Where an unreadable store file is moved: `session.json` -> `session.json.corrupt`
    fn corrupt_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".corrupt");
        path.with_file_name(name)
    }

    /// Default location under the platform's local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|p| p.join("disclosure-explorer").join("session.json"))
            .unwrap_or_else(|| PathBuf::from("./disclosure_session.json"))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> SessionResult<()> {
        let io_err = |e: std::io::Error| SessionError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(entries).map_err(|e| SessionError::Parse {
            path: self.path.clone(),
            error: e.to_string(),
        })?;

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        Ok(())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> SessionResult<()> {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> SessionResult<()> {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
