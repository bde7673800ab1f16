//! Session Identity Provider

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::error::{SessionError, SessionResult};
use super::store::{MemoryStore, SessionStore};

/// Store key holding the active session id
pub const SESSION_KEY: &str = "userId";

/// Opaque, non-empty session correlation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier, rejecting empty strings
    pub fn new(id: impl Into<String>) -> SessionResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Fresh random identifier (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Produces and remembers the session id for one client session
///
/// The first call to [`session_id`](Self::session_id) looks in memory, then in
/// the store, and only then generates a new id. Store writes are best-effort.
pub struct SessionIdentity {
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<SessionId>>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Identity whose id lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Get the active id, creating one on first use
    pub fn session_id(&self) -> SessionId {
        if let Some(id) = self.peek() {
            return id;
        }

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have won the race while we waited for the lock
        if let Some(id) = current.as_ref() {
            return id.clone();
        }

        let id = match self.store.get(SESSION_KEY).map(SessionId::new) {
            Some(Ok(stored)) => {
                tracing::debug!(session_id = %stored, "Restored session id from store");
                stored
            }
            _ => {
                let generated = SessionId::generate();
                tracing::info!(session_id = %generated, "Generated new session id");
                self.persist(&generated);
                generated
            }
        };

        *current = Some(id.clone());
        id
    }

    /// Get the active id without generating one
    pub fn peek(&self) -> Option<SessionId> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the active id with one assigned by the server
    pub fn adopt(&self, id: SessionId) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if current.as_ref() == Some(&id) {
            return;
        }

        tracing::info!(
            previous = ?current.as_ref().map(SessionId::as_str),
            session_id = %id,
            "Adopted session id"
        );
        self.persist(&id);
        *current = Some(id);
    }

    /// Underlying store, shared with other client state
    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    fn persist(&self, id: &SessionId) {
        if let Err(e) = self.store.set(SESSION_KEY, id.as_str()) {
            tracing::warn!(error = %e, "Failed to persist session id");
        }
    }
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("current", &self.peek())
            .finish_non_exhaustive()
    }
}
