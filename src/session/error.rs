//! Session error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the session identity layer
#[derive(Error, Debug)]
pub enum SessionError {
    /// Identifier was empty or whitespace
    #[error("Session id must not be empty")]
    EmptyId,

    /// Store file could not be read or written
    #[error("Failed to access session store {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    /// Store file exists but is not a JSON object of strings
    #[error("Failed to parse session store {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
