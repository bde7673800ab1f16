//! Upload error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while uploading a filing or switching modes
#[derive(Error, Debug)]
pub enum UploadError {
    /// Request was blocked locally before hitting the network
    #[error("Invalid upload: {0}")]
    Validation(String),

    /// Local file could not be read
    #[error("Failed to read {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    /// Network or protocol failure
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Backend answered 2xx with a body we could not interpret
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;
