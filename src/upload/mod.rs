//! Filing Uploads
//!
//! Sends corporate filings to the backend and tracks which document the
//! assistant is currently working from.
//!
//! ## Endpoints
//!
//! - `POST /upload_file` - Raw XBRL archive, converted server-side
//! - `POST /upload_json_file` - Pre-converted JSON document
//! - `POST /switch_mode` - Select the assistant mode (used for the preloaded sample)
//!
//! Every request carries the session id as `websocket_user_id` so the backend
//! can route results to the matching chat socket.

mod client;
mod error;
mod status;

pub use client::{UploadClient, UploadOutcome, UploadRequest, DEFAULT_DOWNLOAD_NAME};
pub use error::{UploadError, UploadResult};
pub use status::{AssistantMode, FileKind, UploadKind, UploadStatus};
