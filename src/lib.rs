//! # Disclosure Explorer
//!
//! Client for exploring corporate sustainability (ESRS) disclosures: upload an
//! XBRL filing, get it back as JSON, and ask an assistant about it.
//!
//! ## Features
//!
//! - **Session identity**: One id per client, persisted and shared by every component
//! - **Uploads**: XBRL packages, xBRL-JSON documents, or the preloaded sample
//! - **Chat**: WebSocket session with streamed replies and automatic reconnect
//! - **Views**: A store for the active panel that any number of views can watch
//!
//! ## Modules
//!
//! - [`session`]: Session ids and the client store
//! - [`upload`]: REST uploads and assistant mode switches
//! - [`chat`]: Wire protocol, transcript, and the chat session driver
//! - [`render`]: Transcript rendering
//! - [`view`]: Active tab store
//! - [`devserver`]: Development backend speaking the same contract
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use disclosure_explorer::chat::{ChatSession, ChatSessionConfig};
//! use disclosure_explorer::config::Config;
//! use disclosure_explorer::session::SessionIdentity;
//! use disclosure_explorer::upload::{UploadClient, UploadRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let identity = Arc::new(SessionIdentity::new(config.session.open_store()?));
//!
//!     // Convert a filing
//!     let uploads = UploadClient::from_config(&config.backend, Arc::clone(&identity))?;
//!     let request = UploadRequest::Xbrl {
//!         file_name: "report.zip".to_string(),
//!         bytes: std::fs::read("report.zip")?,
//!     };
//!     let outcome = uploads.submit(request).await?;
//!     outcome.write_json(outcome.download_name()).await?;
//!
//!     // Ask about it
//!     let chat = ChatSession::spawn(ChatSessionConfig::from_config(&config), identity);
//!     chat.subscribe().wait_for(|s| s.is_open()).await?;
//!     chat.send("Summarise the E1 climate disclosures");
//!
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod devserver;
pub mod render;
pub mod session;
pub mod upload;
pub mod view;

#[cfg(test)]
mod test_support;

// Re-export top-level types for convenience
pub use session::{FileStore, MemoryStore, SessionError, SessionId, SessionIdentity, SessionStore};

pub use upload::{
    AssistantMode, FileKind, UploadClient, UploadError, UploadKind, UploadOutcome, UploadRequest,
    UploadStatus,
};

pub use chat::{
    ChatMessage, ChatNotice, ChatSession, ChatSessionConfig, ChatSnapshot, ConnectionState,
    ReconnectPolicy, Role, Transcript,
};

pub use view::{Tab, TabError, ViewListener, ViewStore};

pub use config::{Config, ConfigError, LoggingConfig};
