//! Session Identity
//!
//! Per-session correlation identifier shared by uploads and the chat socket.
//!
//! ## Architecture
//!
//! - **SessionStore**: Key-value client store (in memory or a JSON file)
//! - **SessionIdentity**: Produces, adopts, and persists the active [`SessionId`]
//!
//! The identity is created once and handed to every consumer as an
//! `Arc<SessionIdentity>`; nothing reads the store keys directly.

mod error;
mod identity;
mod store;

pub use error::{SessionError, SessionResult};
pub use identity::{SessionId, SessionIdentity, SESSION_KEY};
pub use store::{FileStore, MemoryStore, SessionStore};
