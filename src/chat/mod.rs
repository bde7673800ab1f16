//! Chat Sessions
//!
//! Real-time chat with the disclosure assistant over a single WebSocket.
//!
//! ## Architecture
//!
//! - **Protocol**: Tagged JSON envelopes exchanged with the backend
//! - **Transcript**: Ordered messages, with in-place growth of streamed replies
//! - **State**: Synchronous connection state machine
//! - **Reconnect**: Policies for retrying dropped connections
//! - **Session**: Async driver owning the socket
//!
//! ## Wire contract
//!
//! The client connects to `{ws_base}/ws/{session_id}` and sends
//! `{"type": "message", "content": "..."}`. The server replies with `message`,
//! `chunk` / `stream_end`, `user_id`, `personal_message`, or `error` frames.
//!
//! ## Example
//!
//! ```rust,no_run
//! use disclosure_explorer::chat::{ChatSession, ChatSessionConfig, ReconnectPolicy};
//! use disclosure_explorer::session::SessionIdentity;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let identity = Arc::new(SessionIdentity::in_memory());
//! let config = ChatSessionConfig::new("ws://localhost:8000", ReconnectPolicy::default());
//! let chat = ChatSession::spawn(config, identity);
//!
//! let mut updates = chat.subscribe();
//! updates.wait_for(|s| s.is_open()).await.ok();
//! chat.send("Which ESRS datapoints does this filing report?");
//! # }
//! ```

mod protocol;
mod reconnect;
mod session;
mod state;
mod transcript;

pub use protocol::{ClientFrame, ProtocolError, ServerFrame};
pub use reconnect::ReconnectPolicy;
pub use session::{ChatSession, ChatSessionConfig};
pub use state::{ChatNotice, ChatSnapshot, ChatState, ConnectionState, FrameEffect};
pub use transcript::{ChatMessage, Role, Transcript};
