//! Chat Session State Machine
//!
//! Pure, synchronous core of the chat session. The async driver feeds it
//! socket events and carries out the effects it returns, which keeps every
//! transition testable without a network.
//!
//! ```text
//! Connecting ──open──▶ Open ──close/error──▶ Closed ──timer──▶ Connecting
//!      └────────────handshake failure─────────────▲
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::protocol::{ClientFrame, ProtocolError, ServerFrame};
use super::reconnect::ReconnectPolicy;
use super::transcript::{ChatMessage, Transcript};
use crate::session::SessionId;

/// Socket connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Transient, user-facing notification; never stored in the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatNotice {
    /// Message addressed to this session (e.g. upload progress)
    Personal(String),
    /// Server-reported failure
    ServerError(String),
}

impl fmt::Display for ChatNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatNotice::Personal(message) => write!(f, "{}", message),
            ChatNotice::ServerError(message) => write!(f, "Server error: {}", message),
        }
    }
}

/// What the driver must do after an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEffect {
    /// Transcript changed; publish a new snapshot
    TranscriptUpdated,
    /// Surface a notification
    Notify(ChatNotice),
    /// Adopt a server-assigned session id
    AdoptSession(SessionId),
    /// Frame was dropped
    Ignored,
}

/// Point-in-time view of the session for observers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub connection: ConnectionState,
    pub messages: Vec<ChatMessage>,
    /// Consecutive failed or dropped connections since the last successful open
    pub reconnect_attempt: u32,
    /// A reconnect timer is pending
    pub retry_scheduled: bool,
}

impl ChatSnapshot {
    pub fn is_open(&self) -> bool {
        self.connection == ConnectionState::Open
    }

    /// Closed with no retry coming; only a manual reconnect will help
    pub fn gave_up(&self) -> bool {
        self.connection == ConnectionState::Closed && !self.retry_scheduled
    }
}

/// Chat session core
#[derive(Debug)]
pub struct ChatState {
    connection: ConnectionState,
    transcript: Transcript,
    policy: ReconnectPolicy,
    attempt: u32,
    retry_scheduled: bool,
    shut_down: bool,
}

impl ChatState {
    /// New session, already in `Connecting`
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            connection: ConnectionState::Connecting,
            transcript: Transcript::new(),
            policy,
            attempt: 0,
            retry_scheduled: false,
            shut_down: false,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// A connection attempt is starting
    pub fn on_connecting(&mut self) {
        if self.shut_down {
            return;
        }
        self.connection = ConnectionState::Connecting;
        self.retry_scheduled = false;
    }

    /// Handshake succeeded
    pub fn on_open(&mut self) {
        if self.shut_down {
            return;
        }
        self.connection = ConnectionState::Open;
        self.attempt = 0;
        self.retry_scheduled = false;
    }

    /// Socket closed, errored, or failed to connect
    ///
    /// Returns the delay before the single reconnect attempt this closure
    /// schedules, or `None` when no retry should happen. A reply still
    /// streaming is closed as-is; the next connection never continues it.
    pub fn on_closed(&mut self) -> Option<Duration> {
        self.connection = ConnectionState::Closed;
        if self.transcript.finish_stream() {
            tracing::debug!("Closed reply interrupted by disconnect");
        }
        if self.shut_down {
            self.retry_scheduled = false;
            return None;
        }

        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.retry_scheduled = delay.is_some();
        delay
    }

    /// Apply one inbound text frame
    pub fn on_frame(&mut self, text: &str) -> FrameEffect {
        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::warn!(frame_type = %kind, "Dropping frame with unknown type");
                return FrameEffect::Ignored;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                return FrameEffect::Ignored;
            }
        };

        match frame {
            ServerFrame::Message { content } => {
                self.transcript.push_assistant(&content);
                FrameEffect::TranscriptUpdated
            }
            ServerFrame::Chunk { content } => {
                self.transcript.append_chunk(&content);
                FrameEffect::TranscriptUpdated
            }
            ServerFrame::StreamEnd => {
                if self.transcript.finish_stream() {
                    FrameEffect::TranscriptUpdated
                } else {
                    tracing::debug!("stream_end without an open stream");
                    FrameEffect::Ignored
                }
            }
            ServerFrame::UserId { user_id } => match SessionId::new(user_id) {
                Ok(id) => FrameEffect::AdoptSession(id),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring invalid user_id frame");
                    FrameEffect::Ignored
                }
            },
            ServerFrame::PersonalMessage { message } => {
                FrameEffect::Notify(ChatNotice::Personal(message))
            }
            ServerFrame::Error { error } => FrameEffect::Notify(ChatNotice::ServerError(error)),
        }
    }

    /// Prepare an outbound message
    ///
    /// No-op unless the socket is open and the content has non-whitespace
    /// characters. On success the user message is already in the transcript.
    pub fn prepare_send(&mut self, content: &str) -> Option<ClientFrame> {
        if self.connection != ConnectionState::Open || self.shut_down {
            tracing::debug!(state = %self.connection, "Send ignored: socket not open");
            return None;
        }
        if content.trim().is_empty() {
            return None;
        }

        self.transcript.push_user(content);
        Some(ClientFrame::message(content))
    }

    /// Terminal teardown; no further reconnects
    pub fn shutdown(&mut self) {
        self.transcript.finish_stream();
        self.shut_down = true;
        self.retry_scheduled = false;
        self.connection = ConnectionState::Closed;
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            connection: self.connection,
            messages: self.transcript.messages().to_vec(),
            reconnect_attempt: self.attempt,
            retry_scheduled: self.retry_scheduled,
        }
    }
}
