//! Chat Transcript
//!
//! Append-only message list. The only in-place mutation is growing the
//! trailing assistant message while a reply is streamed.

use serde::{Deserialize, Serialize};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// False while a streamed reply is still arriving
    pub complete: bool,
    /// Creation time in milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), true)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), true)
    }

    fn new(role: Role, content: String, complete: bool) -> Self {
        Self {
            role,
            content,
            complete,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Ordered chat history; insertion order is display order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locally-sent user message, closing any stream in progress
    pub fn push_user(&mut self, content: &str) {
        self.finish_stream();
        self.messages.push(ChatMessage::user(content));
    }

    /// Append a complete assistant reply, closing any stream in progress
    pub fn push_assistant(&mut self, content: &str) {
        self.finish_stream();
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Grow the streaming assistant reply, starting one if needed
    pub fn append_chunk(&mut self, token: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant && !last.complete => {
                last.content.push_str(token);
            }
            _ => self
                .messages
                .push(ChatMessage::new(Role::Assistant, token.to_string(), false)),
        }
    }

    /// Mark the streaming reply complete; returns false if none was open
    pub fn finish_stream(&mut self) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant && !last.complete => {
                last.complete = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.messages
            .last()
            .map(|m| m.role == Role::Assistant && !m.complete)
            .unwrap_or(false)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_messages_preserve_order() {
        let mut transcript = Transcript::new();
        for i in 0..5 {
            transcript.push_assistant(&format!("reply {}", i));
            assert_eq!(transcript.len(), i + 1);
        }

        let contents: Vec<_> = transcript.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["reply 0", "reply 1", "reply 2", "reply 3", "reply 4"]);
        assert!(transcript.messages().iter().all(|m| m.complete));
    }

    #[test]
    fn test_chunks_accumulate_until_stream_end() {
        let mut transcript = Transcript::new();
        transcript.push_user("question");

        transcript.append_chunk("The ");
        transcript.append_chunk("answer");
        assert_eq!(transcript.len(), 2);
        assert!(transcript.is_streaming());
        assert_eq!(transcript.last().unwrap().content, "The answer");

        assert!(transcript.finish_stream());
        assert!(!transcript.is_streaming());
        assert!(transcript.last().unwrap().complete);

        // A new chunk after completion starts a new message
        transcript.append_chunk("Next");
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn test_finish_without_stream() {
        let mut transcript = Transcript::new();
        assert!(!transcript.finish_stream());
        transcript.push_user("hi");
        assert!(!transcript.finish_stream());
    }

    #[test]
    fn test_full_message_closes_stream() {
        let mut transcript = Transcript::new();
        transcript.append_chunk("partial");
        transcript.push_assistant("full");

        assert_eq!(transcript.len(), 2);
        assert!(transcript.messages()[0].complete);
        assert_eq!(transcript.messages()[1].content, "full");
    }

    #[test]
    fn test_chunk_after_user_message_starts_new_reply() {
        let mut transcript = Transcript::new();
        transcript.append_chunk("a");
        transcript.push_user("interrupt");
        transcript.append_chunk("b");

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[2].content, "b");
    }

    #[test]
    fn test_user_message_closes_open_stream() {
        let mut transcript = Transcript::new();
        transcript.append_chunk("partial");
        transcript.push_user("again?");
        transcript.push_assistant("answer");

        assert!(transcript.messages().iter().all(|m| m.complete));
        assert_eq!(transcript.messages()[0].content, "partial");
        assert!(!transcript.is_streaming());
    }
}
