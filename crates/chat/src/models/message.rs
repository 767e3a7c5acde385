//! Message model representing a single chat message

use super::ThreadId;
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (remote message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single message within a thread, in its persisted shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Remote message ID
    pub id: MessageId,
    /// ID of the thread this message belongs to
    pub thread_id: ThreadId,
    /// When the message was sent (epoch milliseconds)
    pub timestamp: i64,
    /// Message text; may be absent or empty for stickers and attachments
    pub text: Option<String>,
    /// Sender ID
    pub author: String,
}

impl Message {
    pub fn new(
        id: MessageId,
        thread_id: ThreadId,
        timestamp: i64,
        text: Option<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id,
            thread_id,
            timestamp,
            text,
            author: author.into(),
        }
    }
}
