//! Thread model representing a single conversation

use serde::{Deserialize, Serialize};

/// Unique identifier for a thread (remote thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation, direct or group, as last reported by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Remote thread ID
    pub id: ThreadId,
    /// Display name; absent for group conversations without a title
    #[serde(default)]
    pub name: Option<String>,
    /// Timestamp of the newest message (epoch milliseconds)
    pub last_message_timestamp: i64,
    /// Total number of messages according to the remote
    pub message_count: usize,
}

impl Thread {
    pub fn new(
        id: ThreadId,
        name: Option<String>,
        last_message_timestamp: i64,
        message_count: usize,
    ) -> Self {
        Self {
            id,
            name,
            last_message_timestamp,
            message_count,
        }
    }

    /// Name for logs and reports, falling back to the thread ID
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Account folder a thread can be listed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    Inbox,
    /// Conversations the account has left or archived
    Archived,
    /// Hidden or filtered conversations
    Other,
    Pending,
}

impl Location {
    /// Wire name used by the remote API
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Inbox => "INBOX",
            Location::Archived => "ARCHIVED",
            Location::Other => "OTHER",
            Location::Pending => "PENDING",
        }
    }

    /// Locations synced when nothing else is configured
    pub fn defaults() -> Vec<Location> {
        vec![Location::Archived, Location::Inbox, Location::Other]
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_id() {
        let named = Thread::new(ThreadId::new("100"), Some("Alice".to_string()), 0, 0);
        assert_eq!(named.display_name(), "Alice");

        let group = Thread::new(ThreadId::new("200"), None, 0, 0);
        assert_eq!(group.display_name(), "200");
    }

    #[test]
    fn test_location_serde_uses_wire_names() {
        let json = serde_json::to_string(&Location::Archived).unwrap();
        assert_eq!(json, "\"ARCHIVED\"");

        let parsed: Vec<Location> = serde_json::from_str(r#"["INBOX", "OTHER"]"#).unwrap();
        assert_eq!(parsed, vec![Location::Inbox, Location::Other]);
    }
}
