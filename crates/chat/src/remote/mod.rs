//! Remote message source
//!
//! This module provides:
//! - The [`RemoteSource`] capability the sync engine consumes
//! - An HTTP client for the JSON gateway
//! - Error classification for retry decisions
//! - Projection from wire shapes to the persisted models

mod client;
mod error;
pub mod fake;
mod normalize;

pub use client::HttpSource;
pub use error::{ErrorClass, RemoteError, RemoteErrorKind, classify};
pub use normalize::{PROJECTION_VERSION, project_message, project_thread};

use crate::models::{Location, ThreadId};
use api::{RemoteMessage, RemoteThread};

/// Access to a remote account's conversations.
///
/// The remote only offers "messages at or before a timestamp"; there is no
/// cursor and no way to ask for newer messages.
pub trait RemoteSource {
    /// List every thread in one account folder
    fn list_threads(&self, location: Location) -> Result<Vec<RemoteThread>, RemoteError>;

    /// Fetch up to `limit` messages stamped at or before `before` (epoch ms),
    /// newest first.
    fn fetch_messages_before(
        &self,
        thread_id: &ThreadId,
        before: i64,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, RemoteError>;
}

impl<S: RemoteSource + ?Sized> RemoteSource for &S {
    fn list_threads(&self, location: Location) -> Result<Vec<RemoteThread>, RemoteError> {
        (**self).list_threads(location)
    }

    fn fetch_messages_before(
        &self,
        thread_id: &ThreadId,
        before: i64,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        (**self).fetch_messages_before(thread_id, before, limit)
    }
}

/// Remote API response types
pub mod api {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    /// Kind of conversation
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ThreadKind {
        #[default]
        User,
        Group,
        Page,
        /// Buyer/seller conversations; the remote's message API rejects these
        Marketplace,
    }

    /// Thread as returned by the thread listing
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct RemoteThread {
        pub uid: String,
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default, rename = "type")]
        pub kind: ThreadKind,
        /// Epoch milliseconds, sent as a string
        pub last_message_timestamp: String,
        #[serde(default)]
        pub message_count: Option<usize>,
        #[serde(default)]
        pub participants: Vec<String>,
        #[serde(default)]
        pub nicknames: HashMap<String, String>,
        #[serde(default)]
        pub admins: Vec<String>,
        #[serde(default)]
        pub approval_requests: Vec<String>,
        #[serde(default)]
        pub color: Option<String>,
        #[serde(default)]
        pub emoji: Option<String>,
        #[serde(default)]
        pub plan: Option<serde_json::Value>,
        #[serde(default)]
        pub photo: Option<String>,
    }

    impl RemoteThread {
        pub fn new(
            uid: impl Into<String>,
            name: Option<&str>,
            last_message_timestamp: i64,
            message_count: usize,
        ) -> Self {
            Self {
                uid: uid.into(),
                name: name.map(str::to_string),
                last_message_timestamp: last_message_timestamp.to_string(),
                message_count: Some(message_count),
                ..Default::default()
            }
        }
    }

    /// A user mentioned in a message
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Mention {
        pub thread_id: String,
        pub offset: usize,
        pub length: usize,
    }

    /// Message as returned by a page fetch
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct RemoteMessage {
        pub uid: String,
        pub author: String,
        /// Epoch milliseconds, sent as a string
        pub timestamp: String,
        #[serde(default)]
        pub text: Option<String>,
        #[serde(default)]
        pub mentions: Vec<Mention>,
        #[serde(default)]
        pub read_by: Vec<String>,
        #[serde(default)]
        pub attachments: Vec<serde_json::Value>,
        #[serde(default)]
        pub quick_replies: Vec<serde_json::Value>,
        #[serde(default)]
        pub reactions: HashMap<String, String>,
        #[serde(default)]
        pub sticker: Option<serde_json::Value>,
        #[serde(default)]
        pub emoji_size: Option<String>,
        #[serde(default)]
        pub reply_to_id: Option<String>,
        #[serde(default)]
        pub replied_to: Option<Box<RemoteMessage>>,
        #[serde(default)]
        pub is_read: Option<bool>,
        #[serde(default)]
        pub unsent: bool,
    }

    impl RemoteMessage {
        pub fn new(
            uid: impl Into<String>,
            author: impl Into<String>,
            timestamp: i64,
            text: Option<&str>,
        ) -> Self {
            Self {
                uid: uid.into(),
                author: author.into(),
                timestamp: timestamp.to_string(),
                text: text.map(str::to_string),
                ..Default::default()
            }
        }
    }

    /// Error payload
    #[derive(Debug, Deserialize)]
    pub struct ApiError {
        pub message: String,
    }

    /// Response from listing threads
    #[derive(Debug, Deserialize)]
    pub struct ListThreadsResponse {
        #[serde(default)]
        pub threads: Option<Vec<RemoteThread>>,
        #[serde(default)]
        pub error: Option<ApiError>,
    }

    /// Response from fetching one page of messages
    #[derive(Debug, Deserialize)]
    pub struct MessagePageResponse {
        #[serde(default)]
        pub messages: Option<Vec<RemoteMessage>>,
        #[serde(default)]
        pub error: Option<ApiError>,
    }
}
