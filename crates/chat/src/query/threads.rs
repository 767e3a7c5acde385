//! Thread query functions

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, Thread, ThreadId};
use crate::storage::ChatStore;

/// Summary information for one stored conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread ID
    pub id: ThreadId,
    /// Thread name, or its ID for untitled group conversations
    pub display_name: String,
    /// Number of messages in the export
    pub stored_messages: usize,
    /// Number of messages the remote reported at the last sync
    pub remote_messages: usize,
    /// Timestamp of the most recent message
    pub last_message_at: DateTime<Utc>,
}

/// A stored message with its sender resolved for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    /// When the message was sent, in UTC
    pub sent_at: DateTime<Utc>,
    /// Message text; empty or absent for stickers and attachments
    pub text: Option<String>,
    /// Sender ID as stored
    pub author_id: String,
    /// Sender name when known, otherwise the sender ID
    pub author_name: String,
}

/// Convert an epoch-milliseconds timestamp to UTC
pub fn timestamp_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// List stored threads, sorted by display name
pub fn list_threads(store: &dyn ChatStore) -> Result<Vec<ThreadSummary>> {
    let mut summaries = store
        .list_threads()?
        .into_iter()
        .map(|thread| {
            Ok(ThreadSummary {
                stored_messages: store.count_messages_in_thread(&thread.id)?,
                remote_messages: thread.message_count,
                display_name: thread.display_name().to_string(),
                last_message_at: timestamp_to_datetime(thread.last_message_timestamp),
                id: thread.id,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    summaries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    Ok(summaries)
}

/// List a thread's messages in chronological order.
///
/// Sender names are resolved best-effort: the remote does not name every
/// sender, but a direct conversation is keyed by the other person's ID, so
/// a thread whose ID matches the sender carries their name.
pub fn thread_messages(store: &dyn ChatStore, thread_id: &ThreadId) -> Result<Vec<MessageView>> {
    let names: HashMap<String, String> = store
        .list_threads()?
        .into_iter()
        .filter_map(|Thread { id, name, .. }| name.map(|name| (id.0, name)))
        .collect();

    let messages = store.list_messages_for_thread(thread_id)?;
    Ok(messages
        .into_iter()
        .map(|message| MessageView {
            author_name: names
                .get(&message.author)
                .cloned()
                .unwrap_or_else(|| message.author.clone()),
            author_id: message.author,
            sent_at: timestamp_to_datetime(message.timestamp),
            text: message.text,
            id: message.id,
        })
        .collect())
}
