//! Remote response normalization
//!
//! Projects the remote's rich thread/message shapes onto the two narrow
//! persisted schemas. Participants, nicknames, colours, plans, mentions,
//! reactions, attachments, stickers and read receipts are dropped.

use anyhow::{Context, Result};

use super::api::{RemoteMessage, RemoteThread};
use crate::models::{Message, MessageId, Thread, ThreadId};

/// Version of the field selection below. Bump when a column is added or
/// removed so stores written by an older projection can be told apart.
pub const PROJECTION_VERSION: u32 = 1;

/// Project a listed thread onto the `threads` schema
pub fn project_thread(remote: &RemoteThread) -> Result<Thread> {
    let last_message_timestamp = parse_timestamp(&remote.last_message_timestamp)
        .with_context(|| format!("Thread {} has an invalid last_message_timestamp", remote.uid))?;

    Ok(Thread::new(
        ThreadId::new(&remote.uid),
        remote.name.clone(),
        last_message_timestamp,
        remote.message_count.unwrap_or(0),
    ))
}

/// Project a fetched message onto the `messages` schema, stamping the
/// thread it was fetched from.
pub fn project_message(thread_id: &ThreadId, remote: &RemoteMessage) -> Result<Message> {
    let timestamp = parse_timestamp(&remote.timestamp)
        .with_context(|| format!("Message {} has an invalid timestamp", remote.uid))?;

    Ok(Message::new(
        MessageId::new(&remote.uid),
        thread_id.clone(),
        timestamp,
        remote.text.clone(),
        remote.author.clone(),
    ))
}

/// Timestamps arrive as decimal strings; some payloads carry a fractional part
fn parse_timestamp(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    let ms: f64 = raw
        .parse()
        .with_context(|| format!("Not a timestamp: {:?}", raw))?;
    anyhow::ensure!(ms.is_finite(), "Not a timestamp: {:?}", raw);
    Ok(ms as i64)
}
