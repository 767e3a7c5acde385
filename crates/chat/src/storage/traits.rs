//! Storage trait definitions

use crate::models::{Message, MessageId, Thread, ThreadId};
use anyhow::Result;

/// Stored thread's message count disagrees with the remote's total
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Expected {expected} messages in thread {thread_name} ({thread_id}), got {actual}")]
pub struct ConsistencyError {
    pub thread_id: ThreadId,
    pub thread_name: String,
    pub expected: usize,
    pub actual: usize,
}

/// Timestamps of the oldest and newest stored message of a thread.
///
/// Everything between the two bounds is assumed to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageRange {
    pub oldest: i64,
    pub newest: i64,
}

impl CoverageRange {
    pub fn new(oldest: i64, newest: i64) -> Self {
        Self { oldest, newest }
    }

    /// Build from a MIN/MAX query result; both bounds must be present or absent together
    pub fn from_bounds(min: Option<i64>, max: Option<i64>) -> Result<Option<Self>> {
        match (min, max) {
            (Some(oldest), Some(newest)) => Ok(Some(Self::new(oldest, newest))),
            (None, None) => Ok(None),
            (min, max) => anyhow::bail!("Inconsistent coverage bounds: min={:?} max={:?}", min, max),
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.oldest <= timestamp && timestamp <= self.newest
    }
}

/// Trait for chat storage operations
///
/// Every write is an upsert keyed by ID, so any write can be repeated
/// after an interruption without creating duplicates.
pub trait ChatStore: Send + Sync {
    /// Insert or update a thread
    fn upsert_thread(&self, thread: &Thread) -> Result<()>;

    /// Insert or update a message
    fn upsert_message(&self, message: &Message) -> Result<()>;

    /// Insert or update a set of messages in one transaction: either all of
    /// them become visible or none do. Each message is stamped with `thread_id`.
    fn upsert_messages_atomic(&self, thread_id: &ThreadId, messages: &[Message]) -> Result<()>;

    /// MIN/MAX message timestamps for a thread, `None` if it has no messages
    fn coverage_range(&self, thread_id: &ThreadId) -> Result<Option<CoverageRange>>;

    /// Get a thread by ID
    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>>;

    /// List all threads
    fn list_threads(&self) -> Result<Vec<Thread>>;

    /// List messages for a thread, ordered by timestamp ascending
    fn list_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Message>>;

    /// Check if a message exists
    fn has_message(&self, id: &MessageId) -> Result<bool>;

    /// Count messages in a thread
    fn count_messages_in_thread(&self, thread_id: &ThreadId) -> Result<usize>;

    /// Compare the stored message count with the remote-reported total.
    ///
    /// A mismatch is returned as a [`ConsistencyError`] inside the error,
    /// so callers can tell it apart from storage failures by downcasting.
    fn verify_count(&self, thread: &Thread) -> Result<()> {
        let actual = self.count_messages_in_thread(&thread.id)?;
        if actual != thread.message_count {
            return Err(ConsistencyError {
                thread_id: thread.id.clone(),
                thread_name: thread.display_name().to_string(),
                expected: thread.message_count,
                actual,
            }
            .into());
        }
        Ok(())
    }
}
