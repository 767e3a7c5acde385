//! In-memory storage implementation
//!
//! Used by tests and dry runs. Uses HashMaps protected by RwLocks for
//! thread-safe access.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::{ChatStore, CoverageRange};
use crate::models::{Message, MessageId, Thread, ThreadId};

/// In-memory implementation of ChatStore
#[derive(Default)]
pub struct InMemoryChatStore {
    threads: RwLock<HashMap<String, Thread>>,
    messages: RwLock<HashMap<String, Message>>,
}

impl InMemoryChatStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored message, in no particular order
    pub fn all_messages(&self) -> Vec<Message> {
        self.messages.read().unwrap().values().cloned().collect()
    }
}

impl ChatStore for InMemoryChatStore {
    fn upsert_thread(&self, thread: &Thread) -> Result<()> {
        self.threads
            .write()
            .unwrap()
            .insert(thread.id.0.clone(), thread.clone());
        Ok(())
    }

    fn upsert_message(&self, message: &Message) -> Result<()> {
        self.messages
            .write()
            .unwrap()
            .insert(message.id.0.clone(), message.clone());
        Ok(())
    }

    fn upsert_messages_atomic(&self, thread_id: &ThreadId, messages: &[Message]) -> Result<()> {
        // Holding the write lock for the whole batch keeps it atomic to readers
        let mut stored = self.messages.write().unwrap();
        for message in messages {
            let mut message = message.clone();
            message.thread_id = thread_id.clone();
            stored.insert(message.id.0.clone(), message);
        }
        Ok(())
    }

    fn coverage_range(&self, thread_id: &ThreadId) -> Result<Option<CoverageRange>> {
        let messages = self.messages.read().unwrap();
        let timestamps = messages
            .values()
            .filter(|m| &m.thread_id == thread_id)
            .map(|m| m.timestamp);

        let (min, max) = timestamps.fold((None, None), |(min, max): (Option<i64>, Option<i64>), ts| {
            (
                Some(min.map_or(ts, |m| m.min(ts))),
                Some(max.map_or(ts, |m| m.max(ts))),
            )
        });

        CoverageRange::from_bounds(min, max)
    }

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>> {
        Ok(self.threads.read().unwrap().get(id.as_str()).cloned())
    }

    fn list_threads(&self) -> Result<Vec<Thread>> {
        let mut threads: Vec<Thread> = self.threads.read().unwrap().values().cloned().collect();
        threads.sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
        Ok(threads)
    }

    fn list_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .unwrap()
            .values()
            .filter(|m| &m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(messages)
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        Ok(self.messages.read().unwrap().contains_key(id.as_str()))
    }

    fn count_messages_in_thread(&self, thread_id: &ThreadId) -> Result<usize> {
        Ok(self
            .messages
            .read()
            .unwrap()
            .values()
            .filter(|m| &m.thread_id == thread_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConsistencyError;

    fn make_test_message(id: &str, thread_id: &str, timestamp: i64) -> Message {
        Message::new(
            MessageId::new(id),
            ThreadId::new(thread_id),
            timestamp,
            None,
            "author-1",
        )
    }

    #[test]
    fn test_coverage_range() {
        let store = InMemoryChatStore::new();
        let t1 = ThreadId::new("t1");
        assert_eq!(store.coverage_range(&t1).unwrap(), None);

        store.upsert_message(&make_test_message("m1", "t1", 4000)).unwrap();
        store.upsert_message(&make_test_message("m2", "t1", 2000)).unwrap();
        store.upsert_message(&make_test_message("m3", "t2", 100)).unwrap();

        assert_eq!(
            store.coverage_range(&t1).unwrap(),
            Some(CoverageRange::new(2000, 4000))
        );
    }

    #[test]
    fn test_upsert_overwrites_by_id() {
        let store = InMemoryChatStore::new();

        store.upsert_message(&make_test_message("m1", "t1", 1000)).unwrap();
        let mut edited = make_test_message("m1", "t1", 1000);
        edited.text = Some("edited".to_string());
        store.upsert_message(&edited).unwrap();

        assert_eq!(store.all_messages(), vec![edited]);
    }

    #[test]
    fn test_verify_count() {
        let store = InMemoryChatStore::new();
        let thread = Thread::new(ThreadId::new("t1"), None, 0, 2);
        store.upsert_message(&make_test_message("m1", "t1", 1000)).unwrap();

        let err = store.verify_count(&thread).unwrap_err();
        let mismatch = err.downcast_ref::<ConsistencyError>().unwrap();
        assert_eq!((mismatch.expected, mismatch.actual), (2, 1));
        assert_eq!(mismatch.thread_name, "t1");
    }
}
