//! Scripted in-memory remote
//!
//! Serves pages from a fixed message list with the same "at or before"
//! semantics as the real API, so consecutive pages overlap by one message.
//! Failures and raw pages can be queued per thread to exercise retry and
//! protocol-anomaly paths.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::api::{RemoteMessage, RemoteThread};
use super::{RemoteError, RemoteSource};
use crate::models::{Location, ThreadId};

/// One recorded page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub thread_id: String,
    pub before: i64,
    pub limit: usize,
}

/// In-memory [`RemoteSource`] for tests
#[derive(Default)]
pub struct FakeRemote {
    threads: Mutex<Vec<(Location, RemoteThread)>>,
    /// thread uid -> messages, newest first
    messages: Mutex<HashMap<String, Vec<RemoteMessage>>>,
    failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    scripted_pages: Mutex<HashMap<String, VecDeque<Vec<RemoteMessage>>>>,
    list_failures: Mutex<HashMap<Location, RemoteError>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a thread under a location
    pub fn add_thread(&self, location: Location, thread: RemoteThread) {
        self.threads.lock().unwrap().push((location, thread));
    }

    /// Add messages to a thread.
    ///
    /// Every registered copy of the thread has its last message timestamp and
    /// message count refreshed, as the real remote would report them.
    pub fn add_messages(&self, thread_uid: &str, messages: impl IntoIterator<Item = RemoteMessage>) {
        let mut all = self.messages.lock().unwrap();
        let list = all.entry(thread_uid.to_string()).or_default();
        list.extend(messages);
        list.sort_by_key(|m| Reverse(timestamp_of(m)));

        let newest = list.first().map(timestamp_of).unwrap_or(0);
        let count = list.len();
        for (_, thread) in self.threads.lock().unwrap().iter_mut() {
            if thread.uid == thread_uid {
                thread.last_message_timestamp = newest.to_string();
                thread.message_count = Some(count);
            }
        }
    }

    /// Override the message count the remote reports for a thread
    pub fn set_message_count(&self, thread_uid: &str, count: usize) {
        for (_, thread) in self.threads.lock().unwrap().iter_mut() {
            if thread.uid == thread_uid {
                thread.message_count = Some(count);
            }
        }
    }

    /// Make the next page request for a thread fail with `error`
    pub fn push_failure(&self, thread_uid: &str, error: RemoteError) {
        self.failures
            .lock()
            .unwrap()
            .entry(thread_uid.to_string())
            .or_default()
            .push_back(error);
    }

    /// Make the next page request for a thread return exactly `page`
    pub fn push_page(&self, thread_uid: &str, page: Vec<RemoteMessage>) {
        self.scripted_pages
            .lock()
            .unwrap()
            .entry(thread_uid.to_string())
            .or_default()
            .push_back(page);
    }

    /// Make listing a location fail
    pub fn fail_listing(&self, location: Location, error: RemoteError) {
        self.list_failures.lock().unwrap().insert(location, error);
    }

    /// Page requests made so far
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Page requests made so far for one thread
    pub fn calls_for(&self, thread_uid: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.thread_id == thread_uid)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn timestamp_of(message: &RemoteMessage) -> i64 {
    message.timestamp.parse().unwrap_or(0)
}

impl RemoteSource for FakeRemote {
    fn list_threads(&self, location: Location) -> Result<Vec<RemoteThread>, RemoteError> {
        if let Some(error) = self.list_failures.lock().unwrap().get(&location) {
            return Err(error.clone());
        }
        Ok(self
            .threads
            .lock()
            .unwrap()
            .iter()
            .filter(|(loc, _)| *loc == location)
            .map(|(_, thread)| thread.clone())
            .collect())
    }

    fn fetch_messages_before(
        &self,
        thread_id: &ThreadId,
        before: i64,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        let uid = thread_id.as_str();
        self.calls.lock().unwrap().push(FetchCall {
            thread_id: uid.to_string(),
            before,
            limit,
        });

        if let Some(error) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(uid)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        if let Some(page) = self
            .scripted_pages
            .lock()
            .unwrap()
            .get_mut(uid)
            .and_then(VecDeque::pop_front)
        {
            return Ok(page);
        }

        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(uid)
            .map(|list| {
                list.iter()
                    .filter(|m| timestamp_of(m) <= before)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_overlap_on_boundary() {
        let remote = FakeRemote::new();
        remote.add_thread(Location::Inbox, RemoteThread::new("t1", Some("T"), 0, 0));
        remote.add_messages(
            "t1",
            (1..=5).map(|i| RemoteMessage::new(format!("m{}", i), "a", i * 100, None)),
        );

        let thread_id = ThreadId::new("t1");
        let first = remote.fetch_messages_before(&thread_id, 500, 2).unwrap();
        assert_eq!(first.iter().map(|m| m.uid.as_str()).collect::<Vec<_>>(), ["m5", "m4"]);

        let second = remote.fetch_messages_before(&thread_id, 400, 2).unwrap();
        assert_eq!(second.iter().map(|m| m.uid.as_str()).collect::<Vec<_>>(), ["m4", "m3"]);
    }

    #[test]
    fn test_add_messages_refreshes_thread() {
        let remote = FakeRemote::new();
        remote.add_thread(Location::Inbox, RemoteThread::new("t1", None, 0, 0));
        remote.add_messages("t1", vec![RemoteMessage::new("m1", "a", 700, None)]);

        let threads = remote.list_threads(Location::Inbox).unwrap();
        assert_eq!(threads[0].last_message_timestamp, "700");
        assert_eq!(threads[0].message_count, Some(1));
    }
}
