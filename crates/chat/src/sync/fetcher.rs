//! Lazy newest-to-oldest traversal of one thread's messages
//!
//! The remote only answers "messages at or before T", so each page is
//! requested with the timestamp of the last message already yielded as its
//! upper bound. That bound is inclusive: the next page starts with the
//! message(s) we just yielded, which are stripped before yielding more.

use std::collections::{HashSet, VecDeque};
use std::iter::FusedIterator;

use log::{debug, info};

use super::{RetryPolicy, SyncError, SyncOptions};
use crate::models::{Message, MessageId, Thread, ThreadId};
use crate::remote::{RemoteSource, project_message};

/// Iterator over a thread's messages, newest first.
///
/// Yields `Ok(message)` until the remote has nothing older, or a single
/// `Err` after which the iterator is exhausted. Pages are only requested
/// when the previous one has been consumed, so dropping the iterator stops
/// all further requests.
pub struct ThreadFetcher<'a, S: RemoteSource + ?Sized> {
    source: &'a S,
    retry: &'a RetryPolicy,
    page_size: usize,
    thread_id: ThreadId,
    thread_name: String,
    expected_total: usize,
    /// Upper bound of the first request
    start: i64,
    /// Upper bound of the next request: timestamp of the last yielded message
    watermark: i64,
    /// Messages yielded with timestamp == watermark; the next page repeats them
    boundary_ids: HashSet<MessageId>,
    last_timestamp: Option<i64>,
    buffer: VecDeque<Message>,
    finished: bool,
    /// Set by [`ThreadFetcher::stop_after_page`]: no further requests
    last_page: bool,
    yielded: usize,
    pages: usize,
}

impl<'a, S: RemoteSource + ?Sized> ThreadFetcher<'a, S> {
    /// Start a traversal of `thread` at `start_before`, or at the thread's
    /// last message when `None`.
    pub fn new(
        source: &'a S,
        thread: &Thread,
        start_before: Option<i64>,
        options: &'a SyncOptions,
    ) -> Self {
        let start = start_before.unwrap_or(thread.last_message_timestamp);
        info!(
            "thread {}: fetching messages before {}",
            thread.display_name(),
            start
        );

        Self {
            source,
            retry: &options.retry,
            page_size: options.page_size.max(2),
            thread_id: thread.id.clone(),
            thread_name: thread.display_name().to_string(),
            expected_total: thread.message_count,
            start,
            watermark: start,
            boundary_ids: HashSet::new(),
            last_timestamp: None,
            buffer: VecDeque::new(),
            finished: false,
            last_page: false,
            yielded: 0,
            pages: 0,
        }
    }

    /// Number of messages yielded so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Number of pages requested successfully so far
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Yield what the current page still holds, then end without
    /// requesting another page.
    pub fn stop_after_page(&mut self) {
        self.last_page = true;
    }

    /// Request the next page into the buffer. `Ok(false)` means traversal is complete.
    fn fetch_page(&mut self) -> Result<bool, SyncError> {
        debug!(
            "thread {}: fetched {} starting from {} (total {})",
            self.thread_name, self.yielded, self.watermark, self.expected_total
        );

        let source = self.source;
        let thread_id = &self.thread_id;
        let before = self.watermark;
        let limit = self.page_size;
        let what = format!("thread {}", self.thread_name);
        let page = self
            .retry
            .run(&what, || source.fetch_messages_before(thread_id, before, limit))?;
        self.pages += 1;

        if page.is_empty() {
            return Err(SyncError::EmptyPage {
                thread_id: self.thread_id.clone(),
                before,
            });
        }

        let full_page = page.len() >= limit;
        let fresh: Vec<_> = page
            .into_iter()
            .skip_while(|m| self.boundary_ids.contains(&MessageId::new(&m.uid)))
            .collect();

        if fresh.is_empty() && full_page {
            return Err(SyncError::StalledPage {
                thread_id: self.thread_id.clone(),
                before,
                limit,
            });
        }
        if fresh.is_empty() {
            debug!(
                "thread {}: no messages older than {}",
                self.thread_name, self.watermark
            );
            return Ok(false);
        }

        for remote in &fresh {
            let message =
                project_message(&self.thread_id, remote).map_err(|source| SyncError::Malformed {
                    thread_id: self.thread_id.clone(),
                    source,
                })?;
            self.buffer.push_back(message);
        }
        Ok(true)
    }

    fn fail(&mut self, error: SyncError) -> Option<Result<Message, SyncError>> {
        self.finished = true;
        self.buffer.clear();
        Some(Err(error))
    }
}

impl<S: RemoteSource + ?Sized> Iterator for ThreadFetcher<'_, S> {
    type Item = Result<Message, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                let previous = self.last_timestamp.unwrap_or(self.start);
                if message.timestamp > previous {
                    return self.fail(SyncError::OrderingViolation {
                        thread_id: self.thread_id.clone(),
                        message_id: message.id,
                        previous,
                        next: message.timestamp,
                    });
                }

                if message.timestamp != self.watermark {
                    self.boundary_ids.clear();
                    self.watermark = message.timestamp;
                }
                self.boundary_ids.insert(message.id.clone());
                self.last_timestamp = Some(message.timestamp);
                self.yielded += 1;
                return Some(Ok(message));
            }

            if self.finished || self.last_page {
                self.finished = true;
                return None;
            }

            match self.fetch_page() {
                Ok(true) => continue,
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(error) => return self.fail(error),
            }
        }
    }
}

impl<S: RemoteSource + ?Sized> FusedIterator for ThreadFetcher<'_, S> {}
