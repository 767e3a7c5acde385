//! Buffered all-or-nothing message writes

use anyhow::Result;

use super::ChatStore;
use crate::models::{Message, ThreadId};

/// Messages collected for a single atomic commit.
///
/// Nothing reaches the store until [`commit`](Self::commit); dropping the
/// batch discards everything pushed so far.
#[derive(Debug)]
pub struct PendingBatch {
    thread_id: ThreadId,
    messages: Vec<Message>,
}

impl PendingBatch {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Write every buffered message in one transaction, returning how many
    pub fn commit(self, store: &dyn ChatStore) -> Result<usize> {
        if self.messages.is_empty() {
            return Ok(0);
        }
        store.upsert_messages_atomic(&self.thread_id, &self.messages)?;
        Ok(self.messages.len())
    }
}
