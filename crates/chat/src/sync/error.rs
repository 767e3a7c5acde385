//! Sync error taxonomy

use std::time::Duration;

use crate::models::{MessageId, ThreadId};
use crate::remote::RemoteError;
use crate::storage::ConsistencyError;

/// Anything that ends a fetch pass or is recorded against a thread
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Non-transient remote failure, propagated as-is
    #[error("Remote error: {0}")]
    Remote(#[source] RemoteError),

    /// A transient failure kept recurring past the retry budget
    #[error("Gave up after {attempts} attempts over {elapsed:?}: {source}")]
    RetryExhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: RemoteError,
    },

    /// The remote returned nothing where at least the boundary message was due
    #[error("Expected non-empty page for thread {thread_id} before {before}")]
    EmptyPage { thread_id: ThreadId, before: i64 },

    /// A full page held only messages already yielded, so the walk cannot
    /// get past their shared timestamp
    #[error(
        "Thread {thread_id} has at least {limit} messages stamped {before}; raise page_size to get past them"
    )]
    StalledPage {
        thread_id: ThreadId,
        before: i64,
        limit: usize,
    },

    /// The remote broke its newest-to-oldest ordering
    #[error(
        "Ordering violation in thread {thread_id}: message {message_id} at {next} follows {previous}"
    )]
    OrderingViolation {
        thread_id: ThreadId,
        message_id: MessageId,
        previous: i64,
        next: i64,
    },

    /// A fetched message could not be projected onto the stored schema
    #[error("Malformed message in thread {thread_id}: {source}")]
    Malformed {
        thread_id: ThreadId,
        #[source]
        source: anyhow::Error,
    },

    /// Reading or writing the local store failed
    #[error("Store error: {0:#}")]
    Store(#[source] anyhow::Error),

    /// Stored count differs from the remote-reported total
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

impl SyncError {
    /// Split a store result into a consistency mismatch or a storage failure
    pub(crate) fn from_store(error: anyhow::Error) -> Self {
        match error.downcast::<ConsistencyError>() {
            Ok(mismatch) => SyncError::Consistency(mismatch),
            Err(other) => SyncError::Store(other),
        }
    }
}
